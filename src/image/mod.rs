//! Image naming and content identity
//!
//! - [`reference`]: `[registry/]repository:tag` references with docker's
//!   registry-defaulting rules
//! - [`digest`]: `sha256:` manifest digest helpers

pub mod digest;
pub mod reference;

pub use digest::DigestUtils;
pub use reference::{DEFAULT_REGISTRY, ImageReference, split_registry};
