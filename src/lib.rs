//! Registry Sync Library
//!
//! This file serves as the library root for the registry-sync crate, which
//! copies a versioned set of container images from a source registry prefix
//! to a destination prefix: pull, retag, push and optionally remove the old
//! local tag.

pub mod cli;
pub mod error;
pub mod image;
pub mod logging;
pub mod output;
pub mod registry;
pub mod runtime;
pub mod sync;

pub use error::{Result, SyncError};
pub use image::ImageReference;
pub use logging::Logger;
pub use registry::{Credentials, RegistryApi};
pub use runtime::ContainerRuntime;
pub use sync::{RunSummary, SyncPlan};
