//! Command line interface module
//!
//! Argument parsing, configuration assembly and the runner that drives the
//! sync pipeline.

pub mod args;
pub mod config;
pub mod runner;

pub use args::Args;
pub use config::{RegistryEndpoint, SyncConfig};
pub use runner::Runner;
