//! Container runtime abstraction
//!
//! The executor never shells out itself; it drives a [`ContainerRuntime`].
//! [`DockerCli`] implements it on top of the `docker` binary, and tests use an
//! in-memory fake.

pub mod docker;

pub use docker::DockerCli;

use crate::error::Result;
use crate::image::ImageReference;
use crate::registry::Credentials;
use async_trait::async_trait;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Log the runtime in to `registry` (host, optionally with port)
    async fn login(&self, registry: &str, credentials: &Credentials) -> Result<()>;

    async fn pull(&self, image: &ImageReference) -> Result<()>;

    /// Add `target` as a local alias of `source`
    async fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<()>;

    async fn push(&self, image: &ImageReference) -> Result<()>;

    /// Remove the local `image` tag
    async fn remove(&self, image: &ImageReference) -> Result<()>;

    /// Registry manifest digest recorded for the local `image`, if known
    async fn repo_digest(&self, image: &ImageReference) -> Result<Option<String>>;
}
