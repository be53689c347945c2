//! Registry module for Docker Hub and Distribution v2 interactions
//!
//! This module provides authentication, paginated listings and manifest digest
//! lookups. The rest of the pipeline only sees the [`RegistryApi`] trait, so
//! tests can substitute an in-memory registry.

pub mod auth;
pub mod client;
pub mod pagination;

pub use auth::{Auth, Credentials, Session};
pub use client::{DOCKER_HUB_URL, RegistryClient, RegistryClientBuilder, RegistryKind};
pub use pagination::{Listing, RetryPolicy};

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Read-only registry queries used by the resolver and the planner
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Repository names under `namespace`, relative to it
    fn list_repositories(&self, namespace: &str) -> BoxStream<'static, Result<String>>;

    /// Tags of `repository`; each call starts a fresh listing
    fn list_tags(&self, repository: &str) -> BoxStream<'static, Result<String>>;

    /// Manifest digest of `repository:tag`; `None` when the tag is absent
    async fn manifest_digest(&self, repository: &str, tag: &str) -> Result<Option<String>>;
}

/// A [`RegistryClient`] bound to an established [`Session`]
#[derive(Debug, Clone)]
pub struct AuthenticatedRegistry {
    client: RegistryClient,
    session: Session,
}

impl AuthenticatedRegistry {
    pub fn new(client: RegistryClient, session: Session) -> Self {
        Self { client, session }
    }

    /// Authenticate `client` and bind the resulting session
    pub async fn connect(
        client: RegistryClient,
        credentials: Option<&Credentials>,
    ) -> Result<Self> {
        let session = client.authenticate(credentials).await?;
        Ok(Self::new(client, session))
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

#[async_trait]
impl RegistryApi for AuthenticatedRegistry {
    fn list_repositories(&self, namespace: &str) -> BoxStream<'static, Result<String>> {
        self.client.list_repositories(&self.session, namespace).stream()
    }

    fn list_tags(&self, repository: &str) -> BoxStream<'static, Result<String>> {
        self.client.list_tags(&self.session, repository).stream()
    }

    async fn manifest_digest(&self, repository: &str, tag: &str) -> Result<Option<String>> {
        self.client
            .manifest_digest(&self.session, repository, tag)
            .await
    }
}
