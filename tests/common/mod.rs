//! In-memory registry and container runtime used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use registry_sync::error::{Result, SyncError};
use registry_sync::image::{DigestUtils, ImageReference};
use registry_sync::registry::{Credentials, RegistryApi};
use registry_sync::runtime::ContainerRuntime;
use registry_sync::sync::CancelSignal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RegistryState {
    repositories: Vec<String>,
    tags: HashMap<String, Vec<String>>,
    digests: HashMap<String, String>,
    unavailable: HashSet<String>,
    repository_calls: usize,
    tag_calls: HashMap<String, usize>,
    digest_calls: usize,
}

/// Registry keyed by repository path without the registry host
#[derive(Clone, Default)]
pub struct FakeRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(self, repository: &str, tags: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            if !state.repositories.iter().any(|r| r == repository) {
                state.repositories.push(repository.to_string());
            }
            let entry = state.tags.entry(repository.to_string()).or_default();
            entry.extend(tags.iter().map(|t| t.to_string()));
        }
        self
    }

    /// Tag listings of `repository` fail as if the registry kept answering 503
    pub fn with_unavailable_tags(self, repository: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .unavailable
            .insert(repository.to_string());
        self
    }

    pub fn with_digest(self, repository: &str, tag: &str, digest: &str) -> Self {
        self.publish(repository, tag, digest);
        self
    }

    /// Record `repository:tag` as present with `digest`
    pub fn publish(&self, repository: &str, tag: &str, digest: &str) {
        let mut state = self.state.lock().unwrap();
        if !state.repositories.iter().any(|r| r == repository) {
            state.repositories.push(repository.to_string());
        }
        let tags = state.tags.entry(repository.to_string()).or_default();
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
        state
            .digests
            .insert(format!("{}:{}", repository, tag), digest.to_string());
    }

    pub fn has_tag(&self, repository: &str, tag: &str) -> bool {
        let state = self.state.lock().unwrap();
        state
            .tags
            .get(repository)
            .is_some_and(|tags| tags.iter().any(|t| t == tag))
    }

    pub fn tag_calls(&self, repository: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.tag_calls.get(repository).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.repository_calls + state.tag_calls.values().sum::<usize>() + state.digest_calls
    }
}

#[async_trait]
impl RegistryApi for FakeRegistry {
    fn list_repositories(&self, namespace: &str) -> BoxStream<'static, Result<String>> {
        let mut state = self.state.lock().unwrap();
        state.repository_calls += 1;
        let prefix = format!("{}/", namespace.trim_matches('/'));
        let names: Vec<String> = state
            .repositories
            .iter()
            .filter_map(|r| r.strip_prefix(&prefix).map(str::to_string))
            .collect();
        stream::iter(names.into_iter().map(Ok)).boxed()
    }

    fn list_tags(&self, repository: &str) -> BoxStream<'static, Result<String>> {
        let mut state = self.state.lock().unwrap();
        *state.tag_calls.entry(repository.to_string()).or_default() += 1;
        if state.unavailable.contains(repository) {
            let err = SyncError::RegistryUnavailable {
                operation: format!("list tags of {}", repository),
                attempts: 3,
                message: "HTTP 503".to_string(),
            };
            return stream::once(async move { Err(err) }).boxed();
        }
        let tags = state.tags.get(repository).cloned().unwrap_or_default();
        stream::iter(tags.into_iter().map(Ok)).boxed()
    }

    async fn manifest_digest(&self, repository: &str, tag: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.digest_calls += 1;
        Ok(state.digests.get(&format!("{}:{}", repository, tag)).cloned())
    }
}

#[derive(Default)]
struct RuntimeState {
    calls: Vec<String>,
    local: HashMap<String, String>,
}

/// Records docker-like calls; pushes are published to an optional registry
#[derive(Clone, Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<RuntimeState>>,
    source_digests: HashMap<String, String>,
    repo_digests: HashMap<String, String>,
    failures: HashSet<String>,
    destination: Option<FakeRegistry>,
    cancel_on_first_pull: Option<CancelSignal>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digest a pull of `image` produces; defaults to a hash of the name
    pub fn with_source_digest(mut self, image: &str, digest: &str) -> Self {
        self.source_digests
            .insert(image.to_string(), digest.to_string());
        self
    }

    /// RepoDigest reported for `image` regardless of what was pulled or tagged
    pub fn with_repo_digest(mut self, image: &str, digest: &str) -> Self {
        self.repo_digests
            .insert(image.to_string(), digest.to_string());
        self
    }

    /// Make `"<verb> <image>"` fail, e.g. `"push registry.example.com/idol/find:24.4"`
    pub fn failing(mut self, call: &str) -> Self {
        self.failures.insert(call.to_string());
        self
    }

    pub fn publishing_to(mut self, registry: FakeRegistry) -> Self {
        self.destination = Some(registry);
        self
    }

    pub fn cancelling_on_first_pull(mut self, cancel: CancelSignal) -> Self {
        self.cancel_on_first_pull = Some(cancel);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, verb: &str) -> usize {
        let prefix = format!("{} ", verb);
        self.calls().iter().filter(|c| c.starts_with(&prefix)).count()
    }

    fn record(&self, verb: &str, image: &ImageReference) -> Result<()> {
        let call = format!("{} {}", verb, image);
        self.state.lock().unwrap().calls.push(call.clone());
        if self.failures.contains(&call) {
            return Err(SyncError::Runtime(format!("simulated failure: {}", call)));
        }
        Ok(())
    }

    fn default_digest(image: &ImageReference) -> String {
        DigestUtils::compute_docker_digest(image.to_string().as_bytes())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn login(&self, registry: &str, credentials: &Credentials) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("login {} {}", registry, credentials.username));
        Ok(())
    }

    async fn pull(&self, image: &ImageReference) -> Result<()> {
        if let Some(cancel) = &self.cancel_on_first_pull {
            cancel.cancel();
        }
        self.record("pull", image)?;
        let digest = self
            .source_digests
            .get(&image.to_string())
            .cloned()
            .unwrap_or_else(|| Self::default_digest(image));
        self.state
            .lock()
            .unwrap()
            .local
            .insert(image.to_string(), digest);
        Ok(())
    }

    async fn tag(&self, source: &ImageReference, target: &ImageReference) -> Result<()> {
        self.record("tag", source)?;
        let mut state = self.state.lock().unwrap();
        let digest = state
            .local
            .get(&source.to_string())
            .cloned()
            .ok_or_else(|| SyncError::Runtime(format!("No such image: {}", source)))?;
        state.local.insert(target.to_string(), digest);
        Ok(())
    }

    async fn push(&self, image: &ImageReference) -> Result<()> {
        self.record("push", image)?;
        let digest = self
            .state
            .lock()
            .unwrap()
            .local
            .get(&image.to_string())
            .cloned()
            .ok_or_else(|| SyncError::Runtime(format!("No such image: {}", image)))?;
        if let Some(registry) = &self.destination {
            registry.publish(image.repository(), image.tag(), &digest);
        }
        Ok(())
    }

    async fn remove(&self, image: &ImageReference) -> Result<()> {
        self.record("rmi", image)?;
        self.state.lock().unwrap().local.remove(&image.to_string());
        Ok(())
    }

    async fn repo_digest(&self, image: &ImageReference) -> Result<Option<String>> {
        if let Some(digest) = self.repo_digests.get(&image.to_string()) {
            return Ok(Some(digest.clone()));
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .local
            .get(&image.to_string())
            .cloned())
    }
}
