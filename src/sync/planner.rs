//! Maps source images onto the destination prefix and builds the [`SyncPlan`]

use crate::error::{Result, SyncError};
use crate::image::ImageReference;
use crate::logging::Logger;
use crate::registry::RegistryApi;
use crate::sync::plan::{ImageChain, PlannedOperation, SyncPlan};
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

/// Rename one specific tag while mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRewrite {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub old_prefix: String,
    pub new_prefix: String,
    pub remove_old: bool,
    pub tag_rewrite: Option<TagRewrite>,
    /// Concurrent destination lookups during planning
    pub lookup_concurrency: usize,
}

impl PlanOptions {
    pub fn new(old_prefix: impl Into<String>, new_prefix: impl Into<String>) -> Self {
        Self {
            old_prefix: old_prefix.into(),
            new_prefix: new_prefix.into(),
            remove_old: false,
            tag_rewrite: None,
            lookup_concurrency: 4,
        }
    }
}

type TagSet = Arc<HashSet<String>>;

/// Destination tags per repository, fetched at most once per key
#[derive(Debug, Clone, Default)]
pub struct TagCache {
    entries: Arc<Mutex<HashMap<String, Arc<OnceCell<TagSet>>>>>,
}

impl TagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_fetch(
        &self,
        registry: &dyn RegistryApi,
        repository: &str,
    ) -> Result<TagSet> {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(repository.to_string()).or_default().clone()
        };
        cell.get_or_try_init(|| fetch_tags(registry, repository))
            .await
            .cloned()
    }

    /// Number of repositories with a cached tag set
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|cell| cell.initialized()).count()
    }
}

async fn fetch_tags(registry: &dyn RegistryApi, repository: &str) -> Result<TagSet> {
    let tags: Vec<String> = registry.list_tags(repository).try_collect().await?;
    Ok(Arc::new(tags.into_iter().collect()))
}

/// Replace the leading `old_prefix` of the source name with `new_prefix`
pub fn map_destination(
    source: &ImageReference,
    old_prefix: &str,
    new_prefix: &str,
    tag_rewrite: Option<&TagRewrite>,
) -> Result<ImageReference> {
    let old_prefix = old_prefix.trim_matches('/');
    let new_prefix = new_prefix.trim_matches('/');

    let qualified = format!("{}/{}", source.effective_registry(), source.repository());
    let rest = [source.name(), qualified]
        .iter()
        .find_map(|name| {
            let rest = name.strip_prefix(old_prefix)?;
            (rest.is_empty() || rest.starts_with('/')).then(|| rest.to_string())
        })
        .ok_or_else(|| {
            SyncError::Validation(format!(
                "{} is not under the source prefix {}",
                source, old_prefix
            ))
        })?;

    let tag = match tag_rewrite {
        Some(rewrite) if rewrite.from == source.tag() => rewrite.to.as_str(),
        _ => source.tag(),
    };

    let destination = ImageReference::from_name(&format!("{}{}", new_prefix, rest), tag)?;
    if destination == *source {
        return Err(SyncError::Validation(format!(
            "{} maps onto itself; source and destination prefixes must differ",
            source
        )));
    }
    Ok(destination)
}

pub struct SyncPlanner<'a> {
    registry: &'a dyn RegistryApi,
    cache: TagCache,
    output: Logger,
}

impl<'a> SyncPlanner<'a> {
    /// `registry` is the destination registry
    pub fn new(registry: &'a dyn RegistryApi, output: Logger) -> Self {
        Self {
            registry,
            cache: TagCache::new(),
            output,
        }
    }

    pub fn with_cache(mut self, cache: TagCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &TagCache {
        &self.cache
    }

    pub async fn plan(
        &self,
        sources: &[ImageReference],
        options: &PlanOptions,
    ) -> Result<SyncPlan> {
        let pairs = sources
            .iter()
            .map(|source| {
                map_destination(
                    source,
                    &options.old_prefix,
                    &options.new_prefix,
                    options.tag_rewrite.as_ref(),
                )
                .map(|destination| (source, destination))
            })
            .collect::<Result<Vec<_>>>()?;

        let concurrency = options.lookup_concurrency.max(1);

        let mut repositories = Vec::new();
        let mut seen = HashSet::new();
        for (_, destination) in &pairs {
            if seen.insert(destination.repository()) {
                repositories.push(destination.repository());
            }
        }
        self.output.verbose(&format!(
            "Checking {} destination repositories for existing tags",
            repositories.len()
        ));
        let blocked = self.list_destinations(repositories, concurrency).await?;
        let blocked = &blocked;

        let existing: Vec<Option<String>> = stream::iter(pairs.iter())
            .map(|(_, destination)| async move {
                if blocked.contains_key(destination.repository()) {
                    return Ok(None);
                }
                self.existing_digest(destination).await
            })
            .buffered(concurrency)
            .try_collect()
            .await?;

        let chains = pairs
            .into_iter()
            .zip(existing)
            .enumerate()
            .map(|(index, ((source, destination), existing_digest))| {
                let mut operations = vec![
                    PlannedOperation::pull(source.clone(), destination.clone()),
                    PlannedOperation::retag(source.clone(), destination.clone()),
                    PlannedOperation::push(
                        source.clone(),
                        destination.clone(),
                        existing_digest,
                    ),
                ];
                if options.remove_old {
                    operations.push(PlannedOperation::delete_old(
                        source.clone(),
                        destination.clone(),
                    ));
                }
                ImageChain {
                    index,
                    source: source.clone(),
                    operations,
                    blocked: blocked.get(destination.repository()).cloned(),
                }
            })
            .collect();

        let plan = SyncPlan::from_chains(chains);
        self.output.verbose(&format!(
            "Planned {} operations for {} images",
            plan.len(),
            plan.images().len()
        ));
        Ok(plan)
    }

    /// Fill the tag cache for every destination repository
    ///
    /// Returns the repositories whose listing failed, with the cause. Only
    /// auth failures abort planning; any other failure blocks just the
    /// images pushed to that repository.
    async fn list_destinations(
        &self,
        repositories: Vec<&str>,
        concurrency: usize,
    ) -> Result<HashMap<String, String>> {
        let listings: Vec<(&str, Result<TagSet>)> = stream::iter(repositories)
            .map(|repository| async move {
                let tags = self.cache.get_or_fetch(self.registry, repository).await;
                (repository, tags)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut blocked = HashMap::new();
        for (repository, listing) in listings {
            match listing {
                Ok(_) => {}
                Err(err @ SyncError::Auth(_)) => return Err(err),
                Err(err) => {
                    self.output.warning(&format!(
                        "Images for {} will not be synced: {}",
                        repository, err
                    ));
                    blocked.insert(
                        repository.to_string(),
                        format!("destination tag listing failed: {}", err),
                    );
                }
            }
        }
        Ok(blocked)
    }

    /// Digest of the destination tag if it already exists
    async fn existing_digest(&self, destination: &ImageReference) -> Result<Option<String>> {
        let tags = self
            .cache
            .get_or_fetch(self.registry, destination.repository())
            .await?;
        if !tags.contains(destination.tag()) {
            return Ok(None);
        }

        match self
            .registry
            .manifest_digest(destination.repository(), destination.tag())
            .await
        {
            Ok(digest) => Ok(digest),
            Err(err) if !matches!(err, SyncError::Auth(_)) => {
                self.output.warning(&format!(
                    "Could not read digest of existing {}: {}",
                    destination, err
                ));
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}
