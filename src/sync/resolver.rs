//! Expands packages × version selectors into concrete source images

use crate::error::{Result, SyncError};
use crate::image::{ImageReference, split_registry};
use crate::logging::Logger;
use crate::registry::RegistryApi;
use crate::sync::package::{PackageSpec, VersionSelector};
use futures::TryStreamExt;
use std::collections::HashSet;

/// What to do when a wildcard package has no tags in the source registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownPackagePolicy {
    #[default]
    Warn,
    Fail,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Deduplicated source images, first occurrence order
    pub references: Vec<ImageReference>,
    pub warnings: Vec<String>,
}

pub struct ImageSetResolver<'a> {
    registry: &'a dyn RegistryApi,
    source_prefix: String,
    policy: UnknownPackagePolicy,
    output: Logger,
}

impl<'a> ImageSetResolver<'a> {
    /// `source_prefix` is `[registry/]namespace`, e.g. `microfocusidolserver`
    pub fn new(registry: &'a dyn RegistryApi, source_prefix: &str, output: Logger) -> Self {
        Self {
            registry,
            source_prefix: source_prefix.trim_matches('/').to_string(),
            policy: UnknownPackagePolicy::default(),
            output,
        }
    }

    pub fn with_policy(mut self, policy: UnknownPackagePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub async fn resolve(&self, specs: &[PackageSpec]) -> Result<Resolution> {
        let mut resolution = Resolution::default();
        let specs = self.expand_packages(specs, &mut resolution).await?;

        let mut seen = HashSet::new();
        for spec in &specs {
            for reference in self.resolve_package(spec, &mut resolution).await? {
                if seen.insert(reference.clone()) {
                    resolution.references.push(reference);
                }
            }
        }

        self.output.verbose(&format!(
            "Resolved {} image(s) from {} package(s)",
            resolution.references.len(),
            specs.len()
        ));
        Ok(resolution)
    }

    /// Namespace path inside the source registry
    fn namespace(&self) -> &str {
        split_registry(&self.source_prefix).1
    }

    /// Replace glob package names with the matching repositories
    async fn expand_packages(
        &self,
        specs: &[PackageSpec],
        resolution: &mut Resolution,
    ) -> Result<Vec<PackageSpec>> {
        let mut repositories: Option<Vec<String>> = None;
        let mut expanded = Vec::new();

        for spec in specs {
            if !spec.is_pattern() {
                expanded.push(spec.clone());
                continue;
            }

            if repositories.is_none() {
                self.output.verbose(&format!(
                    "Listing repositories under {}",
                    self.namespace()
                ));
                repositories = Some(
                    self.registry
                        .list_repositories(self.namespace())
                        .try_collect()
                        .await?,
                );
            }
            let matching: Vec<&String> = repositories
                .iter()
                .flatten()
                .filter(|repository| spec.matches_name(repository))
                .collect();

            if matching.is_empty() {
                self.unknown_package(&spec.name, resolution)?;
                continue;
            }
            self.output.detail(&format!(
                "Package pattern {} matched {} repositories",
                spec.name,
                matching.len()
            ));
            expanded.extend(matching.into_iter().map(|name| spec.with_name(name.as_str())));
        }

        Ok(expanded)
    }

    async fn resolve_package(
        &self,
        spec: &PackageSpec,
        resolution: &mut Resolution,
    ) -> Result<Vec<ImageReference>> {
        let name = format!("{}/{}", self.source_prefix, spec.name);
        let repository = format!("{}/{}", self.namespace(), spec.name);

        let tags: Vec<String> = if spec.selectors.iter().all(VersionSelector::is_literal) {
            Vec::new()
        } else {
            self.output
                .detail(&format!("Listing tags for {}", repository));
            self.registry.list_tags(&repository).try_collect().await?
        };

        let mut references = Vec::new();
        for selector in &spec.selectors {
            match selector {
                VersionSelector::Literal(tag) => {
                    references.push(ImageReference::from_name(&name, tag.as_str())?);
                }
                VersionSelector::All | VersionSelector::Pattern(_) => {
                    if tags.is_empty() {
                        self.unknown_package(&spec.name, resolution)?;
                        continue;
                    }
                    let before = references.len();
                    for tag in tags.iter().filter(|tag| selector.matches(tag)) {
                        references.push(ImageReference::from_name(&name, tag.as_str())?);
                    }
                    if references.len() == before {
                        let warning =
                            format!("No tags of {} match version selector {}", name, selector);
                        self.output.warning(&warning);
                        resolution.warnings.push(warning);
                    }
                }
            }
        }

        Ok(references)
    }

    fn unknown_package(&self, package: &str, resolution: &mut Resolution) -> Result<()> {
        let err = SyncError::UnknownPackage(format!("{}/{}", self.source_prefix, package));
        match self.policy {
            UnknownPackagePolicy::Fail => Err(err),
            UnknownPackagePolicy::Warn => {
                let warning = err.to_string();
                if !resolution.warnings.contains(&warning) {
                    self.output.warning(&warning);
                    resolution.warnings.push(warning);
                }
                Ok(())
            }
        }
    }
}
