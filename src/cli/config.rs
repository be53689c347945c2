//! Run configuration assembled from arguments and environment

use crate::cli::args::Args;
use crate::error::{Result, SyncError};
use crate::image::{DEFAULT_REGISTRY, ImageReference, split_registry};
use crate::output::OutputFormat;
use crate::registry::{Credentials, DOCKER_HUB_URL, RetryPolicy};
use crate::sync::package::{WILDCARD, parse_list, read_list_file};
use crate::sync::{ExecuteOptions, PackageSpec, PlanOptions, TagRewrite, UnknownPackagePolicy};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Username GitLab accepts together with an access token
const GITLAB_TOKEN_USER: &str = "oauth2";

/// One side of the sync: API endpoint, docker login server and credentials
#[derive(Debug, Clone)]
pub struct RegistryEndpoint {
    pub url: String,
    /// Server name passed to `docker login`
    pub runtime_registry: String,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub source: RegistryEndpoint,
    pub destination: RegistryEndpoint,
    pub old_prefix: String,
    pub new_prefix: String,
    pub packages: Vec<PackageSpec>,
    /// Explicit source images; when set, package resolution is skipped
    pub images: Vec<ImageReference>,
    pub remove_old: bool,
    pub tag_rewrite: Option<TagRewrite>,
    pub policy: UnknownPackagePolicy,
    pub execute: bool,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub timeout: u64,
    pub skip_tls: bool,
    pub use_existing_auth: bool,
    pub output_format: OutputFormat,
    pub report_dir: Option<PathBuf>,
    pub docker_binary: String,
}

impl SyncConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let old_prefix = required(&args.old_repo, "OLD_REPO (--old-repo)")?;
        let new_prefix = required(&args.new_repo, "NEW_REPO (--new-repo)")?;

        let packages = match (&args.packages, &args.packages_file) {
            (Some(list), _) => parse_list(list),
            (None, Some(path)) => read_list_file(path)?,
            (None, None) => vec![WILDCARD.to_string()],
        };
        let versions = match (&args.versions, &args.versions_file) {
            (Some(list), _) => parse_list(list),
            (None, Some(path)) => read_list_file(path)?,
            (None, None) => vec![WILDCARD.to_string()],
        };
        if packages.is_empty() {
            return Err(SyncError::Configuration("No packages given".to_string()));
        }
        if versions.is_empty() {
            return Err(SyncError::Configuration("No versions given".to_string()));
        }

        let images = explicit_images(&args.image, &old_prefix)?;

        let source_host = split_registry(&old_prefix)
            .0
            .unwrap_or(DEFAULT_REGISTRY)
            .to_string();
        let source = RegistryEndpoint {
            url: source_url(args.source_registry_url.as_deref(), &old_prefix)?,
            credentials: credentials_pair(
                &args.docker_hub_username,
                &args.docker_hub_password,
                "DOCKER_HUB_USERNAME",
                "DOCKER_HUB_PASSWORD",
            )?
            .map(|c| c.with_registry_url(&source_host)),
            runtime_registry: source_host,
        };

        let destination_host = new_prefix
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let destination_password = args
            .registry_password
            .clone()
            .or_else(|| args.gitlab_token.clone());
        let destination_username = args.registry_username.clone().or_else(|| {
            args.gitlab_token
                .as_ref()
                .map(|_| GITLAB_TOKEN_USER.to_string())
        });
        let destination = RegistryEndpoint {
            url: match &args.registry_url {
                Some(url) => with_scheme(url),
                None => with_scheme(&destination_host),
            },
            credentials: credentials_pair(
                &destination_username,
                &destination_password,
                "REGISTRY_USERNAME",
                "REGISTRY_PASSWORD or GITLAB_TOKEN",
            )?
            .map(|c| c.with_registry_url(&destination_host)),
            runtime_registry: destination_host,
        };

        let tag_rewrite = match (&args.source_tag, &args.target_tag) {
            (Some(from), Some(to)) => Some(TagRewrite {
                from: from.clone(),
                to: to.clone(),
            }),
            (None, None) => None,
            _ => {
                return Err(SyncError::Configuration(
                    "--source-tag and --target-tag must be given together".to_string(),
                ));
            }
        };

        let config = Self {
            source,
            destination,
            old_prefix,
            new_prefix,
            packages: PackageSpec::cross(&packages, &versions)?,
            images,
            remove_old: args.remove_old,
            tag_rewrite,
            policy: if args.strict {
                UnknownPackagePolicy::Fail
            } else {
                UnknownPackagePolicy::Warn
            },
            execute: args.execute,
            concurrency: args.concurrency,
            retry: RetryPolicy::new(args.retry, Duration::from_millis(500)),
            timeout: args.timeout,
            skip_tls: args.skip_tls,
            use_existing_auth: args.use_existing_auth,
            output_format: args.output,
            report_dir: args.report_dir.clone(),
            docker_binary: args.docker.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.old_prefix == self.new_prefix {
            return Err(SyncError::Validation(
                "OLD_REPO and NEW_REPO must differ".to_string(),
            ));
        }
        if self.destination.runtime_registry.is_empty() {
            return Err(SyncError::Validation(format!(
                "Cannot derive a registry host from NEW_REPO {}",
                self.new_prefix
            )));
        }
        if self.concurrency == 0 {
            return Err(SyncError::Validation(
                "Concurrency must be greater than 0".to_string(),
            ));
        }
        for endpoint in [&self.source, &self.destination] {
            url::Url::parse(&endpoint.url)?;
            if let Some(credentials) = &endpoint.credentials {
                credentials.validate()?;
            }
        }
        Ok(())
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            old_prefix: self.old_prefix.clone(),
            new_prefix: self.new_prefix.clone(),
            remove_old: self.remove_old,
            tag_rewrite: self.tag_rewrite.clone(),
            lookup_concurrency: self.concurrency,
        }
    }

    pub fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            dry_run: !self.execute,
            concurrency: self.concurrency,
        }
    }

    /// Printable settings; never includes secrets
    pub fn describe(&self) -> Vec<(&'static str, String)> {
        let user = |endpoint: &RegistryEndpoint| {
            endpoint
                .credentials
                .as_ref()
                .map(|c| c.username.clone())
                .unwrap_or_else(|| "(anonymous)".to_string())
        };
        let package_names: Vec<&str> = self.packages.iter().map(|p| p.name.as_str()).collect();
        let versions: Vec<String> = self
            .packages
            .first()
            .map(|p| p.selectors.iter().map(ToString::to_string).collect())
            .unwrap_or_default();

        let mut items = vec![
            ("Mode", if self.execute { "execute" } else { "dry-run" }.to_string()),
            ("Source", format!("{} ({})", self.old_prefix, self.source.url)),
            ("Source user", user(&self.source)),
            ("Destination", format!("{} ({})", self.new_prefix, self.destination.url)),
            ("Destination user", user(&self.destination)),
        ];
        if self.images.is_empty() {
            items.push(("Packages", package_names.join(", ")));
            items.push(("Versions", versions.join(", ")));
        } else {
            let images: Vec<String> = self.images.iter().map(ToString::to_string).collect();
            items.push(("Images", images.join(", ")));
        }
        items.push(("Concurrency", self.concurrency.to_string()));
        items.push(("Remove old", self.remove_old.to_string()));
        if let Some(rewrite) = &self.tag_rewrite {
            items.push(("Tag rewrite", format!("{} -> {}", rewrite.from, rewrite.to)));
        }
        items
    }
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .as_deref()
        .map(|v| v.trim().trim_matches('/'))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SyncError::Configuration(format!("{} is not set", name)))
}

fn credentials_pair(
    username: &Option<String>,
    password: &Option<String>,
    username_name: &str,
    password_name: &str,
) -> Result<Option<Credentials>> {
    match (username, password) {
        (Some(username), Some(password)) => Ok(Some(Credentials::new(username, password))),
        (None, None) => Ok(None),
        (Some(_), None) => Err(SyncError::Configuration(format!(
            "{} is set but {} is not",
            username_name, password_name
        ))),
        (None, Some(_)) => Err(SyncError::Configuration(format!(
            "{} is set but {} is not",
            password_name, username_name
        ))),
    }
}

/// `--image` references; names outside `old_prefix` are taken relative to it
fn explicit_images(refs: &[String], old_prefix: &str) -> Result<Vec<ImageReference>> {
    let mut seen = HashSet::new();
    let mut images = Vec::new();
    for reference in refs.iter().map(|r| r.trim()).filter(|r| !r.is_empty()) {
        let image = if reference.starts_with(&format!("{}/", old_prefix)) {
            ImageReference::parse(reference)?
        } else {
            ImageReference::parse(&format!("{}/{}", old_prefix, reference))?
        };
        if seen.insert(image.to_string()) {
            images.push(image);
        }
    }
    Ok(images)
}

fn source_url(explicit: Option<&str>, old_prefix: &str) -> Result<String> {
    Ok(match (explicit, split_registry(old_prefix).0) {
        (Some(url), _) => with_scheme(url),
        (None, Some(host)) if host != DEFAULT_REGISTRY => with_scheme(host),
        _ => DOCKER_HUB_URL.to_string(),
    })
}

fn with_scheme(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}
