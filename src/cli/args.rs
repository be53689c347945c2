//! Command-line argument parsing

use crate::output::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "registry-sync")]
#[command(about = "Copy a versioned set of container images from one registry prefix to another")]
#[command(version, author)]
pub struct Args {
    /// Perform the sync (the default is a dry run)
    #[arg(
        long = "execute",
        short = 'x',
        help = "Actually pull, retag and push; without this flag nothing is changed"
    )]
    pub execute: bool,

    #[arg(
        long = "packages",
        short = 'p',
        conflicts_with = "packages_file",
        help = "Comma-separated package names or glob patterns \
                (default: every repository under the source prefix)"
    )]
    pub packages: Option<String>,

    #[arg(
        long = "packages-file",
        help = "File with one package per line; blank lines and # comments are ignored"
    )]
    pub packages_file: Option<PathBuf>,

    #[arg(
        long = "versions",
        conflicts_with = "versions_file",
        help = "Comma-separated tags, '*' for all tags or globs such as 24.* (default: *)"
    )]
    pub versions: Option<String>,

    #[arg(
        long = "versions-file",
        help = "File with one version selector per line"
    )]
    pub versions_file: Option<PathBuf>,

    #[arg(
        long = "image",
        value_delimiter = ',',
        conflicts_with_all = ["packages", "packages_file", "versions", "versions_file"],
        help = "Sync these image:tag references directly, skipping resolution"
    )]
    pub image: Vec<String>,

    /// Source prefix, e.g. microfocusidolserver
    #[arg(
        long = "old-repo",
        env = "OLD_REPO",
        help = "Source repository prefix ([registry/]namespace)"
    )]
    pub old_repo: Option<String>,

    /// Destination prefix, e.g. registry.gitlab.example.com/idol
    #[arg(
        long = "new-repo",
        env = "NEW_REPO",
        help = "Destination repository prefix (registry/namespace)"
    )]
    pub new_repo: Option<String>,

    #[arg(
        long = "source-registry-url",
        env = "SOURCE_REGISTRY_URL",
        help = "Source registry API URL (default: Docker Hub, or the registry in --old-repo)"
    )]
    pub source_registry_url: Option<String>,

    #[arg(
        long = "registry-url",
        env = "REGISTRY_URL",
        help = "Destination registry API URL (default: first component of --new-repo)"
    )]
    pub registry_url: Option<String>,

    #[arg(long = "docker-hub-username", env = "DOCKER_HUB_USERNAME")]
    pub docker_hub_username: Option<String>,

    #[arg(long = "docker-hub-password", env = "DOCKER_HUB_PASSWORD", hide_env_values = true)]
    pub docker_hub_password: Option<String>,

    #[arg(long = "registry-username", env = "REGISTRY_USERNAME")]
    pub registry_username: Option<String>,

    #[arg(long = "registry-password", env = "REGISTRY_PASSWORD", hide_env_values = true)]
    pub registry_password: Option<String>,

    /// GitLab access token, used as the destination password
    #[arg(long = "gitlab-token", env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: Option<String>,

    #[arg(
        long = "remove-old",
        help = "Remove the local source tag after a successful push"
    )]
    pub remove_old: bool,

    #[arg(
        long = "concurrency",
        short = 'j',
        default_value = "4",
        help = "Number of images synced in parallel"
    )]
    pub concurrency: usize,

    #[arg(
        long = "source-tag",
        requires = "target_tag",
        help = "Tag to rename while syncing (requires --target-tag)"
    )]
    pub source_tag: Option<String>,

    #[arg(
        long = "target-tag",
        requires = "source_tag",
        help = "New name for --source-tag at the destination"
    )]
    pub target_tag: Option<String>,

    #[arg(
        long = "strict",
        help = "Fail when a wildcard package has no tags instead of warning"
    )]
    pub strict: bool,

    #[arg(
        long = "use-existing-auth",
        help = "Skip docker login and rely on the existing docker credentials"
    )]
    pub use_existing_auth: bool,

    #[arg(
        long = "output",
        short = 'o',
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Summary format"
    )]
    pub output: OutputFormat,

    #[arg(
        long = "report-dir",
        help = "Write sync_report_<timestamp>.json into this directory"
    )]
    pub report_dir: Option<PathBuf>,

    #[arg(
        long = "docker",
        env = "DOCKER_BINARY",
        default_value = "docker",
        help = "Docker CLI binary"
    )]
    pub docker: String,

    #[arg(
        long = "skip-tls",
        short = 'k',
        help = "Skip TLS certificate verification for registry API calls"
    )]
    pub skip_tls: bool,

    #[arg(
        long = "timeout",
        short = 't',
        default_value = "300",
        help = "Timeout for registry API calls in seconds"
    )]
    pub timeout: u64,

    #[arg(
        long = "retry",
        default_value = "3",
        help = "Attempts per registry API call"
    )]
    pub retry: u32,

    #[arg(long = "verbose", short = 'v', help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long = "quiet",
        short = 'q',
        conflicts_with = "verbose",
        help = "Only print errors and the final summary"
    )]
    pub quiet: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("Concurrency must be greater than 0".to_string());
        }

        if self.timeout == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.retry == 0 {
            return Err("Retry attempts must be greater than 0".to_string());
        }

        if self.source_tag.is_some() != self.target_tag.is_some() {
            return Err("--source-tag and --target-tag must be given together".to_string());
        }

        let mut list_files = self.packages_file.iter().chain(&self.versions_file);
        if let Some(path) = list_files.find(|p| !p.exists()) {
            return Err(format!("File does not exist: {}", path.display()));
        }

        for (name, url) in [
            ("--source-registry-url", &self.source_registry_url),
            ("--registry-url", &self.registry_url),
        ] {
            if let Some(url) = url {
                let http = url.starts_with("http://") || url.starts_with("https://");
                if url.contains("://") && !http {
                    return Err(format!("{} must use http:// or https://", name));
                }
            }
        }

        Ok(())
    }
}
