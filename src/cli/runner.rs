//! Runner wiring the pipeline together: connect → resolve → plan → execute

use crate::cli::args::Args;
use crate::cli::config::{RegistryEndpoint, SyncConfig};
use crate::error::Result;
use crate::image::ImageReference;
use crate::logging::Logger;
use crate::output::{self, OutputFormat};
use crate::registry::{AuthenticatedRegistry, RegistryApi, RegistryClient};
use crate::runtime::{ContainerRuntime, DockerCli};
use crate::sync::{CancelSignal, Executor, ImageSetResolver, RunSummary, SyncPlanner};
use std::sync::Arc;

pub struct Runner {
    config: SyncConfig,
    output: Logger,
    source: Option<Arc<dyn RegistryApi>>,
    destination: Option<Arc<dyn RegistryApi>>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    cancel: CancelSignal,
}

impl Runner {
    pub fn new(config: SyncConfig, output: Logger) -> Self {
        Self {
            config,
            output,
            source: None,
            destination: None,
            runtime: None,
            cancel: CancelSignal::new(),
        }
    }

    pub fn from_args(args: &Args) -> Result<Self> {
        // JSON goes to stdout, so progress output is suppressed
        let output = if args.quiet || args.output == OutputFormat::Json {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };
        let config = SyncConfig::from_args(args)?;
        Ok(Self::new(config, output))
    }

    /// Use pre-built registries instead of connecting over HTTP
    pub fn with_registries(
        mut self,
        source: Arc<dyn RegistryApi>,
        destination: Arc<dyn RegistryApi>,
    ) -> Self {
        self.source = Some(source);
        self.destination = Some(destination);
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn ContainerRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.output.section("Registry Sync");
        self.output
            .summary_kv("Configuration", &self.config.describe());

        let references = self.source_images().await?;
        self.output
            .info(&format!("{} source image(s) selected", references.len()));
        if self.output.verbose {
            let images: Vec<String> = references.iter().map(ToString::to_string).collect();
            self.output.list("Source images", &images);
        }

        let destination = match &self.destination {
            Some(destination) => Arc::clone(destination),
            None => {
                self.connect("destination", &self.config.destination)
                    .await?
            }
        };

        self.output.subsection("Planning");
        let plan = SyncPlanner::new(destination.as_ref(), self.output.clone())
            .plan(&references, &self.config.plan_options())
            .await?;
        self.output.info(&format!(
            "{} operations planned for {} image(s)",
            plan.len(),
            plan.chains().len()
        ));
        let blocked = plan.blocked().count();
        if blocked > 0 {
            self.output.warning(&format!(
                "{} image(s) cannot be synced because their destination listing failed",
                blocked
            ));
        }

        let runtime = self.prepare_runtime().await?;

        self.output.subsection(if self.config.execute {
            "Executing"
        } else {
            "Dry run"
        });
        let summary = Executor::new(runtime, self.output.clone())
            .execute(&plan, &self.config.execute_options(), &self.cancel)
            .await;

        output::print_summary(&summary, self.config.output_format, &self.output)?;

        if let Some(dir) = &self.config.report_dir {
            let path = output::write_report(dir, &summary)?;
            self.output
                .info(&format!("Report written to {}", path.display()));
        }

        if summary.is_success() {
            self.output.success(&format!(
                "Sync finished in {}",
                self.output.format_duration(self.output.elapsed())
            ));
        } else {
            self.output.error(&format!(
                "{} of {} image(s) failed",
                summary.failed, summary.total
            ));
        }

        Ok(summary)
    }

    /// Explicit `--image` references, or the resolved package set
    async fn source_images(&self) -> Result<Vec<ImageReference>> {
        if !self.config.images.is_empty() {
            self.output
                .step("Using explicit images; skipping resolution");
            return Ok(self.config.images.clone());
        }

        let source = match &self.source {
            Some(source) => Arc::clone(source),
            None => self.connect("source", &self.config.source).await?,
        };

        self.output.subsection("Resolving image set");
        let resolution = ImageSetResolver::new(
            source.as_ref(),
            &self.config.old_prefix,
            self.output.clone(),
        )
        .with_policy(self.config.policy)
        .resolve(&self.config.packages)
        .await?;
        Ok(resolution.references)
    }

    async fn connect(
        &self,
        side: &str,
        endpoint: &RegistryEndpoint,
    ) -> Result<Arc<dyn RegistryApi>> {
        self.output
            .subsection(&format!("Connecting to {} registry", side));
        let client = RegistryClient::builder(endpoint.url.as_str())
            .with_retry(self.config.retry)
            .with_timeout(self.config.timeout)
            .with_skip_tls(self.config.skip_tls)
            .with_output(self.output.clone())
            .build()?;
        let registry =
            AuthenticatedRegistry::connect(client, endpoint.credentials.as_ref()).await?;
        self.output.step(&format!(
            "{} session established ({})",
            endpoint.url,
            registry.session().scheme_name()
        ));
        Ok(Arc::new(registry))
    }

    /// Docker availability check and logins only happen in execute mode
    async fn prepare_runtime(&self) -> Result<Arc<dyn ContainerRuntime>> {
        let runtime: Arc<dyn ContainerRuntime> = match &self.runtime {
            Some(runtime) => Arc::clone(runtime),
            None => {
                let docker = DockerCli::new(&self.config.docker_binary, self.output.clone());
                if self.config.execute {
                    self.output.subsection("Checking docker");
                    let version = docker.check_available().await?;
                    self.output.step(&format!("Docker daemon {} reachable", version));
                }
                Arc::new(docker)
            }
        };

        if self.config.execute && !self.config.use_existing_auth {
            for endpoint in [&self.config.source, &self.config.destination] {
                if let Some(credentials) = &endpoint.credentials {
                    let server = credentials
                        .registry_url
                        .as_deref()
                        .unwrap_or(&endpoint.runtime_registry);
                    runtime.login(server, credentials).await?;
                }
            }
        }

        Ok(runtime)
    }
}
