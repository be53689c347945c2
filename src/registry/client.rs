// RegistryClient talks to one registry endpoint over HTTP: it authenticates,
// lists repositories and tags page by page, and looks up manifest digests.
// Docker Hub is reached through its web API (hub.docker.com), anything else
// through the Distribution v2 API.

use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{Result, SyncError};
use crate::image::DigestUtils;
use crate::logging::Logger;
use crate::registry::auth::{Auth, Credentials, Session};
use crate::registry::pagination::{AttemptError, Listing, Page, PageFormat, RetryPolicy, with_retry};
use reqwest::header::{ACCEPT, LINK};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const DOCKER_HUB_URL: &str = "https://hub.docker.com";
pub const DEFAULT_PAGE_SIZE: u32 = 100;

const DOCKER_CONTENT_DIGEST: &str = "Docker-Content-Digest";
const MANIFEST_ACCEPT: &str = "application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.docker.distribution.manifest.v2+json, \
application/vnd.oci.image.index.v1+json, \
application/vnd.oci.image.manifest.v1+json";

/// Which HTTP API a registry endpoint speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    DockerHub,
    Distribution,
}

impl RegistryKind {
    pub fn detect(address: &str) -> Self {
        let host = Url::parse(address)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase));
        match host.as_deref() {
            Some("hub.docker.com") | Some("docker.io") | Some("index.docker.io") => {
                RegistryKind::DockerHub
            }
            _ => RegistryKind::Distribution,
        }
    }
}

pub struct RegistryClientBuilder {
    address: String,
    kind: Option<RegistryKind>,
    retry: RetryPolicy,
    timeout: u64,
    skip_tls: bool,
    page_size: u32,
    output: Logger,
}

impl RegistryClientBuilder {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: None,
            retry: RetryPolicy::default(),
            timeout: 300,
            skip_tls: false,
            page_size: DEFAULT_PAGE_SIZE,
            output: Logger::new(false),
        }
    }

    pub fn with_kind(mut self, kind: RegistryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_skip_tls(mut self, skip_tls: bool) -> Self {
        self.skip_tls = skip_tls;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_output(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        if !self.address.starts_with("http://") && !self.address.starts_with("https://") {
            return Err(SyncError::Validation(format!(
                "Registry address must start with http:// or https://: {}",
                self.address
            )));
        }
        Url::parse(&self.address)?;

        let kind = self
            .kind
            .unwrap_or_else(|| RegistryKind::detect(&self.address));
        let address = match kind {
            RegistryKind::DockerHub if RegistryKind::detect(&self.address) == kind => {
                DOCKER_HUB_URL.to_string()
            }
            _ => self.address.trim_end_matches('/').to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(self.timeout))
            .danger_accept_invalid_certs(self.skip_tls)
            .user_agent(concat!("registry-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Network(format!("Failed to build HTTP client: {}", e)))?;

        let auth = Auth::new(client.clone(), &address, self.output.clone());

        Ok(RegistryClient {
            client,
            address,
            kind,
            auth,
            retry: self.retry,
            page_size: self.page_size,
            output: self.output,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    address: String,
    kind: RegistryKind,
    auth: Auth,
    retry: RetryPolicy,
    page_size: u32,
    output: Logger,
}

impl RegistryClient {
    pub fn builder(address: impl Into<String>) -> RegistryClientBuilder {
        RegistryClientBuilder::new(address)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn kind(&self) -> RegistryKind {
        self.kind
    }

    /// Establish a session; `None` means anonymous access
    pub async fn authenticate(&self, credentials: Option<&Credentials>) -> Result<Session> {
        match (self.kind, credentials) {
            (RegistryKind::DockerHub, Some(credentials)) => {
                self.auth.docker_hub_login(credentials).await
            }
            (RegistryKind::DockerHub, None) => {
                self.output
                    .verbose("No Docker Hub credentials - using anonymous access");
                Ok(Session::anonymous(self.address.clone()))
            }
            (RegistryKind::Distribution, credentials) => {
                self.auth.registry_login(credentials).await
            }
        }
    }

    /// Repositories under `namespace`, named relative to it
    pub fn list_repositories(&self, session: &Session, namespace: &str) -> Listing {
        let namespace = namespace.trim_matches('/');
        let context = format!("repository listing for {}", namespace);
        match self.kind {
            RegistryKind::DockerHub => {
                // Hub namespaces are flat: results are already relative
                let url = format!(
                    "{}/v2/namespaces/{}/repositories/?page_size={}",
                    self.address, namespace, self.page_size
                );
                Listing::new(self.clone(), session.clone(), url, PageFormat::HubResults, context)
            }
            RegistryKind::Distribution => {
                let url = format!("{}/v2/_catalog?n={}", self.address, self.page_size);
                let listing = Listing::new(
                    self.clone(),
                    session.clone(),
                    url,
                    PageFormat::Catalog,
                    context,
                )
                .with_scope("registry:catalog:*");
                if namespace.is_empty() {
                    listing
                } else {
                    listing.with_strip_prefix(format!("{}/", namespace))
                }
            }
        }
    }

    pub fn list_tags(&self, session: &Session, repository: &str) -> Listing {
        let repository = self.api_repository(repository);
        let context = format!("tag listing for {}", repository);
        match self.kind {
            RegistryKind::DockerHub => {
                let url = format!(
                    "{}/v2/repositories/{}/tags/?page_size={}",
                    self.address, repository, self.page_size
                );
                Listing::new(self.clone(), session.clone(), url, PageFormat::HubResults, context)
            }
            RegistryKind::Distribution => {
                let url = format!(
                    "{}/v2/{}/tags/list?n={}",
                    self.address, repository, self.page_size
                );
                Listing::new(self.clone(), session.clone(), url, PageFormat::TagList, context)
                    .with_scope(format!("repository:{}:pull", repository))
            }
        }
    }

    /// Manifest digest of `repository:tag`, or `None` if the tag does not exist
    pub async fn manifest_digest(
        &self,
        session: &Session,
        repository: &str,
        tag: &str,
    ) -> Result<Option<String>> {
        let repository = self.api_repository(repository);
        let context = format!("digest lookup for {}:{}", repository, tag);
        match self.kind {
            RegistryKind::DockerHub => {
                self.hub_tag_digest(session, &repository, tag, &context)
                    .await
            }
            RegistryKind::Distribution => {
                self.distribution_digest(session, &repository, tag, &context)
                    .await
            }
        }
    }

    /// Official Docker Hub images live under `library/`
    fn api_repository(&self, repository: &str) -> String {
        let repository = repository.trim_matches('/');
        if self.kind == RegistryKind::DockerHub && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository.to_string()
        }
    }

    pub(crate) async fn fetch_page(
        &self,
        session: &Session,
        url: &str,
        format: PageFormat,
        scope: Option<&str>,
        context: &str,
    ) -> Result<Page> {
        let base = Url::parse(&self.address)?;
        let base = &base;
        self.output.detail(&format!("GET {}", url));

        with_retry(&self.retry, context, &self.output, || {
            self.page_attempt(session, url, format, scope, context, base)
        })
        .await
    }

    async fn page_attempt(
        &self,
        session: &Session,
        url: &str,
        format: PageFormat,
        scope: Option<&str>,
        context: &str,
        base: &Url,
    ) -> std::result::Result<Page, AttemptError> {
        let request = self
            .auth
            .authorize(session, self.client.get(url), scope)
            .await
            .map_err(AttemptError::Fatal)?;
        let response = request
            .send()
            .await
            .map_err(|e| transient_network(&e, context))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            self.output
                .verbose(&format!("{}: not found, treating as empty", context));
            return Ok(Page::default());
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &error_text, context));
        }

        let link = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;
        format
            .parse(&body, link.as_deref(), base)
            .map_err(AttemptError::Fatal)
    }

    async fn hub_tag_digest(
        &self,
        session: &Session,
        repository: &str,
        tag: &str,
        context: &str,
    ) -> Result<Option<String>> {
        let url = format!("{}/v2/repositories/{}/tags/{}/", self.address, repository, tag);

        with_retry(&self.retry, context, &self.output, || {
            self.hub_digest_attempt(session, &url, context)
        })
        .await
    }

    async fn hub_digest_attempt(
        &self,
        session: &Session,
        url: &str,
        context: &str,
    ) -> std::result::Result<Option<String>, AttemptError> {
        let request = self
            .auth
            .authorize(session, self.client.get(url), None)
            .await
            .map_err(AttemptError::Fatal)?;
        let response = request
            .send()
            .await
            .map_err(|e| transient_network(&e, context))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &error_text, context));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AttemptError::Fatal(SyncError::Parse(e.to_string())))?;
        match json.get("digest").and_then(Value::as_str) {
            Some(digest) => DigestUtils::normalize_digest(digest)
                .map(Some)
                .map_err(AttemptError::Fatal),
            None => Ok(None),
        }
    }

    async fn distribution_digest(
        &self,
        session: &Session,
        repository: &str,
        tag: &str,
        context: &str,
    ) -> Result<Option<String>> {
        let url = format!("{}/v2/{}/manifests/{}", self.address, repository, tag);
        let scope = format!("repository:{}:pull", repository);

        with_retry(&self.retry, context, &self.output, || {
            self.distribution_digest_attempt(session, &url, &scope, context)
        })
        .await
    }

    async fn distribution_digest_attempt(
        &self,
        session: &Session,
        url: &str,
        scope: &str,
        context: &str,
    ) -> std::result::Result<Option<String>, AttemptError> {
        let request = self
            .auth
            .authorize(
                session,
                self.client.head(url).header(ACCEPT, MANIFEST_ACCEPT),
                Some(scope),
            )
            .await
            .map_err(AttemptError::Fatal)?;
        let response = request
            .send()
            .await
            .map_err(|e| transient_network(&e, context))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            // HEAD responses carry no body
            return Err(classify_failure(status, "", context));
        }

        let header = response
            .headers()
            .get(DOCKER_CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        match header {
            Some(digest) => DigestUtils::normalize_digest(&digest)
                .map(Some)
                .map_err(AttemptError::Fatal),
            None => self.manifest_body_digest(session, url, scope, context).await,
        }
    }

    /// Fallback when the registry omits `Docker-Content-Digest` on HEAD
    async fn manifest_body_digest(
        &self,
        session: &Session,
        url: &str,
        scope: &str,
        context: &str,
    ) -> std::result::Result<Option<String>, AttemptError> {
        self.output
            .detail(&format!("{}: no digest header, hashing manifest body", context));

        let request = self
            .auth
            .authorize(
                session,
                self.client.get(url).header(ACCEPT, MANIFEST_ACCEPT),
                Some(scope),
            )
            .await
            .map_err(AttemptError::Fatal)?;
        let response = request
            .send()
            .await
            .map_err(|e| transient_network(&e, context))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &error_text, context));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;
        Ok(Some(DigestUtils::compute_docker_digest(&body)))
    }
}

fn classify_failure(status: StatusCode, error_text: &str, context: &str) -> AttemptError {
    if HttpErrorHandler::is_retryable(status) {
        AttemptError::Transient(format!("HTTP {}: {}", status, error_text))
    } else {
        AttemptError::Fatal(HttpErrorHandler::handle_registry_error(
            status, error_text, context,
        ))
    }
}

fn transient_network(err: &reqwest::Error, context: &str) -> AttemptError {
    AttemptError::Transient(NetworkErrorHandler::handle_network_error(err, context).to_string())
}
