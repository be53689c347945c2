//! Paginated listings and bounded retry
//!
//! Registry listings are exposed as restartable [`Listing`] values whose
//! [`Listing::stream`] yields names lazily, one page at a time. Every page
//! fetch goes through [`with_retry`], which retries transient failures with
//! exponential backoff and reports [`SyncError::RegistryUnavailable`] once the
//! attempt budget is spent.

use crate::error::handlers::HttpErrorHandler;
use crate::error::{Result, SyncError};
use crate::logging::Logger;
use crate::registry::auth::Session;
use crate::registry::client::RegistryClient;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Retry budget for a single registry call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Backoff before the attempt following `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        HttpErrorHandler::retry_delay(attempt, self.base_delay)
    }
}

/// Outcome of one failed attempt
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Network failure, 408, 429 or 5xx: try again
    Transient(String),
    /// Anything else, returned as-is
    Fatal(SyncError),
}

pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    output: &Logger,
    mut attempt_fn: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(err)) => return Err(err),
            Err(AttemptError::Transient(message)) => {
                if attempt >= max_attempts {
                    return Err(SyncError::RegistryUnavailable {
                        operation: operation.to_string(),
                        attempts: attempt,
                        message,
                    });
                }
                let delay = policy.delay_for(attempt);
                output.warning(&format!(
                    "{} failed (attempt {}/{}): {} - retrying in {}ms",
                    operation,
                    attempt,
                    max_attempts,
                    message,
                    delay.as_millis()
                ));
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Response body layout of a listing endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageFormat {
    /// Docker Hub: `{"results":[{"name":..}], "next": "<url>|null"}`
    HubResults,
    /// Distribution `/v2/_catalog`: `{"repositories":[..]}` + `Link` header
    Catalog,
    /// Distribution `/v2/<name>/tags/list`: `{"tags":[..]}` + `Link` header
    TagList,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Page {
    pub items: Vec<String>,
    pub next: Option<String>,
}

impl PageFormat {
    pub(crate) fn parse(&self, body: &str, link_header: Option<&str>, base: &Url) -> Result<Page> {
        let json: Value = serde_json::from_str(body)
            .map_err(|e| SyncError::Parse(format!("Invalid listing response: {}", e)))?;

        let (items, next) = match self {
            PageFormat::HubResults => {
                let items = json
                    .get("results")
                    .and_then(Value::as_array)
                    .map(|results| {
                        results
                            .iter()
                            .filter_map(|r| r.get("name").and_then(Value::as_str))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let next = json
                    .get("next")
                    .and_then(Value::as_str)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string);
                (items, next)
            }
            PageFormat::Catalog | PageFormat::TagList => {
                let field = if *self == PageFormat::Catalog {
                    "repositories"
                } else {
                    "tags"
                };
                let items = string_array(&json, field);
                let next = link_header.and_then(parse_link_next);
                (items, next)
            }
        };

        let next = match next {
            Some(next) => Some(base.join(&next)?.to_string()),
            None => None,
        };

        Ok(Page { items, next })
    }
}

fn string_array(json: &Value, field: &str) -> Vec<String> {
    json.get(field)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Extract the target of `<...>; rel="next"` from a `Link` header
pub fn parse_link_next(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let (target, params) = link.split_once(';')?;
        let is_next = params.split(';').any(|param| {
            param
                .trim()
                .strip_prefix("rel=")
                .map(|rel| rel.trim_matches('"') == "next")
                .unwrap_or(false)
        });
        if !is_next {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// A restartable registry listing
///
/// Each call to [`Listing::stream`] starts again from the first page.
#[derive(Debug, Clone)]
pub struct Listing {
    client: RegistryClient,
    session: Session,
    first_url: String,
    format: PageFormat,
    scope: Option<String>,
    strip_prefix: Option<String>,
    context: String,
}

impl Listing {
    pub(crate) fn new(
        client: RegistryClient,
        session: Session,
        first_url: String,
        format: PageFormat,
        context: String,
    ) -> Self {
        Self {
            client,
            session,
            first_url,
            format,
            scope: None,
            strip_prefix: None,
            context,
        }
    }

    pub(crate) fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Keep only names under `prefix` and yield them relative to it
    pub(crate) fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    pub fn stream(&self) -> BoxStream<'static, Result<String>> {
        let listing = self.clone();
        let strip_prefix = self.strip_prefix.clone();

        stream::try_unfold(Some(self.first_url.clone()), move |cursor| {
            next_page(listing.clone(), cursor)
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<String, SyncError>)))
        .try_flatten()
        .try_filter_map(move |name| {
            let name = match &strip_prefix {
                Some(prefix) => name.strip_prefix(prefix.as_str()).map(str::to_string),
                None => Some(name),
            };
            futures::future::ready(Ok(name.filter(|n| !n.is_empty())))
        })
        .boxed()
    }

    /// Drain the whole listing
    pub async fn collect(&self) -> Result<Vec<String>> {
        self.stream().try_collect().await
    }
}

async fn next_page(
    listing: Listing,
    cursor: Option<String>,
) -> Result<Option<(Vec<String>, Option<String>)>> {
    let Some(url) = cursor else {
        return Ok(None);
    };

    let page = listing
        .client
        .fetch_page(
            &listing.session,
            &url,
            listing.format,
            listing.scope.as_deref(),
            &listing.context,
        )
        .await?;

    // Guard against a registry that links a page to itself
    let next = page.next.filter(|next| *next != url);
    Ok(Some((page.items, next)))
}
