//! Fully-qualified container image references
//!
//! An [`ImageReference`] is `[registry/]repository:tag`. The registry part is
//! optional; two references are equal when all fields match after defaulting
//! the registry to [`DEFAULT_REGISTRY`].

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Registry assumed when a reference names none
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag assumed when a parsed reference names none
pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ImageReference {
    registry: Option<String>,
    repository: String,
    tag: String,
}

impl ImageReference {
    pub fn new(
        registry: Option<String>,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Self> {
        let repository = repository.into();
        let tag = tag.into();
        let registry = registry.filter(|r| !r.is_empty());

        validate_repository(&repository)?;
        validate_tag(&tag)?;
        if let Some(registry) = &registry {
            if registry.contains('/') || registry.chars().any(char::is_whitespace) {
                return Err(SyncError::InvalidReference(format!(
                    "{}/{}:{}",
                    registry, repository, tag
                )));
            }
        }

        Ok(Self {
            registry,
            repository,
            tag,
        })
    }

    /// Build a reference from a `[registry/]repository` name and a tag
    pub fn from_name(name: &str, tag: impl Into<String>) -> Result<Self> {
        let (registry, repository) = split_registry(name.trim_matches('/'));
        Self::new(registry.map(str::to_string), repository, tag)
    }

    /// Parse `[registry/]repository[:tag]`; digest references are rejected
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() || reference.contains('@') {
            return Err(SyncError::InvalidReference(reference.to_string()));
        }

        let last_slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match reference[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                (&reference[..split], &reference[split + 1..])
            }
            None => (reference, DEFAULT_TAG),
        };

        Self::from_name(name, tag)
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// Registry host with the implicit default applied
    pub fn effective_registry(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// `[registry/]repository` without the tag
    pub fn name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.repository),
            None => self.repository.clone(),
        }
    }
}

/// Split a `[registry/]path` name using the docker rule: the first component
/// is a registry host iff it contains `.` or `:` or is `localhost`.
pub fn split_registry(name: &str) -> (Option<&str>, &str) {
    match name.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (Some(first), rest)
        }
        _ => (None, name),
    }
}

fn validate_repository(repository: &str) -> Result<()> {
    let valid = !repository.is_empty()
        && !repository.starts_with('/')
        && !repository.ends_with('/')
        && !repository.contains("//")
        && repository
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/".contains(c));
    if valid {
        Ok(())
    } else {
        Err(SyncError::InvalidReference(format!(
            "repository '{}' must be lowercase alphanumerics separated by '/', '.', '_' or '-'",
            repository
        )))
    }
}

fn validate_tag(tag: &str) -> Result<()> {
    let mut chars = tag.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphanumeric() || first == '_')
                && tag.len() <= 128
                && chars.all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c))
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SyncError::InvalidReference(format!("tag '{}'", tag)))
    }
}

impl PartialEq for ImageReference {
    fn eq(&self, other: &Self) -> bool {
        self.effective_registry() == other.effective_registry()
            && self.repository == other.repository
            && self.tag == other.tag
    }
}

impl Eq for ImageReference {}

impl Hash for ImageReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.effective_registry().hash(state);
        self.repository.hash(state);
        self.tag.hash(state);
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name(), self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<ImageReference> for String {
    fn from(reference: ImageReference) -> Self {
        reference.to_string()
    }
}

impl TryFrom<String> for ImageReference {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}
