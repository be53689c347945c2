//! Package names, version selectors and list files

use crate::error::{Result, SyncError};
use glob::{MatchOptions, Pattern};
use std::fmt;
use std::path::Path;

pub const WILDCARD: &str = "*";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Which tags of a package to take
#[derive(Debug, Clone)]
pub enum VersionSelector {
    /// Exactly this tag, no registry lookup
    Literal(String),
    /// Every tag present in the source registry
    All,
    /// Tags matching a glob such as `24.*`
    Pattern(Pattern),
}

impl VersionSelector {
    pub fn parse(selector: &str) -> Result<Self> {
        let selector = selector.trim();
        if selector.is_empty() {
            return Err(SyncError::Validation("Empty version selector".to_string()));
        }
        if selector == WILDCARD {
            return Ok(VersionSelector::All);
        }
        if is_pattern(selector) {
            return Ok(VersionSelector::Pattern(Pattern::new(selector)?));
        }
        Ok(VersionSelector::Literal(selector.to_string()))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, VersionSelector::Literal(_))
    }

    pub fn matches(&self, tag: &str) -> bool {
        match self {
            VersionSelector::Literal(literal) => literal == tag,
            VersionSelector::All => true,
            VersionSelector::Pattern(pattern) => pattern.matches_with(tag, MATCH_OPTIONS),
        }
    }
}

impl fmt::Display for VersionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSelector::Literal(literal) => f.write_str(literal),
            VersionSelector::All => f.write_str(WILDCARD),
            VersionSelector::Pattern(pattern) => f.write_str(pattern.as_str()),
        }
    }
}

/// A package (repository name relative to the source prefix) and its selectors
#[derive(Debug, Clone)]
pub struct PackageSpec {
    pub name: String,
    pub selectors: Vec<VersionSelector>,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, selectors: Vec<VersionSelector>) -> Self {
        Self {
            name: name.into().trim_matches('/').to_ascii_lowercase(),
            selectors,
        }
    }

    /// Every package paired with every version selector
    pub fn cross(packages: &[String], versions: &[String]) -> Result<Vec<Self>> {
        let selectors = versions
            .iter()
            .map(|v| VersionSelector::parse(v))
            .collect::<Result<Vec<_>>>()?;
        packages
            .iter()
            .map(|name| {
                let spec = Self::new(name.as_str(), selectors.clone());
                if spec.name.is_empty() {
                    return Err(SyncError::Validation("Empty package name".to_string()));
                }
                if spec.is_pattern() {
                    Pattern::new(&spec.name)?;
                }
                Ok(spec)
            })
            .collect()
    }

    /// Whether the name is a glob to expand against the source namespace
    pub fn is_pattern(&self) -> bool {
        is_pattern(&self.name)
    }

    pub fn matches_name(&self, repository: &str) -> bool {
        if self.is_pattern() {
            Pattern::new(&self.name)
                .map(|pattern| pattern.matches_with(repository, MATCH_OPTIONS))
                .unwrap_or(false)
        } else {
            self.name.eq_ignore_ascii_case(repository)
        }
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.selectors.clone())
    }
}

fn is_pattern(value: &str) -> bool {
    value.contains(['*', '?', '['])
}

/// Split a comma-separated list, dropping empty entries
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read one entry per line; blank lines and `#` comments are ignored
pub fn read_list_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        SyncError::Configuration(format!("Cannot read list file {}: {}", path.display(), e))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
