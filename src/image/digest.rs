//! SHA256 digest utilities
//!
//! Registries identify image content by `sha256:<hex>` manifest digests. These
//! helpers compute, validate and compare them so the executor can tell whether
//! a destination tag already holds the freshly pulled image.

use crate::error::{Result, SyncError};
use sha2::{Digest, Sha256};

const SHA256_PREFIX: &str = "sha256:";

/// Utilities for working with SHA256 digests in registry context
pub struct DigestUtils;

impl DigestUtils {
    /// Compute SHA256 hex digest from byte data
    pub fn compute_sha256(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Compute full docker digest (with sha256: prefix), e.g. of a manifest body
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("{}{}", SHA256_PREFIX, Self::compute_sha256(data))
    }

    /// Validate SHA256 hex string (64 characters, all hex)
    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Validate full docker digest format (sha256:xxxxx)
    pub fn is_valid_docker_digest(digest: &str) -> bool {
        digest
            .strip_prefix(SHA256_PREFIX)
            .is_some_and(Self::is_valid_sha256_hex)
    }

    /// Normalize to lowercase `sha256:<hex>`, adding the prefix if missing
    pub fn normalize_digest(digest: &str) -> Result<String> {
        let digest = digest.trim().to_ascii_lowercase();
        let hex_part = digest.strip_prefix(SHA256_PREFIX).unwrap_or(&digest);
        if !Self::is_valid_sha256_hex(hex_part) {
            return Err(SyncError::Validation(format!(
                "Invalid SHA256 digest: {}",
                digest
            )));
        }
        Ok(format!("{}{}", SHA256_PREFIX, hex_part))
    }

    /// Compare two digests after normalization; malformed digests never match
    pub fn digests_match(left: &str, right: &str) -> bool {
        match (Self::normalize_digest(left), Self::normalize_digest(right)) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }

    /// Split a `name@sha256:...` repo digest as reported by `docker inspect`
    pub fn split_repo_digest(repo_digest: &str) -> Option<(&str, &str)> {
        repo_digest.rsplit_once('@')
    }
}
