//! Standardized HTTP and network error handling for registry calls

use crate::error::SyncError;
use reqwest::StatusCode;
use std::time::Duration;

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Handle authentication-related HTTP errors
    pub fn handle_auth_error(status: StatusCode, error_text: &str) -> SyncError {
        let error_msg = match status.as_u16() {
            400 => "Invalid token request parameters".to_string(),
            401 => "Invalid credentials provided".to_string(),
            403 => "Access denied - insufficient permissions".to_string(),
            404 => "Authentication endpoint not found".to_string(),
            429 => "Too many login attempts - rate limited".to_string(),
            _ => format!("Authentication failed (status {}): {}", status, error_text),
        };

        SyncError::Auth(error_msg)
    }

    /// Handle registry-related HTTP errors
    pub fn handle_registry_error(
        status: StatusCode,
        error_text: &str,
        operation: &str,
    ) -> SyncError {
        match status.as_u16() {
            401 => SyncError::Auth(format!(
                "Unauthorized to perform {} operation: {}",
                operation, error_text
            )),
            403 => SyncError::Auth(format!(
                "Forbidden: insufficient permissions for {}: {}",
                operation, error_text
            )),
            404 => SyncError::Registry(format!(
                "Resource not found for {}: {}",
                operation, error_text
            )),
            429 => SyncError::Registry(format!(
                "Rate limited during {}: {}",
                operation, error_text
            )),
            500 => SyncError::Registry(format!(
                "Registry server error during {}: {}",
                operation, error_text
            )),
            502 | 503 => SyncError::Registry(format!(
                "Registry unavailable for {}: {}",
                operation, error_text
            )),
            _ => SyncError::Registry(format!(
                "{} failed (status {}): {}",
                operation, status, error_text
            )),
        }
    }

    /// Statuses that are worth another attempt
    pub fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
    }

    /// Exponential backoff delay for the given attempt (1-based)
    pub fn retry_delay(attempt: u32, base_delay: Duration) -> Duration {
        let backoff_multiplier = 2_u32.pow(attempt.saturating_sub(1).min(6));
        base_delay * backoff_multiplier
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize and format network errors with helpful context
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> SyncError {
        if error.is_timeout() {
            SyncError::Network(format!("{} timeout: {}", context, error))
        } else if error.is_connect() {
            SyncError::Network(format!("Connection error during {}: {}", context, error))
        } else if error.to_string().contains("certificate") {
            SyncError::Network(format!(
                "TLS certificate error during {}: {}",
                context, error
            ))
        } else {
            SyncError::Network(format!("{} network error: {}", context, error))
        }
    }
}
