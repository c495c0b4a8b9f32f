//! Application error model with MCP error mapping
//!
//! Defines a typed error hierarchy using `thiserror` for internal error handling,
//! and maps each variant to the appropriate MCP `ErrorData` type for protocol
//! compliance.

use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

/// Application error type
///
/// Covers every failure the session manager and tool layer can surface. Each
/// variant maps to an appropriate MCP error code in [`ErrorData`].
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (malformed account, empty secret, bad server URL)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Login rejected, or a 401 persisted after one refresh-and-retry
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// Any other non-2xx response from the Axigen API
    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },
    /// HTTP call exceeded the configured total timeout
    #[error("operation timed out: {0}")]
    Timeout(String),
    /// Remote host unreachable or connection dropped before a response
    #[error("connection failed: {0}")]
    Connection(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// HTTP status carried by an `Api` error
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True when the remote API answered 404
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// True when the remote API answered 409
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    /// Convert to MCP `ErrorData`
    ///
    /// Maps each `AppError` variant to the appropriate MCP error type and
    /// includes a structured `code` field for client error handling, plus a
    /// `suggestion` when there is something the caller can do about it.
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_params`
    /// - `AuthFailed` → `invalid_request`
    /// - `Api` (404) → `resource_not_found`
    /// - `Api` (other 4xx) → `invalid_request`
    /// - `Api` (5xx) → `internal_error`
    /// - `Timeout` → `internal_error`
    /// - `Connection` → `internal_error`
    /// - `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            Self::InvalidInput(msg) => {
                ErrorData::invalid_params(msg.clone(), Some(json!({ "code": "invalid_input" })))
            }
            Self::AuthFailed(msg) => ErrorData::invalid_request(
                msg.clone(),
                Some(json!({
                    "code": "auth_failed",
                    "suggestion": "verify the email address and password for this account"
                })),
            ),
            Self::Api { status, message } => {
                let data = Some(json!({ "code": "api_error", "status": status }));
                match status {
                    404 => ErrorData::resource_not_found(message.clone(), data),
                    400..=499 => ErrorData::invalid_request(message.clone(), data),
                    _ => ErrorData::internal_error(message.clone(), data),
                }
            }
            Self::Timeout(msg) => ErrorData::internal_error(
                msg.clone(),
                Some(json!({
                    "code": "timeout",
                    "suggestion": "the Axigen server is slow to respond; retry later"
                })),
            ),
            Self::Connection(msg) => ErrorData::internal_error(
                msg.clone(),
                Some(json!({
                    "code": "connection",
                    "suggestion": "check server_url and network connectivity"
                })),
            ),
            Self::Internal(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "internal" })))
            }
        }
    }
}

/// Type alias for fallible return values
///
/// Use this for all internal functions that can fail. Provides a consistent
/// error type throughout the codebase.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn api_error_helpers_use_status_not_message_text() {
        let not_found = AppError::Api {
            status: 404,
            message: "entry already exists".to_owned(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());

        let conflict = AppError::Api {
            status: 409,
            message: "whatever".to_owned(),
        };
        assert!(conflict.is_conflict());
        assert_eq!(AppError::Timeout("t".to_owned()).status(), None);
    }

    #[test]
    fn error_data_carries_machine_readable_code() {
        let data = AppError::Api {
            status: 403,
            message: "insufficient permissions".to_owned(),
        }
        .to_error_data();
        assert_eq!(data.message, "insufficient permissions");
        let extra = data.data.expect("error data must be present");
        assert_eq!(extra["code"], "api_error");
        assert_eq!(extra["status"], 403);

        let auth = AppError::AuthFailed("bad".to_owned()).to_error_data();
        assert_eq!(
            auth.data.expect("error data must be present")["code"],
            "auth_failed"
        );
    }
}
