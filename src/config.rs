//! Server configuration loaded from the environment
//!
//! All settings follow the pattern `AXIGEN_<KEY>`. Account credentials are
//! not configured here: every tool call carries its own email, password, and
//! optional server URL.

use std::env;
use std::env::VarError;

use crate::credentials::normalize_server_url;
use crate::errors::{AppError, AppResult};

/// Server used when a tool call omits `server_url`
const DEFAULT_SERVER_URL: &str = "https://ax.email";

/// Server-wide configuration
///
/// Shared with MCP tool handlers via `Arc`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Axigen server URL used when a call does not name one (normalized)
    pub default_server_url: String,
    /// Whether mutating tools (settings updates, moves, list edits) are enabled
    pub write_enabled: bool,
    /// Total timeout for each HTTP call in milliseconds
    pub request_timeout_ms: u64,
    /// Client-side lifetime of a session token in seconds
    pub session_ttl_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_server_url: DEFAULT_SERVER_URL.to_owned(),
            write_enabled: false,
            request_timeout_ms: 30_000,
            session_ttl_seconds: 1_800,
        }
    }
}

impl ServerConfig {
    /// Load all configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a variable is set to a malformed value or the
    /// request timeout is zero.
    ///
    /// # Example Environment
    ///
    /// ```text
    /// AXIGEN_DEFAULT_SERVER_URL=https://mail.example.com
    /// AXIGEN_REQUEST_TIMEOUT_MS=30000
    /// AXIGEN_SESSION_TTL_SECONDS=1800
    /// AXIGEN_WRITE_ENABLED=false
    /// ```
    pub fn load_from_env() -> AppResult<Self> {
        let defaults = Self::default();
        let default_server_url = match optional_env("AXIGEN_DEFAULT_SERVER_URL")? {
            Some(url) => normalize_server_url(&url)?,
            None => defaults.default_server_url,
        };

        let request_timeout_ms =
            parse_u64_env("AXIGEN_REQUEST_TIMEOUT_MS", defaults.request_timeout_ms)?;
        if request_timeout_ms == 0 {
            return Err(AppError::InvalidInput(
                "AXIGEN_REQUEST_TIMEOUT_MS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            default_server_url,
            write_enabled: parse_bool_env("AXIGEN_WRITE_ENABLED", defaults.write_enabled)?,
            request_timeout_ms,
            session_ttl_seconds: parse_u64_env(
                "AXIGEN_SESSION_TTL_SECONDS",
                defaults.session_ttl_seconds,
            )?,
        })
    }
}

/// Read an optional environment variable; blank counts as unset
fn optional_env(key: &str) -> AppResult<Option<String>> {
    match env::var(key) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => Err(AppError::InvalidInput(format!(
            "environment variable {key} contains non-unicode data"
        ))),
    }
}

/// Parse a boolean environment variable with flexible values
///
/// Accepts: `1`, `true`, `yes`, `y`, `on` (truthy) or `0`, `false`, `no`,
/// `n`, `off` (falsy). Case-insensitive. Returns `default` if unset.
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set to an unrecognized value.
fn parse_bool_env(key: &str, default: bool) -> AppResult<bool> {
    match optional_env(key)? {
        Some(v) => parse_bool_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!("invalid boolean environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_bool_value(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a `u64` environment variable with default fallback
///
/// # Errors
///
/// Returns `InvalidInput` if the variable is set but not a valid `u64`.
fn parse_u64_env(key: &str, default: u64) -> AppResult<u64> {
    match optional_env(key)? {
        Some(v) => parse_u64_value(&v).ok_or_else(|| {
            AppError::InvalidInput(format!("invalid u64 environment variable {key}: '{v}'"))
        }),
        None => Ok(default),
    }
}

fn parse_u64_value(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}
