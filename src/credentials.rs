//! Account credentials and session cache keys
//!
//! A [`Credentials`] value is the (account, secret, server) triple every
//! authenticated call is made with. Construction validates all three parts
//! so malformed input is rejected before any network call.

use std::sync::LazyLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::errors::{AppError, AppResult};

/// Path prefix of the Axigen REST API below the server URL
const API_PREFIX: &str = "/api/v1";
/// Maximum account identifier length (RFC 5321 path limit)
const MAX_ACCOUNT_LEN: usize = 254;

/// Validated credentials for one Axigen account
///
/// The secret is held in a `SecretString` and never appears in `Debug`
/// output.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Account identifier (email address) exactly as supplied
    account: String,
    /// Account password
    secret: SecretString,
    /// Server URL with trailing slashes removed
    server_url: String,
}

/// Session cache key
///
/// Lowercased account identifier plus normalized server URL. Two credentials
/// with the same key share one cached session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub account: String,
    pub server_url: String,
}

impl Credentials {
    /// Validate and normalize a credentials triple
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the account is not an email address, the
    /// secret is empty, or the server URL is malformed.
    pub fn new(
        account: impl Into<String>,
        secret: impl Into<String>,
        server_url: &str,
    ) -> AppResult<Self> {
        let account = account.into().trim().to_owned();
        validate_email_address(&account)?;

        let secret = secret.into();
        if secret.is_empty() {
            return Err(AppError::invalid("password must not be empty"));
        }

        Ok(Self {
            account,
            secret: SecretString::new(secret.into()),
            server_url: normalize_server_url(server_url)?,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Base URL of the REST API (`<server>/api/v1`)
    pub fn api_base(&self) -> String {
        format!("{}{}", self.server_url, API_PREFIX)
    }

    /// Full URL for a relative API path; a leading `/` is tolerated
    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base(), path.trim_start_matches('/'))
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            account: self.account.to_lowercase(),
            server_url: self.server_url.clone(),
        }
    }

    /// `Authorization` header value: `Basic base64(account:secret)`
    pub fn basic_auth_header(&self) -> SecretString {
        let raw = format!("{}:{}", self.account, self.secret.expose_secret());
        SecretString::new(format!("Basic {}", STANDARD.encode(raw)).into())
    }
}

/// Check that a value looks like an email address
pub fn validate_email_address(account: &str) -> AppResult<()> {
    if account.is_empty() || account.len() > MAX_ACCOUNT_LEN {
        return Err(AppError::invalid(format!(
            "email must be 1..{MAX_ACCOUNT_LEN} characters"
        )));
    }
    if account
        .chars()
        .any(|ch| ch.is_whitespace() || ch.is_control())
    {
        return Err(AppError::invalid(
            "email must not contain whitespace or control characters",
        ));
    }
    let Some((local, domain)) = account.rsplit_once('@') else {
        return Err(AppError::invalid("email must contain '@'"));
    };
    let domain_ok = domain
        .split('.')
        .all(|label| !label.is_empty() && !label.starts_with('-') && !label.ends_with('-'))
        && domain.contains('.');
    if local.is_empty() || local.contains('@') || !domain_ok {
        return Err(AppError::invalid(format!(
            "'{account}' is not a valid email address"
        )));
    }
    Ok(())
}

static SERVER_URL_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/?#@]+(/[^\s?#]*)?$"));

/// Validate a server URL and strip trailing slashes
///
/// # Errors
///
/// Returns `InvalidInput` unless the URL is `http://` or `https://` with a
/// non-empty host and no whitespace, query, or fragment.
pub fn normalize_server_url(server_url: &str) -> AppResult<String> {
    let url_pattern = SERVER_URL_PATTERN
        .as_ref()
        .map_err(|e| AppError::Internal(format!("invalid server url regex: {e}")))?;

    let trimmed = server_url.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid("server_url is required"));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(AppError::invalid(
            "server_url must start with http:// or https://",
        ));
    }
    if !url_pattern.is_match(trimmed) {
        return Err(AppError::invalid(format!(
            "server_url '{trimmed}' is malformed"
        )));
    }
    Ok(trimmed.trim_end_matches('/').to_owned())
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::{Credentials, SERVER_URL_PATTERN, normalize_server_url};

    #[test]
    fn basic_auth_header_encodes_account_and_secret() {
        let creds = Credentials::new("user@example.com", "secret123", "https://mail.example.com")
            .expect("valid credentials");
        assert_eq!(
            creds.basic_auth_header().expose_secret(),
            "Basic dXNlckBleGFtcGxlLmNvbTpzZWNyZXQxMjM="
        );
    }

    #[test]
    fn cache_key_folds_account_case_and_trailing_slash() {
        let a = Credentials::new("User@Example.com", "x", "https://mail.example.com/")
            .expect("valid credentials");
        let b = Credentials::new("user@example.com", "y", "https://mail.example.com")
            .expect("valid credentials");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.server_url(), "https://mail.example.com");
    }

    #[test]
    fn endpoint_url_strips_leading_slash() {
        let creds = Credentials::new("user@example.com", "x", "https://mail.example.com//")
            .expect("valid credentials");
        assert_eq!(
            creds.endpoint_url("/account/info"),
            "https://mail.example.com/api/v1/account/info"
        );
        assert_eq!(
            creds.endpoint_url("account/info"),
            "https://mail.example.com/api/v1/account/info"
        );
    }

    #[test]
    fn rejects_malformed_accounts() {
        for bad in ["", "user", "user@", "@example.com", "us er@example.com", "user@localhost"] {
            let err = Credentials::new(bad, "x", "https://mail.example.com")
                .expect_err("must fail");
            assert!(err.to_string().contains("invalid input"), "{bad}: {err}");
        }
    }

    #[test]
    fn rejects_empty_secret() {
        let err = Credentials::new("user@example.com", "", "https://mail.example.com")
            .expect_err("must fail");
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn validates_server_urls() {
        assert_eq!(
            normalize_server_url("http://127.0.0.1:8080/").expect("valid url"),
            "http://127.0.0.1:8080"
        );
        for bad in ["", "ftp://mail.example.com", "mail.example.com", "https://", "https://a b.com"] {
            assert!(normalize_server_url(bad).is_err(), "{bad} must be rejected");
        }
    }

    #[test]
    fn server_url_pattern_is_compiled_once_and_reused() {
        assert!(SERVER_URL_PATTERN.is_ok());
        for _ in 0..3 {
            assert_eq!(
                normalize_server_url("https://mail.example.com/").expect("valid url"),
                "https://mail.example.com"
            );
        }
        assert!(SERVER_URL_PATTERN.is_ok());
    }
}
