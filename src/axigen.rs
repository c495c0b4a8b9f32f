//! Axigen REST transport with cached, self-refreshing sessions
//!
//! [`AxigenClient::authenticated_request`] is the single entry point the tool
//! layer uses. It makes sure a session exists for the credentials (logging in
//! when needed), sends the request with both the Basic-Auth and session
//! headers, and on a 401 refreshes the session once and retries once.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode, header};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::credentials::Credentials;
use crate::errors::{AppError, AppResult};
use crate::session::{Session, SessionCache};

/// Header carrying the session id on every API call
pub const SESSION_HEADER: &str = "X-Axigen-Session";
/// Maximum characters of a response body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 500;

/// HTTP methods accepted by the Axigen API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// Normalized body of a successful response
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    /// 204, or a 2xx with an empty body
    Empty,
    /// Parsed JSON body
    Json(Value),
    /// Non-JSON body kept verbatim
    Raw(String),
}

impl ApiResponse {
    /// Flatten into a JSON value for tool output
    ///
    /// Raw text is wrapped as `{"raw_response": text}` so callers can tell it
    /// apart from a JSON payload.
    pub fn into_value(self) -> Value {
        match self {
            Self::Empty => json!({}),
            Self::Json(value) => value,
            Self::Raw(text) => json!({ "raw_response": text }),
        }
    }
}

/// Optional pieces of an API request
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestParts<'a> {
    /// JSON request body
    pub body: Option<&'a Value>,
    /// Query-string parameters
    pub query: Option<&'a BTreeMap<String, String>>,
}

impl<'a> RequestParts<'a> {
    pub fn body(body: &'a Value) -> Self {
        Self {
            body: Some(body),
            query: None,
        }
    }

    pub fn query(query: &'a BTreeMap<String, String>) -> Self {
        Self {
            body: None,
            query: Some(query),
        }
    }
}

/// Login response body
#[derive(Debug, Deserialize)]
struct LoginResponse {
    sessid: Option<String>,
}

/// Axigen API client
///
/// Owns the process-wide HTTP connection pool and the session cache. Cheap to
/// share behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct AxigenClient {
    http: Client,
    sessions: Arc<SessionCache>,
}

impl AxigenClient {
    /// Build a client from server config
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the HTTP client cannot be constructed.
    pub fn new(config: &ServerConfig) -> AppResult<Self> {
        let sessions = Arc::new(SessionCache::new(Duration::from_secs(
            config.session_ttl_seconds,
        )));
        Self::with_sessions(Duration::from_millis(config.request_timeout_ms), sessions)
    }

    /// Build a client around an existing session cache
    pub fn with_sessions(request_timeout: Duration, sessions: Arc<SessionCache>) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, sessions })
    }

    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// Perform an authenticated call against `<server>/api/v1/<path>`
    ///
    /// Logs in first when the cached session has no token or its local TTL
    /// elapsed. A 401 from the target triggers exactly one re-login and one
    /// retry; a second 401 is reported as `AuthFailed`.
    ///
    /// # Errors
    ///
    /// - `AuthFailed` if login fails or the retry is also rejected
    /// - `Api` for any other non-2xx status
    /// - `Timeout` / `Connection` for transport failures
    pub async fn authenticated_request(
        &self,
        creds: &Credentials,
        method: HttpMethod,
        path: &str,
        parts: RequestParts<'_>,
    ) -> AppResult<ApiResponse> {
        let session = self.sessions.session_for(creds).await;
        let url = creds.endpoint_url(path);

        let token = self.ensure_token(creds, &session).await?;
        let response = self
            .send(&session, &token, method, &url, parts, 1)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return read_response(response).await;
        }

        info!(
            account = %creds.account(),
            method = method.as_str(),
            path,
            "session rejected, re-authenticating"
        );
        let token = self.refresh_token(creds, &session, &token).await?;
        let response = self
            .send(&session, &token, method, &url, parts, 2)
            .await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(account = %creds.account(), path, "request still unauthorized after retry");
            return Err(AppError::AuthFailed(
                "session rejected again after re-authentication".to_owned(),
            ));
        }
        read_response(response).await
    }

    /// Log in unconditionally and install the new session token
    ///
    /// Used to verify credentials; later calls reuse the fresh session.
    pub async fn reauthenticate(&self, creds: &Credentials) -> AppResult<()> {
        let session = self.sessions.session_for(creds).await;
        let mut state = session.lock().await;
        state.invalidate();
        let token = self.login(creds, &session).await?;
        state.install(token, self.sessions.ttl());
        Ok(())
    }

    /// Drop all cached sessions
    pub async fn shutdown(&self) {
        let count = self.sessions.len().await;
        self.sessions.clear().await;
        info!(count, "closed cached sessions");
    }

    /// Return a valid token, logging in under the session lock if needed
    async fn ensure_token(&self, creds: &Credentials, session: &Session) -> AppResult<String> {
        let mut state = session.lock().await;
        if state.is_valid()
            && let Some(token) = state.token()
        {
            return Ok(token.to_owned());
        }

        let token = self.login(creds, session).await?;
        state.install(token.clone(), self.sessions.ttl());
        Ok(token)
    }

    /// Replace a token the server rejected
    ///
    /// If another caller already swapped `stale` for a newer valid token, that
    /// token is reused rather than logging in again.
    async fn refresh_token(
        &self,
        creds: &Credentials,
        session: &Session,
        stale: &str,
    ) -> AppResult<String> {
        let mut state = session.lock().await;
        if state.is_valid()
            && let Some(current) = state.token()
            && current != stale
        {
            return Ok(current.to_owned());
        }

        state.invalidate();
        let token = self.login(creds, session).await?;
        state.install(token.clone(), self.sessions.ttl());
        Ok(token)
    }

    /// `POST <base>/login` and extract the `sessid` field
    async fn login(&self, creds: &Credentials, session: &Session) -> AppResult<String> {
        let url = format!("{}/login", creds.api_base());
        debug!(account = %creds.account(), server = %creds.server_url(), "logging in");

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, session.auth_header())
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| transport_error("login request", &e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AppError::AuthFailed("invalid email or password".to_owned()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| transport_error("login response", &e))?;
        if status != StatusCode::OK {
            return Err(AppError::AuthFailed(format!(
                "login failed with status {}: {}",
                status.as_u16(),
                truncate_chars(&body, MAX_ERROR_BODY_CHARS)
            )));
        }

        let parsed: LoginResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::AuthFailed(format!("unreadable login response: {e}")))?;
        match parsed.sessid {
            Some(sessid) if !sessid.is_empty() => {
                info!(account = %creds.account(), server = %creds.server_url(), "authenticated");
                Ok(sessid)
            }
            _ => Err(AppError::AuthFailed(
                "no session id received from server".to_owned(),
            )),
        }
    }

    async fn send(
        &self,
        session: &Session,
        token: &str,
        method: HttpMethod,
        url: &str,
        parts: RequestParts<'_>,
        attempt: u32,
    ) -> AppResult<Response> {
        let mut request = self
            .http
            .request(method.into(), url)
            .header(header::AUTHORIZATION, session.auth_header())
            .header(SESSION_HEADER, token)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(body) = parts.body {
            request = request.json(body);
        }
        if let Some(query) = parts.query {
            request = request.query(query);
        }

        debug!(method = method.as_str(), url, attempt, "sending request");
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("request", &e))?;
        debug!(url, status = response.status().as_u16(), attempt, "received response");
        Ok(response)
    }
}

/// Turn a non-401 response into the normalized result or an `Api` error
async fn read_response(response: Response) -> AppResult<ApiResponse> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    let body = response
        .text()
        .await
        .map_err(|e| transport_error("response body", &e))?;

    if !status.is_success() {
        return Err(AppError::Api {
            status: status.as_u16(),
            message: error_message(status, &body),
        });
    }
    Ok(normalize_success(status, is_json, body))
}

fn normalize_success(status: StatusCode, is_json: bool, body: String) -> ApiResponse {
    if status == StatusCode::NO_CONTENT || body.trim().is_empty() {
        return ApiResponse::Empty;
    }
    if is_json && let Ok(value) = serde_json::from_str::<Value>(&body) {
        return ApiResponse::Json(value);
    }
    ApiResponse::Raw(body)
}

/// Best-effort error text: JSON `error`, then `message`, then the raw body
fn error_message(status: StatusCode, body: &str) -> String {
    if body.trim().is_empty() {
        return format!("HTTP {}", status.as_u16());
    }
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        ["error", "message"]
            .iter()
            .find_map(|field| json.get(field).and_then(Value::as_str).map(str::to_owned))
    });
    truncate_chars(from_json.as_deref().unwrap_or(body), MAX_ERROR_BODY_CHARS)
}

/// Classify a `reqwest` failure as timeout or connection error
fn transport_error(context: &str, err: &reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Timeout(format!("{context} timed out"))
    } else if err.is_connect() || err.is_request() || err.is_body() {
        AppError::Connection(format!("{context} failed: {err}"))
    } else {
        AppError::Internal(format!("{context} failed: {err}"))
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}... (truncated)")
}
