//! MCP server implementation with tool handlers
//!
//! Implements the `ServerHandler` trait and registers the Axigen tools. Handles
//! input validation, request orchestration through [`AxigenClient`], and
//! response formatting.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{ErrorData, ServerCapabilities, ServerInfo};
use rmcp::{Json, ServerHandler, tool, tool_handler, tool_router};
use serde_json::{Value, json};

use crate::axigen::{ApiResponse, AxigenClient, HttpMethod, RequestParts};
use crate::config::ServerConfig;
use crate::credentials::{Credentials, validate_email_address};
use crate::errors::{AppError, AppResult};
use crate::models::{
    AccountAuth, AccountOnlyInput, AddWhitelistInput, ApiRequestInput, FolderInfo,
    GetEmailInput, ListEmailsInput, ListFoldersInput, Meta, MoveEmailInput, RemoveWhitelistInput,
    ToolEnvelope, UpdateSettingsInput,
};

/// Maximum emails per listing page
const MAX_LIST_LIMIT: u32 = 500;
/// Folder types accepted by `GET folders`
const FOLDER_TYPES: &[&str] = &["all", "mails", "events", "tasks", "notes", "contacts"];
/// Sort fields accepted by `GET mails`
const SORT_FIELDS: &[&str] = &["date", "from", "subject", "size"];
/// Folder names surfaced in `common_folders`
const COMMON_FOLDERS: &[&str] = &["inbox", "sent", "drafts", "trash", "spam", "archive"];

/// Axigen MCP server
///
/// Holds shared configuration and the API client (which owns the session
/// cache). Implements MCP tool handlers via `#[tool]` attribute macro and
/// `ServerHandler` trait.
#[derive(Clone)]
pub struct AxigenServer {
    /// Server config (default server URL, timeouts, write flag)
    config: Arc<ServerConfig>,
    /// REST client shared by all tool calls
    client: Arc<AxigenClient>,
    /// Tool router for dispatching MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl AxigenServer {
    /// Create a new MCP server instance
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the HTTP client cannot be built.
    pub fn new(config: ServerConfig) -> AppResult<Self> {
        let client = AxigenClient::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            client: Arc::new(client),
            tool_router: Self::tool_router(),
        })
    }

    /// Shared API client, kept by `main` to close sessions on shutdown
    pub fn client(&self) -> Arc<AxigenClient> {
        Arc::clone(&self.client)
    }

    /// Tool: Verify credentials against the server
    ///
    /// Forces a fresh login, then reads account info with the new session.
    #[tool(
        name = "axigen_verify_account",
        description = "Verify Axigen credentials and connectivity"
    )]
    async fn verify_account(
        &self,
        Parameters(input): Parameters<AccountOnlyInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.verify_account_impl(input)
                .await
                .map(|data| ("Account verification succeeded".to_owned(), data)),
        )
    }

    #[tool(name = "axigen_get_account_info", description = "Get account information")]
    async fn get_account_info(
        &self,
        Parameters(input): Parameters<AccountOnlyInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = self.fetch(&input.account, "account/info").await;
        finalize_tool(
            started,
            result.map(|data| ("Account information retrieved".to_owned(), data)),
        )
    }

    #[tool(
        name = "axigen_get_account_settings",
        description = "Get account settings and preferences"
    )]
    async fn get_account_settings(
        &self,
        Parameters(input): Parameters<AccountOnlyInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = self.fetch(&input.account, "account/settings").await;
        finalize_tool(
            started,
            result.map(|data| ("Account settings retrieved".to_owned(), data)),
        )
    }

    /// Tool: Update account settings
    ///
    /// Sends a PATCH so only the provided fields change. Requires
    /// `AXIGEN_WRITE_ENABLED=true`.
    #[tool(
        name = "axigen_update_account_settings",
        description = "Update account settings and preferences"
    )]
    async fn update_account_settings(
        &self,
        Parameters(input): Parameters<UpdateSettingsInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.update_settings_impl(input)
                .await
                .map(|data| ("Account settings updated".to_owned(), data)),
        )
    }

    /// Tool: List folders with ids
    ///
    /// Also returns the ids of well-known folders (inbox, sent, drafts,
    /// trash, spam, archive) for use with `axigen_list_emails`.
    #[tool(name = "axigen_list_folders", description = "List folders with their ids")]
    async fn list_folders(
        &self,
        Parameters(input): Parameters<ListFoldersInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.list_folders_impl(input).await.map(|data| {
                (
                    format!(
                        "{} folder(s)",
                        data["folders"].as_array().map_or(0, Vec::len)
                    ),
                    data,
                )
            }),
        )
    }

    /// Tool: List emails in a folder
    ///
    /// Offset pagination with sort field and direction.
    #[tool(name = "axigen_list_emails", description = "List emails in a folder")]
    async fn list_emails(
        &self,
        Parameters(input): Parameters<ListEmailsInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.list_emails_impl(input).await.map(|data| {
                (
                    format!(
                        "{} email(s) returned",
                        data["emails"].as_array().map_or(0, Vec::len)
                    ),
                    data,
                )
            }),
        )
    }

    #[tool(name = "axigen_get_email", description = "Get email details")]
    async fn get_email(
        &self,
        Parameters(input): Parameters<GetEmailInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.get_email_impl(input)
                .await
                .map(|data| ("Email retrieved".to_owned(), data)),
        )
    }

    /// Tool: Move email to another folder
    ///
    /// Requires `AXIGEN_WRITE_ENABLED=true`.
    #[tool(name = "axigen_move_email", description = "Move an email to a folder")]
    async fn move_email(
        &self,
        Parameters(input): Parameters<MoveEmailInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.move_email_impl(input)
                .await
                .map(|data| ("Email moved".to_owned(), data)),
        )
    }

    #[tool(name = "axigen_get_whitelist", description = "Get the spam whitelist")]
    async fn get_whitelist(
        &self,
        Parameters(input): Parameters<AccountOnlyInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = self.fetch(&input.account, "account/avas/whitelist").await;
        finalize_tool(
            started,
            result.map(|data| (format!("{} whitelist entries", count_items(&data)), data)),
        )
    }

    /// Tool: Add sender to the spam whitelist
    ///
    /// An address that is already whitelisted is reported as success with
    /// `already_present=true`. Requires `AXIGEN_WRITE_ENABLED=true`.
    #[tool(
        name = "axigen_add_to_whitelist",
        description = "Add an address to the spam whitelist"
    )]
    async fn add_to_whitelist(
        &self,
        Parameters(input): Parameters<AddWhitelistInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.add_whitelist_impl(input).await.map(|data| {
                let summary = if data["already_present"] == json!(true) {
                    "Address was already whitelisted"
                } else {
                    "Address added to whitelist"
                };
                (summary.to_owned(), data)
            }),
        )
    }

    /// Tool: Remove a whitelist entry
    ///
    /// A missing entry is reported as success with `already_absent=true`.
    /// Requires `AXIGEN_WRITE_ENABLED=true`.
    #[tool(
        name = "axigen_remove_from_whitelist",
        description = "Remove an entry from the spam whitelist"
    )]
    async fn remove_from_whitelist(
        &self,
        Parameters(input): Parameters<RemoveWhitelistInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        finalize_tool(
            started,
            self.remove_whitelist_impl(input)
                .await
                .map(|data| ("Whitelist entry removed".to_owned(), data)),
        )
    }

    #[tool(
        name = "axigen_get_temporary_aliases",
        description = "List temporary email aliases"
    )]
    async fn get_temporary_aliases(
        &self,
        Parameters(input): Parameters<AccountOnlyInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let result = self.fetch(&input.account, "account/temporaryaliases").await;
        finalize_tool(
            started,
            result.map(|data| (format!("{} temporary alias(es)", count_items(&data)), data)),
        )
    }

    /// Tool: Raw authenticated API request
    ///
    /// Escape hatch for endpoints without a dedicated tool. Methods other
    /// than GET require `AXIGEN_WRITE_ENABLED=true`.
    #[tool(
        name = "axigen_api_request",
        description = "Send an authenticated request to any Axigen API path"
    )]
    async fn api_request(
        &self,
        Parameters(input): Parameters<ApiRequestInput>,
    ) -> Result<Json<ToolEnvelope<Value>>, ErrorData> {
        let started = Instant::now();
        let summary = format!("{} {} completed", input.method.as_str(), input.path);
        finalize_tool(
            started,
            self.api_request_impl(input).await.map(|data| (summary, data)),
        )
    }
}

/// MCP server handler implementation
///
/// Provides server info and capabilities to MCP client.
#[tool_handler(router = self.tool_router)]
impl ServerHandler for AxigenServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build()).with_instructions(
            "Axigen mail MCP server. Every tool takes email, password, and an optional server_url; sessions are cached and refreshed automatically. Write tools require AXIGEN_WRITE_ENABLED=true.",
        )
    }
}

/// Tool implementation methods
///
/// Private methods handle the actual request logic for each tool, separated
/// from the public `#[tool]` methods that handle response formatting.
impl AxigenServer {
    /// Build validated credentials, falling back to the default server URL
    fn credentials(&self, auth: &AccountAuth) -> AppResult<Credentials> {
        let server_url = auth
            .server_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or(&self.config.default_server_url);
        Credentials::new(auth.email.as_str(), auth.password.as_str(), server_url)
    }

    async fn call(
        &self,
        creds: &Credentials,
        method: HttpMethod,
        path: &str,
        parts: RequestParts<'_>,
    ) -> AppResult<Value> {
        self.client
            .authenticated_request(creds, method, path, parts)
            .await
            .map(ApiResponse::into_value)
    }

    async fn get(
        &self,
        creds: &Credentials,
        path: &str,
        query: Option<&BTreeMap<String, String>>,
    ) -> AppResult<Value> {
        let parts = query.map_or_else(RequestParts::default, RequestParts::query);
        self.call(creds, HttpMethod::Get, path, parts).await
    }

    /// GET a fixed path for the given account
    async fn fetch(&self, auth: &AccountAuth, path: &str) -> AppResult<Value> {
        let creds = self.credentials(auth)?;
        self.get(&creds, path, None).await
    }

    async fn verify_account_impl(&self, input: AccountOnlyInput) -> AppResult<Value> {
        let creds = self.credentials(&input.account)?;
        let started = Instant::now();
        self.client.reauthenticate(&creds).await?;
        let latency_ms = duration_ms(started);
        let info = self.get(&creds, "account/info", None).await?;

        Ok(json!({
            "email": creds.account(),
            "server_url": creds.server_url(),
            "ok": true,
            "login_latency_ms": latency_ms,
            "account": info,
        }))
    }

    async fn update_settings_impl(&self, input: UpdateSettingsInput) -> AppResult<Value> {
        require_write_enabled(&self.config)?;
        if input.settings.is_empty() {
            return Err(AppError::invalid("settings must contain at least one field"));
        }
        let creds = self.credentials(&input.account)?;

        let updated = input.settings.keys().cloned().collect::<Vec<_>>();
        let body = Value::Object(input.settings);
        let result = self
            .call(
                &creds,
                HttpMethod::Patch,
                "account/settings",
                RequestParts::body(&body),
            )
            .await?;

        Ok(json!({ "updated_fields": updated, "result": result }))
    }

    async fn list_folders_impl(&self, input: ListFoldersInput) -> AppResult<Value> {
        validate_choice(&input.folder_type, FOLDER_TYPES, "folder_type")?;
        let creds = self.credentials(&input.account)?;

        let query = BTreeMap::from([("type".to_owned(), input.folder_type.clone())]);
        let raw = self.get(&creds, "folders", Some(&query)).await?;
        let (folders, common_folders) = summarize_folders(&raw);

        Ok(json!({
            "folder_type": input.folder_type,
            "folders": folders,
            "common_folders": common_folders,
        }))
    }

    async fn list_emails_impl(&self, input: ListEmailsInput) -> AppResult<Value> {
        validate_id(&input.folder_id, "folder_id")?;
        validate_range(input.limit, 1, MAX_LIST_LIMIT, "limit")?;
        validate_choice(&input.sort, SORT_FIELDS, "sort")?;
        let sort_dir = input.sort_dir.to_ascii_uppercase();
        validate_choice(&sort_dir, &["ASC", "DESC"], "sort_dir")?;
        let creds = self.credentials(&input.account)?;

        let query = BTreeMap::from([
            ("folderId".to_owned(), input.folder_id.clone()),
            ("start".to_owned(), input.start.to_string()),
            ("limit".to_owned(), input.limit.to_string()),
            ("sort".to_owned(), input.sort.clone()),
            ("dir".to_owned(), sort_dir),
        ]);
        let raw = self.get(&creds, "mails", Some(&query)).await?;

        let emails = items(&raw);
        let total = raw
            .get("total")
            .and_then(Value::as_u64)
            .unwrap_or(emails.len() as u64);
        Ok(json!({
            "folder_id": input.folder_id,
            "start": input.start,
            "total": total,
            "emails": emails,
        }))
    }

    async fn get_email_impl(&self, input: GetEmailInput) -> AppResult<Value> {
        validate_id(&input.mail_id, "mail_id")?;
        let creds = self.credentials(&input.account)?;
        let path = format!("mails/{}", urlencoding::encode(&input.mail_id));
        self.get(&creds, &path, None).await
    }

    async fn move_email_impl(&self, input: MoveEmailInput) -> AppResult<Value> {
        require_write_enabled(&self.config)?;
        validate_id(&input.mail_id, "mail_id")?;
        validate_id(&input.folder_id, "folder_id")?;
        let creds = self.credentials(&input.account)?;

        let path = format!("mails/{}/move", urlencoding::encode(&input.mail_id));
        let body = json!({ "destinationFolderId": input.folder_id });
        let result = self
            .call(&creds, HttpMethod::Post, &path, RequestParts::body(&body))
            .await?;

        Ok(json!({
            "mail_id": input.mail_id,
            "folder_id": input.folder_id,
            "result": result,
        }))
    }

    async fn add_whitelist_impl(&self, input: AddWhitelistInput) -> AppResult<Value> {
        require_write_enabled(&self.config)?;
        validate_email_address(&input.email_address)?;
        let creds = self.credentials(&input.account)?;

        let body = json!({ "emailAddress": input.email_address });
        match self
            .call(
                &creds,
                HttpMethod::Post,
                "account/avas/whitelist",
                RequestParts::body(&body),
            )
            .await
        {
            Ok(entry) => Ok(json!({
                "email_address": input.email_address,
                "already_present": false,
                "entry": entry,
            })),
            Err(e) if e.is_conflict() => Ok(json!({
                "email_address": input.email_address,
                "already_present": true,
            })),
            Err(e) => Err(e),
        }
    }

    async fn remove_whitelist_impl(&self, input: RemoveWhitelistInput) -> AppResult<Value> {
        require_write_enabled(&self.config)?;
        validate_id(&input.entry_id, "entry_id")?;
        let creds = self.credentials(&input.account)?;

        let path = format!(
            "account/avas/whitelist/{}",
            urlencoding::encode(&input.entry_id)
        );
        let already_absent = match self
            .call(&creds, HttpMethod::Delete, &path, RequestParts::default())
            .await
        {
            Ok(_) => false,
            Err(e) if e.is_not_found() => true,
            Err(e) => return Err(e),
        };

        Ok(json!({ "entry_id": input.entry_id, "already_absent": already_absent }))
    }

    async fn api_request_impl(&self, input: ApiRequestInput) -> AppResult<Value> {
        if input.method != HttpMethod::Get {
            require_write_enabled(&self.config)?;
        }
        validate_api_path(&input.path)?;
        let creds = self.credentials(&input.account)?;

        let parts = RequestParts {
            body: input.body.as_ref(),
            query: input.query.as_ref(),
        };
        self.call(&creds, input.method, &input.path, parts).await
    }
}

/// Calculate elapsed milliseconds
fn duration_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Build a standardized MCP tool response envelope from request output
fn finalize_tool<T>(
    started: Instant,
    result: AppResult<(String, T)>,
) -> Result<Json<ToolEnvelope<T>>, ErrorData>
where
    T: schemars::JsonSchema,
{
    match result {
        Ok((summary, data)) => Ok(Json(ToolEnvelope {
            summary,
            data,
            meta: Meta::now(duration_ms(started)),
        })),
        Err(e) => Err(e.to_error_data()),
    }
}

/// List payload of a response: a bare array or the `items` field
fn items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(list) => list.clone(),
        other => other
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

fn count_items(value: &Value) -> usize {
    items(value).len()
}

/// Extract folder summaries and ids of well-known folders
fn summarize_folders(raw: &Value) -> (Vec<FolderInfo>, BTreeMap<String, String>) {
    let mut common = BTreeMap::new();
    let folders = items(raw)
        .iter()
        .filter_map(|folder| {
            let id = match folder.get("id")? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            let name = folder
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_owned();
            let lowered = name.to_lowercase();
            if COMMON_FOLDERS.contains(&lowered.as_str()) {
                common.entry(lowered).or_insert_with(|| id.clone());
            }
            Some(FolderInfo {
                id,
                name,
                unread_count: folder.get("unreadCount").and_then(Value::as_u64),
                total_count: folder.get("totalCount").and_then(Value::as_u64),
            })
        })
        .collect();
    (folders, common)
}

/// Validate an opaque identifier taken from user input
fn validate_id(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() || value.len() > 256 {
        return Err(AppError::InvalidInput(format!(
            "{field} must be 1..256 characters"
        )));
    }
    validate_no_controls(value, field)
}

/// Reject control characters in user-provided values
fn validate_no_controls(value: &str, field: &str) -> AppResult<()> {
    if value.chars().any(|ch| ch.is_ascii_control()) {
        return Err(AppError::InvalidInput(format!(
            "{field} must not contain control characters"
        )));
    }
    Ok(())
}

/// Validate numeric value in range
fn validate_range(value: u32, min: u32, max: u32, field: &str) -> AppResult<()> {
    if value < min || value > max {
        return Err(AppError::InvalidInput(format!(
            "{field} must be in range {min}..{max}"
        )));
    }
    Ok(())
}

fn validate_choice(value: &str, allowed: &[&str], field: &str) -> AppResult<()> {
    if !allowed.contains(&value) {
        return Err(AppError::InvalidInput(format!(
            "{field} must be one of: {}",
            allowed.join(", ")
        )));
    }
    Ok(())
}

/// Validate a relative API path for the raw request tool
///
/// The path must stay below `/api/v1`: no scheme, no dot segments (plain or
/// percent-encoded), and no inline query or fragment (use `query` instead).
fn validate_api_path(path: &str) -> AppResult<()> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.len() > 512 {
        return Err(AppError::InvalidInput(
            "path must be 1..512 characters".to_owned(),
        ));
    }
    validate_no_controls(trimmed, "path")?;
    if trimmed.contains("://") || trimmed.contains(['?', '#', ' ']) {
        return Err(AppError::InvalidInput(
            "path must be a relative API path without query or fragment".to_owned(),
        ));
    }
    for segment in trimmed.split('/') {
        let decoded = urlencoding::decode(segment)
            .map_err(|_| AppError::invalid("path segments must be valid percent-encoded UTF-8"))?;
        if decoded == "." || decoded == ".." {
            return Err(AppError::InvalidInput(
                "path must not contain '.' or '..' segments".to_owned(),
            ));
        }
    }
    Ok(())
}

/// Check if write operations are enabled
fn require_write_enabled(config: &ServerConfig) -> AppResult<()> {
    if !config.write_enabled {
        return Err(AppError::InvalidInput(
            "write tools are disabled; set AXIGEN_WRITE_ENABLED=true".to_owned(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{
        AxigenServer, summarize_folders, validate_api_path, validate_choice, validate_id,
    };
    use crate::config::ServerConfig;
    use crate::models::{
        AccountAuth, AccountOnlyInput, AddWhitelistInput, ListEmailsInput, MoveEmailInput,
        RemoveWhitelistInput,
    };

    fn server_for(mock: &MockServer, write_enabled: bool) -> AxigenServer {
        AxigenServer::new(ServerConfig {
            default_server_url: mock.uri(),
            write_enabled,
            ..ServerConfig::default()
        })
        .expect("server must build")
    }

    fn auth() -> AccountAuth {
        AccountAuth {
            email: "user@example.com".to_owned(),
            password: "secret123".to_owned(),
            server_url: None,
        }
    }

    async fn mount_login(mock: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/v1/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sessid": "abc" })))
            .mount(mock)
            .await;
    }

    #[test]
    fn account_auth_debug_redacts_password() {
        let rendered = format!("{:?}", auth());
        assert!(rendered.contains("user@example.com"));
        assert!(!rendered.contains("secret123"));
    }

    #[test]
    fn rejects_control_chars_in_ids() {
        let err = validate_id("12\r\n", "mail_id").expect_err("must fail");
        assert!(err.to_string().contains("control characters"));
        assert!(validate_id("  ", "mail_id").is_err());
        validate_id("1234", "mail_id").expect("plain id must be valid");
    }

    #[test]
    fn validate_choice_lists_allowed_values() {
        let err = validate_choice("color", &["date", "size"], "sort").expect_err("must fail");
        assert!(err.to_string().contains("date, size"));
    }

    #[test]
    fn api_path_must_stay_relative() {
        validate_api_path("/account/vacation").expect("leading slash is tolerated");
        validate_api_path("mails/42/body").expect("nested path must be valid");
        for bad in [
            "",
            "/",
            "https://evil.example/x",
            "account/../../admin",
            "mails?x=1",
            "a#b",
            "account/%2e%2e/%2e%2e/%2e%2e/admin",
            "account/%2E%2E/admin",
            "account/.%2E/admin",
            "./account",
            "account/%ff",
        ] {
            assert!(validate_api_path(bad).is_err(), "{bad} must be rejected");
        }
    }

    #[test]
    fn summarize_folders_extracts_common_ids() {
        let raw = json!({
            "items": [
                { "id": "1", "name": "Inbox", "unreadCount": 3, "totalCount": 10 },
                { "id": 2, "name": "Sent" },
                { "id": "9", "name": "Projects" },
                { "name": "no id" }
            ]
        });
        let (folders, common) = summarize_folders(&raw);
        assert_eq!(folders.len(), 3);
        assert_eq!(folders[0].unread_count, Some(3));
        assert_eq!(common.get("inbox").map(String::as_str), Some("1"));
        assert_eq!(common.get("sent").map(String::as_str), Some("2"));
        assert!(!common.contains_key("projects"));
    }

    #[tokio::test]
    async fn write_tools_require_write_mode() {
        let mock = MockServer::start().await;
        let server = server_for(&mock, false);
        let err = server
            .move_email_impl(MoveEmailInput {
                account: auth(),
                mail_id: "42".to_owned(),
                folder_id: "7".to_owned(),
            })
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("AXIGEN_WRITE_ENABLED"));
        assert!(mock.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn list_emails_forwards_paging_query() {
        let mock = MockServer::start().await;
        mount_login(&mock).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/mails"))
            .and(query_param("folderId", "5"))
            .and(query_param("limit", "20"))
            .and(query_param("dir", "ASC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "id": "a" }, { "id": "b" }],
                "total": 12
            })))
            .mount(&mock)
            .await;

        let data = server_for(&mock, false)
            .list_emails_impl(ListEmailsInput {
                account: auth(),
                folder_id: "5".to_owned(),
                start: 0,
                limit: 20,
                sort: "date".to_owned(),
                sort_dir: "asc".to_owned(),
            })
            .await
            .expect("listing must succeed");

        assert_eq!(data["total"], 12);
        assert_eq!(data["emails"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn duplicate_whitelist_entry_is_reported_as_present() {
        let mock = MockServer::start().await;
        mount_login(&mock).await;
        Mock::given(method("POST"))
            .and(path("/api/v1/account/avas/whitelist"))
            .and(body_json(json!({ "emailAddress": "friend@example.org" })))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({ "error": "already exists" })),
            )
            .mount(&mock)
            .await;

        let data = server_for(&mock, true)
            .add_whitelist_impl(AddWhitelistInput {
                account: auth(),
                email_address: "friend@example.org".to_owned(),
            })
            .await
            .expect("duplicate must not be an error");
        assert_eq!(data["already_present"], true);
    }

    #[tokio::test]
    async fn removing_missing_whitelist_entry_is_idempotent() {
        let mock = MockServer::start().await;
        mount_login(&mock).await;
        Mock::given(method("DELETE"))
            .and(path("/api/v1/account/avas/whitelist/77"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock)
            .await;

        let data = server_for(&mock, true)
            .remove_whitelist_impl(RemoveWhitelistInput {
                account: auth(),
                entry_id: "77".to_owned(),
            })
            .await
            .expect("missing entry must not be an error");
        assert_eq!(data["already_absent"], true);
    }

    #[tokio::test]
    async fn verify_account_logs_in_and_reads_info() {
        let mock = MockServer::start().await;
        mount_login(&mock).await;
        Mock::given(method("GET"))
            .and(path("/api/v1/account/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "accountName": "user" })))
            .mount(&mock)
            .await;

        let server = server_for(&mock, false);
        let data = server
            .verify_account_impl(AccountOnlyInput { account: auth() })
            .await
            .expect("verification must succeed");

        assert_eq!(data["ok"], true);
        assert_eq!(data["account"]["accountName"], "user");
        assert_eq!(server.client().sessions().len().await, 1);
    }

    #[tokio::test]
    async fn invalid_email_is_rejected_before_network() {
        let mock = MockServer::start().await;
        let server = server_for(&mock, false);
        let mut account = auth();
        account.email = "not-an-email".to_owned();

        let err = server
            .verify_account_impl(AccountOnlyInput { account })
            .await
            .expect_err("must fail");
        assert!(err.to_string().contains("invalid input"));
        assert!(mock.received_requests().await.unwrap_or_default().is_empty());
    }
}
