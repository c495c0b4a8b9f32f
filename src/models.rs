//! Input/output DTOs and schema-bearing types
//!
//! Defines all data structures used in MCP tool contracts. Each type is
//! annotated with `JsonSchema` for automatic schema generation.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::axigen::HttpMethod;

/// Metadata included in all tool responses
///
/// Provides timing information and current UTC timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Meta {
    /// Current UTC timestamp in RFC 3339 format with milliseconds
    pub now_utc: String,
    /// Tool execution duration in milliseconds
    pub duration_ms: u64,
}

impl Meta {
    /// Create metadata populated with current time and elapsed duration
    pub fn now(duration_ms: u64) -> Self {
        Self {
            now_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            duration_ms,
        }
    }
}

/// Standard response envelope for all tools
///
/// Wraps tool-specific data with human-readable summary and execution metadata.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolEnvelope<T>
where
    T: JsonSchema,
{
    /// Human-readable summary of the operation outcome
    pub summary: String,
    /// Tool-specific data payload
    pub data: T,
    /// Execution metadata (timestamp, duration)
    pub meta: Meta,
}

/// Account credentials accepted by every tool
///
/// `Debug` output redacts the password.
#[derive(Clone, Deserialize, JsonSchema)]
pub struct AccountAuth {
    /// Account email address
    pub email: String,
    /// Account password
    pub password: String,
    /// Axigen server URL (defaults to `AXIGEN_DEFAULT_SERVER_URL`)
    pub server_url: Option<String>,
}

impl fmt::Debug for AccountAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountAuth")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("server_url", &self.server_url)
            .finish()
    }
}

/// Folder metadata
///
/// Returned by `axigen_list_folders`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FolderInfo {
    /// Folder identifier used by mail tools
    pub id: String,
    /// Display name
    pub name: String,
    /// Unread message count when reported by the server
    pub unread_count: Option<u64>,
    /// Total message count when reported by the server
    pub total_count: Option<u64>,
}

/// Input: credentials only
///
/// Used by account info, settings, whitelist, and alias listing tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AccountOnlyInput {
    #[serde(flatten)]
    pub account: AccountAuth,
}

/// Input: partial account settings update
///
/// Used by `axigen_update_account_settings`. Only the provided fields change.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateSettingsInput {
    #[serde(flatten)]
    pub account: AccountAuth,
    /// Settings to change (e.g. `language`, `timezone`, `theme`, `deleteToTrash`)
    pub settings: Map<String, Value>,
}

/// Input: list folders
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListFoldersInput {
    #[serde(flatten)]
    pub account: AccountAuth,
    /// Folder type: `all`, `mails`, `events`, `tasks`, `notes`, `contacts`
    #[serde(default = "default_folder_type")]
    pub folder_type: String,
}

/// Input: list emails in a folder
///
/// Used by `axigen_list_emails`. Pagination is offset based.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListEmailsInput {
    #[serde(flatten)]
    pub account: AccountAuth,
    /// Folder identifier from `axigen_list_folders`
    pub folder_id: String,
    /// Offset of the first email (default 0)
    #[serde(default)]
    pub start: u32,
    /// Maximum emails to return (1..500, default 50)
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Sort field: `date`, `from`, `subject`, `size` (default `date`)
    #[serde(default = "default_sort")]
    pub sort: String,
    /// Sort direction: `ASC` or `DESC` (default `DESC`)
    #[serde(default = "default_sort_dir")]
    pub sort_dir: String,
}

/// Input: single email by id
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetEmailInput {
    #[serde(flatten)]
    pub account: AccountAuth,
    /// Email identifier
    pub mail_id: String,
}

/// Input: move an email
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct MoveEmailInput {
    #[serde(flatten)]
    pub account: AccountAuth,
    /// Email identifier
    pub mail_id: String,
    /// Destination folder identifier
    pub folder_id: String,
}

/// Input: add an address to the spam whitelist
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AddWhitelistInput {
    #[serde(flatten)]
    pub account: AccountAuth,
    /// Sender address to always accept
    pub email_address: String,
}

/// Input: remove a whitelist entry
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RemoveWhitelistInput {
    #[serde(flatten)]
    pub account: AccountAuth,
    /// Whitelist entry identifier from `axigen_get_whitelist`
    pub entry_id: String,
}

/// Input: raw API request
///
/// Used by `axigen_api_request` for endpoints without a dedicated tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ApiRequestInput {
    #[serde(flatten)]
    pub account: AccountAuth,
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to `/api/v1` (e.g. `account/vacation`)
    pub path: String,
    /// Optional JSON body
    pub body: Option<Value>,
    /// Optional query-string parameters
    pub query: Option<BTreeMap<String, String>>,
}

fn default_folder_type() -> String {
    "mails".to_owned()
}

fn default_limit() -> u32 {
    50
}

fn default_sort() -> String {
    "date".to_owned()
}

fn default_sort_dir() -> String {
    "DESC".to_owned()
}
