//! Wire and domain types shared by the chat, explorer and admin modules.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Standard `{ success, data, message }` wrapper used by the auth and AI routes
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: T,
    #[serde(default)]
    pub message: Option<String>,
}

/// A chat conversation owned by the current user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    #[serde(alias = "createdAt")]
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message. Ids are generated on the client and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>, timestamp: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: timestamp
                .filter(|ts| !ts.is_empty())
                .unwrap_or_else(|| Utc::now().to_rfc3339()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, None)
    }

    pub fn assistant(content: impl Into<String>, timestamp: Option<String>) -> Self {
        Self::new(Role::Assistant, content, timestamp)
    }
}

/// Remote storage provider backing a document source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    GoogleDrive,
    Dropbox,
    #[serde(rename = "onedrive")]
    OneDrive,
}

impl Provider {
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::GoogleDrive => "Google Drive",
            Provider::Dropbox => "Dropbox",
            Provider::OneDrive => "OneDrive",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::GoogleDrive => write!(f, "google_drive"),
            Provider::Dropbox => write!(f, "dropbox"),
            Provider::OneDrive => write!(f, "onedrive"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_lowercase().as_str() {
            "google_drive" | "google-drive" | "gdrive" => Ok(Provider::GoogleDrive),
            "dropbox" => Ok(Provider::Dropbox),
            "onedrive" | "one_drive" => Ok(Provider::OneDrive),
            _ => Err(crate::error::Error::Validation(format!(
                "Unknown provider '{}': expected google_drive, dropbox or onedrive",
                s
            ))),
        }
    }
}

/// Provider OAuth tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credentials {
    /// Build credentials, treating a blank refresh token as absent
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.filter(|t| !t.trim().is_empty()),
        }
    }
}

/// A configured connection to a remote storage provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSource {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub name: String,
    pub provider: Provider,
    #[serde(default)]
    pub root_folder_id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_sync_at: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decrypted_credentials: Option<DecryptedCredentials>,
}

/// Credentials as returned by `?includeCredentials=true`; either token may be missing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedCredentials {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// A file or folder listed from a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_time: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Human readable size, `-` when unknown
pub fn format_file_size(bytes: Option<u64>) -> String {
    match bytes {
        None | Some(0) => "-".to_string(),
        Some(bytes) => {
            let kb = bytes as f64 / 1024.0;
            if kb < 1024.0 {
                format!("{:.1} KB", kb)
            } else {
                format!("{:.1} MB", kb / 1024.0)
            }
        }
    }
}

/// Indexing state of a tracked file, driven by the backend sync process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackedStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl fmt::Display for TrackedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackedStatus::Pending => write!(f, "pending"),
            TrackedStatus::Processing => write!(f, "processing"),
            TrackedStatus::Completed => write!(f, "completed"),
            TrackedStatus::Error => write!(f, "error"),
        }
    }
}

/// A remote file or folder opted into the RAG index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedFile {
    #[serde(default)]
    pub id: Option<i64>,
    pub source_id: i64,
    pub file_id: String,
    pub file_name: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub file_hash: Option<String>,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub include_children: bool,
    pub status: TrackedStatus,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub last_processed_at: Option<String>,
    #[serde(default)]
    pub chunks_count: u32,
}

/// Body of `POST /api/tracked-files`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackFileRequest {
    pub source_id: i64,
    pub file_id: String,
    pub file_name: String,
    pub file_path: String,
    pub is_folder: bool,
    pub include_children: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncLevel {
    Info,
    Success,
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLog {
    pub timestamp: String,
    pub level: SyncLevel,
    pub message: String,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Result of `POST /api/tracked-files/sync`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub success: bool,
    #[serde(default)]
    pub processed_count: u32,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default)]
    pub logs: Vec<SyncLog>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    User,
    Admin,
}

/// The logged in user as returned by `/api/auth/fetchme`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "last_name")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub division: Option<String>,
    pub email: String,
    #[serde(default)]
    pub disclaimer_checked: bool,
    #[serde(default = "default_role")]
    pub role: UserRole,
}

fn default_role() -> UserRole {
    UserRole::User
}

impl UserProfile {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}
