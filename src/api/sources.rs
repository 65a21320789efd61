//! `/api/document-sources/*` routes
//!
//! These routes answer with bare JSON (no `{ success, data }` envelope).

use super::{segment, ApiClient, ApiRequest};
use crate::error::Result;
use crate::models::{CloudFile, Credentials, DocumentSource, Provider};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/document-sources`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSource {
    pub name: String,
    pub provider: Provider,
    pub credentials: Credentials,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_folder_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Partial body of `PUT /api/document-sources/:id`. Only set fields are sent.
///
/// `root_folder_id: Some(None)` clears the root folder (sent as `null`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_folder_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl SourceUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Body of `POST /api/document-sources/oauth/authorize`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub provider: Provider,
    pub client_id: String,
    pub client_secret: String,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_folder_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    auth_url: String,
}

impl ApiClient {
    /// Sources visible to the current user
    pub async fn list_sources(&self) -> Result<Vec<DocumentSource>> {
        self.fetch("/api/document-sources", ApiRequest::get().authenticated())
            .await
    }

    /// Every source of every user (admin only)
    pub async fn list_all_sources(&self) -> Result<Vec<DocumentSource>> {
        self.fetch(
            "/api/document-sources/admin/all",
            ApiRequest::get().authenticated(),
        )
        .await
    }

    pub async fn create_source(&self, source: &NewSource) -> Result<DocumentSource> {
        self.fetch(
            "/api/document-sources",
            ApiRequest::post().json(source).authenticated(),
        )
        .await
    }

    pub async fn update_source(&self, id: i64, update: &SourceUpdate) -> Result<()> {
        let _: Value = self
            .fetch(
                &format!("/api/document-sources/{}", id),
                ApiRequest::put().json(update).authenticated(),
            )
            .await?;
        Ok(())
    }

    pub async fn delete_source(&self, id: i64) -> Result<()> {
        let _: Value = self
            .fetch(
                &format!("/api/document-sources/{}", id),
                ApiRequest::delete().authenticated(),
            )
            .await?;
        Ok(())
    }

    /// A source including its decrypted credentials
    pub async fn source_with_credentials(&self, id: i64) -> Result<DocumentSource> {
        self.fetch(
            &format!("/api/document-sources/{}?includeCredentials=true", id),
            ApiRequest::get().authenticated(),
        )
        .await
    }

    /// List a folder of a source; `None` lists the source root
    pub async fn list_files(&self, id: i64, folder_id: Option<&str>) -> Result<Vec<CloudFile>> {
        let path = match folder_id.filter(|f| !f.is_empty()) {
            Some(folder) => format!(
                "/api/document-sources/{}/files?folderId={}",
                id,
                segment(folder)
            ),
            None => format!("/api/document-sources/{}/files", id),
        };
        self.fetch(&path, ApiRequest::get().authenticated()).await
    }

    /// Start a provider OAuth flow; returns the URL the user must visit
    pub async fn oauth_authorize(&self, request: &AuthorizeRequest) -> Result<String> {
        let response: AuthorizeResponse = self
            .fetch(
                "/api/document-sources/oauth/authorize",
                ApiRequest::post().json(request).authenticated(),
            )
            .await?;
        Ok(response.auth_url)
    }
}
