//! `/api/tracked-files/*` routes

use super::{segment, ApiClient, ApiRequest};
use crate::error::Result;
use crate::models::{SyncReport, TrackFileRequest, TrackedFile};
use serde_json::Value;
use std::collections::HashMap;

impl ApiClient {
    /// Opt a file or folder into the RAG index
    pub async fn track_file(&self, request: &TrackFileRequest) -> Result<TrackedFile> {
        self.fetch(
            "/api/tracked-files",
            ApiRequest::post().json(request).authenticated(),
        )
        .await
    }

    pub async fn untrack_file(&self, source_id: i64, file_id: &str) -> Result<()> {
        let _: Value = self
            .fetch(
                &format!("/api/tracked-files/{}/{}", source_id, segment(file_id)),
                ApiRequest::delete().authenticated(),
            )
            .await?;
        Ok(())
    }

    pub async fn tracked_files(&self, source_id: i64) -> Result<Vec<TrackedFile>> {
        self.fetch(
            &format!("/api/tracked-files/{}", source_id),
            ApiRequest::get().authenticated(),
        )
        .await
    }

    /// Tracked files of a source keyed by provider file id
    pub async fn tracked_map(&self, source_id: i64) -> Result<HashMap<String, TrackedFile>> {
        self.fetch(
            &format!("/api/tracked-files/{}/map", source_id),
            ApiRequest::get().authenticated(),
        )
        .await
    }

    /// Remove a file's chunks from the index while keeping it tracked
    pub async fn unrag_file(&self, source_id: i64, file_id: &str) -> Result<()> {
        let _: Value = self
            .fetch(
                &format!("/api/tracked-files/{}/{}/unrag", source_id, segment(file_id)),
                ApiRequest::delete().authenticated(),
            )
            .await?;
        Ok(())
    }

    /// Run the backend indexing pass over every tracked file
    pub async fn sync(&self) -> Result<SyncReport> {
        self.fetch(
            "/api/tracked-files/sync",
            ApiRequest::post().authenticated(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::client_for;
    use super::*;
    use crate::models::TrackedStatus;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tracked_json(file_id: &str, status: &str) -> Value {
        json!({
            "id": 1,
            "sourceId": 2,
            "fileId": file_id,
            "fileName": "notes.md",
            "filePath": "Root/notes.md",
            "isFolder": false,
            "includeChildren": false,
            "status": status,
            "chunksCount": 4
        })
    }

    #[tokio::test]
    async fn test_track_file_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tracked-files"))
            .and(body_json(json!({
                "sourceId": 2,
                "fileId": "abc",
                "fileName": "notes.md",
                "filePath": "Root/notes.md",
                "isFolder": false,
                "includeChildren": false
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(tracked_json("abc", "pending")))
            .expect(1)
            .mount(&server)
            .await;

        let api = client_for(&server.uri(), Some("jwt"));
        let tracked = api
            .track_file(&TrackFileRequest {
                source_id: 2,
                file_id: "abc".to_string(),
                file_name: "notes.md".to_string(),
                file_path: "Root/notes.md".to_string(),
                is_folder: false,
                include_children: false,
            })
            .await
            .unwrap();
        assert_eq!(tracked.status, TrackedStatus::Pending);
    }

    #[tokio::test]
    async fn test_tracked_map_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tracked-files/2/map"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "abc": tracked_json("abc", "completed"),
                "def": tracked_json("def", "error")
            })))
            .mount(&server)
            .await;

        let api = client_for(&server.uri(), Some("jwt"));
        let map = api.tracked_map(2).await.unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["abc"].chunks_count, 4);
        assert_eq!(map["def"].status, TrackedStatus::Error);
    }

    #[tokio::test]
    async fn test_untrack_and_unrag_accept_empty_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/tracked-files/2/abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/tracked-files/2/abc/unrag"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let api = client_for(&server.uri(), Some("jwt"));
        api.untrack_file(2, "abc").await.unwrap();
        api.unrag_file(2, "abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tracked-files/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "processedCount": 3,
                "errorCount": 1,
                "logs": [
                    { "timestamp": "2025-01-01T00:00:00Z", "level": "error", "message": "boom", "fileName": "a.pdf" }
                ]
            })))
            .mount(&server)
            .await;

        let api = client_for(&server.uri(), Some("jwt"));
        let report = api.sync().await.unwrap();
        assert!(!report.success);
        assert_eq!(report.processed_count, 3);
        assert_eq!(report.logs[0].file_name.as_deref(), Some("a.pdf"));
    }
}
