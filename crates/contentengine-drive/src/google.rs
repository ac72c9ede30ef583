//! Google Drive v3 REST implementation of [`FileStore`].

use std::time::Duration;

use async_trait::async_trait;
use contentengine_core::{EngineError, FileId, Result, FOLDER_MIME_TYPE};
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::query::{FileEntry, FileQuery};
use crate::store::FileStore;

const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, parents)";

/// Connection settings for the Drive API.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Metadata endpoint base, e.g. `https://www.googleapis.com/drive/v3`.
    pub api_base: String,

    /// Upload endpoint base, e.g. `https://www.googleapis.com/upload/drive/v3`.
    pub upload_base: String,

    /// OAuth bearer token with the `drive` scope.
    pub access_token: String,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Page size used when listing.
    pub page_size: u32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: "https://www.googleapis.com/drive/v3".to_string(),
            upload_base: "https://www.googleapis.com/upload/drive/v3".to_string(),
            access_token: String::new(),
            request_timeout: Duration::from_secs(30),
            page_size: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: FileId,
}

#[derive(Debug, Deserialize)]
struct ParentsOnly {
    #[serde(default)]
    parents: Vec<FileId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewFileMetadata<'a> {
    name: &'a str,
    mime_type: &'a str,
    parents: [&'a str; 1],
}

/// Drive client using a bearer token.
#[derive(Clone)]
pub struct GoogleDriveStore {
    config: DriveConfig,
    http: reqwest::Client,
}

impl GoogleDriveStore {
    /// Create a client with the given configuration.
    pub fn new(config: DriveConfig) -> Result<Self> {
        if config.access_token.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "Drive access token is not configured".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::Internal(e.to_string()))?;
        Ok(Self { config, http })
    }

    fn files_url(&self) -> String {
        format!("{}/files", self.config.api_base.trim_end_matches('/'))
    }

    fn file_url(&self, file_id: &FileId) -> String {
        format!("{}/{}", self.files_url(), file_id)
    }

    async fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response> {
        let response = request
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .map_err(|e| transport_error(e, operation, self.config.request_timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Storage(format!(
                "{} failed with {}: {}",
                operation,
                status,
                body.trim()
            )));
        }
        Ok(response)
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: Response, operation: &str) -> Result<T> {
        response
            .json()
            .await
            .map_err(|e| EngineError::Serialization(format!("{} returned unexpected body: {}", operation, e)))
    }
}

#[async_trait]
impl FileStore for GoogleDriveStore {
    async fn find(&self, query: &FileQuery) -> Result<Vec<FileEntry>> {
        let q = query.to_drive_query();
        let page_size = self.config.page_size.to_string();
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q", q.as_str()),
                ("fields", LIST_FIELDS),
                ("pageSize", page_size.as_str()),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }

            let request = self.http.get(self.files_url()).query(&params);
            let response = self.send(request, "files.list").await?;
            let page: FileList = Self::json(response, "files.list").await?;

            files.extend(page.files);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Drive query `{}` matched {} files", q, files.len());
        Ok(files)
    }

    async fn download(&self, file_id: &FileId) -> Result<Vec<u8>> {
        let request = self
            .http
            .get(self.file_url(file_id))
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
        let response = self.send(request, "files.get(media)").await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, "files.get(media)", self.config.request_timeout))?;
        Ok(bytes.to_vec())
    }

    async fn create_folder(&self, name: &str, parent: &FileId) -> Result<FileId> {
        let metadata = NewFileMetadata {
            name,
            mime_type: FOLDER_MIME_TYPE,
            parents: [parent.as_str()],
        };
        let request = self
            .http
            .post(self.files_url())
            .query(&[("fields", "id"), ("supportsAllDrives", "true")])
            .json(&metadata);
        let response = self.send(request, "files.create(folder)").await?;
        let created: CreatedFile = Self::json(response, "files.create(folder)").await?;
        Ok(created.id)
    }

    async fn upload(
        &self,
        name: &str,
        parent: &FileId,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<FileId> {
        let metadata = NewFileMetadata {
            name,
            mime_type,
            parents: [parent.as_str()],
        };
        let boundary = format!("contentengine-{}", Uuid::new_v4().simple());
        let body = multipart_related(&boundary, &serde_json::to_vec(&metadata)?, mime_type, &content);

        let url = format!("{}/files", self.config.upload_base.trim_end_matches('/'));
        let request = self
            .http
            .post(url)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id"),
                ("supportsAllDrives", "true"),
            ])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body);
        let response = self.send(request, "files.create(upload)").await?;
        let created: CreatedFile = Self::json(response, "files.create(upload)").await?;
        Ok(created.id)
    }

    async fn parents(&self, file_id: &FileId) -> Result<Vec<FileId>> {
        let request = self
            .http
            .get(self.file_url(file_id))
            .query(&[("fields", "parents"), ("supportsAllDrives", "true")]);
        let response = self.send(request, "files.get(parents)").await?;
        let parents: ParentsOnly = Self::json(response, "files.get(parents)").await?;
        Ok(parents.parents)
    }

    async fn reparent(&self, file_id: &FileId, remove: &[FileId], add: &FileId) -> Result<()> {
        let remove = remove
            .iter()
            .map(FileId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let request = self
            .http
            .patch(self.file_url(file_id))
            .query(&[
                ("addParents", add.as_str()),
                ("removeParents", remove.as_str()),
                ("fields", "id, parents"),
                ("supportsAllDrives", "true"),
            ])
            .json(&serde_json::json!({}));
        self.send(request, "files.update(parents)").await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error, operation: &str, timeout: Duration) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout {
            duration_ms: timeout.as_millis() as u64,
            operation: operation.to_string(),
        }
    } else {
        EngineError::Storage(format!("{} request failed: {}", operation, err))
    }
}

/// Build a `multipart/related` body: JSON metadata part, then the media part.
fn multipart_related(boundary: &str, metadata: &[u8], mime_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(metadata.len() + content.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata);
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime_type).as_bytes());
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_token_is_rejected() {
        let result = GoogleDriveStore::new(DriveConfig::default());
        assert!(matches!(result, Err(EngineError::InvalidRequest(_))));
    }

    #[test]
    fn test_file_urls() {
        let store = GoogleDriveStore::new(DriveConfig {
            api_base: "https://drive.example/v3/".to_string(),
            access_token: "token".to_string(),
            ..DriveConfig::default()
        })
        .unwrap();
        assert_eq!(store.files_url(), "https://drive.example/v3/files");
        assert_eq!(store.file_url(&FileId::new("abc")), "https://drive.example/v3/files/abc");
    }

    #[test]
    fn test_multipart_related_layout() {
        let body = multipart_related("b", br#"{"name":"pin_1.json"}"#, "application/json", b"{}");
        let text = String::from_utf8(body).unwrap();
        assert_eq!(
            text,
            "--b\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{\"name\":\"pin_1.json\"}\r\n--b\r\nContent-Type: application/json\r\n\r\n{}\r\n--b--\r\n"
        );
    }

    #[test]
    fn test_new_file_metadata_shape() {
        let metadata = NewFileMetadata {
            name: "shoe",
            mime_type: FOLDER_MIME_TYPE,
            parents: ["out"],
        };
        assert_eq!(
            serde_json::to_value(&metadata).unwrap(),
            serde_json::json!({"name": "shoe", "mimeType": FOLDER_MIME_TYPE, "parents": ["out"]})
        );
    }

    #[test]
    fn test_file_list_parses_drive_payload() {
        let raw = r#"{"nextPageToken":"t2","files":[{"id":"1","name":"shoe.jpg","mimeType":"image/jpeg","parents":["p"]}]}"#;
        let list: FileList = serde_json::from_str(raw).unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("t2"));
        assert_eq!(list.files[0].mime_type, "image/jpeg");
    }
}
