//! HTTP client for a cloud file API scoped to an app-private folder
//!
//! Requests follow the Google Drive v3 shapes: list files in
//! `appDataFolder`, download with `alt=media`, and multipart upload for
//! create (`POST`) and update (`PATCH`). Every request carries the bearer
//! token, has a timeout, and is retried once on transient failures.

use crate::config::RemoteConfig;
use crate::error::{AgregError, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Requests are attempted at most this many times
const MAX_ATTEMPTS: usize = 2;

/// Folder that holds application data invisible to the user
const APP_DATA_FOLDER: &str = "appDataFolder";

/// Metadata of a stored file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

/// Blob storage used for whole-store backups
#[async_trait]
pub trait RemoteBlobStore: Send + Sync {
    /// Looks up a file by exact name in the app-private folder
    async fn find(&self, token: &str, name: &str) -> Result<Option<RemoteFile>>;

    /// Downloads the content of a file
    async fn download(&self, token: &str, file_id: &str) -> Result<String>;

    /// Creates a new file with the given content
    async fn create(&self, token: &str, name: &str, content: &str) -> Result<RemoteFile>;

    /// Replaces the content of an existing file
    async fn update(&self, token: &str, file_id: &str, name: &str, content: &str)
        -> Result<RemoteFile>;
}

/// Drive v3 implementation of [`RemoteBlobStore`]
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    api_base: String,
    retry_backoff: Duration,
}

impl DriveClient {
    /// Creates a client from the remote configuration
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::config::RemoteConfig;
    /// use agregllm::remote::DriveClient;
    ///
    /// let client = DriveClient::new(&RemoteConfig::default()).unwrap();
    /// assert_eq!(client.api_base(), "https://www.googleapis.com");
    /// ```
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(AgregError::from)?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.api_base)
    }

    fn upload_url(&self, file_id: Option<&str>) -> String {
        match file_id {
            Some(id) => format!("{}/upload/drive/v3/files/{}", self.api_base, id),
            None => format!("{}/upload/drive/v3/files", self.api_base),
        }
    }

    /// Multipart body of JSON metadata followed by the JSON content
    fn upload_form(metadata: &serde_json::Value, content: &str) -> Result<Form> {
        let metadata = Part::text(metadata.to_string())
            .mime_str("application/json")
            .map_err(AgregError::from)?;
        let file = Part::text(content.to_string())
            .mime_str("application/json")
            .map_err(AgregError::from)?;
        Ok(Form::new().part("metadata", metadata).part("file", file))
    }

    /// Sends a request, retrying once on connect errors, timeouts, 429 and
    /// 5xx responses
    ///
    /// `build` is called for every attempt because multipart bodies cannot be
    /// cloned.
    async fn send_with_retry<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder> + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = build()?.send().await;

            let transient = match &outcome {
                Ok(response) => {
                    let status = response.status();
                    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
                }
                Err(e) => e.is_timeout() || e.is_connect(),
            };

            if transient && attempt < MAX_ATTEMPTS {
                tracing::warn!(
                    operation = operation,
                    attempt = attempt,
                    "Transient remote failure, retrying"
                );
                tokio::time::sleep(self.retry_backoff).await;
                continue;
            }

            let response = outcome.map_err(AgregError::from)?;
            return check_status(operation, response).await;
        }
    }
}

async fn check_status(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(AgregError::Authentication(format!("{} rejected: HTTP {}", operation, status)).into());
    }
    Err(AgregError::Remote(format!("{} failed: HTTP {}: {}", operation, status, body)).into())
}

#[async_trait]
impl RemoteBlobStore for DriveClient {
    async fn find(&self, token: &str, name: &str) -> Result<Option<RemoteFile>> {
        let url = self.files_url();
        let response = self
            .send_with_retry("list", || {
                Ok(self
                    .http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("spaces", APP_DATA_FOLDER)]))
            })
            .await?;

        let list: FileList = response
            .json()
            .await
            .map_err(|e| AgregError::Remote(format!("malformed file list: {}", e)))?;
        Ok(list.files.into_iter().find(|f| f.name == name))
    }

    async fn download(&self, token: &str, file_id: &str) -> Result<String> {
        let url = format!("{}/{}", self.files_url(), file_id);
        let response = self
            .send_with_retry("download", || {
                Ok(self
                    .http
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("alt", "media")]))
            })
            .await?;
        Ok(response.text().await.map_err(AgregError::from)?)
    }

    async fn create(&self, token: &str, name: &str, content: &str) -> Result<RemoteFile> {
        let url = self.upload_url(None);
        let metadata = serde_json::json!({ "name": name, "parents": [APP_DATA_FOLDER] });
        let response = self
            .send_with_retry("create", || {
                Ok(self
                    .http
                    .post(&url)
                    .bearer_auth(token)
                    .query(&[("uploadType", "multipart")])
                    .multipart(Self::upload_form(&metadata, content)?))
            })
            .await?;

        let file: RemoteFile = response
            .json()
            .await
            .map_err(|e| AgregError::Remote(format!("malformed create response: {}", e)))?;
        tracing::info!(file_id = %file.id, "Remote backup created");
        Ok(file)
    }

    async fn update(
        &self,
        token: &str,
        file_id: &str,
        name: &str,
        content: &str,
    ) -> Result<RemoteFile> {
        let url = self.upload_url(Some(file_id));
        let metadata = serde_json::json!({ "name": name });
        let response = self
            .send_with_retry("update", || {
                Ok(self
                    .http
                    .patch(&url)
                    .bearer_auth(token)
                    .query(&[("uploadType", "multipart")])
                    .multipart(Self::upload_form(&metadata, content)?))
            })
            .await?;

        let file: RemoteFile = response
            .json()
            .await
            .map_err(|e| AgregError::Remote(format!("malformed update response: {}", e)))?;
        tracing::info!(file_id = %file.id, "Remote backup updated");
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_trim_trailing_slash() {
        let config = RemoteConfig {
            api_base: "http://localhost:9000/".to_string(),
            ..RemoteConfig::default()
        };
        let client = DriveClient::new(&config).unwrap();
        assert_eq!(client.files_url(), "http://localhost:9000/drive/v3/files");
        assert_eq!(
            client.upload_url(Some("abc")),
            "http://localhost:9000/upload/drive/v3/files/abc"
        );
        assert_eq!(
            client.upload_url(None),
            "http://localhost:9000/upload/drive/v3/files"
        );
    }

    #[test]
    fn test_file_list_tolerates_missing_files() {
        let list: FileList = serde_json::from_str("{}").unwrap();
        assert!(list.files.is_empty());
    }

    #[test]
    fn test_upload_form_builds() {
        let metadata = serde_json::json!({ "name": "x.json" });
        assert!(DriveClient::upload_form(&metadata, "{}").is_ok());
    }
}
