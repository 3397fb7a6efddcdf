//! Request/response protocol between capture contexts and the background
//! service
//!
//! Requests are a closed set tagged by `action`:
//!
//! ```json
//! {"action": "capture", "page": {"url": "...", "title": "...", "llm": "..."}}
//! {"action": "save_conversation", "data": {...}}
//! {"action": "sync"}
//! ```
//!
//! Every request is answered, even a malformed one. Failures travel in the
//! `error` field of the response instead of being raised to the sender.

use crate::error::Result;
use crate::model::Conversation;
use crate::normalize::{Normalizer, RawCapture};
use crate::storage::LocalStore;
use crate::sync::Synchronizer;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A message sent to the background service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    /// Normalize and store a scraped page
    Capture { page: RawCapture },
    /// Store an already-normalized record
    SaveConversation { data: Conversation },
    /// Run the synchronizer
    Sync,
}

impl Request {
    pub fn action(&self) -> &'static str {
        match self {
            Request::Capture { .. } => "capture",
            Request::SaveConversation { .. } => "save_conversation",
            Request::Sync => "sync",
        }
    }
}

/// Reply to a [`Request`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Data {
        data: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Response {
    pub fn ok() -> Self {
        Response::Ack {
            success: true,
            error: None,
        }
    }

    pub fn data<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(data) => Response::Data { data, error: None },
            Err(e) => Response::failure(e),
        }
    }

    pub fn failure(error: impl std::fmt::Display) -> Self {
        Response::Ack {
            success: false,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        match self {
            Response::Ack { success, error } => *success && error.is_none(),
            Response::Data { error, .. } => error.is_none(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Response::Ack { error, .. } | Response::Data { error, .. } => error.as_deref(),
        }
    }
}

/// Handles requests on behalf of the add-on context
///
/// Owns the add-on store; when a synchronizer is attached, a capture is
/// followed by a best-effort reconcile into the web-app store.
pub struct BackgroundService {
    source: LocalStore,
    normalizer: Normalizer,
    synchronizer: Option<Arc<Synchronizer>>,
}

impl BackgroundService {
    pub fn new(source: LocalStore, normalizer: Normalizer) -> Self {
        Self {
            source,
            normalizer,
            synchronizer: None,
        }
    }

    pub fn with_synchronizer(mut self, synchronizer: Arc<Synchronizer>) -> Self {
        self.synchronizer = Some(synchronizer);
        self
    }

    pub fn source(&self) -> &LocalStore {
        &self.source
    }

    /// Dispatches a request and always produces a response
    pub async fn handle(&self, request: Request) -> Response {
        let action = request.action();
        let result = match request {
            Request::Capture { page } => self.capture(page).await,
            Request::SaveConversation { data } => self.save(data).await,
            Request::Sync => self.sync().await,
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(action = action, error = %e, "Request failed");
                Response::failure(format!("{:#}", e))
            }
        }
    }

    /// Parses a JSON request, handles it and serializes the response
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::messaging::BackgroundService;
    /// use agregllm::normalize::Normalizer;
    /// use agregllm::storage::LocalStore;
    ///
    /// # tokio_test::block_on(async {
    /// let service = BackgroundService::new(LocalStore::in_memory("addon"), Normalizer::default());
    /// let reply = service.handle_json(r#"{"action":"reboot"}"#).await;
    /// assert!(reply.contains("\"success\":false"));
    /// # });
    /// ```
    pub async fn handle_json(&self, json: &str) -> String {
        let response = match serde_json::from_str::<Request>(json) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                tracing::debug!(error = %e, "Rejected malformed request");
                Response::failure(format!("malformed request: {}", e))
            }
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            format!(r#"{{"success":false,"error":"unserializable response: {}"}}"#, e)
        })
    }

    async fn capture(&self, page: RawCapture) -> Result<Response> {
        let record = self.normalizer.normalize(page, Utc::now())?;
        let stored = self.source.upsert_by_url(record).await?;
        tracing::info!(url = %stored.url, llm = %stored.llm_source, "Captured conversation");

        if let Some(synchronizer) = &self.synchronizer {
            if let Err(e) = synchronizer.reconcile().await {
                tracing::warn!(error = %e, "Post-capture reconcile failed, next sync will retry");
            }
        }
        Ok(Response::data(&stored))
    }

    async fn save(&self, data: Conversation) -> Result<Response> {
        let stored = self.source.upsert_by_url(data).await?;
        tracing::debug!(id = %stored.id, "Saved conversation");
        Ok(Response::ok())
    }

    async fn sync(&self) -> Result<Response> {
        match &self.synchronizer {
            Some(synchronizer) => {
                let report = synchronizer.run().await?;
                Ok(Response::data(&report))
            }
            None => Ok(Response::failure("no synchronization target configured")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CaptureConfig, CaptureMode};

    fn service() -> BackgroundService {
        BackgroundService::new(LocalStore::in_memory("addon"), Normalizer::default())
    }

    fn page(url: &str) -> RawCapture {
        RawCapture {
            url: url.to_string(),
            host: Some("chatgpt.com".to_string()),
            title: "ChatGPT".to_string(),
            ..RawCapture::default()
        }
    }

    #[test]
    fn test_request_tagging() {
        let request: Request = serde_json::from_str(r#"{"action":"sync"}"#).unwrap();
        assert_eq!(request, Request::Sync);

        let request: Request =
            serde_json::from_str(r#"{"action":"capture","page":{"url":"https://x"}}"#).unwrap();
        assert_eq!(request.action(), "capture");
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        assert!(serde_json::from_str::<Request>(r#"{"action":"delete_all"}"#).is_err());
    }

    #[test]
    fn test_response_shapes() {
        assert_eq!(
            serde_json::to_string(&Response::ok()).unwrap(),
            r#"{"success":true}"#
        );
        assert_eq!(
            serde_json::to_string(&Response::failure("boom")).unwrap(),
            r#"{"success":false,"error":"boom"}"#
        );
        let data = Response::data(&vec![1, 2]);
        assert_eq!(serde_json::to_string(&data).unwrap(), r#"{"data":[1,2]}"#);
        assert!(data.is_success());
    }

    #[tokio::test]
    async fn test_capture_stores_record() {
        let service = service();
        let response = service
            .handle(Request::Capture {
                page: page("https://chatgpt.com/c/1"),
            })
            .await;
        assert!(response.is_success());

        let stored = service.source().get_all().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].llm_source, "ChatGPT");
    }

    #[tokio::test]
    async fn test_recapture_keeps_single_record() {
        let service = service();
        for _ in 0..2 {
            service
                .handle(Request::Capture {
                    page: page("https://chatgpt.com/c/1"),
                })
                .await;
        }
        assert_eq!(service.source().get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_capture_without_url_reports_error() {
        let response = service()
            .handle(Request::Capture {
                page: RawCapture::default(),
            })
            .await;
        assert!(!response.is_success());
        assert!(response.error().is_some());
    }

    #[tokio::test]
    async fn test_capture_reconciles_into_target() {
        let source = LocalStore::in_memory("addon");
        let target = LocalStore::in_memory("webapp");
        let synchronizer = Arc::new(Synchronizer::new(source.clone(), target.clone()));
        let normalizer = Normalizer::new(CaptureConfig {
            mode: CaptureMode::Full,
            ..CaptureConfig::default()
        });
        let service = BackgroundService::new(source, normalizer).with_synchronizer(synchronizer);

        service
            .handle(Request::Capture {
                page: page("https://chatgpt.com/c/2"),
            })
            .await;
        assert_eq!(target.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sync_without_target_fails_softly() {
        let response = service().handle(Request::Sync).await;
        assert_eq!(
            response.error(),
            Some("no synchronization target configured")
        );
    }

    #[tokio::test]
    async fn test_handle_json_malformed() {
        let reply = service().handle_json("not json").await;
        assert!(reply.starts_with(r#"{"success":false,"error":"malformed request"#));
    }
}
