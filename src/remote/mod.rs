//! Remote backup synchronization
//!
//! A sync is always pull-then-push: the remote snapshot is merged into the
//! local store by id (remote wins), then the merged local store is uploaded
//! as the new snapshot (last writer wins). Without a usable token the sync is
//! reported as unavailable rather than failing.

pub mod auth;
pub mod drive;

pub use auth::{AccessToken, AuthState, TokenCache};
pub use drive::{DriveClient, RemoteBlobStore, RemoteFile};

use crate::config::RemoteConfig;
use crate::error::{AgregError, Result};
use crate::storage::{transfer, ImportSummary, LocalStore};
use crate::sync::metrics::SyncMetrics;
use serde::Serialize;
use std::sync::Arc;

/// What a remote sync did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoteSyncOutcome {
    /// No valid token; nothing was attempted
    Unavailable,
    Completed {
        /// Merge result of the pulled snapshot, absent when none existed
        pulled: Option<ImportSummary>,
        /// Whether the push created the remote file
        created: bool,
        /// Records in the pushed snapshot
        pushed: usize,
    },
}

/// Pull-then-push synchronizer against a [`RemoteBlobStore`]
pub struct RemoteSync {
    client: Arc<dyn RemoteBlobStore>,
    tokens: TokenCache,
    file_name: String,
}

impl RemoteSync {
    pub fn new(
        client: Arc<dyn RemoteBlobStore>,
        tokens: TokenCache,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            file_name: file_name.into(),
        }
    }

    /// Builds a Drive-backed synchronizer whose token lives in `store`
    pub fn from_config(config: &RemoteConfig, store: &LocalStore) -> Result<Self> {
        let client = DriveClient::new(config)?;
        Ok(Self::new(
            Arc::new(client),
            TokenCache::new(store.backend()),
            config.file_name.clone(),
        ))
    }

    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Pulls the remote snapshot into `local`, then pushes `local` back
    ///
    /// # Errors
    ///
    /// Remote failures are returned as errors after the local store has been
    /// left intact. An authentication failure also expires the cached token.
    pub async fn sync_now(&self, local: &LocalStore) -> Result<RemoteSyncOutcome> {
        let Some(token) = self.tokens.valid_token().await? else {
            tracing::info!("Remote sync unavailable: not signed in or token expired");
            return Ok(RemoteSyncOutcome::Unavailable);
        };

        let metrics = SyncMetrics::new("remote");
        match self.pull_then_push(&token, local).await {
            Ok(outcome) => {
                if let RemoteSyncOutcome::Completed { pulled, .. } = &outcome {
                    let pulled = pulled.unwrap_or_default();
                    metrics.record_completion(pulled.added, pulled.updated, 0);
                }
                Ok(outcome)
            }
            Err(e) => {
                let auth_failure = matches!(
                    e.downcast_ref::<AgregError>(),
                    Some(AgregError::Authentication(_))
                );
                if auth_failure {
                    metrics.record_error("authentication");
                    self.tokens.mark_expired().await?;
                } else {
                    metrics.record_error("remote");
                }
                Err(e)
            }
        }
    }

    async fn pull_then_push(&self, token: &str, local: &LocalStore) -> Result<RemoteSyncOutcome> {
        let existing = self.client.find(token, &self.file_name).await?;

        let pulled = match &existing {
            Some(file) => {
                let body = self.client.download(token, &file.id).await?;
                let doc = transfer::parse_document(&body)?;
                let summary = local.import_document(&doc).await?;
                tracing::info!(
                    added = summary.added,
                    updated = summary.updated,
                    "Pulled remote snapshot"
                );
                Some(summary)
            }
            None => {
                tracing::debug!("No remote snapshot yet");
                None
            }
        };

        let snapshot = local.export_document().await?;
        let pushed = snapshot.conversations.len();
        let body = serde_json::to_string(&snapshot)?;
        let created = match &existing {
            Some(file) => {
                self.client
                    .update(token, &file.id, &self.file_name, &body)
                    .await?;
                false
            }
            None => {
                self.client.create(token, &self.file_name, &body).await?;
                true
            }
        };

        tracing::info!(pushed = pushed, created = created, "Remote sync complete");
        Ok(RemoteSyncOutcome::Completed {
            pulled,
            created,
            pushed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Conversation;
    use crate::storage::{ExportDocument, MemoryBackend};
    use async_trait::async_trait;
    use chrono::Duration;
    use tokio::sync::Mutex;

    /// In-process blob store recording the order of calls
    #[derive(Default)]
    struct FakeBlobStore {
        file: Mutex<Option<(RemoteFile, String)>>,
        calls: Mutex<Vec<&'static str>>,
        reject_auth: bool,
    }

    #[async_trait]
    impl RemoteBlobStore for FakeBlobStore {
        async fn find(&self, _token: &str, name: &str) -> Result<Option<RemoteFile>> {
            self.calls.lock().await.push("find");
            if self.reject_auth {
                return Err(AgregError::Authentication("HTTP 401".into()).into());
            }
            Ok(self
                .file
                .lock()
                .await
                .as_ref()
                .filter(|(f, _)| f.name == name)
                .map(|(f, _)| f.clone()))
        }

        async fn download(&self, _token: &str, _file_id: &str) -> Result<String> {
            self.calls.lock().await.push("download");
            Ok(self
                .file
                .lock()
                .await
                .as_ref()
                .map(|(_, body)| body.clone())
                .unwrap_or_default())
        }

        async fn create(&self, _token: &str, name: &str, content: &str) -> Result<RemoteFile> {
            self.calls.lock().await.push("create");
            let file = RemoteFile {
                id: "file-1".to_string(),
                name: name.to_string(),
            };
            *self.file.lock().await = Some((file.clone(), content.to_string()));
            Ok(file)
        }

        async fn update(
            &self,
            _token: &str,
            file_id: &str,
            name: &str,
            content: &str,
        ) -> Result<RemoteFile> {
            self.calls.lock().await.push("update");
            let file = RemoteFile {
                id: file_id.to_string(),
                name: name.to_string(),
            };
            *self.file.lock().await = Some((file.clone(), content.to_string()));
            Ok(file)
        }
    }

    async fn signed_in(client: Arc<FakeBlobStore>) -> RemoteSync {
        let tokens = TokenCache::new(Arc::new(MemoryBackend::new()));
        tokens
            .authenticate(AccessToken::new("tok", Duration::hours(1)))
            .await
            .unwrap();
        RemoteSync::new(client, tokens, "agregllm_backup.json")
    }

    #[tokio::test]
    async fn test_unavailable_without_token() {
        let client = Arc::new(FakeBlobStore::default());
        let sync = RemoteSync::new(
            client.clone(),
            TokenCache::new(Arc::new(MemoryBackend::new())),
            "agregllm_backup.json",
        );
        let outcome = sync.sync_now(&LocalStore::in_memory("webapp")).await.unwrap();
        assert_eq!(outcome, RemoteSyncOutcome::Unavailable);
        assert!(client.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_first_sync_creates_file() {
        let client = Arc::new(FakeBlobStore::default());
        let sync = signed_in(client.clone()).await;
        let local = LocalStore::in_memory("webapp");
        local
            .upsert_by_id(Conversation::new("https://a", "A", "Claude"))
            .await
            .unwrap();

        let outcome = sync.sync_now(&local).await.unwrap();
        assert_eq!(
            outcome,
            RemoteSyncOutcome::Completed {
                pulled: None,
                created: true,
                pushed: 1
            }
        );
        assert_eq!(*client.calls.lock().await, vec!["find", "create"]);
    }

    #[tokio::test]
    async fn test_existing_file_is_pulled_before_update() {
        let remote_record = Conversation::new("https://remote", "R", "Gemini");
        let doc = ExportDocument::new(vec![remote_record.clone()], Vec::new());
        let client = Arc::new(FakeBlobStore {
            file: Mutex::new(Some((
                RemoteFile {
                    id: "file-9".to_string(),
                    name: "agregllm_backup.json".to_string(),
                },
                serde_json::to_string(&doc).unwrap(),
            ))),
            ..FakeBlobStore::default()
        });
        let sync = signed_in(client.clone()).await;
        let local = LocalStore::in_memory("webapp");

        let outcome = sync.sync_now(&local).await.unwrap();
        match outcome {
            RemoteSyncOutcome::Completed {
                pulled, created, ..
            } => {
                assert_eq!(pulled.map(|p| p.added), Some(1));
                assert!(!created);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            *client.calls.lock().await,
            vec!["find", "download", "update"]
        );
        assert!(local.get_by_id(&remote_record.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_auth_failure_expires_token() {
        let client = Arc::new(FakeBlobStore {
            reject_auth: true,
            ..FakeBlobStore::default()
        });
        let sync = signed_in(client).await;
        assert!(sync.sync_now(&LocalStore::in_memory("webapp")).await.is_err());
        assert_eq!(sync.tokens().state().await.unwrap(), AuthState::Expired);
    }
}
