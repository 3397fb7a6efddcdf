//! Source to target synchronization
//!
//! The add-on store (source) is authoritative for captured content; the
//! web-app store (target) is authoritative for organization (tags, folders,
//! favorites). Reconciliation matches records by url and never infers
//! deletions. Deletions made in the target travel back to the source through
//! persisted tombstones, which only cover captures made before the deletion.

pub mod metrics;

use crate::error::Result;
use crate::model::{new_record_id, Conversation, Tombstone};
use crate::storage::LocalStore;
use self::metrics::SyncMetrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::{broadcast, Mutex};

/// Capacity of the notification channel
const EVENT_CAPACITY: usize = 32;

/// Cross-context notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The target store was changed by a reconciliation
    SyncComplete { added: usize, updated: usize },
    /// Pending deletions were applied to the source store
    DeletesPropagated { count: usize },
}

/// Per-record decisions of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_tombstoned: usize,
}

impl ReconcileOutcome {
    pub fn changed(&self) -> bool {
        self.added > 0 || self.updated > 0
    }
}

/// Result of a synchronizer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_tombstoned: usize,
    /// Tombstones applied to the source during this run
    pub deletions_propagated: usize,
    /// Tombstones that stay pending after a failed source delete
    pub deletions_pending: usize,
    /// Whether the target collection was written
    pub wrote: bool,
}

/// Merges `source` into `target` by url
///
/// New urls are appended as fresh untagged records. Existing ones keep the
/// target's id, tags, folder and favorite flag and are replaced only when
/// their message lists differ. Records whose url is in `tombstoned` are
/// skipped unless they were captured after the deletion time.
///
/// # Examples
///
/// ```
/// use agregllm::model::Conversation;
/// use agregllm::sync::reconcile_records;
/// use std::collections::HashMap;
///
/// let mut captured = Conversation::new("https://claude.ai/chat/1", "T", "Claude");
/// captured.tags = vec!["draft".into()];
/// let mut target = Vec::new();
///
/// let outcome = reconcile_records(&[captured.clone()], &mut target, &HashMap::new());
/// assert_eq!(outcome.added, 1);
/// assert!(target[0].tags.is_empty());
/// assert_ne!(target[0].id, captured.id);
///
/// let again = reconcile_records(&[captured], &mut target, &HashMap::new());
/// assert_eq!(again.unchanged, 1);
/// ```
pub fn reconcile_records(
    source: &[Conversation],
    target: &mut Vec<Conversation>,
    tombstoned: &HashMap<String, DateTime<Utc>>,
) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();

    for record in source {
        let deleted_after_capture = tombstoned
            .get(&record.url)
            .is_some_and(|deleted_at| record.captured_at <= *deleted_at);
        if deleted_after_capture {
            tracing::debug!(url = %record.url, "Skipping record with pending deletion");
            outcome.skipped_tombstoned += 1;
            continue;
        }

        match target.iter_mut().find(|t| t.url == record.url) {
            None => {
                tracing::debug!(url = %record.url, "Adding new record to target");
                target.push(Conversation {
                    id: new_record_id(),
                    title: record.title.clone(),
                    url: record.url.clone(),
                    llm_source: record.llm_source.clone(),
                    captured_at: record.captured_at,
                    date: record.date,
                    summary: record.summary.clone(),
                    messages: record.messages.clone(),
                    tags: Vec::new(),
                    folder_id: None,
                    is_favorite: false,
                });
                outcome.added += 1;
            }
            Some(existing) if existing.messages != record.messages => {
                tracing::debug!(url = %record.url, "Updating record content in target");
                *existing = Conversation {
                    id: existing.id.clone(),
                    title: record.title.clone(),
                    url: record.url.clone(),
                    llm_source: record.llm_source.clone(),
                    captured_at: record.captured_at,
                    date: record.date,
                    summary: record.summary.clone(),
                    messages: record.messages.clone(),
                    tags: existing.tags.clone(),
                    folder_id: existing.folder_id.clone(),
                    is_favorite: existing.is_favorite,
                };
                outcome.updated += 1;
            }
            Some(_) => outcome.unchanged += 1,
        }
    }

    outcome
}

/// Moves records between the add-on store and the web-app store
///
/// Runs within one process are serialized; completion is announced on a
/// broadcast channel that anyone may subscribe to.
pub struct Synchronizer {
    source: LocalStore,
    target: LocalStore,
    events: broadcast::Sender<SyncEvent>,
    run_lock: Mutex<()>,
}

impl Synchronizer {
    pub fn new(source: LocalStore, target: LocalStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            target,
            events,
            run_lock: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &LocalStore {
        &self.source
    }

    pub fn target(&self) -> &LocalStore {
        &self.target
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Copies new and changed source records into the target
    ///
    /// Writes and notifies only when something was added or changed.
    pub async fn reconcile(&self) -> Result<SyncReport> {
        let _guard = self.run_lock.lock().await;
        self.reconcile_locked().await
    }

    async fn reconcile_locked(&self) -> Result<SyncReport> {
        let metrics = SyncMetrics::new("reconcile");

        let result = self.reconcile_inner().await;
        match &result {
            Ok(report) => metrics.record_completion(report.added, report.updated, 0),
            Err(_) => metrics.record_error("reconcile"),
        }
        result
    }

    async fn reconcile_inner(&self) -> Result<SyncReport> {
        let source_records = self.source.get_all().await?;
        if source_records.is_empty() {
            tracing::debug!("Source store is empty, nothing to reconcile");
            return Ok(SyncReport::default());
        }

        let tombstoned: HashMap<String, DateTime<Utc>> = self
            .target
            .get_tombstones()
            .await?
            .into_iter()
            .map(|t| (t.url, t.deleted_at))
            .collect();

        let outcome = self
            .target
            .update_conversations(|target| {
                Ok(reconcile_records(&source_records, target, &tombstoned))
            })
            .await?;

        let report = SyncReport {
            added: outcome.added,
            updated: outcome.updated,
            unchanged: outcome.unchanged,
            skipped_tombstoned: outcome.skipped_tombstoned,
            wrote: outcome.changed(),
            ..SyncReport::default()
        };

        if report.wrote {
            tracing::info!(
                added = report.added,
                updated = report.updated,
                "Synchronization complete"
            );
            self.notify(SyncEvent::SyncComplete {
                added: report.added,
                updated: report.updated,
            });
        } else {
            tracing::debug!(unchanged = report.unchanged, "Target already up to date");
        }

        Ok(report)
    }

    /// Deletes a record from the target and queues the deletion for the
    /// source
    ///
    /// # Returns
    ///
    /// Returns the deleted record, or `None` when the id was unknown
    pub async fn delete_from_target(&self, id: &str) -> Result<Option<Conversation>> {
        let Some(record) = self.target.get_by_id(id).await? else {
            return Ok(None);
        };

        self.target
            .add_tombstone(Tombstone::for_record(&record))
            .await?;
        let removed = self.target.delete_by_id(id).await?;
        tracing::info!(url = %record.url, "Deleted record, deletion queued for source");
        Ok(removed)
    }

    /// Applies every pending tombstone to the source store
    ///
    /// Only source records captured before the deletion are removed; a
    /// later capture of the same url survives and the tombstone is dropped.
    /// A tombstone is cleared only after the source accepted the delete;
    /// failures are logged and left for the next run.
    ///
    /// # Returns
    ///
    /// Returns `(applied, still_pending)`
    pub async fn propagate_deletes(&self) -> Result<(usize, usize)> {
        let tombstones = self.target.get_tombstones().await?;
        let mut applied = 0;
        let mut pending = 0;

        for tombstone in tombstones {
            let deleted = self
                .source
                .delete_by_url_captured_before(&tombstone.url, tombstone.deleted_at)
                .await;
            match deleted {
                Ok(_) => match self.target.clear_tombstone(&tombstone.url).await {
                    Ok(()) => applied += 1,
                    Err(e) => {
                        tracing::warn!(url = %tombstone.url, error = %e, "Failed to clear tombstone");
                        pending += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        url = %tombstone.url,
                        error = %e,
                        "Failed to apply deletion to source, will retry"
                    );
                    pending += 1;
                }
            }
        }

        if applied > 0 {
            tracing::info!(count = applied, "Deletions propagated to source");
            self.notify(SyncEvent::DeletesPropagated { count: applied });
        }
        Ok((applied, pending))
    }

    /// Full run: propagate pending deletions, then reconcile
    pub async fn run(&self) -> Result<SyncReport> {
        let _guard = self.run_lock.lock().await;
        let metrics = SyncMetrics::new("run");

        let result = async {
            let (applied, pending) = self.propagate_deletes().await?;
            let mut report = self.reconcile_inner().await?;
            report.deletions_propagated = applied;
            report.deletions_pending = pending;
            Ok::<_, anyhow::Error>(report)
        }
        .await;

        match &result {
            Ok(report) => {
                metrics.record_completion(report.added, report.updated, report.deletions_propagated)
            }
            Err(_) => metrics.record_error("run"),
        }
        result
    }
}
