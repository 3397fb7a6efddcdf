//! Export and import of a whole store as one JSON document
//!
//! The same document is used for file backups and as the body of the remote
//! backup blob.

use super::LocalStore;
use crate::error::{AgregError, Result};
use crate::model::{Conversation, Folder};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Document format version written by this crate
pub const EXPORT_VERSION: u32 = 1;

/// Snapshot of a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    #[serde(default)]
    pub folders: Vec<Folder>,
}

impl ExportDocument {
    pub fn new(conversations: Vec<Conversation>, folders: Vec<Folder>) -> Self {
        Self {
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
            conversations,
            folders,
        }
    }
}

/// Accepted import payloads; early backups were a bare record array
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportPayload {
    Document(ExportDocument),
    Records(Vec<Conversation>),
}

/// Outcome of merging a batch of records into a store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Folders added or changed
    pub folders: usize,
}

/// Parses an export document, rejecting unsupported versions
///
/// # Errors
///
/// Returns `AgregError::Import` for malformed JSON or an unknown version
pub fn parse_document(json: &str) -> Result<ExportDocument> {
    let payload: ImportPayload = serde_json::from_str(json)
        .map_err(|e| AgregError::Import(format!("malformed export document: {}", e)))?;

    match payload {
        ImportPayload::Document(doc) if doc.version == EXPORT_VERSION => Ok(doc),
        ImportPayload::Document(doc) => Err(AgregError::Import(format!(
            "unsupported export version {}",
            doc.version
        ))
        .into()),
        ImportPayload::Records(conversations) => Ok(ExportDocument::new(conversations, Vec::new())),
    }
}

impl LocalStore {
    /// Snapshot of all records and folders
    pub async fn export_document(&self) -> Result<ExportDocument> {
        Ok(ExportDocument::new(
            self.get_all().await?,
            self.get_all_folders().await?,
        ))
    }

    /// Pretty-printed export document
    pub async fn export_json(&self) -> Result<String> {
        let doc = self.export_document().await?;
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Merges a document into the store by id; incoming records win
    pub async fn import_document(&self, doc: &ExportDocument) -> Result<ImportSummary> {
        let mut summary = self.merge_by_id(&doc.conversations).await?;
        summary.folders = self.merge_folders(&doc.folders).await?;
        tracing::info!(
            context = %self.context(),
            added = summary.added,
            updated = summary.updated,
            folders = summary.folders,
            "Import completed"
        );
        Ok(summary)
    }

    /// Parses and merges an export document
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::storage::LocalStore;
    ///
    /// # tokio_test::block_on(async {
    /// let store = LocalStore::in_memory("webapp");
    /// let json = r#"{"version":1,"exportedAt":"2025-01-01T00:00:00Z","conversations":[]}"#;
    /// let summary = store.import_json(json).await.unwrap();
    /// assert_eq!(summary.added, 0);
    /// assert!(store.import_json(r#"{"version":7,"exportedAt":"2025-01-01T00:00:00Z"}"#).await.is_err());
    /// # });
    /// ```
    pub async fn import_json(&self, json: &str) -> Result<ImportSummary> {
        let doc = parse_document(json)?;
        self.import_document(&doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_wire_shape() {
        let doc = ExportDocument::new(Vec::new(), Vec::new());
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["version"], 1);
        assert!(value["exportedAt"].is_string());
        assert!(value["conversations"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_document("not json").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgregError>(),
            Some(AgregError::Import(_))
        ));
    }

    #[test]
    fn test_parse_accepts_bare_record_array() {
        let json = r#"[{"id":"1","title":"T","url":"https://x","llm":"Claude"}]"#;
        let doc = parse_document(json).unwrap();
        assert_eq!(doc.conversations.len(), 1);
        assert!(doc.folders.is_empty());
    }

    #[tokio::test]
    async fn test_import_merges_by_id_with_incoming_winning() {
        let store = LocalStore::in_memory("test");
        let mut local = Conversation::new("https://a", "Local title", "Claude");
        local.id = "shared".to_string();
        store.upsert_by_id(local.clone()).await.unwrap();

        let mut incoming = local.clone();
        incoming.title = "Remote title".to_string();
        let mut folder = Folder::new("Work", None);
        folder.id = "f1".to_string();
        let doc = ExportDocument::new(
            vec![incoming, Conversation::new("https://b", "B", "Claude")],
            vec![folder],
        );

        let summary = store.import_document(&doc).await.unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.folders, 1);
        assert_eq!(
            store.get_by_id("shared").await.unwrap().unwrap().title,
            "Remote title"
        );
    }
}
