//! Local store for conversation records
//!
//! Each runtime context (the capture add-on and the web app) owns one
//! [`LocalStore`]. Collections are stored as whole JSON arrays under fixed
//! keys and every write is a read-modify-write guarded by a version check.

pub mod backend;
pub mod sqlite;
pub mod transfer;

pub use backend::{KeyValueBackend, MemoryBackend, VersionedValue};
pub use sqlite::SqliteBackend;
pub use transfer::{ExportDocument, ImportSummary};

use chrono::{DateTime, Utc};
use crate::error::{AgregError, Result};
use crate::index::{self, FolderTree};
use crate::model::{new_record_id, normalize_tags, Conversation, Folder, Tombstone};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Key of the conversation collection
pub const CONVERSATIONS_KEY: &str = "agregllm_conversations";
/// Key of the folder collection
pub const FOLDERS_KEY: &str = "agregllm_folders";
/// Key of the pending deletion markers
pub const TOMBSTONES_KEY: &str = "agregllm_tombstones";

/// Default number of compare-and-swap attempts per write
pub const DEFAULT_MAX_WRITE_ATTEMPTS: usize = 5;

/// Record store of one runtime context
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueBackend>,
    context: String,
    max_write_attempts: usize,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("context", &self.context)
            .field("max_write_attempts", &self.max_write_attempts)
            .finish()
    }
}

impl LocalStore {
    /// Creates a store over an existing backend
    ///
    /// # Arguments
    ///
    /// * `backend` - Versioned key-value backend
    /// * `context` - Name of the owning context, used in log fields
    pub fn new(backend: Arc<dyn KeyValueBackend>, context: impl Into<String>) -> Self {
        Self {
            backend,
            context: context.into(),
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }

    /// Creates a store over a fresh in-memory backend
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::model::Conversation;
    /// use agregllm::storage::LocalStore;
    ///
    /// # tokio_test::block_on(async {
    /// let store = LocalStore::in_memory("webapp");
    /// store.upsert_by_id(Conversation::new("https://claude.ai/chat/1", "Hi", "Claude")).await.unwrap();
    /// assert_eq!(store.get_all().await.unwrap().len(), 1);
    /// # });
    /// ```
    pub fn in_memory(context: impl Into<String>) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), context)
    }

    /// Opens (or creates) a SQLite-backed store
    pub fn open_sqlite<P: Into<PathBuf>>(path: P, context: impl Into<String>) -> Result<Self> {
        let backend = SqliteBackend::new_with_path(path)?;
        Ok(Self::new(Arc::new(backend), context))
    }

    pub fn with_max_write_attempts(mut self, attempts: usize) -> Self {
        self.max_write_attempts = attempts.max(1);
        self
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn backend(&self) -> Arc<dyn KeyValueBackend> {
        Arc::clone(&self.backend)
    }

    /// Reads a collection; unparseable data reads as empty but keeps its
    /// version so the next write replaces it
    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<(Vec<T>, Option<u64>)> {
        let Some(stored) = self.backend.get(key).await? else {
            return Ok((Vec::new(), None));
        };
        match serde_json::from_str(&stored.value) {
            Ok(items) => Ok((items, Some(stored.version))),
            Err(e) => {
                tracing::warn!(
                    context = %self.context,
                    key = key,
                    error = %e,
                    "Stored collection is corrupt, treating as empty"
                );
                Ok((Vec::new(), Some(stored.version)))
            }
        }
    }

    /// Applies `mutate` to the collection under `key` with optimistic
    /// concurrency
    ///
    /// On a version mismatch the collection is re-read and `mutate` is run
    /// again on the fresh copy. Mutations that leave the collection unchanged
    /// are not written.
    async fn modify<T, R, F>(&self, key: &str, mut mutate: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned + Send,
        R: Send,
        F: FnMut(&mut Vec<T>) -> Result<R> + Send,
    {
        for attempt in 1..=self.max_write_attempts {
            let (mut items, version) = self.load::<T>(key).await?;
            let before = serde_json::to_string(&items)?;
            let outcome = mutate(&mut items)?;
            let after = serde_json::to_string(&items)?;

            if before == after {
                tracing::debug!(context = %self.context, key = key, "No changes to write");
                return Ok(outcome);
            }

            match self.backend.compare_and_swap(key, version, after).await? {
                Some(new_version) => {
                    tracing::debug!(
                        context = %self.context,
                        key = key,
                        version = new_version,
                        "Collection written"
                    );
                    return Ok(outcome);
                }
                None => {
                    tracing::warn!(
                        context = %self.context,
                        key = key,
                        attempt = attempt,
                        "Concurrent write detected, retrying"
                    );
                }
            }
        }

        Err(AgregError::WriteConflict {
            key: key.to_string(),
            attempts: self.max_write_attempts,
        }
        .into())
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    /// All records in stored order
    pub async fn get_all(&self) -> Result<Vec<Conversation>> {
        Ok(self.load(CONVERSATIONS_KEY).await?.0)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.get_all().await?.into_iter().find(|c| c.id == id))
    }

    pub async fn get_by_url(&self, url: &str) -> Result<Option<Conversation>> {
        Ok(self.get_all().await?.into_iter().find(|c| c.url == url))
    }

    /// Runs an arbitrary mutation over the conversation collection
    ///
    /// Used by the synchronizer so reconciliation happens inside the same
    /// compare-and-swap loop as the write.
    pub async fn update_conversations<R, F>(&self, mutate: F) -> Result<R>
    where
        R: Send,
        F: FnMut(&mut Vec<Conversation>) -> Result<R> + Send,
    {
        self.modify(CONVERSATIONS_KEY, mutate).await
    }

    /// Replaces the record with the same id, or appends it
    pub async fn upsert_by_id(&self, record: Conversation) -> Result<()> {
        self.modify(CONVERSATIONS_KEY, |items: &mut Vec<Conversation>| {
            match items.iter_mut().find(|c| c.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => items.push(record.clone()),
            }
            Ok(())
        })
        .await
    }

    /// Saves a captured record using its url as identity
    ///
    /// An existing record with the same url keeps its id and folder, and its
    /// tags unless the incoming record carries tags. New records get a fresh
    /// id.
    ///
    /// # Returns
    ///
    /// Returns the record as stored
    pub async fn upsert_by_url(&self, record: Conversation) -> Result<Conversation> {
        let fresh_id = new_record_id();
        self.modify(CONVERSATIONS_KEY, |items: &mut Vec<Conversation>| {
            let mut incoming = record.clone();
            match items.iter_mut().find(|c| c.url == incoming.url) {
                Some(existing) => {
                    incoming.id = existing.id.clone();
                    incoming.folder_id = existing.folder_id.clone();
                    if incoming.tags.is_empty() {
                        incoming.tags = existing.tags.clone();
                    }
                    *existing = incoming.clone();
                }
                None => {
                    incoming.id = fresh_id.clone();
                    items.push(incoming.clone());
                }
            }
            Ok(incoming)
        })
        .await
    }

    /// Removes the record with `id`, returning it when present
    pub async fn delete_by_id(&self, id: &str) -> Result<Option<Conversation>> {
        self.modify(CONVERSATIONS_KEY, |items: &mut Vec<Conversation>| {
            Ok(items
                .iter()
                .position(|c| c.id == id)
                .map(|pos| items.remove(pos)))
        })
        .await
    }

    /// Removes every record with `url`; deleting a missing url is a no-op
    pub async fn delete_by_url(&self, url: &str) -> Result<usize> {
        self.modify(CONVERSATIONS_KEY, |items: &mut Vec<Conversation>| {
            let before = items.len();
            items.retain(|c| c.url != url);
            Ok(before - items.len())
        })
        .await
    }

    /// Removes records with `url` captured at or before `cutoff`
    ///
    /// A later capture of the same url is kept.
    pub async fn delete_by_url_captured_before(
        &self,
        url: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize> {
        self.modify(CONVERSATIONS_KEY, |items: &mut Vec<Conversation>| {
            let before = items.len();
            items.retain(|c| c.url != url || c.captured_at > cutoff);
            Ok(before - items.len())
        })
        .await
    }

    async fn update_record<F>(&self, id: &str, mut edit: F) -> Result<Conversation>
    where
        F: FnMut(&mut Conversation) + Send,
    {
        self.modify(CONVERSATIONS_KEY, |items: &mut Vec<Conversation>| {
            let record = items
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| AgregError::NotFound(format!("conversation {}", id)))?;
            edit(record);
            Ok(record.clone())
        })
        .await
    }

    /// Replaces a record's tags with their normalized form
    pub async fn update_tags(&self, id: &str, tags: &[String]) -> Result<Conversation> {
        let tags = normalize_tags(tags);
        self.update_record(id, |record| record.tags = tags.clone())
            .await
    }

    pub async fn set_favorite(&self, id: &str, favorite: bool) -> Result<Conversation> {
        self.update_record(id, |record| record.is_favorite = favorite)
            .await
    }

    /// Files a record into a folder, or unfiles it with `None`
    ///
    /// # Errors
    ///
    /// Returns `AgregError::NotFound` when the record or folder is missing
    pub async fn move_to_folder(&self, id: &str, folder_id: Option<&str>) -> Result<Conversation> {
        if let Some(folder_id) = folder_id {
            let folders = self.get_all_folders().await?;
            if !folders.iter().any(|f| f.id == folder_id) {
                return Err(AgregError::NotFound(format!("folder {}", folder_id)).into());
            }
        }
        let folder_id = folder_id.map(str::to_string);
        self.update_record(id, |record| record.folder_id = folder_id.clone())
            .await
    }

    /// Per-record upsert by id of a batch, counting adds and replacements
    pub async fn merge_by_id(&self, records: &[Conversation]) -> Result<ImportSummary> {
        self.modify(CONVERSATIONS_KEY, |items: &mut Vec<Conversation>| {
            let mut summary = ImportSummary::default();
            for record in records {
                match items.iter_mut().find(|c| c.id == record.id) {
                    Some(existing) => {
                        if existing != record {
                            *existing = record.clone();
                            summary.updated += 1;
                        } else {
                            summary.unchanged += 1;
                        }
                    }
                    None => {
                        items.push(record.clone());
                        summary.added += 1;
                    }
                }
            }
            Ok(summary)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Tags
    // -----------------------------------------------------------------------

    /// Sorted unique tags across all records
    pub async fn all_tags(&self) -> Result<Vec<String>> {
        Ok(index::all_tags(&self.get_all().await?))
    }

    /// Renames a tag everywhere, returning the number of records touched
    pub async fn rename_tag(&self, old: &str, new: &str) -> Result<usize> {
        self.modify(CONVERSATIONS_KEY, |items: &mut Vec<Conversation>| {
            Ok(index::rename_tag(items, old, new))
        })
        .await
    }

    /// Removes a tag everywhere, returning the number of records touched
    pub async fn delete_tag(&self, tag: &str) -> Result<usize> {
        self.modify(CONVERSATIONS_KEY, |items: &mut Vec<Conversation>| {
            Ok(index::delete_tag(items, tag))
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Folders
    // -----------------------------------------------------------------------

    pub async fn get_all_folders(&self) -> Result<Vec<Folder>> {
        Ok(self.load(FOLDERS_KEY).await?.0)
    }

    pub async fn folder_tree(&self) -> Result<FolderTree> {
        Ok(FolderTree::new(self.get_all_folders().await?))
    }

    /// Creates a folder, optionally under an existing parent
    pub async fn create_folder(
        &self,
        name: &str,
        parent_id: Option<&str>,
        color: Option<&str>,
    ) -> Result<Folder> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AgregError::InvalidFolderMove("folder name cannot be empty".into()).into());
        }
        let mut folder = Folder::new(name, parent_id.map(str::to_string));
        folder.color = color.map(str::to_string);

        self.modify(FOLDERS_KEY, |folders: &mut Vec<Folder>| {
            if let Some(parent) = parent_id {
                if !folders.iter().any(|f| f.id == parent) {
                    return Err(AgregError::NotFound(format!("folder {}", parent)).into());
                }
            }
            folders.push(folder.clone());
            Ok(folder.clone())
        })
        .await
    }

    /// Renames and/or recolors a folder
    pub async fn update_folder(
        &self,
        id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<Folder> {
        self.modify(FOLDERS_KEY, |folders: &mut Vec<Folder>| {
            let folder = folders
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or_else(|| AgregError::NotFound(format!("folder {}", id)))?;
            if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
                folder.name = name.to_string();
            }
            if let Some(color) = color {
                folder.color = Some(color.to_string());
            }
            Ok(folder.clone())
        })
        .await
    }

    /// Moves a folder under a new parent, or to the top level with `None`
    ///
    /// # Errors
    ///
    /// Returns `AgregError::InvalidFolderMove` when the move would make the
    /// folder its own ancestor
    pub async fn reparent_folder(&self, id: &str, new_parent: Option<&str>) -> Result<Folder> {
        self.modify(FOLDERS_KEY, |folders: &mut Vec<Folder>| {
            let tree = FolderTree::new(folders.clone());
            tree.check_move(id, new_parent)?;
            let folder = folders
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or_else(|| AgregError::NotFound(format!("folder {}", id)))?;
            folder.parent_id = new_parent.map(str::to_string);
            Ok(folder.clone())
        })
        .await
    }

    /// Deletes a folder, lifting its children to its parent and unfiling its
    /// conversations
    pub async fn delete_folder(&self, id: &str) -> Result<Folder> {
        let removed = self
            .modify(FOLDERS_KEY, |folders: &mut Vec<Folder>| {
                let mut tree = FolderTree::new(folders.clone());
                let removed = tree
                    .remove(id)
                    .ok_or_else(|| AgregError::NotFound(format!("folder {}", id)))?;
                *folders = tree.into_folders();
                Ok(removed)
            })
            .await?;

        self.modify(CONVERSATIONS_KEY, |items: &mut Vec<Conversation>| {
            for record in items.iter_mut() {
                if record.folder_id.as_deref() == Some(id) {
                    record.folder_id = None;
                }
            }
            Ok(())
        })
        .await?;

        Ok(removed)
    }

    /// Upserts folders by id, returning how many were added or changed
    pub async fn merge_folders(&self, incoming: &[Folder]) -> Result<usize> {
        self.modify(FOLDERS_KEY, |folders: &mut Vec<Folder>| {
            let mut changed = 0;
            for folder in incoming {
                match folders.iter_mut().find(|f| f.id == folder.id) {
                    Some(existing) if existing != folder => {
                        *existing = folder.clone();
                        changed += 1;
                    }
                    Some(_) => {}
                    None => {
                        folders.push(folder.clone());
                        changed += 1;
                    }
                }
            }
            Ok(changed)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Tombstones
    // -----------------------------------------------------------------------

    pub async fn get_tombstones(&self) -> Result<Vec<Tombstone>> {
        Ok(self.load(TOMBSTONES_KEY).await?.0)
    }

    /// Records a pending deletion; one tombstone per url
    pub async fn add_tombstone(&self, tombstone: Tombstone) -> Result<()> {
        self.modify(TOMBSTONES_KEY, |tombs: &mut Vec<Tombstone>| {
            if !tombs.iter().any(|t| t.url == tombstone.url) {
                tombs.push(tombstone.clone());
            }
            Ok(())
        })
        .await
    }

    /// Clears the tombstone for `url` once the deletion has been applied
    pub async fn clear_tombstone(&self, url: &str) -> Result<()> {
        self.modify(TOMBSTONES_KEY, |tombs: &mut Vec<Tombstone>| {
            tombs.retain(|t| t.url != url);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(url: &str, title: &str) -> Conversation {
        Conversation::new(url, title, "ChatGPT")
    }

    #[tokio::test]
    async fn test_empty_store_reads_empty() {
        let store = LocalStore::in_memory("test");
        assert!(store.get_all().await.unwrap().is_empty());
        assert!(store.get_by_id("x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_by_id_replaces_or_appends() {
        let store = LocalStore::in_memory("test");
        let mut record = conv("https://a", "A");
        store.upsert_by_id(record.clone()).await.unwrap();

        record.title = "A2".to_string();
        store.upsert_by_id(record.clone()).await.unwrap();
        store.upsert_by_id(conv("https://b", "B")).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "A2");
    }

    #[tokio::test]
    async fn test_upsert_by_url_keeps_identity_folder_and_tags() {
        let store = LocalStore::in_memory("test");
        let first = store.upsert_by_url(conv("https://u", "First")).await.unwrap();
        store.update_tags(&first.id, &["rust".to_string()]).await.unwrap();
        let folder = store.create_folder("Work", None, None).await.unwrap();
        store.move_to_folder(&first.id, Some(&folder.id)).await.unwrap();

        let second = store.upsert_by_url(conv("https://u", "Second")).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.tags, vec!["rust"]);
        assert_eq!(second.folder_id, Some(folder.id.clone()));

        let mut tagged = conv("https://u", "Third");
        tagged.tags = vec!["new".to_string()];
        let third = store.upsert_by_url(tagged).await.unwrap();
        assert_eq!(third.tags, vec!["new"]);

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Third");
    }

    #[tokio::test]
    async fn test_upsert_by_url_assigns_fresh_id_on_insert() {
        let store = LocalStore::in_memory("test");
        let record = conv("https://new", "N");
        let original_id = record.id.clone();
        let stored = store.upsert_by_url(record).await.unwrap();
        assert_ne!(stored.id, original_id);
        assert_eq!(store.get_by_url("https://new").await.unwrap().unwrap().id, stored.id);
    }

    #[tokio::test]
    async fn test_delete_by_id_and_url() {
        let store = LocalStore::in_memory("test");
        let a = conv("https://a", "A");
        store.upsert_by_id(a.clone()).await.unwrap();
        store.upsert_by_id(conv("https://b", "B")).await.unwrap();

        let removed = store.delete_by_id(&a.id).await.unwrap();
        assert_eq!(removed.map(|r| r.id), Some(a.id));
        assert_eq!(store.delete_by_url("https://b").await.unwrap(), 1);
        assert_eq!(store.delete_by_url("https://b").await.unwrap(), 0);
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_noop_write_keeps_version() {
        let backend = Arc::new(MemoryBackend::new());
        let store = LocalStore::new(backend.clone(), "test");
        let record = conv("https://a", "A");
        store.upsert_by_id(record.clone()).await.unwrap();
        let v1 = backend.get(CONVERSATIONS_KEY).await.unwrap().unwrap().version;

        store.upsert_by_id(record).await.unwrap();
        let v2 = backend.get(CONVERSATIONS_KEY).await.unwrap().unwrap().version;
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_corrupt_collection_reads_empty_and_is_overwritable() {
        let backend = Arc::new(MemoryBackend::new());
        backend
            .put(CONVERSATIONS_KEY, "{not json".to_string())
            .await
            .unwrap();
        let store = LocalStore::new(backend, "test");

        assert!(store.get_all().await.unwrap().is_empty());
        store.upsert_by_id(conv("https://a", "A")).await.unwrap();
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let store = LocalStore::in_memory("test");
        let err = store.set_favorite("nope", true).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgregError>(),
            Some(AgregError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_move_to_unknown_folder_is_rejected() {
        let store = LocalStore::in_memory("test");
        let a = conv("https://a", "A");
        store.upsert_by_id(a.clone()).await.unwrap();
        assert!(store.move_to_folder(&a.id, Some("ghost")).await.is_err());
        let unfiled = store.move_to_folder(&a.id, None).await.unwrap();
        assert!(unfiled.folder_id.is_none());
    }

    #[tokio::test]
    async fn test_delete_folder_lifts_children_and_unfiles() {
        let store = LocalStore::in_memory("test");
        let root = store.create_folder("Root", None, None).await.unwrap();
        let mid = store.create_folder("Mid", Some(&root.id), None).await.unwrap();
        let leaf = store.create_folder("Leaf", Some(&mid.id), None).await.unwrap();
        let a = conv("https://a", "A");
        store.upsert_by_id(a.clone()).await.unwrap();
        store.move_to_folder(&a.id, Some(&mid.id)).await.unwrap();

        store.delete_folder(&mid.id).await.unwrap();

        let folders = store.get_all_folders().await.unwrap();
        let leaf_after = folders.iter().find(|f| f.id == leaf.id).unwrap();
        assert_eq!(leaf_after.parent_id, Some(root.id.clone()));
        assert!(!folders.iter().any(|f| f.id == mid.id));
        assert!(store.get_by_id(&a.id).await.unwrap().unwrap().folder_id.is_none());
    }

    #[tokio::test]
    async fn test_reparent_folder_rejects_cycle() {
        let store = LocalStore::in_memory("test");
        let a = store.create_folder("A", None, None).await.unwrap();
        let b = store.create_folder("B", Some(&a.id), None).await.unwrap();

        let err = store.reparent_folder(&a.id, Some(&b.id)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgregError>(),
            Some(AgregError::InvalidFolderMove(_))
        ));

        let moved = store.reparent_folder(&b.id, None).await.unwrap();
        assert!(moved.parent_id.is_none());
    }

    #[tokio::test]
    async fn test_update_folder_renames_and_recolors() {
        let store = LocalStore::in_memory("test");
        let f = store.create_folder("Old", None, None).await.unwrap();
        let updated = store
            .update_folder(&f.id, Some("New"), Some("#ff0000"))
            .await
            .unwrap();
        assert_eq!(updated.name, "New");
        assert_eq!(updated.color.as_deref(), Some("#ff0000"));
    }

    #[tokio::test]
    async fn test_tag_rename_and_delete() {
        let store = LocalStore::in_memory("test");
        let mut a = conv("https://a", "A");
        a.tags = vec!["js".to_string(), "web".to_string()];
        let mut b = conv("https://b", "B");
        b.tags = vec!["javascript".to_string()];
        store.upsert_by_id(a.clone()).await.unwrap();
        store.upsert_by_id(b).await.unwrap();

        assert_eq!(store.rename_tag("js", "javascript").await.unwrap(), 1);
        assert_eq!(store.all_tags().await.unwrap(), vec!["javascript", "web"]);

        assert_eq!(store.delete_tag("web").await.unwrap(), 1);
        let a_after = store.get_by_id(&a.id).await.unwrap().unwrap();
        assert_eq!(a_after.tags, vec!["javascript"]);
    }

    #[tokio::test]
    async fn test_tombstones_are_unique_per_url() {
        let store = LocalStore::in_memory("test");
        let a = conv("https://a", "A");
        store.add_tombstone(Tombstone::for_record(&a)).await.unwrap();
        store.add_tombstone(Tombstone::for_record(&a)).await.unwrap();
        assert_eq!(store.get_tombstones().await.unwrap().len(), 1);

        store.clear_tombstone("https://a").await.unwrap();
        assert!(store.get_tombstones().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_by_url_captured_before_keeps_newer_capture() {
        let store = LocalStore::in_memory("test");
        let record = conv("https://a", "A");
        store.upsert_by_id(record.clone()).await.unwrap();

        let earlier = record.captured_at - chrono::Duration::seconds(1);
        let removed = store
            .delete_by_url_captured_before("https://a", earlier)
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.get_all().await.unwrap().len(), 1);

        let removed = store
            .delete_by_url_captured_before("https://a", record.captured_at)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_by_id_counts() {
        let store = LocalStore::in_memory("test");
        let a = conv("https://a", "A");
        store.upsert_by_id(a.clone()).await.unwrap();

        let mut a2 = a.clone();
        a2.title = "A2".to_string();
        let b = conv("https://b", "B");
        let summary = store.merge_by_id(&[a2, b]).await.unwrap();
        assert_eq!(summary.added, 1);
        assert_eq!(summary.updated, 1);
    }
}
