//! Folder forest over a flat folder list

use crate::error::{AgregError, Result};
use crate::model::Folder;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A folder with its nested children, for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderNode {
    pub folder: Folder,
    pub children: Vec<FolderNode>,
}

/// Arena of folders keyed by id
///
/// Parent links are ids into the arena. A folder whose parent is absent or
/// unknown is a root.
#[derive(Debug, Clone, Default)]
pub struct FolderTree {
    folders: Vec<Folder>,
    index: HashMap<String, usize>,
}

impl FolderTree {
    pub fn new(folders: Vec<Folder>) -> Self {
        let index = folders
            .iter()
            .enumerate()
            .map(|(pos, f)| (f.id.clone(), pos))
            .collect();
        Self { folders, index }
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Folder> {
        self.index.get(id).map(|&pos| &self.folders[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Parent of `folder` when it points at a known folder
    fn known_parent<'a>(&'a self, folder: &'a Folder) -> Option<&'a str> {
        folder
            .parent_id
            .as_deref()
            .filter(|parent| self.contains(parent))
    }

    /// Top-level folders in stored order
    pub fn roots(&self) -> Vec<&Folder> {
        self.folders
            .iter()
            .filter(|f| self.known_parent(f).is_none())
            .collect()
    }

    /// Direct children of `id` in stored order
    pub fn children(&self, id: &str) -> Vec<&Folder> {
        self.folders
            .iter()
            .filter(|f| self.known_parent(f) == Some(id))
            .collect()
    }

    /// Nested view of the whole forest
    pub fn build(&self) -> Vec<FolderNode> {
        let mut visited = HashSet::new();
        self.roots()
            .into_iter()
            .map(|root| self.build_node(root, &mut visited))
            .collect()
    }

    fn build_node(&self, folder: &Folder, visited: &mut HashSet<String>) -> FolderNode {
        visited.insert(folder.id.clone());
        let mut children = Vec::new();
        for child in self.children(&folder.id) {
            if !visited.contains(&child.id) {
                children.push(self.build_node(child, visited));
            }
        }
        FolderNode {
            folder: folder.clone(),
            children,
        }
    }

    /// Depth-first listing as `(depth, folder)` pairs
    pub fn walk(&self) -> Vec<(usize, &Folder)> {
        fn visit<'a>(
            tree: &'a FolderTree,
            folder: &'a Folder,
            depth: usize,
            seen: &mut HashSet<&'a str>,
            out: &mut Vec<(usize, &'a Folder)>,
        ) {
            if !seen.insert(folder.id.as_str()) {
                return;
            }
            out.push((depth, folder));
            for child in tree.children(&folder.id) {
                visit(tree, child, depth + 1, seen, out);
            }
        }

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for root in self.roots() {
            visit(self, root, 0, &mut seen, &mut out);
        }
        out
    }

    /// Whether moving `id` under `new_parent` would make it its own ancestor
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::index::FolderTree;
    /// use agregllm::model::Folder;
    ///
    /// let mut a = Folder::new("A", None);
    /// a.id = "a".into();
    /// let mut b = Folder::new("B", Some("a".into()));
    /// b.id = "b".into();
    /// let tree = FolderTree::new(vec![a, b]);
    ///
    /// assert!(tree.would_create_cycle("a", Some("b")));
    /// assert!(tree.would_create_cycle("a", Some("a")));
    /// assert!(!tree.would_create_cycle("b", None));
    /// ```
    pub fn would_create_cycle(&self, id: &str, new_parent: Option<&str>) -> bool {
        let mut current = new_parent;
        let mut seen = HashSet::new();
        while let Some(ancestor) = current {
            if ancestor == id {
                return true;
            }
            if !seen.insert(ancestor) {
                // Stored data already loops; never move into it.
                return true;
            }
            current = self.get(ancestor).and_then(|f| f.parent_id.as_deref());
        }
        false
    }

    /// Validates a reparenting request
    ///
    /// # Errors
    ///
    /// Returns `AgregError::NotFound` for unknown folders and
    /// `AgregError::InvalidFolderMove` for cycles
    pub fn check_move(&self, id: &str, new_parent: Option<&str>) -> Result<()> {
        if !self.contains(id) {
            return Err(AgregError::NotFound(format!("folder {}", id)).into());
        }
        if let Some(parent) = new_parent {
            if !self.contains(parent) {
                return Err(AgregError::NotFound(format!("folder {}", parent)).into());
            }
        }
        if self.would_create_cycle(id, new_parent) {
            return Err(AgregError::InvalidFolderMove(format!(
                "moving {} under {} would create a cycle",
                id,
                new_parent.unwrap_or("<root>")
            ))
            .into());
        }
        Ok(())
    }

    /// Removes a folder, attaching its children to its parent
    pub fn remove(&mut self, id: &str) -> Option<Folder> {
        let pos = *self.index.get(id)?;
        let removed = self.folders.remove(pos);
        for folder in self.folders.iter_mut() {
            if folder.parent_id.as_deref() == Some(id) {
                folder.parent_id = removed.parent_id.clone();
            }
        }
        *self = Self::new(std::mem::take(&mut self.folders));
        Some(removed)
    }

    pub fn into_folders(self) -> Vec<Folder> {
        self.folders
    }
}

/// First folder whose name occurs in `text`, ignoring case
///
/// # Examples
///
/// ```
/// use agregllm::index::find_best_folder;
/// use agregllm::model::Folder;
///
/// let folders = vec![Folder::new("Cuisine", None), Folder::new("Rust", None)];
/// let best = find_best_folder("Learning rust macros", &folders);
/// assert_eq!(best.map(|f| f.name.as_str()), Some("Rust"));
/// assert!(find_best_folder("nothing here", &folders).is_none());
/// ```
pub fn find_best_folder<'a>(text: &str, folders: &'a [Folder]) -> Option<&'a Folder> {
    if text.is_empty() {
        return None;
    }
    let text = text.to_lowercase();
    folders.iter().find(|folder| {
        let name = folder.name.trim().to_lowercase();
        !name.is_empty() && text.contains(&name)
    })
}
