//! Folder and tag index
//!
//! Derived views over a store's collections: the folder forest with
//! cycle-checked reparenting, folder suggestion, and global tag edits.

pub mod folders;
pub mod tags;

pub use folders::{find_best_folder, FolderNode, FolderTree};
pub use tags::{all_tags, delete_tag, rename_tag, tag_counts};
