//! AgregLLM - conversation capture and organization library
//!
//! This library provides the core of AgregLLM: turning captured chat pages
//! into canonical conversation records, storing them, keeping the add-on
//! store and the web-app store in step, and backing them up remotely.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `convert`: HTML fragment to markdown conversion
//! - `normalize`: Raw capture to canonical `Conversation`
//! - `storage`: Versioned key-value backends and the `LocalStore`
//! - `sync`: Add-on to web-app reconciliation and delete propagation
//! - `remote`: Remote backup client, token cache and pull-then-push sync
//! - `index`: Folder forest and global tag edits
//! - `messaging`: Request/response protocol of the background service
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface
//!
//! # Example
//!
//! ```
//! use agregllm::normalize::{Normalizer, RawCapture};
//! use agregllm::storage::LocalStore;
//! use agregllm::sync::Synchronizer;
//!
//! # tokio_test::block_on(async {
//! let addon = LocalStore::in_memory("addon");
//! let webapp = LocalStore::in_memory("webapp");
//!
//! let raw = RawCapture {
//!     url: "https://chatgpt.com/c/42".to_string(),
//!     title: "Ownership in Rust".to_string(),
//!     ..RawCapture::default()
//! };
//! let record = Normalizer::default().normalize(raw, chrono::Utc::now()).unwrap();
//! addon.upsert_by_url(record).await.unwrap();
//!
//! let report = Synchronizer::new(addon, webapp.clone()).run().await.unwrap();
//! assert_eq!(report.added, 1);
//! assert_eq!(webapp.get_all().await.unwrap()[0].llm_source, "ChatGPT");
//! # });
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod convert;
pub mod error;
pub mod index;
pub mod messaging;
pub mod model;
pub mod normalize;
pub mod remote;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use config::Config;
pub use error::{AgregError, Result};
pub use model::{Conversation, Folder, Message, Role};
pub use storage::LocalStore;
pub use sync::Synchronizer;
