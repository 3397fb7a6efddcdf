use agregllm::model::{Conversation, Message};
use agregllm::storage::LocalStore;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Add-on and web-app stores backed by SQLite files in one temp dir
#[allow(dead_code)]
pub fn create_temp_stores() -> (LocalStore, LocalStore, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let source = LocalStore::open_sqlite(tmp.path().join("addon.db"), "addon")
        .expect("failed to open add-on store");
    let target = LocalStore::open_sqlite(tmp.path().join("webapp.db"), "webapp")
        .expect("failed to open web-app store");
    (source, target, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// A captured conversation with a short two-message transcript
#[allow(dead_code)]
pub fn conversation(url: &str, title: &str) -> Conversation {
    let mut record = Conversation::new(url, title, "Claude");
    record.messages = vec![
        Message::user(format!("Question about {}", title)),
        Message::assistant("Here is an answer."),
    ];
    record
}
