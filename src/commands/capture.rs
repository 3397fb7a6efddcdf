//! Add-on side commands: conversion, capture, request dispatch and sync

use super::{print_json, read_input, short_id, Stores};
use crate::config::{CaptureMode, Config};
use crate::convert::html_to_markdown;
use crate::error::{AgregError, Result};
use crate::index::find_best_folder;
use crate::messaging::BackgroundService;
use crate::normalize::{Normalizer, RawCapture};
use crate::sync::SyncReport;
use chrono::Utc;
use colored::Colorize;
use std::path::Path;

/// Converts an HTML fragment to markdown and prints it
pub fn convert(file: Option<&Path>) -> Result<()> {
    let html = read_input(file)?;
    let markdown = html_to_markdown(&html);
    tracing::debug!(
        input_bytes = html.len(),
        output_bytes = markdown.len(),
        "Converted fragment"
    );
    println!("{}", markdown);
    Ok(())
}

/// Normalizes a captured page and stores it in the add-on store
///
/// Unless `no_sync` is set, the add-on store is then reconciled into the
/// web-app store.
///
/// # Arguments
///
/// * `config` - Loaded configuration
/// * `stores` - Opened stores
/// * `file` - Capture JSON file, or stdin
/// * `mode` - Capture mode override
/// * `no_sync` - Skip the reconcile
/// * `json` - Print the stored record as JSON
pub async fn capture(
    config: &Config,
    stores: &Stores,
    file: Option<&Path>,
    mode: Option<CaptureMode>,
    no_sync: bool,
    json: bool,
) -> Result<()> {
    let raw: RawCapture = serde_json::from_str(&read_input(file)?)
        .map_err(|e| AgregError::Capture(format!("Invalid capture JSON: {}", e)))?;

    let mut capture_config = config.capture.clone();
    if let Some(mode) = mode {
        capture_config.mode = mode;
    }
    let normalizer = Normalizer::new(capture_config);

    let record = normalizer.normalize(raw, Utc::now())?;
    let stored = stores.source.upsert_by_url(record).await?;
    tracing::info!(url = %stored.url, mode = ?normalizer.mode(), "Captured conversation");

    let report = if no_sync {
        None
    } else {
        Some(stores.synchronizer().reconcile().await?)
    };

    if json {
        return print_json(&serde_json::json!({ "record": stored, "sync": report }));
    }

    println!(
        "{} {} {}",
        "Captured".green(),
        stored.title.bold(),
        format!("[{}]", short_id(&stored.id)).cyan()
    );
    println!("  provider: {}", stored.llm_source);
    println!("  messages: {}", stored.messages.len());
    if !stored.tags.is_empty() {
        println!("  tags: {}", stored.tags.join(", "));
    }
    if let Some(report) = report {
        print_report(&report);
    }

    let folders = stores.target.get_all_folders().await?;
    if let Some(folder) = find_best_folder(&stored.searchable_text(), &folders) {
        println!(
            "  suggested folder: {} ({})",
            folder.name.cyan(),
            format!("agregllm folder assign <ID> --folder {}", folder.id).dimmed()
        );
    }
    Ok(())
}

/// Handles one JSON request the way the background service does
pub async fn dispatch(config: &Config, stores: &Stores, request: Option<String>) -> Result<()> {
    let request = match request {
        Some(request) => request,
        None => read_input(None)?,
    };
    let service = BackgroundService::new(stores.source.clone(), Normalizer::new(config.capture.clone()))
        .with_synchronizer(stores.synchronizer());
    println!("{}", service.handle_json(&request).await);
    Ok(())
}

/// Propagates pending deletions, then reconciles the stores
pub async fn sync(stores: &Stores, json: bool) -> Result<()> {
    let report = stores.synchronizer().run().await?;
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.wrote || report.deletions_propagated > 0 {
        println!(
            "{} {} added, {} updated, {} unchanged",
            "Synchronized:".green(),
            report.added,
            report.updated,
            report.unchanged
        );
    } else {
        println!("{}", "Already up to date.".yellow());
    }
    if report.skipped_tombstoned > 0 {
        println!(
            "  {} record(s) skipped pending deletion",
            report.skipped_tombstoned
        );
    }
    if report.deletions_propagated > 0 {
        println!("  {} deletion(s) applied", report.deletions_propagated);
    }
    if report.deletions_pending > 0 {
        println!(
            "  {}",
            format!("{} deletion(s) still pending", report.deletions_pending).yellow()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn stores(dir: &TempDir) -> (Config, Stores) {
        let mut config = Config::default();
        config.storage.source_db = Some(dir.path().join("addon.db"));
        config.storage.target_db = Some(dir.path().join("webapp.db"));
        let stores = Stores::open(&config).unwrap();
        (config, stores)
    }

    #[tokio::test]
    async fn test_capture_then_reconcile() {
        let dir = TempDir::new().unwrap();
        let (config, stores) = stores(&dir);
        let page = dir.path().join("page.json");
        std::fs::write(
            &page,
            r#"{"url":"https://claude.ai/chat/1","host":"claude.ai","title":"Borrowing rules"}"#,
        )
        .unwrap();

        capture(&config, &stores, Some(&page), None, false, true)
            .await
            .unwrap();

        let target = stores.target.get_all().await.unwrap();
        assert_eq!(target.len(), 1);
        assert_eq!(target[0].llm_source, "Claude");
        assert!(target[0].tags.is_empty());
    }

    #[tokio::test]
    async fn test_capture_no_sync_leaves_target_empty() {
        let dir = TempDir::new().unwrap();
        let (config, stores) = stores(&dir);
        let page = dir.path().join("page.json");
        std::fs::write(&page, r#"{"url":"https://chatgpt.com/c/9"}"#).unwrap();

        capture(&config, &stores, Some(&page), Some(CaptureMode::Full), true, true)
            .await
            .unwrap();

        assert_eq!(stores.source.get_all().await.unwrap().len(), 1);
        assert!(stores.target.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capture_rejects_invalid_json() {
        let dir = TempDir::new().unwrap();
        let (config, stores) = stores(&dir);
        let page = dir.path().join("page.json");
        std::fs::write(&page, "not json").unwrap();

        let err = capture(&config, &stores, Some(&page), None, false, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid capture JSON"));
    }
}
