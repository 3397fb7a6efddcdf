//! Commands that browse and edit the web-app store

use super::{print_json, read_input, short_id, truncate, Stores};
use crate::cli::{FolderCommand, ListSort, TagsCommand};
use crate::error::{AgregError, Result};
use crate::index::tag_counts;
use crate::model::{Conversation, Role};
use crate::storage::ExportDocument;
use colored::Colorize;
use prettytable::{format, row, Table};
use std::path::Path;

/// Filters applied by `list`
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub tag: Option<String>,
    pub folder: Option<String>,
    pub favorites: bool,
    pub search: Option<String>,
}

impl ListFilter {
    pub fn matches(&self, record: &Conversation) -> bool {
        if self.favorites && !record.is_favorite {
            return false;
        }
        if let Some(tag) = &self.tag {
            let tag = tag.trim().to_lowercase();
            if !record.tags.iter().any(|t| *t == tag) {
                return false;
            }
        }
        if let Some(folder) = &self.folder {
            if record.folder_id.as_deref() != Some(folder.as_str()) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let haystack = format!(
                "{} {} {}",
                record.searchable_text(),
                record.llm_source,
                record.tags.join(" ")
            )
            .to_lowercase();
            if !haystack.contains(&search.trim().to_lowercase()) {
                return false;
            }
        }
        true
    }
}

fn sort_records(records: &mut [Conversation], sort: ListSort) {
    match sort {
        ListSort::Date => records.sort_by(|a, b| b.captured_at.cmp(&a.captured_at)),
        ListSort::Title => records.sort_by_cached_key(|r| r.title.to_lowercase()),
    }
}

/// Lists conversations in the requested order
pub async fn list(stores: &Stores, filter: &ListFilter, sort: ListSort, json: bool) -> Result<()> {
    let mut records: Vec<Conversation> = stores
        .target
        .get_all()
        .await?
        .into_iter()
        .filter(|r| filter.matches(r))
        .collect();
    sort_records(&mut records, sort);

    if json {
        return print_json(&records);
    }

    if records.is_empty() {
        println!("{}", "No conversations found.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(row![
        "ID".bold(),
        "Title".bold(),
        "Provider".bold(),
        "Tags".bold(),
        "Captured".bold()
    ]);

    for record in &records {
        let marker = if record.is_favorite { "* " } else { "" };
        table.add_row(row![
            short_id(&record.id).cyan(),
            format!("{}{}", marker, truncate(&record.title, 40)),
            record.llm_source,
            record.tags.join(", "),
            record.captured_at.format("%Y-%m-%d %H:%M")
        ]);
    }

    println!("\nConversations ({}):", records.len());
    table.printstd();
    println!();
    Ok(())
}

/// Finds a record by full id or unique id prefix
async fn resolve(stores: &Stores, id: &str) -> Result<Conversation> {
    let records = stores.target.get_all().await?;
    if let Some(exact) = records.iter().find(|r| r.id == id) {
        return Ok(exact.clone());
    }

    let mut matches = records.into_iter().filter(|r| r.id.starts_with(id));
    match (matches.next(), matches.next()) {
        (Some(record), None) => Ok(record),
        (Some(_), Some(_)) => Err(AgregError::NotFound(format!("ambiguous id prefix {}", id)).into()),
        (None, _) => Err(AgregError::NotFound(format!("conversation {}", id)).into()),
    }
}

/// Prints one conversation with its transcript
pub async fn show(stores: &Stores, id: &str, json: bool) -> Result<()> {
    let record = resolve(stores, id).await?;
    if json {
        return print_json(&record);
    }

    println!("{}", record.title.bold());
    println!("  id:       {}", record.id.cyan());
    println!("  url:      {}", record.url);
    println!("  provider: {}", record.llm_source);
    println!("  captured: {}", record.captured_at.format("%Y-%m-%d %H:%M"));
    if !record.tags.is_empty() {
        println!("  tags:     {}", record.tags.join(", "));
    }
    if let Some(folder_id) = &record.folder_id {
        let tree = stores.target.folder_tree().await?;
        let name = tree.get(folder_id).map_or("(missing)", |f| f.name.as_str());
        println!("  folder:   {}", name);
    }
    println!("\n{}\n", record.summary);

    for message in &record.messages {
        let label = match message.role {
            Role::User => "User".green().bold(),
            Role::Assistant => "Assistant".blue().bold(),
            Role::System => "System".dimmed(),
        };
        println!("{}\n{}\n", label, message.content);
    }
    Ok(())
}

/// Deletes a conversation and propagates the deletion to the add-on store
pub async fn delete(stores: &Stores, id: &str) -> Result<()> {
    let record = resolve(stores, id).await?;
    let synchronizer = stores.synchronizer();
    synchronizer.delete_from_target(&record.id).await?;
    let (applied, pending) = synchronizer.propagate_deletes().await?;

    println!("{}", format!("Deleted conversation {}", record.id).green());
    if pending > 0 {
        println!(
            "{}",
            format!("{} deletion(s) will be retried on the next sync", pending).yellow()
        );
    } else {
        tracing::debug!(applied = applied, "Deletion reached the add-on store");
    }
    Ok(())
}

pub async fn tag(stores: &Stores, id: &str, tags: &[String], json: bool) -> Result<()> {
    let record = resolve(stores, id).await?;
    let updated = stores.target.update_tags(&record.id, tags).await?;
    if json {
        return print_json(&updated);
    }
    println!(
        "{} {}: {}",
        "Tagged".green(),
        short_id(&updated.id).cyan(),
        updated.tags.join(", ")
    );
    Ok(())
}

pub async fn favorite(stores: &Stores, id: &str, favorite: bool) -> Result<()> {
    let record = resolve(stores, id).await?;
    stores.target.set_favorite(&record.id, favorite).await?;
    let verb = if favorite { "Starred" } else { "Unstarred" };
    println!("{} {}", verb.green(), record.title);
    Ok(())
}

/// Handles `folder` subcommands
pub async fn handle_folder(stores: &Stores, command: FolderCommand, json: bool) -> Result<()> {
    let store = &stores.target;
    match command {
        FolderCommand::List => {
            let tree = store.folder_tree().await?;
            if json {
                return print_json(&tree.build());
            }
            if tree.is_empty() {
                println!("{}", "No folders.".yellow());
                return Ok(());
            }
            let records = store.get_all().await?;
            for (depth, folder) in tree.walk() {
                let count = records
                    .iter()
                    .filter(|r| r.folder_id.as_deref() == Some(folder.id.as_str()))
                    .count();
                println!(
                    "{}{} {} ({})",
                    "  ".repeat(depth),
                    folder.name.bold(),
                    short_id(&folder.id).cyan(),
                    count
                );
            }
        }
        FolderCommand::Create {
            name,
            parent,
            color,
        } => {
            let folder = store
                .create_folder(&name, parent.as_deref(), color.as_deref())
                .await?;
            if json {
                return print_json(&folder);
            }
            println!("{} {} {}", "Created folder".green(), folder.name, folder.id.cyan());
        }
        FolderCommand::Rename { id, name, color } => {
            let folder = store
                .update_folder(&id, Some(name.as_str()), color.as_deref())
                .await?;
            println!("{} {}", "Renamed folder to".green(), folder.name);
        }
        FolderCommand::Move { id, parent } => {
            let folder = store.reparent_folder(&id, parent.as_deref()).await?;
            let target = parent.as_deref().unwrap_or("top level");
            println!("{} {} under {}", "Moved".green(), folder.name, target);
        }
        FolderCommand::Delete { id } => {
            let folder = store.delete_folder(&id).await?;
            println!("{} {}", "Deleted folder".green(), folder.name);
        }
        FolderCommand::Assign {
            conversation,
            folder,
        } => {
            let record = resolve(stores, &conversation).await?;
            let updated = store.move_to_folder(&record.id, folder.as_deref()).await?;
            match &updated.folder_id {
                Some(folder_id) => println!("{} {} to {}", "Filed".green(), updated.title, folder_id),
                None => println!("{} {}", "Unfiled".green(), updated.title),
            }
        }
    }
    Ok(())
}

/// Handles `tags` subcommands
pub async fn handle_tags(stores: &Stores, command: TagsCommand, json: bool) -> Result<()> {
    let store = &stores.target;
    match command {
        TagsCommand::List => {
            let counts = tag_counts(&store.get_all().await?);
            if json {
                return print_json(&counts);
            }
            if counts.is_empty() {
                println!("{}", "No tags.".yellow());
                return Ok(());
            }
            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(row!["Tag".bold(), "Conversations".bold()]);
            for (tag, count) in &counts {
                table.add_row(row![tag.cyan(), count]);
            }
            table.printstd();
        }
        TagsCommand::Rename { old, new } => {
            let changed = store.rename_tag(&old, &new).await?;
            println!("{} {} conversation(s)", "Renamed tag on".green(), changed);
        }
        TagsCommand::Delete { tag } => {
            let changed = store.delete_tag(&tag).await?;
            println!("{} {} conversation(s)", "Removed tag from".green(), changed);
        }
    }
    Ok(())
}

/// Writes the export document to `output` or stdout
pub async fn export(stores: &Stores, output: Option<&Path>) -> Result<()> {
    let json = stores.target.export_json().await?;
    match output {
        Some(path) => {
            std::fs::write(path, &json).map_err(AgregError::from)?;
            let doc: ExportDocument = serde_json::from_str(&json)?;
            eprintln!(
                "{} {} conversation(s) to {}",
                "Exported".green(),
                doc.conversations.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

pub async fn import(stores: &Stores, file: &Path, json: bool) -> Result<()> {
    let summary = stores.target.import_json(&read_input(Some(file))?).await?;
    if json {
        return print_json(&summary);
    }
    println!(
        "{} {} added, {} updated, {} unchanged, {} folder(s)",
        "Imported:".green(),
        summary.added,
        summary.updated,
        summary.unchanged,
        summary.folders
    );
    Ok(())
}
