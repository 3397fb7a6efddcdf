//! Command-line interface definition for AgregLLM
//!
//! This module defines the CLI structure using clap's derive API. The
//! library commands (`list`, `show`, `tag`, `folder`, ...) act on the
//! web-app store; `capture` and `dispatch` act as the add-on context.

use crate::config::CaptureMode;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Ordering of `list` output
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListSort {
    /// Most recent capture first
    #[default]
    Date,
    /// Title, case-insensitive
    Title,
}

/// AgregLLM - collect, organize and back up LLM conversations
#[derive(Parser, Debug, Clone)]
#[command(name = "agregllm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Add-on store database (overrides config)
    #[arg(long, global = true)]
    pub source_db: Option<PathBuf>,

    /// Web-app store database (overrides config)
    #[arg(long, global = true)]
    pub target_db: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for AgregLLM
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Convert an HTML fragment to markdown
    Convert {
        /// HTML file to read (stdin when omitted)
        file: Option<PathBuf>,
    },

    /// Normalize a captured page (JSON) and store it in the add-on store
    Capture {
        /// Capture JSON file (stdin when omitted)
        file: Option<PathBuf>,

        /// Override the configured capture mode (metadata_only, full)
        #[arg(short, long)]
        mode: Option<CaptureMode>,

        /// Skip the reconcile into the web-app store
        #[arg(long)]
        no_sync: bool,
    },

    /// Handle one JSON request as the background service would
    Dispatch {
        /// Request JSON (stdin when omitted)
        request: Option<String>,
    },

    /// Propagate pending deletions and reconcile the two stores
    Sync,

    /// List conversations
    List {
        /// Only conversations carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Only conversations in this folder
        #[arg(short, long)]
        folder: Option<String>,

        /// Only favorites
        #[arg(long)]
        favorites: bool,

        /// Case-insensitive text filter on title, provider, summary and tags
        #[arg(short, long)]
        search: Option<String>,

        /// Sort order
        #[arg(long, value_enum, default_value_t = ListSort::Date)]
        sort: ListSort,
    },

    /// Show one conversation with its messages
    Show {
        /// Conversation id
        id: String,
    },

    /// Delete a conversation everywhere
    Delete {
        /// Conversation id
        id: String,
    },

    /// Replace the tags of a conversation
    Tag {
        /// Conversation id
        id: String,

        /// New tags (normalized, at most four kept)
        tags: Vec<String>,
    },

    /// Mark or unmark a conversation as favorite
    Favorite {
        /// Conversation id
        id: String,

        /// Remove the favorite mark
        #[arg(long)]
        off: bool,
    },

    /// Manage folders
    Folder {
        #[command(subcommand)]
        command: FolderCommand,
    },

    /// Manage tags across all conversations
    Tags {
        #[command(subcommand)]
        command: TagsCommand,
    },

    /// Export the web-app store as JSON
    Export {
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge an exported JSON document into the web-app store
    Import {
        /// Export file to read
        file: PathBuf,
    },

    /// Remote backup operations
    Remote {
        #[command(subcommand)]
        command: RemoteCommand,
    },
}

/// Folder management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum FolderCommand {
    /// Show the folder tree
    List,

    /// Create a folder
    Create {
        /// Folder name
        name: String,

        /// Parent folder id
        #[arg(short, long)]
        parent: Option<String>,

        /// Display color
        #[arg(long)]
        color: Option<String>,
    },

    /// Rename or recolor a folder
    Rename {
        /// Folder id
        id: String,

        /// New name
        name: String,

        /// New display color
        #[arg(long)]
        color: Option<String>,
    },

    /// Move a folder under another one (top level when no parent given)
    Move {
        /// Folder id
        id: String,

        /// New parent folder id
        #[arg(short, long)]
        parent: Option<String>,
    },

    /// Delete a folder; its children move up and its conversations are unfiled
    Delete {
        /// Folder id
        id: String,
    },

    /// File a conversation into a folder (unfile when no folder given)
    Assign {
        /// Conversation id
        conversation: String,

        /// Folder id
        #[arg(short, long)]
        folder: Option<String>,
    },
}

/// Tag management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum TagsCommand {
    /// List tags with usage counts
    List,

    /// Rename a tag on every conversation
    Rename {
        /// Current tag
        old: String,

        /// New tag
        new: String,
    },

    /// Remove a tag from every conversation
    Delete {
        /// Tag to remove
        tag: String,
    },
}

/// Remote backup subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum RemoteCommand {
    /// Store an access token obtained from the provider's sign-in flow
    Login {
        /// Bearer access token
        #[arg(long)]
        token: String,

        /// Token lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        expires_in: i64,
    },

    /// Forget the stored access token
    Logout,

    /// Show the authentication state
    Status,

    /// Pull the remote backup, merge it, then push the merged store
    Sync,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_list_defaults() {
        let cli = Cli::try_parse_from(["agregllm", "list"]).unwrap();
        assert_eq!(cli.config, Some("config/config.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(!cli.json);
        if let Commands::List {
            tag,
            folder,
            favorites,
            search,
            sort,
        } = cli.command
        {
            assert!(tag.is_none());
            assert!(folder.is_none());
            assert!(!favorites);
            assert!(search.is_none());
            assert_eq!(sort, ListSort::Date);
        } else {
            panic!("Expected List command");
        }
    }

    #[test]
    fn test_cli_parse_list_sort_title() {
        let cli = Cli::try_parse_from(["agregllm", "list", "--sort", "title"]).unwrap();
        match cli.command {
            Commands::List { sort, .. } => assert_eq!(sort, ListSort::Title),
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["agregllm", "list", "--json", "--target-db", "w.db"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.target_db, Some(PathBuf::from("w.db")));
    }

    #[test]
    fn test_cli_parse_capture_mode() {
        let cli = Cli::try_parse_from(["agregllm", "capture", "page.json", "--mode", "full"]).unwrap();
        if let Commands::Capture {
            file,
            mode,
            no_sync,
        } = cli.command
        {
            assert_eq!(file, Some(PathBuf::from("page.json")));
            assert_eq!(mode, Some(CaptureMode::Full));
            assert!(!no_sync);
        } else {
            panic!("Expected Capture command");
        }
    }

    #[test]
    fn test_cli_rejects_unknown_capture_mode() {
        assert!(Cli::try_parse_from(["agregllm", "capture", "--mode", "everything"]).is_err());
    }

    #[test]
    fn test_cli_parse_tag_command() {
        let cli = Cli::try_parse_from(["agregllm", "tag", "abc", "rust", "async"]).unwrap();
        if let Commands::Tag { id, tags } = cli.command {
            assert_eq!(id, "abc");
            assert_eq!(tags, vec!["rust", "async"]);
        } else {
            panic!("Expected Tag command");
        }
    }

    #[test]
    fn test_cli_parse_folder_move_to_top_level() {
        let cli = Cli::try_parse_from(["agregllm", "folder", "move", "f1"]).unwrap();
        if let Commands::Folder {
            command: FolderCommand::Move { id, parent },
        } = cli.command
        {
            assert_eq!(id, "f1");
            assert!(parent.is_none());
        } else {
            panic!("Expected Folder Move command");
        }
    }

    #[test]
    fn test_cli_parse_remote_login() {
        let cli = Cli::try_parse_from(["agregllm", "remote", "login", "--token", "t0k"]).unwrap();
        if let Commands::Remote {
            command: RemoteCommand::Login { token, expires_in },
        } = cli.command
        {
            assert_eq!(token, "t0k");
            assert_eq!(expires_in, 3600);
        } else {
            panic!("Expected Remote Login command");
        }
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["agregllm"]).is_err());
    }
}
