//! AgregLLM - collect, organize and back up LLM conversations
//!
#![doc = "AgregLLM command-line entry point."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use agregllm::cli::{Cli, Commands};
use agregllm::commands::{self, library::ListFilter, Stores};
use agregllm::config::Config;
use agregllm::sync::metrics::init_metrics_exporter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);
    init_metrics_exporter();

    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    // Conversion needs no store.
    if let Commands::Convert { file } = &cli.command {
        return commands::capture::convert(file.as_deref());
    }

    let stores = Stores::open(&config)?;
    let json = cli.json;

    match cli.command {
        Commands::Convert { .. } => Ok(()),
        Commands::Capture {
            file,
            mode,
            no_sync,
        } => {
            tracing::debug!("Starting capture");
            commands::capture::capture(&config, &stores, file.as_deref(), mode, no_sync, json)
                .await
        }
        Commands::Dispatch { request } => {
            commands::capture::dispatch(&config, &stores, request).await
        }
        Commands::Sync => commands::capture::sync(&stores, json).await,
        Commands::List {
            tag,
            folder,
            favorites,
            search,
            sort,
        } => {
            let filter = ListFilter {
                tag,
                folder,
                favorites,
                search,
            };
            commands::library::list(&stores, &filter, sort, json).await
        }
        Commands::Show { id } => commands::library::show(&stores, &id, json).await,
        Commands::Delete { id } => commands::library::delete(&stores, &id).await,
        Commands::Tag { id, tags } => commands::library::tag(&stores, &id, &tags, json).await,
        Commands::Favorite { id, off } => commands::library::favorite(&stores, &id, !off).await,
        Commands::Folder { command } => {
            commands::library::handle_folder(&stores, command, json).await
        }
        Commands::Tags { command } => commands::library::handle_tags(&stores, command, json).await,
        Commands::Export { output } => commands::library::export(&stores, output.as_deref()).await,
        Commands::Import { file } => commands::library::import(&stores, &file, json).await,
        Commands::Remote { command } => {
            tracing::debug!("Starting remote command");
            commands::remote::handle_remote(&config, &stores, command, json).await
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so command output on stdout stays parseable.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "agregllm=debug" } else { "agregllm=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
