//! Remote backup commands

use super::{print_json, Stores};
use crate::cli::RemoteCommand;
use crate::config::Config;
use crate::error::Result;
use crate::remote::{AccessToken, AuthState, RemoteSync, RemoteSyncOutcome};
use colored::Colorize;

/// Handles `remote` subcommands against the web-app store
///
/// The token is persisted in the web-app store, so every invocation sees
/// the state left by the previous one.
pub async fn handle_remote(
    config: &Config,
    stores: &Stores,
    command: RemoteCommand,
    json: bool,
) -> Result<()> {
    let remote = RemoteSync::from_config(&config.remote, &stores.target)?;

    match command {
        RemoteCommand::Login { token, expires_in } => {
            let token = AccessToken::new(token, chrono::Duration::seconds(expires_in));
            let expires_at = token.expires_at;
            remote.tokens().authenticate(token).await?;
            println!(
                "{} token valid until {}",
                "Signed in:".green(),
                expires_at.format("%Y-%m-%d %H:%M UTC")
            );
        }
        RemoteCommand::Logout => {
            remote.tokens().logout().await?;
            println!("{}", "Signed out.".green());
        }
        RemoteCommand::Status => {
            let state = remote.tokens().state().await?;
            if json {
                let expires_at = match &state {
                    AuthState::Authenticated(token) => Some(token.expires_at),
                    _ => None,
                };
                return print_json(&serde_json::json!({
                    "state": state.label(),
                    "expiresAt": expires_at,
                }));
            }
            match state {
                AuthState::Authenticated(token) => println!(
                    "{} (expires {})",
                    "authenticated".green(),
                    token.expires_at.format("%Y-%m-%d %H:%M UTC")
                ),
                AuthState::Expired => println!(
                    "{} - run {}",
                    "expired".yellow(),
                    "agregllm remote login --token <TOKEN>".cyan()
                ),
                AuthState::Uninitialized => println!("{}", "not signed in".yellow()),
            }
        }
        RemoteCommand::Sync => {
            let outcome = remote.sync_now(&stores.target).await?;
            if json {
                return print_json(&outcome);
            }
            match outcome {
                RemoteSyncOutcome::Unavailable => {
                    println!("{}", "Remote sync unavailable: sign in first.".yellow())
                }
                RemoteSyncOutcome::Completed {
                    pulled,
                    created,
                    pushed,
                } => {
                    if let Some(pulled) = pulled {
                        println!(
                            "{} {} added, {} updated from remote",
                            "Pulled:".green(),
                            pulled.added,
                            pulled.updated
                        );
                    }
                    let verb = if created { "created" } else { "updated" };
                    println!(
                        "{} {} conversation(s), remote backup {}",
                        "Pushed:".green(),
                        pushed,
                        verb
                    );
                }
            }
        }
    }
    Ok(())
}
