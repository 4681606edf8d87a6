//! CLI commands

use anyhow::{Context, Result};
use clap::Subcommand;
use latch_core::{Action, FileStorage, LatchConfig, Persistor, Store, StoreApi, UserState};
use latch_http::RequestApi;
use reqwest::Method;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config;

#[derive(Subcommand)]
pub enum Commands {
    /// Store a token pair and start a session
    Login {
        /// Access token sent as the Authorization header
        #[arg(long, env = "LATCH_ACCESS_TOKEN")]
        access_token: String,

        /// Refresh token sent as the user-token header
        #[arg(long, env = "LATCH_REFRESH_TOKEN")]
        refresh_token: String,

        /// Email sent as the user-email header; kept across runs only when
        /// "user" is in persist.allow_list
        #[arg(long)]
        email: Option<String>,
    },

    /// End the session and clear the stored tokens
    Logout,

    /// Show whether a session is active
    Status,

    /// Query a URL relative to the base URL
    Get { url: String },

    /// Send JSON to a URL relative to the base URL
    Send {
        url: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "POST")]
        method: String,

        /// JSON body
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Remove persisted state from disk
    Purge,

    /// Configuration file operations
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Generate a default configuration file
    Init {
        /// Output file path (defaults to <state dir>/latch.json)
        output: Option<PathBuf>,
    },
}

impl Commands {
    pub async fn execute(self, config: LatchConfig, state_dir: PathBuf) -> Result<()> {
        match self {
            Commands::Login {
                access_token,
                refresh_token,
                email,
            } => {
                let (store, api) = open_session(&config, &state_dir).await?;
                store.dispatch(Action::login(access_token, refresh_token)).await;
                if let Some(email) = email {
                    store.dispatch(Action::SetUser(UserState::new(email))).await;
                }
                info!("Logged in");
                println!("Logged in to {}", api.client().base_url());
                Ok(())
            }
            Commands::Logout => {
                let (store, _) = open_session(&config, &state_dir).await?;
                store.dispatch(Action::LogOut).await;
                println!("Logged out");
                Ok(())
            }
            Commands::Status => {
                let (store, api) = open_session(&config, &state_dir).await?;
                let state = store.get_state().await;
                println!("Base URL:      {}", api.client().base_url());
                println!("Authenticated: {}", state.auth.is_auth);
                println!(
                    "Refresh token: {}",
                    if state.auth.refresh_token.is_some() {
                        "present"
                    } else {
                        "absent"
                    }
                );
                if !state.user.email.is_empty() {
                    println!("User:          {}", state.user.email);
                }
                Ok(())
            }
            Commands::Get { url } => {
                let (_, api) = open_session(&config, &state_dir).await?;
                let data = api.get_data(&url).await?;
                print_json(&data)
            }
            Commands::Send { url, method, data } => {
                let method = Method::from_bytes(method.to_uppercase().as_bytes())
                    .with_context(|| format!("Invalid HTTP method: {method}"))?;
                let body = data
                    .map(|raw| serde_json::from_str::<Value>(&raw))
                    .transpose()
                    .context("--data is not valid JSON")?;
                let (_, api) = open_session(&config, &state_dir).await?;
                let response = api.send_data(&url, body, method).await?;
                print_json(&response)
            }
            Commands::Purge => {
                let (store, _) = open_session(&config, &state_dir).await?;
                store.purge().await?;
                println!("Removed persisted state from {}", state_dir.display());
                Ok(())
            }
            Commands::Config { command } => command.execute(&state_dir),
        }
    }
}

/// Rehydrate the store from `state_dir` and bind the request API to it
async fn open_session(
    config: &LatchConfig,
    state_dir: &Path,
) -> Result<(Arc<Store>, RequestApi)> {
    let storage = FileStorage::new(state_dir);
    let persistor = Persistor::new(config.persist.clone(), Arc::new(storage));
    let store = Arc::new(
        Store::builder()
            .middleware(RequestApi::middleware())
            .persistor(persistor)
            .build()
            .await?,
    );
    let api = RequestApi::from_config(config, store.clone())?;
    Ok((store, api))
}

impl ConfigCommands {
    pub fn execute(self, state_dir: &Path) -> Result<()> {
        match self {
            ConfigCommands::Init { output } => {
                let config_path = output.unwrap_or_else(|| config::default_config_path(state_dir));

                // Create parent directory if it doesn't exist
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                config::generate_default_config(&config_path)?;
                println!("Generated configuration at: {}", config_path.display());
                Ok(())
            }
        }
    }
}

fn print_json(value: &Value) -> Result<()> {
    match value {
        Value::Null => {}
        Value::String(text) => println!("{text}"),
        other => println!("{}", serde_json::to_string_pretty(other)?),
    }
    Ok(())
}
