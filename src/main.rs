//! now-playing - music context for chat prompts
//!
//! Reads what you are listening to on Spotify or YouTube Music, injects it
//! into the chat host's prompt, and exposes music function tools.

mod api;
mod auth;
mod commands;
mod config;
mod extension;
mod host;
mod inject;
mod models;
mod settings;
mod tools;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::Session;
use crate::config::Config;
use crate::models::ProviderKind;

#[derive(Parser)]
#[command(name = "now-playing")]
#[command(about = "Inject now-playing music context into chat prompts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Music provider
    #[arg(short, long, global = true, value_enum, default_value_t = ProviderKind::Spotify)]
    provider: ProviderKind,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in (Spotify: prints the authorization URL; YouTube Music: stores a cookie)
    Login {
        /// YouTube Music cookie header value
        #[arg(long, conflicts_with = "cookie_file")]
        cookie: Option<String>,

        /// File containing the YouTube Music cookie
        #[arg(long)]
        cookie_file: Option<PathBuf>,
    },

    /// Complete a Spotify login with the URL you were redirected to
    Callback {
        /// Redirect URL including its query string
        url: String,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show authentication and injection status
    Status,

    /// Show what is playing
    Now,

    /// Inject the current track into the prompt once
    Inject,

    /// Keep the injected prompt up to date until Ctrl-C
    Watch {
        /// Seconds between updates (default from config)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// List or call function tools
    Tools {
        #[command(subcommand)]
        command: ToolsCommand,
    },

    /// Show or change extension settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
}

#[derive(Subcommand)]
enum ToolsCommand {
    /// List tools and whether they are active
    List,

    /// Call a tool as the model would
    Call {
        /// Tool name, e.g. SpotifySearchTracks
        name: String,

        /// Arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
    },
}

#[derive(Subcommand)]
enum SettingsCommand {
    /// Show current settings
    Show,

    /// Set one setting
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let session = Session::open(cli.provider, &config_path)?;

    match cli.command {
        Commands::Login {
            cookie,
            cookie_file,
        } => {
            tracing::info!("Starting {} login...", cli.provider);
            session.login(cookie, cookie_file).await?;
        }
        Commands::Callback { url } => {
            session.callback(&url).await?;
        }
        Commands::Logout => {
            session.logout()?;
        }
        Commands::Status => {
            session.status().await?;
        }
        Commands::Now => {
            session.now().await?;
        }
        Commands::Inject => {
            session.inject().await?;
        }
        Commands::Watch { interval } => {
            session.watch(interval).await?;
        }
        Commands::Tools { command } => match command {
            ToolsCommand::List => session.tools_list().await?,
            ToolsCommand::Call { name, args } => {
                session.tools_call(&name, args.as_deref()).await?;
            }
        },
        Commands::Settings { command } => match command {
            SettingsCommand::Show => session.settings_show()?,
            SettingsCommand::Set { key, value } => session.settings_set(&key, &value)?,
        },
    }

    Ok(())
}
