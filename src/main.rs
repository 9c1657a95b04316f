//! Main entry point for the docchat CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docchat::cli::commands::{self, ChatArgs, Commands};
use docchat::AppConfig;

/// docchat - chat with documents kept in Azure Blob Storage
#[derive(Parser, Debug)]
#[command(name = "docchat", version, about, long_about = None)]
struct Args {
    /// Load configuration from a JSON file instead of the environment
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}={}", env!("CARGO_CRATE_NAME"), log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = args.config.as_ref();

    match args.command {
        Some(Commands::Upload { path, recursive }) => {
            commands::handle_upload(&load_config(config_path)?, path, recursive).await?;
        }
        Some(Commands::List) => {
            commands::handle_list(&load_config(config_path)?).await?;
        }
        Some(Commands::Read { name }) => {
            commands::handle_read(&load_config(config_path)?, name).await?;
        }
        Some(Commands::Chat {
            input,
            deployment,
            temperature,
            max_tokens,
            instructed,
            preamble,
            translate_to,
        }) => {
            let chat = ChatArgs {
                input,
                deployment,
                temperature,
                max_tokens,
                instructed,
                preamble,
                translate_to,
            };
            commands::handle_chat(&load_config(config_path)?, chat).await?;
        }
        Some(Commands::Translate { text, to }) => {
            commands::handle_translate(&load_config(config_path)?, text, to).await?;
        }
        Some(Commands::Cost {
            prompt_tokens,
            completion_tokens,
            total_tokens,
            deployment,
        }) => {
            let config = match load_config(config_path) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("No configuration ({}); using built-in rates", e);
                    None
                }
            };
            commands::handle_cost(config.as_ref(), prompt_tokens, completion_tokens, total_tokens, deployment)?;
        }
        Some(Commands::Languages) => {
            commands::handle_languages();
        }
        Some(Commands::Server { host, port }) => {
            commands::handle_server(load_config(config_path)?, host, port).await?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
