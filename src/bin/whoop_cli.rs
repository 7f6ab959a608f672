// ABOUTME: whoop-cli - setup and diagnostics tool for the WHOOP MCP server core
// ABOUTME: Handles authorization-code exchange, credential status, and credential removal
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! Usage:
//! ```bash
//! # Show stored credential status (no secrets printed)
//! whoop-cli status
//!
//! # Exchange an authorization code from the OAuth companion service
//! whoop-cli authorize <code>
//!
//! # Remove stored credentials
//! whoop-cli clear
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use whoop_mcp_server::{
    config::ServerConfig,
    logging::{self, LoggingConfig},
    token::{TokenStatus, TokenStore},
};

#[derive(Parser)]
#[command(
    name = "whoop-cli",
    about = "WHOOP MCP server setup CLI",
    long_about = "Manage the encrypted WHOOP credential store: exchange authorization codes, inspect status, and clear credentials."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Show credential status without revealing token values
    Status,
    /// Exchange an authorization code for tokens and persist them
    Authorize {
        /// Authorization code from the OAuth companion service
        code: String,
    },
    /// Delete stored credentials
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging_config = LoggingConfig::from_env();
    if cli.verbose {
        logging_config.level = "debug".into();
    }
    logging::init(&logging_config)?;

    let config = ServerConfig::from_env().context("failed to load configuration")?;
    let http = reqwest::Client::builder()
        .timeout(config.api.request_timeout)
        .build()
        .context("failed to build HTTP client")?;
    let store = TokenStore::new(&config.storage, config.oauth.clone(), http)
        .context("failed to open token store")?;

    match cli.command {
        Command::Status => {
            let status = store.status();
            println!("{}", serde_json::to_string_pretty(&status)?);
            if status.status == TokenStatus::NoTokens {
                println!("No credentials stored. Run `whoop-cli authorize <code>` after completing the OAuth flow.");
            }
        }
        Command::Authorize { code } => match store.exchange_code(&code).await? {
            Some(record) => {
                println!("Authorization complete. Access token valid until {}.", record.expires_at);
            }
            None => {
                anyhow::bail!("authorization failed: the companion service rejected the code (see logs)");
            }
        },
        Command::Clear => {
            store.clear()?;
            println!("Stored credentials removed.");
        }
    }

    Ok(())
}
