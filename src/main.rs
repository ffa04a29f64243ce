//! Referral Gate Bot - Main Entry Point
//!
//! A Telegram bot that checks channel subscriptions, hands out referral
//! links and unlocks a private channel once enough friends have joined.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use referral_gate_bot::commands::EventHandler;
use referral_gate_bot::config::{BotSettings, ReferralConfig};
use referral_gate_bot::dispatcher::{PollerMessage, UpdatePoller};
use referral_gate_bot::referral::ReferralEngine;
use referral_gate_bot::registry::UserRegistry;
use referral_gate_bot::telegram::{BotApiClient, Platform, UpdateSource};

/// Telegram bot that unlocks a private channel for referrals.
#[derive(Parser, Debug)]
#[command(name = "referral_bot")]
#[command(about = "Gate a private channel behind channel subscriptions and referrals")]
#[command(version)]
struct Args {
    /// Path to the referral JSON configuration file.
    #[arg(short, long, default_value = "referral.json")]
    config: String,

    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Generate an example configuration file and exit.
    #[arg(long)]
    generate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    if args.generate_config {
        return generate_example_config();
    }

    if let Err(e) = dotenvy::from_filename(&args.env_file) {
        debug!("Could not load .env file ({}): {}", args.env_file, e);
    }

    let settings = BotSettings::from_env().context("Failed to load bot settings from environment")?;
    debug!("Settings: {:?}", settings);

    let mut referral_config = ReferralConfig::load_from_file(&args.config)
        .context("Failed to load referral configuration")?;

    let client = Arc::new(
        BotApiClient::new(
            &settings.bot_token,
            settings.send_interval(),
            settings.poll_timeout(),
        )
        .context("Failed to create Bot API client")?,
    );

    let me = client.get_me().await.context("Failed to authorize with the Bot API")?;
    if let Some(username) = &me.username {
        referral_config.resolve_entrypoint(username);
    }

    let registry = Arc::new(
        UserRegistry::open(&settings.database_path)
            .await
            .context("Failed to open user registry")?,
    );

    let engine = Arc::new(
        ReferralEngine::new(
            referral_config,
            Arc::clone(&registry),
            Arc::clone(&client) as Arc<dyn Platform>,
        )
        .context("Referral configuration validation failed")?,
    );

    let stats = registry.stats(engine.threshold()).await;
    info!(
        "Loaded {} users ({} verified, {} unlocked); {} channel(s) required, {} invites to unlock",
        stats.users,
        stats.verified,
        stats.unlocked,
        engine.required_channels().len(),
        engine.threshold()
    );

    let handler = Arc::new(EventHandler::new(
        Arc::clone(&engine),
        Arc::clone(&client) as Arc<dyn Platform>,
    ));
    let poller = UpdatePoller::new(
        Arc::clone(&client) as Arc<dyn UpdateSource>,
        handler,
        me.username.clone(),
        settings.poll_timeout(),
    );

    let (poller_tx, poller_rx) = mpsc::channel::<PollerMessage>(1);

    info!("Starting referral bot...");
    let poller_handle = tokio::spawn(async move {
        poller.run(poller_rx).await;
    });

    info!("Bot is running. Use Ctrl+C to stop.");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }

    info!("Shutting down...");
    let _ = poller_tx.send(PollerMessage::Shutdown).await;
    if let Err(e) = poller_handle.await {
        error!("Update poller task failed: {}", e);
    }

    registry.close().await.context("Failed to save user registry")?;

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Generates an example configuration file.
fn generate_example_config() -> Result<()> {
    let example = ReferralConfig::example();
    example.save_to_file("referral.example.json")?;

    println!("✓ Example configuration written to: referral.example.json");
    println!("\nTo use this bot:");
    println!("1. Copy referral.example.json to referral.json");
    println!("2. List your channels and the private invite link");
    println!("3. Create a .env file with BOT_TOKEN");
    println!("4. Make the bot an administrator of every required channel");
    println!("5. Run: referral_bot");

    Ok(())
}
