//! GetWVKeys moderation bot
//!
//! Keeps GetWVKeys accounts in line with Discord community membership,
//! serves moderator commands, and applies quarantine pushes from the
//! account service.

mod bridge;
mod commands;
mod config;
mod errors;
mod gateway;
mod handlers;
mod health;
mod moderation;
mod quarantine;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use serenity::model::gateway::GatewayIntents;
use serenity::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wvkeys_rpc::{RpcClient, Transport};

use crate::bridge::ModerationBridge;
use crate::config::Config;
use crate::gateway::SerenityGateway;
use crate::handlers::Handler;
use crate::health::AppState;

/// GetWVKeys moderation bot CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/wvkeys-bot.toml")]
    config: String,

    /// Account service transport URI (overrides config file)
    #[arg(long, env = "WVKEYS_TRANSPORT_URI")]
    transport_uri: Option<String>,

    /// Discord bot token (overrides config file)
    #[arg(long, env = "DISCORD_BOT_TOKEN")]
    bot_token: Option<String>,

    /// Command prefix (overrides config file)
    #[arg(long, env = "DISCORD_COMMAND_PREFIX")]
    prefix: Option<String>,

    /// Health check server port
    #[arg(long, env = "HEALTH_CHECK_PORT", default_value = "3001")]
    health_port: u16,

    /// Also write daily-rotated logs to this directory
    #[arg(long, env = "WVKEYS_LOG_DIR")]
    log_dir: Option<String>,

    /// Development mode
    #[arg(long, env = "DEVELOPMENT")]
    development: bool,
}

fn init_tracing(log_dir: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wvkeys_bot=debug,wvkeys_rpc=debug,info".into());

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "wvkeys-bot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();
    let _log_guard = init_tracing(args.log_dir.as_deref());

    info!("Starting GetWVKeys moderation bot");
    if args.development {
        warn!("RUNNING IN DEVELOPMENT MODE");
    }

    // Load configuration
    let mut config = if std::path::Path::new(&args.config).exists() {
        info!("Loading config from file: {}", args.config);
        Config::from_file(&args.config)?
    } else {
        info!("Config file not found, loading from environment");
        Config::from_env()?
    };

    if let Some(uri) = args.transport_uri {
        config.rpc.transport_uri = uri;
    }
    if let Some(bot_token) = args.bot_token {
        config.discord.bot_token = bot_token;
    }
    if let Some(prefix) = args.prefix {
        config.discord.command_prefix = prefix;
    }

    // Connect to the account service
    let transport_kind = config.rpc.transport_kind()?;
    info!(
        "Connecting to account service over {} (timeout {:?})",
        transport_kind,
        config.rpc.request_timeout()
    );
    let rpc = RpcClient::connect(&config.rpc).await?;
    info!("Connected to account service over {}", rpc.transport().kind());

    // Sweep entries whose caller vanished without releasing them.
    let registry = rpc.registry().clone();
    let stale_after = config.rpc.request_timeout() * 2;
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(stale_after);
        loop {
            tick.tick().await;
            let purged = registry.purge_stale(stale_after);
            if purged > 0 {
                warn!(purged, "Purged stale pending requests");
            }
        }
    });

    // Build serenity client
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MODERATION
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord.bot_token, intents)
        .event_handler(Handler)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Discord client: {}", e))?;

    let gateway = Arc::new(SerenityGateway::new(client.http.clone()));
    let health_state = AppState::new(transport_kind, rpc.registry().clone());
    let bridge = Arc::new(ModerationBridge::new(config.discord, rpc, gateway));

    // Insert bridge and health state into client data
    {
        let mut data = client.data.write().await;
        data.insert::<ModerationBridge>(bridge);
        data.insert::<AppState>(health_state.clone());
    }

    // Start health check server
    let health_port = args.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::start_health_server(health_state, health_port).await {
            error!("Health server error: {}", e);
        }
    });

    // Graceful shutdown: close all shards on SIGTERM or Ctrl+C.
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    tokio::signal::ctrl_c().await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
        }
        info!("Shutdown signal received, stopping Discord client...");
        shard_manager.shutdown_all().await;
    });

    info!("Starting Discord gateway connection...");

    // Start the Discord client (blocks until all shards are stopped)
    client
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Discord client error: {}", e))?;

    info!("Discord bot stopped");
    Ok(())
}
