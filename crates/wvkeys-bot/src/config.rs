//! Configuration management for wvkeys-bot

#[path = "config_tests.rs"]
mod config_tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use wvkeys_rpc::{ReadEnv, RpcConfig, SystemEnv};

/// Complete bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub discord: DiscordBotConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
}

/// Discord side: token, prefix, and the community's channels and roles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordBotConfig {
    /// Bot token from the Discord developer portal; falls back to
    /// `DISCORD_BOT_TOKEN` when left out of the file
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// The community whose membership drives account state
    pub guild_id: u64,
    /// Audit log for membership moderation and admin commands
    pub log_channel_id: u64,
    pub quarantine_log_channel_id: u64,
    /// Channel in which quarantine threads are opened
    pub interrogation_room_channel_id: u64,
    pub verified_role: u64,
    pub sus_role: u64,
    pub moderator_role: u64,
    #[serde(default)]
    pub admin_users: Vec<u64>,
    #[serde(default)]
    pub admin_roles: Vec<u64>,
}

impl DiscordBotConfig {
    /// Admins are listed by user id or hold one of the admin roles.
    pub fn is_admin(&self, user_id: u64, roles: &[u64]) -> bool {
        self.admin_users.contains(&user_id) || roles.iter().any(|r| self.admin_roles.contains(r))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        Self::from_file_with(path, &SystemEnv)
    }

    pub fn from_file_with<E: ReadEnv>(path: &str, env: &E) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        if config.discord.bot_token.is_empty() {
            config.discord.bot_token = env.var("DISCORD_BOT_TOKEN").unwrap_or_default();
        }

        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(&SystemEnv)
    }

    pub fn from_env_with<E: ReadEnv>(env: &E) -> Result<Self> {
        let bot_token = env
            .var("DISCORD_BOT_TOKEN")
            .context("DISCORD_BOT_TOKEN not set")?;
        let command_prefix = env
            .var("DISCORD_COMMAND_PREFIX")
            .unwrap_or_else(|_| default_command_prefix());

        Ok(Config {
            discord: DiscordBotConfig {
                bot_token,
                command_prefix,
                guild_id: required_id(env, "DISCORD_GUILD_ID")?,
                log_channel_id: required_id(env, "DISCORD_LOG_CHANNEL_ID")?,
                quarantine_log_channel_id: required_id(env, "DISCORD_QUARANTINE_LOG_CHANNEL_ID")?,
                interrogation_room_channel_id: required_id(
                    env,
                    "DISCORD_INTERROGATION_ROOM_CHANNEL_ID",
                )?,
                verified_role: required_id(env, "DISCORD_VERIFIED_ROLE")?,
                sus_role: required_id(env, "DISCORD_SUS_ROLE")?,
                moderator_role: required_id(env, "DISCORD_MODERATOR_ROLE")?,
                admin_users: parse_id_list(&env.var("DISCORD_ADMIN_USERS").unwrap_or_default()),
                admin_roles: parse_id_list(&env.var("DISCORD_ADMIN_ROLES").unwrap_or_default()),
            },
            rpc: RpcConfig::from_env(env),
        })
    }
}

fn default_command_prefix() -> String {
    "wv!".to_string()
}

fn required_id<E: ReadEnv>(env: &E, key: &str) -> Result<u64> {
    let raw = env.var(key).with_context(|| format!("{} not set", key))?;
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("{} is not a valid id: {:?}", key, raw))
}

fn parse_id_list(s: &str) -> Vec<u64> {
    s.split(',')
        .map(|x| x.trim())
        .filter(|x| !x.is_empty())
        .filter_map(|x| x.parse::<u64>().ok())
        .collect()
}
