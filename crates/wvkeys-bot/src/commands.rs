//! Prefix commands for moderators and the community.

#[cfg(test)]
#[path = "commands_tests.rs"]
mod commands_tests;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};
use wvkeys_rpc::RpcError;
use wvkeys_types::{FlagAction, SearchResults, UserFlag};

use crate::bridge::Rpc;
use crate::config::DiscordBotConfig;
use crate::errors::{self, describe_rpc_error};
use crate::gateway::{Embed, MessageRef, ModerationGateway, UserInfo};

pub const SYNC_COOLDOWN: Duration = Duration::from_secs(3600);
pub const MIN_SEARCH_QUERY_LEN: usize = 32;
const EMBED_FIELD_LIMIT: usize = 1024;
const SEARCH_EMBED_COLOUR: u32 = 0x2f_3136;

const MISSING_ARGUMENT: &str =
    "You are missing a required argument. Please check the command's syntax.";
const BAD_ARGUMENT: &str = "Please check the argument you provided. It is invalid.";
const NOT_ADMIN: &str = "You're not elite enough, try harder.";

/// A message that might be a command, with what we know about its author.
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub message_id: u64,
    pub author: UserInfo,
    pub author_roles: Vec<u64>,
    pub content: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Sync,
    UserCount,
    KeyCount,
    Search(String),
    DisableUser(u64),
    EnableUser(u64),
    ResetApiKey(u64),
    Flags,
    UpdateFlags {
        user_id: u64,
        action: String,
        flag: String,
    },
}

impl Command {
    fn requires_admin(&self) -> bool {
        matches!(
            self,
            Self::Sync
                | Self::DisableUser(_)
                | Self::EnableUser(_)
                | Self::ResetApiKey(_)
                | Self::UpdateFlags { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    MissingArgument,
    BadArgument,
    Unknown(String),
}

/// Parse a `<@id>`, `<@!id>` or bare id.
pub fn parse_user(arg: &str) -> Result<u64, ParseError> {
    let id = arg
        .strip_prefix("<@")
        .and_then(|s| s.strip_suffix('>'))
        .map(|s| s.trim_start_matches('!'))
        .unwrap_or(arg);
    id.parse::<u64>().map_err(|_| ParseError::BadArgument)
}

/// Parse the text after the prefix.
pub fn parse_command(body: &str) -> Result<Command, ParseError> {
    let mut words = body.split_whitespace();
    let name = words.next().unwrap_or_default();
    let mut arg = || words.next().ok_or(ParseError::MissingArgument);

    let command = match name {
        "ping" => Command::Ping,
        "sync" => Command::Sync,
        "usercount" => Command::UserCount,
        "keycount" => Command::KeyCount,
        "search" => Command::Search(arg()?.to_string()),
        "disable_user" => Command::DisableUser(parse_user(arg()?)?),
        "enable_user" => Command::EnableUser(parse_user(arg()?)?),
        "reset_api_key" => Command::ResetApiKey(parse_user(arg()?)?),
        "flags" => Command::Flags,
        "update_flags" => {
            let user_id = parse_user(arg()?)?;
            Command::UpdateFlags {
                user_id,
                action: arg()?.to_string(),
                flag: arg()?.to_string(),
            }
        }
        other => return Err(ParseError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn flag_list() -> String {
    UserFlag::names()
        .into_iter()
        .map(|name| format!("``{}``", name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build the embed for a non-empty search result.
///
/// Keys are listed one per line until the field would pass Discord's
/// 1024 character limit; the footer counts what was left out. A first key
/// longer than the limit is cut short rather than dropped.
pub fn render_search_embed(query: &str, results: &SearchResults) -> Embed {
    let count = results.keys.len();
    let mut embed = Embed::new(format!("Search Results for '{}'", query))
        .description(format!(
            "Found **{}** result{}",
            count,
            if count > 1 { "s" } else { "" }
        ))
        .colour(SEARCH_EMBED_COLOUR);

    let mut field = String::new();
    let mut width = 0;
    let mut included = 0;
    for entry in &results.keys {
        let line = format!("{}\n", entry.key);
        let line_width = line.chars().count();
        if width + line_width > EMBED_FIELD_LIMIT {
            warn!(
                kid = results.kid.as_deref().unwrap_or_default(),
                "Search results exceed the embed field limit"
            );
            if included == 0 {
                field = truncate_chars(&entry.key, EMBED_FIELD_LIMIT);
                included = 1;
            }
            if count > included {
                embed = embed.footer(format!("{} keys were omitted.", count - included));
            }
            break;
        }
        field.push_str(&line);
        width += line_width;
        included += 1;
    }
    embed.field("Results", field, false)
}

/// At most `limit` characters of `text`, ending in an ellipsis when cut.
fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(limit - 1).collect();
    cut.push('…');
    cut
}

/// An admin action against one account.
#[derive(Debug, Clone, Copy)]
enum AccountCommand {
    Disable,
    Enable,
    ResetApiKey,
    UpdateFlags(FlagAction, UserFlag),
}

impl AccountCommand {
    async fn send(self, rpc: &Rpc, user_id: u64) -> Result<(), RpcError> {
        let reply = match self {
            Self::Disable => rpc.disable_user(user_id).await,
            Self::Enable => rpc.enable_user(user_id).await,
            Self::ResetApiKey => rpc.reset_api_key(user_id).await,
            Self::UpdateFlags(action, flag) => rpc.update_permissions(user_id, action, flag).await,
        };
        reply.map(|_| ())
    }

    fn audit_line(self, user: &UserInfo, admin: &UserInfo) -> String {
        match self {
            Self::Disable | Self::Enable => format!(
                "User {} (`{}`) was {} by {} (`{}`)",
                user.tag,
                user.id,
                self.past_tense(),
                admin.tag,
                admin.id
            ),
            Self::ResetApiKey => format!(
                "API Key for {} (`{}`) was reset by {} (`{}`)",
                user.tag, user.id, admin.tag, admin.id
            ),
            Self::UpdateFlags(action, flag) => format!(
                "Permissions for {} (`{}`) were updated by {} (`{}`). {} {}",
                user.tag, user.id, admin.tag, admin.id, action, flag
            ),
        }
    }

    fn done_line(self, user: &UserInfo) -> String {
        match self {
            Self::Disable | Self::Enable => {
                format!("User {} (`{}`) was {}.", user.tag, user.id, self.past_tense())
            }
            Self::ResetApiKey => format!("API Key for {} (`{}`) was reset.", user.tag, user.id),
            Self::UpdateFlags(..) => {
                format!("Permissions for {} (`{}`) were updated.", user.tag, user.id)
            }
        }
    }

    fn failure_line(self, reason: &str) -> String {
        let what = match self {
            Self::Disable => "disabling user",
            Self::Enable => "enabling user",
            Self::ResetApiKey => "resetting user API Key",
            Self::UpdateFlags(..) => "updating user permissions",
        };
        format!("An error occurred while {}: {}", what, reason)
    }

    fn past_tense(self) -> &'static str {
        match self {
            Self::Disable => "disabled",
            _ => "enabled",
        }
    }
}

pub struct CommandRunner {
    gateway: Arc<dyn ModerationGateway>,
    rpc: Rpc,
    config: Arc<DiscordBotConfig>,
    sync_cooldowns: Mutex<HashMap<u64, Instant>>,
}

impl CommandRunner {
    pub fn new(
        gateway: Arc<dyn ModerationGateway>,
        rpc: Rpc,
        config: Arc<DiscordBotConfig>,
    ) -> Self {
        Self {
            gateway,
            rpc,
            config,
            sync_cooldowns: Mutex::new(HashMap::new()),
        }
    }

    /// `None` when `content` does not start with the command prefix.
    pub fn parse(&self, content: &str) -> Option<Result<Command, ParseError>> {
        content
            .strip_prefix(self.config.command_prefix.as_str())
            .map(parse_command)
    }

    pub async fn run(&self, inv: &Invocation<'_>, parsed: Result<Command, ParseError>) {
        let command = match parsed {
            Ok(command) => command,
            Err(ParseError::MissingArgument) => {
                self.reply(inv, MISSING_ARGUMENT).await;
                return;
            }
            Err(ParseError::BadArgument) => {
                self.reply(inv, BAD_ARGUMENT).await;
                return;
            }
            Err(ParseError::Unknown(_)) => return,
        };

        if command.requires_admin() && !self.config.is_admin(inv.author.id, &inv.author_roles) {
            info!(user_id = inv.author.id, ?command, "Refused admin command");
            self.reply(inv, NOT_ADMIN).await;
            return;
        }

        match command {
            Command::Ping => self.ping(inv).await,
            Command::Sync => self.sync(inv).await,
            Command::UserCount => self.user_count(inv).await,
            Command::KeyCount => self.key_count(inv).await,
            Command::Search(query) => self.search(inv, &query).await,
            Command::DisableUser(user_id) => {
                self.account(inv, user_id, AccountCommand::Disable).await
            }
            Command::EnableUser(user_id) => {
                self.account(inv, user_id, AccountCommand::Enable).await
            }
            Command::ResetApiKey(user_id) => {
                self.account(inv, user_id, AccountCommand::ResetApiKey).await
            }
            Command::Flags => {
                self.reply(inv, &format!("Valid user flags:\n{}", flag_list()))
                    .await;
            }
            Command::UpdateFlags {
                user_id,
                action,
                flag,
            } => {
                let Ok(action) = FlagAction::from_str(&action) else {
                    self.reply(inv, "Invalid action! Valid actions are ``add``, ``remove``")
                        .await;
                    return;
                };
                let Ok(flag) = UserFlag::from_str(&flag) else {
                    self.reply(
                        inv,
                        &format!("Invalid User Flag! Valid flags are {}", flag_list()),
                    )
                    .await;
                    return;
                };
                self.account(inv, user_id, AccountCommand::UpdateFlags(action, flag))
                    .await
            }
        }
    }

    async fn reply(&self, inv: &Invocation<'_>, content: &str) -> Option<MessageRef> {
        match self
            .gateway
            .reply(inv.channel_id, inv.message_id, content)
            .await
        {
            Ok(sent) => Some(sent),
            Err(e) => {
                errors::log_error("command.reply", "Failed to reply", &e);
                None
            }
        }
    }

    async fn edit(&self, message: MessageRef, content: &str, embed: Option<&Embed>) {
        if let Err(e) = self.gateway.edit_message(message, content, embed).await {
            errors::log_error("command.edit", "Failed to edit reply", &e);
        }
    }

    async fn ping(&self, inv: &Invocation<'_>) {
        let started = Instant::now();
        if let Some(sent) = self.reply(inv, "Pong!").await {
            let ms = started.elapsed().as_millis();
            self.edit(sent, &format!("Pong! {}ms", ms), None).await;
        }
    }

    /// Seconds left on the guild's sync cooldown, or `None` after starting a new one.
    fn take_sync_slot(&self, guild_id: u64) -> Option<u64> {
        let now = Instant::now();
        let mut cooldowns = self.sync_cooldowns.lock().unwrap();
        if let Some(last) = cooldowns.get(&guild_id) {
            let elapsed = now.duration_since(*last);
            if elapsed < SYNC_COOLDOWN {
                return Some((SYNC_COOLDOWN - elapsed).as_secs_f64().round() as u64);
            }
        }
        cooldowns.insert(guild_id, now);
        None
    }

    async fn sync(&self, inv: &Invocation<'_>) {
        let Some(guild_id) = inv.guild_id else {
            self.reply(inv, "This command can only be used in a server.")
                .await;
            return;
        };
        if let Some(remaining) = self.take_sync_slot(guild_id) {
            self.reply(
                inv,
                &format!(
                    "You are on cooldown. Please wait {} seconds before using this command again.",
                    remaining
                ),
            )
            .await;
            return;
        }

        let Some(notice) = self
            .reply(
                inv,
                "Syncing the banned users with the database might take a while. Please be patient.",
            )
            .await
        else {
            return;
        };

        let outcome = match self.gateway.guild_bans(guild_id).await {
            Ok(bans) => {
                let count = bans.len();
                self.rpc
                    .disable_users(bans)
                    .await
                    .map(|_| count)
                    .map_err(|e| describe_rpc_error(&e))
            }
            Err(e) => Err(e.to_string()),
        };

        let line = match outcome {
            Ok(count) => {
                info!(guild_id, count, "Synced guild bans");
                format!("{} guild bans have been synced with the database.", count)
            }
            Err(reason) => {
                error!(guild_id, error = %reason, "Failed to sync guild bans");
                format!("An error occurred while syncing the guild bans: {}", reason)
            }
        };
        if let Err(e) = self
            .gateway
            .reply(notice.channel_id, notice.message_id, &line)
            .await
        {
            errors::log_error("command.sync", "Failed to report sync result", &e);
        }
    }

    async fn user_count(&self, inv: &Invocation<'_>) {
        let line = match self.rpc.user_count().await {
            Ok(count) => format!("There are currently {} users in the database.", count),
            Err(e) => {
                error!(error = %e, "Failed to fetch user count");
                format!(
                    "An error occurred while fetching the user count: {}",
                    describe_rpc_error(&e)
                )
            }
        };
        self.reply(inv, &line).await;
    }

    async fn key_count(&self, inv: &Invocation<'_>) {
        let line = match self.rpc.key_count().await {
            Ok(count) => format!("There are currently {} keys in the database.", count),
            Err(e) => {
                error!(error = %e, "Failed to fetch key count");
                format!(
                    "An error occurred while fetching the key count: {}",
                    describe_rpc_error(&e)
                )
            }
        };
        self.reply(inv, &line).await;
    }

    async fn search(&self, inv: &Invocation<'_>, query: &str) {
        if query.chars().count() < MIN_SEARCH_QUERY_LEN {
            self.reply(inv, "Sorry, your query is not valid.").await;
            return;
        }
        let Some(status) = self.reply(inv, "Searching...").await else {
            return;
        };

        match self.rpc.search(query).await {
            Ok(None) => {
                self.edit(
                    status,
                    "The response was null. Please report this to the developers.",
                    None,
                )
                .await
            }
            Ok(Some(results)) if results.is_empty() => {
                self.edit(status, "There were no results. sadface.", None)
                    .await
            }
            Ok(Some(results)) => {
                let embed = render_search_embed(query, &results);
                self.edit(status, "", Some(&embed)).await
            }
            Err(e) => {
                error!(error = %e, "Search failed");
                self.edit(
                    status,
                    &format!("An error occurred while searching: {}", describe_rpc_error(&e)),
                    None,
                )
                .await
            }
        }
    }

    async fn account(&self, inv: &Invocation<'_>, user_id: u64, command: AccountCommand) {
        let user = match self.gateway.fetch_user(user_id).await {
            Ok(user) => user,
            Err(e) => {
                errors::log_error("command.fetch_user", "Failed to resolve user", &e);
                self.reply(inv, BAD_ARGUMENT).await;
                return;
            }
        };

        if let Err(e) = command.send(&self.rpc, user.id).await {
            error!(user_id = user.id, error = %e, "{:?} failed", command);
            self.reply(inv, &command.failure_line(&describe_rpc_error(&e)))
                .await;
            return;
        }

        info!(user_id = user.id, admin_id = inv.author.id, "{:?} applied", command);
        if let Err(e) = self
            .gateway
            .send_message(
                self.config.log_channel_id,
                &command.audit_line(&user, &inv.author),
            )
            .await
        {
            errors::log_error("command.audit", "Failed to post to log channel", &e);
        }
        self.reply(inv, &command.done_line(&user)).await;
    }
}
