//! Handles `QUARANTINE` pushes from the account service.
//!
//! The member is moved from the verified role to the sus role, the action
//! is recorded in the quarantine log, and a private thread is opened in the
//! interrogation room for the member and the moderators.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};
use wvkeys_rpc::InboundHandler;
use wvkeys_types::{OpCode, QuarantineDirective};

use crate::config::DiscordBotConfig;
use crate::errors;
use crate::gateway::{Embed, ModerationGateway};

const QUARANTINE_COLOUR: u32 = 0xe7_4c3c;

pub struct QuarantineHandler {
    gateway: Arc<dyn ModerationGateway>,
    config: Arc<DiscordBotConfig>,
}

impl QuarantineHandler {
    pub fn new(gateway: Arc<dyn ModerationGateway>, config: Arc<DiscordBotConfig>) -> Self {
        Self { gateway, config }
    }

    pub async fn quarantine(&self, directive: &QuarantineDirective) -> anyhow::Result<()> {
        let guild_id = self.config.guild_id;
        let user_id = directive.user_id;

        let roles = self
            .gateway
            .fetch_member_roles(guild_id, user_id)
            .await
            .with_context(|| format!("Failed to look up member {}", user_id))?;
        if roles.is_none() {
            warn!(user_id, "Quarantine target is not a member, skipping");
            return Ok(());
        }

        let audit_reason = format!("Automatic quarantine: {}", directive.reason);
        self.gateway
            .add_role(guild_id, user_id, self.config.sus_role, &audit_reason)
            .await
            .with_context(|| format!("Failed to add sus role to {}", user_id))?;
        self.gateway
            .remove_role(guild_id, user_id, self.config.verified_role, &audit_reason)
            .await
            .with_context(|| format!("Failed to remove verified role from {}", user_id))?;
        info!(user_id, reason = %directive.reason, "Member quarantined");

        let tag = match self.gateway.fetch_user(user_id).await {
            Ok(user) => user.tag,
            Err(e) => {
                errors::log_error("quarantine.fetch_user", "Failed to resolve user", &e);
                format!("<@{}>", user_id)
            }
        };

        if let Err(e) = self
            .gateway
            .send_embed(
                self.config.quarantine_log_channel_id,
                None,
                &audit_embed(&tag, directive),
            )
            .await
        {
            errors::log_error("quarantine.log", "Failed to post quarantine log", &e);
        }

        self.open_thread(directive).await;
        Ok(())
    }

    async fn open_thread(&self, directive: &QuarantineDirective) {
        let user_id = directive.user_id;
        let thread_id = match self
            .gateway
            .create_private_thread(
                self.config.interrogation_room_channel_id,
                &format!("quarantine-{}", user_id),
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                errors::log_error("quarantine.thread", "Failed to open quarantine thread", &e);
                return;
            }
        };

        let notice = format!(
            "<@&{}> <@{}>\nYour account has been automatically quarantined.\n\
             Reason: {}\nA moderator will review it here.",
            self.config.moderator_role,
            user_id,
            reason_or_default(&directive.reason),
        );
        if let Err(e) = self.gateway.send_message(thread_id, &notice).await {
            errors::log_error("quarantine.notice", "Failed to post quarantine notice", &e);
        }
        if let Err(e) = self.gateway.add_thread_member(thread_id, user_id).await {
            errors::log_error("quarantine.invite", "Failed to add member to thread", &e);
        }
    }
}

fn reason_or_default(reason: &str) -> &str {
    if reason.is_empty() {
        "no reason given"
    } else {
        reason
    }
}

fn audit_embed(tag: &str, directive: &QuarantineDirective) -> Embed {
    let mut embed = Embed::new("User Quarantined")
        .description(format!(
            "{} (`{}`) was quarantined automatically.",
            tag, directive.user_id
        ))
        .colour(QUARANTINE_COLOUR)
        .field("Reason", reason_or_default(&directive.reason), false);
    for (name, value) in [
        ("License URL", &directive.url),
        ("Build Info", &directive.buildinfo),
        ("PSSH", &directive.pssh),
    ] {
        if !value.is_empty() {
            embed = embed.field(name, format!("`{}`", value), false);
        }
    }
    embed
}

#[async_trait]
impl InboundHandler for QuarantineHandler {
    async fn handle(&self, _op: OpCode, payload: Value) -> anyhow::Result<()> {
        let directive: QuarantineDirective =
            serde_json::from_value(payload).context("Malformed quarantine directive")?;
        self.quarantine(&directive).await
    }
}
