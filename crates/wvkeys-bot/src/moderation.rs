//! Keeps account state in line with community membership.

use std::sync::Arc;

use tracing::{error, info};

use crate::bridge::Rpc;
use crate::config::DiscordBotConfig;
use crate::errors;
use crate::gateway::{ModerationGateway, UserInfo};

/// A membership change observed in a guild.
///
/// Roles are `None` when the cache did not know the member.
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    Banned {
        guild_id: u64,
        user: UserInfo,
        roles: Option<Vec<u64>>,
    },
    Removed {
        guild_id: u64,
        user: UserInfo,
        roles: Option<Vec<u64>>,
    },
    RolesChanged {
        guild_id: u64,
        user: UserInfo,
        old_roles: Option<Vec<u64>>,
        new_roles: Vec<u64>,
    },
}

impl MembershipEvent {
    fn guild_id(&self) -> u64 {
        match self {
            Self::Banned { guild_id, .. }
            | Self::Removed { guild_id, .. }
            | Self::RolesChanged { guild_id, .. } => *guild_id,
        }
    }

    fn user(&self) -> &UserInfo {
        match self {
            Self::Banned { user, .. }
            | Self::Removed { user, .. }
            | Self::RolesChanged { user, .. } => user,
        }
    }
}

/// What to do with the account, and the word the audit line uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountChange {
    Disable(&'static str),
    Enable(&'static str),
}

impl AccountChange {
    fn success_line(self, user: &UserInfo) -> String {
        match self {
            Self::Disable(verb) => format!(
                "User {} (`{}`) was {}, their account has been disabled.",
                user.tag, user.id, verb
            ),
            Self::Enable(verb) => format!(
                "User {} (`{}`) was {}, their account has been enabled.",
                user.tag, user.id, verb
            ),
        }
    }

    fn failure_line(self, user: &UserInfo) -> String {
        let action = match self {
            Self::Disable(_) => "disable",
            Self::Enable(_) => "enable",
        };
        format!(
            "An error occurred while trying to {} user {} (`{}`).",
            action, user.tag, user.id
        )
    }
}

/// Decide the account change for `event`, if any.
pub fn plan(config: &DiscordBotConfig, event: &MembershipEvent) -> Option<AccountChange> {
    if event.user().bot || event.guild_id() != config.guild_id {
        return None;
    }
    let verified = |roles: &[u64]| roles.contains(&config.verified_role);

    match event {
        MembershipEvent::Banned { roles, .. } => roles
            .as_deref()
            .map_or(true, verified)
            .then_some(AccountChange::Disable("banned")),
        MembershipEvent::Removed { roles, .. } => roles
            .as_deref()
            .map_or(true, verified)
            .then_some(AccountChange::Disable("removed")),
        MembershipEvent::RolesChanged {
            old_roles,
            new_roles,
            ..
        } => {
            let now = verified(new_roles.as_slice());
            match old_roles.as_deref().map(verified) {
                Some(before) if before == now => None,
                _ if now => Some(AccountChange::Enable("verified")),
                _ => Some(AccountChange::Disable("unverified")),
            }
        }
    }
}

pub struct Moderator {
    gateway: Arc<dyn ModerationGateway>,
    rpc: Rpc,
    config: Arc<DiscordBotConfig>,
}

impl Moderator {
    pub fn new(
        gateway: Arc<dyn ModerationGateway>,
        rpc: Rpc,
        config: Arc<DiscordBotConfig>,
    ) -> Self {
        Self {
            gateway,
            rpc,
            config,
        }
    }

    /// Apply the planned change and report it to the log channel.
    /// Failures are logged and reported, never returned.
    pub async fn handle(&self, event: MembershipEvent) {
        let Some(change) = plan(&self.config, &event) else {
            return;
        };
        let user = event.user();
        info!(user_id = user.id, change = ?change, "Membership change");

        let result = match change {
            AccountChange::Disable(_) => self.rpc.disable_user(user.id).await,
            AccountChange::Enable(_) => self.rpc.enable_user(user.id).await,
        };

        let line = match result {
            Ok(_) => change.success_line(user),
            Err(e) => {
                error!(user_id = user.id, error = %e, "Failed to apply {:?}", change);
                change.failure_line(user)
            }
        };

        if let Err(e) = self
            .gateway
            .send_message(self.config.log_channel_id, &line)
            .await
        {
            errors::log_error("moderation.log", "Failed to post to log channel", &e);
        }
    }
}
