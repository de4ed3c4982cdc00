//! Serenity event handler implementation

use std::sync::Arc;

use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::event::GuildMemberUpdateEvent;
use serenity::model::gateway::Ready;
use serenity::model::guild::Member;
use serenity::model::id::{GuildId, RoleId};
use serenity::model::user::User;
use serenity::prelude::*;
use tracing::{debug, error, info};

use crate::bridge::ModerationBridge;
use crate::commands::Invocation;
use crate::gateway::UserInfo;
use crate::health::AppState;
use crate::moderation::MembershipEvent;

pub struct Handler;

fn role_ids(roles: &[RoleId]) -> Vec<u64> {
    roles.iter().map(|r| r.get()).collect()
}

async fn bridge(ctx: &Context) -> Option<Arc<ModerationBridge>> {
    let data = ctx.data.read().await;
    let bridge = data.get::<ModerationBridge>().cloned();
    if bridge.is_none() {
        error!("ModerationBridge not found in context data");
    }
    bridge
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("Discord bot connected as {}", ready.user.tag());

        let data = ctx.data.read().await;
        if let Some(state) = data.get::<AppState>() {
            state.set_bot_username(ready.user.tag()).await;
        }
    }

    async fn guild_ban_addition(&self, ctx: Context, guild_id: GuildId, banned_user: User) {
        let Some(bridge) = bridge(&ctx).await else {
            return;
        };

        let roles = ctx
            .cache
            .member(guild_id, banned_user.id)
            .map(|m| role_ids(&m.roles));
        debug!(user_id = banned_user.id.get(), known = roles.is_some(), "Member banned");

        bridge
            .on_membership(MembershipEvent::Banned {
                guild_id: guild_id.get(),
                user: UserInfo::from(&banned_user),
                roles,
            })
            .await;
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        member_data_if_available: Option<Member>,
    ) {
        let Some(bridge) = bridge(&ctx).await else {
            return;
        };

        bridge
            .on_membership(MembershipEvent::Removed {
                guild_id: guild_id.get(),
                user: UserInfo::from(&user),
                roles: member_data_if_available.map(|m| role_ids(&m.roles)),
            })
            .await;
    }

    async fn guild_member_update(
        &self,
        ctx: Context,
        old_if_available: Option<Member>,
        _new: Option<Member>,
        event: GuildMemberUpdateEvent,
    ) {
        let Some(bridge) = bridge(&ctx).await else {
            return;
        };

        bridge
            .on_membership(MembershipEvent::RolesChanged {
                guild_id: event.guild_id.get(),
                user: UserInfo::from(&event.user),
                old_roles: old_if_available.map(|m| role_ids(&m.roles)),
                new_roles: role_ids(&event.roles),
            })
            .await;
    }

    async fn message(&self, ctx: Context, msg: Message) {
        // Skip bot messages
        if msg.author.bot {
            return;
        }

        let Some(bridge) = bridge(&ctx).await else {
            return;
        };

        let invocation = Invocation {
            guild_id: msg.guild_id.map(|g| g.get()),
            channel_id: msg.channel_id.get(),
            message_id: msg.id.get(),
            author: UserInfo::from(&msg.author),
            author_roles: msg
                .member
                .as_ref()
                .map(|m| role_ids(&m.roles))
                .unwrap_or_default(),
            content: &msg.content,
        };

        if bridge.on_message(invocation).await {
            debug!(user_id = msg.author.id.get(), "Handled command");
        }
    }
}
