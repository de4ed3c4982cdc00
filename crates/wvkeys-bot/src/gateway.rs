//! The Discord operations moderation and commands need, behind a trait so
//! the logic can be driven without a live gateway.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::{
    CreateEmbed, CreateEmbedFooter, CreateMessage, CreateThread, EditMessage,
};
use serenity::http::{Http, UserPagination};
use serenity::model::channel::ChannelType;
use serenity::model::id::{ChannelId, GuildId, MessageId, RoleId, UserId};
use serenity::model::user::User;

use crate::errors;

/// A sent message that can later be edited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: u64,
    pub tag: String,
    pub bot: bool,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.get(),
            tag: user.tag(),
            bot: user.bot,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: String,
    pub description: Option<String>,
    pub colour: Option<u32>,
    pub fields: Vec<EmbedField>,
    pub footer: Option<String>,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn colour(mut self, colour: u32) -> Self {
        self.colour = Some(colour);
        self
    }

    pub fn field(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(text.into());
        self
    }

    fn build(&self) -> CreateEmbed {
        let mut embed = CreateEmbed::new().title(&self.title);
        if let Some(description) = &self.description {
            embed = embed.description(description);
        }
        if let Some(colour) = self.colour {
            embed = embed.colour(colour);
        }
        for field in &self.fields {
            embed = embed.field(&field.name, &field.value, field.inline);
        }
        if let Some(footer) = &self.footer {
            embed = embed.footer(CreateEmbedFooter::new(footer));
        }
        embed
    }
}

#[async_trait]
pub trait ModerationGateway: Send + Sync + 'static {
    async fn send_message(&self, channel_id: u64, content: &str) -> serenity::Result<MessageRef>;

    async fn send_embed(
        &self,
        channel_id: u64,
        content: Option<&str>,
        embed: &Embed,
    ) -> serenity::Result<MessageRef>;

    /// Reply to `message_id` in `channel_id`, quoting it.
    async fn reply(
        &self,
        channel_id: u64,
        message_id: u64,
        content: &str,
    ) -> serenity::Result<MessageRef>;

    async fn edit_message(
        &self,
        message: MessageRef,
        content: &str,
        embed: Option<&Embed>,
    ) -> serenity::Result<()>;

    /// Role ids of a guild member, `None` when they are not a member.
    async fn fetch_member_roles(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> serenity::Result<Option<Vec<u64>>>;

    async fn fetch_user(&self, user_id: u64) -> serenity::Result<UserInfo>;

    async fn add_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> serenity::Result<()>;

    async fn remove_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> serenity::Result<()>;

    /// Returns the new thread's channel id.
    async fn create_private_thread(&self, channel_id: u64, name: &str) -> serenity::Result<u64>;

    async fn add_thread_member(&self, thread_id: u64, user_id: u64) -> serenity::Result<()>;

    /// Ids of every banned user in the guild.
    async fn guild_bans(&self, guild_id: u64) -> serenity::Result<Vec<u64>>;
}

/// [`ModerationGateway`] over serenity's HTTP client.
#[derive(Clone)]
pub struct SerenityGateway {
    http: Arc<Http>,
}

impl SerenityGateway {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn message_ref(msg: &serenity::model::channel::Message) -> MessageRef {
    MessageRef {
        channel_id: msg.channel_id.get(),
        message_id: msg.id.get(),
    }
}

#[async_trait]
impl ModerationGateway for SerenityGateway {
    async fn send_message(&self, channel_id: u64, content: &str) -> serenity::Result<MessageRef> {
        let msg = ChannelId::new(channel_id).say(&*self.http, content).await?;
        Ok(message_ref(&msg))
    }

    async fn send_embed(
        &self,
        channel_id: u64,
        content: Option<&str>,
        embed: &Embed,
    ) -> serenity::Result<MessageRef> {
        let mut builder = CreateMessage::new().embed(embed.build());
        if let Some(content) = content {
            builder = builder.content(content);
        }
        let msg = ChannelId::new(channel_id)
            .send_message(&*self.http, builder)
            .await?;
        Ok(message_ref(&msg))
    }

    async fn reply(
        &self,
        channel_id: u64,
        message_id: u64,
        content: &str,
    ) -> serenity::Result<MessageRef> {
        let channel = ChannelId::new(channel_id);
        let builder = CreateMessage::new()
            .content(content)
            .reference_message((channel, MessageId::new(message_id)));
        let msg = channel.send_message(&*self.http, builder).await?;
        Ok(message_ref(&msg))
    }

    async fn edit_message(
        &self,
        message: MessageRef,
        content: &str,
        embed: Option<&Embed>,
    ) -> serenity::Result<()> {
        let mut builder = EditMessage::new().content(content);
        if let Some(embed) = embed {
            builder = builder.embed(embed.build());
        }
        ChannelId::new(message.channel_id)
            .edit_message(&*self.http, MessageId::new(message.message_id), builder)
            .await?;
        Ok(())
    }

    async fn fetch_member_roles(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> serenity::Result<Option<Vec<u64>>> {
        match self
            .http
            .get_member(GuildId::new(guild_id), UserId::new(user_id))
            .await
        {
            Ok(member) => Ok(Some(member.roles.iter().map(|r| r.get()).collect())),
            Err(e) if errors::is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fetch_user(&self, user_id: u64) -> serenity::Result<UserInfo> {
        let user = self.http.get_user(UserId::new(user_id)).await?;
        Ok(UserInfo::from(&user))
    }

    async fn add_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> serenity::Result<()> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some(reason),
            )
            .await
    }

    async fn remove_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
        reason: &str,
    ) -> serenity::Result<()> {
        self.http
            .remove_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some(reason),
            )
            .await
    }

    async fn create_private_thread(&self, channel_id: u64, name: &str) -> serenity::Result<u64> {
        let thread = ChannelId::new(channel_id)
            .create_thread(
                &*self.http,
                CreateThread::new(name).kind(ChannelType::PrivateThread),
            )
            .await?;
        Ok(thread.id.get())
    }

    async fn add_thread_member(&self, thread_id: u64, user_id: u64) -> serenity::Result<()> {
        self.http
            .add_thread_channel_member(ChannelId::new(thread_id), UserId::new(user_id))
            .await
    }

    async fn guild_bans(&self, guild_id: u64) -> serenity::Result<Vec<u64>> {
        let guild = GuildId::new(guild_id);
        let mut ids = Vec::new();
        let mut after: Option<UserId> = None;
        loop {
            let page = guild
                .bans(&*self.http, after.map(UserPagination::After), None)
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            after = Some(last.user.id);
            ids.extend(page.iter().map(|ban| ban.user.id.get()));
        }
        Ok(ids)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// One recorded gateway call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Send { channel_id: u64, content: String },
        Embed { channel_id: u64, content: Option<String>, embed: Embed },
        Reply { channel_id: u64, content: String },
        Edit { message: MessageRef, content: String, embed: Option<Embed> },
        AddRole { user_id: u64, role_id: u64 },
        RemoveRole { user_id: u64, role_id: u64 },
        CreateThread { channel_id: u64, name: String },
        AddThreadMember { thread_id: u64, user_id: u64 },
    }

    /// Records calls and serves canned members, users and bans.
    #[derive(Default)]
    pub struct MockGateway {
        calls: Mutex<Vec<Call>>,
        members: Mutex<HashMap<u64, Vec<u64>>>,
        users: Mutex<HashMap<u64, UserInfo>>,
        bans: Mutex<Vec<u64>>,
        failing_roles: Mutex<HashSet<u64>>,
        fail_threads: Mutex<bool>,
        next_id: AtomicU64,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self {
                next_id: AtomicU64::new(1000),
                ..Default::default()
            }
        }

        pub fn with_member(self, user_id: u64, roles: Vec<u64>) -> Self {
            self.members.lock().unwrap().insert(user_id, roles);
            self
        }

        pub fn with_user(self, user_id: u64, tag: &str) -> Self {
            self.users.lock().unwrap().insert(
                user_id,
                UserInfo {
                    id: user_id,
                    tag: tag.to_string(),
                    bot: false,
                },
            );
            self
        }

        pub fn with_bans(self, bans: Vec<u64>) -> Self {
            *self.bans.lock().unwrap() = bans;
            self
        }

        /// Role changes on `role_id` fail.
        pub fn failing_role(self, role_id: u64) -> Self {
            self.failing_roles.lock().unwrap().insert(role_id);
            self
        }

        pub fn failing_threads(self) -> Self {
            *self.fail_threads.lock().unwrap() = true;
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        /// Text of every plain message sent to `channel_id`.
        pub fn sent_to(&self, channel_id: u64) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Send { channel_id: ch, content } if ch == channel_id => Some(content),
                    _ => None,
                })
                .collect()
        }

        /// Every reply and edit, in order, as the user would see the text.
        pub fn replies(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Reply { content, .. } | Call::Edit { content, .. } => Some(content),
                    _ => None,
                })
                .collect()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn next_ref(&self, channel_id: u64) -> MessageRef {
            MessageRef {
                channel_id,
                message_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            }
        }

        fn check_role(&self, role_id: u64) -> serenity::Result<()> {
            if self.failing_roles.lock().unwrap().contains(&role_id) {
                return Err(serenity::Error::Other("role update rejected"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ModerationGateway for MockGateway {
        async fn send_message(
            &self,
            channel_id: u64,
            content: &str,
        ) -> serenity::Result<MessageRef> {
            self.record(Call::Send {
                channel_id,
                content: content.to_string(),
            });
            Ok(self.next_ref(channel_id))
        }

        async fn send_embed(
            &self,
            channel_id: u64,
            content: Option<&str>,
            embed: &Embed,
        ) -> serenity::Result<MessageRef> {
            self.record(Call::Embed {
                channel_id,
                content: content.map(str::to_string),
                embed: embed.clone(),
            });
            Ok(self.next_ref(channel_id))
        }

        async fn reply(
            &self,
            channel_id: u64,
            _message_id: u64,
            content: &str,
        ) -> serenity::Result<MessageRef> {
            self.record(Call::Reply {
                channel_id,
                content: content.to_string(),
            });
            Ok(self.next_ref(channel_id))
        }

        async fn edit_message(
            &self,
            message: MessageRef,
            content: &str,
            embed: Option<&Embed>,
        ) -> serenity::Result<()> {
            self.record(Call::Edit {
                message,
                content: content.to_string(),
                embed: embed.cloned(),
            });
            Ok(())
        }

        async fn fetch_member_roles(
            &self,
            _guild_id: u64,
            user_id: u64,
        ) -> serenity::Result<Option<Vec<u64>>> {
            Ok(self.members.lock().unwrap().get(&user_id).cloned())
        }

        async fn fetch_user(&self, user_id: u64) -> serenity::Result<UserInfo> {
            self.users
                .lock()
                .unwrap()
                .get(&user_id)
                .cloned()
                .ok_or(serenity::Error::Other("unknown user"))
        }

        async fn add_role(
            &self,
            _guild_id: u64,
            user_id: u64,
            role_id: u64,
            _reason: &str,
        ) -> serenity::Result<()> {
            self.check_role(role_id)?;
            self.record(Call::AddRole { user_id, role_id });
            Ok(())
        }

        async fn remove_role(
            &self,
            _guild_id: u64,
            user_id: u64,
            role_id: u64,
            _reason: &str,
        ) -> serenity::Result<()> {
            self.check_role(role_id)?;
            self.record(Call::RemoveRole { user_id, role_id });
            Ok(())
        }

        async fn create_private_thread(
            &self,
            channel_id: u64,
            name: &str,
        ) -> serenity::Result<u64> {
            if *self.fail_threads.lock().unwrap() {
                return Err(serenity::Error::Other("threads disabled"));
            }
            self.record(Call::CreateThread {
                channel_id,
                name: name.to_string(),
            });
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn add_thread_member(&self, thread_id: u64, user_id: u64) -> serenity::Result<()> {
            self.record(Call::AddThreadMember { thread_id, user_id });
            Ok(())
        }

        async fn guild_bans(&self, _guild_id: u64) -> serenity::Result<Vec<u64>> {
            Ok(self.bans.lock().unwrap().clone())
        }
    }
}
