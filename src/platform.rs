//! The chat-service boundary: the events the bot consumes and the actions it
//! asks the service to perform.

use crate::error::{Error, Result};
use serenity::{
    async_trait,
    http::Http,
    model::{
        channel::{Message, Reaction, ReactionType},
        id::ChannelId,
    },
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub guild_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub guild_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub emoji: String,
    pub added: bool,
}

impl MessageEvent {
    /// Guild messages from humans only.
    pub fn from_message(msg: &Message) -> Option<Self> {
        if msg.author.bot {
            return None;
        }
        Some(Self {
            guild_id: msg.guild_id?.0.to_string(),
            channel_id: msg.channel_id.0.to_string(),
            author_id: msg.author.id.0.to_string(),
            content: msg.content.clone(),
        })
    }
}

impl ReactionEvent {
    pub fn from_reaction(reaction: &Reaction, added: bool) -> Option<Self> {
        let emoji = match &reaction.emoji {
            ReactionType::Custom { name, .. } => name.clone()?,
            ReactionType::Unicode(symbol) => symbol.clone(),
            _ => return None,
        };
        Some(Self {
            guild_id: reaction.guild_id?.0.to_string(),
            channel_id: reaction.channel_id.0.to_string(),
            user_id: reaction.user_id?.0.to_string(),
            emoji,
            added,
        })
    }
}

#[async_trait]
pub trait Platform: Send + Sync {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()>;

    async fn grant_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<()>;

    async fn revoke_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<()>;
}

fn snowflake(id: &str) -> Result<u64> {
    id.parse()
        .map_err(|_| Error::Platform(format!("`{}` is not a discord id", id)))
}

/// Discord, through serenity's REST client.
pub struct Discord {
    http: Arc<Http>,
}

impl Discord {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Platform for Discord {
    async fn send_message(&self, channel_id: &str, text: &str) -> Result<()> {
        ChannelId(snowflake(channel_id)?)
            .say(&self.http, text)
            .await?;
        Ok(())
    }

    async fn grant_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<()> {
        self.http
            .add_member_role(snowflake(guild_id)?, snowflake(user_id)?, snowflake(role_id)?)
            .await?;
        Ok(())
    }

    async fn revoke_role(&self, guild_id: &str, user_id: &str, role_id: &str) -> Result<()> {
        self.http
            .remove_member_role(snowflake(guild_id)?, snowflake(user_id)?, snowflake(role_id)?)
            .await?;
        Ok(())
    }
}
