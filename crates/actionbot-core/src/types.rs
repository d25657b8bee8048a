//! Inbound events and outbound payloads shared across crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message received from the chat platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform message ID.
    pub id: String,
    /// Channel (locality) the message was posted in.
    pub channel_id: String,
    /// Guild (group); `None` for direct messages.
    pub guild_id: Option<String>,
    pub author_id: String,
    #[serde(default)]
    pub author_is_bot: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// Build a message from a human author, stamped now.
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        author_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            guild_id: None,
            author_id: author_id.into(),
            author_is_bot: false,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a guild ID.
    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }
}

/// A reaction added to a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundReaction {
    /// The message the reaction was added to.
    pub message_id: String,
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub user_is_bot: bool,
    /// Emoji name (unicode emoji or custom emoji name).
    pub emoji: String,
}

impl InboundReaction {
    pub fn new(
        message_id: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        emoji: impl Into<String>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            channel_id: channel_id.into(),
            guild_id: None,
            user_id: user_id.into(),
            user_is_bot: false,
            emoji: emoji.into(),
        }
    }

    pub fn in_guild(mut self, guild_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self
    }
}

/// What produced an [`EventContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Message,
    Reaction,
    Scheduled,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Message => write!(f, "message"),
            EventKind::Reaction => write!(f, "reaction"),
            EventKind::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Uniform view of a triggering event, passed by value into the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventContext {
    pub kind: EventKind,
    /// Triggering message (the reacted-to message for reactions).
    pub message_id: Option<String>,
    pub channel_id: String,
    pub guild_id: Option<String>,
    /// Caller identity; `None` for scheduled fires.
    pub caller_id: Option<String>,
    pub content: String,
    pub emoji: Option<String>,
}

impl EventContext {
    /// Synthetic event for a scheduled fire against one channel.
    pub fn scheduled(channel_id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Scheduled,
            message_id: None,
            channel_id: channel_id.into(),
            guild_id: None,
            caller_id: None,
            content: String::new(),
            emoji: None,
        }
    }

    /// Caller ID or the empty string.
    pub fn caller(&self) -> &str {
        self.caller_id.as_deref().unwrap_or("")
    }

    /// Guild ID or the empty string.
    pub fn guild(&self) -> &str {
        self.guild_id.as_deref().unwrap_or("")
    }
}

impl From<&InboundMessage> for EventContext {
    fn from(msg: &InboundMessage) -> Self {
        Self {
            kind: EventKind::Message,
            message_id: Some(msg.id.clone()),
            channel_id: msg.channel_id.clone(),
            guild_id: msg.guild_id.clone(),
            caller_id: Some(msg.author_id.clone()),
            content: msg.content.clone(),
            emoji: None,
        }
    }
}

impl From<&InboundReaction> for EventContext {
    fn from(r: &InboundReaction) -> Self {
        Self {
            kind: EventKind::Reaction,
            message_id: Some(r.message_id.clone()),
            channel_id: r.channel_id.clone(),
            guild_id: r.guild_id.clone(),
            caller_id: Some(r.user_id.clone()),
            content: String::new(),
            emoji: Some(r.emoji.clone()),
        }
    }
}

/// A rich embed ready to be sent by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedPayload {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedFieldPayload>,
    pub footer: Option<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub author: Option<EmbedAuthorPayload>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFieldPayload {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedAuthorPayload {
    pub name: String,
    pub icon_url: Option<String>,
    pub url: Option<String>,
}
