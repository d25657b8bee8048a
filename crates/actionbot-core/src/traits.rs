//! Capabilities ActionBot consumes from its collaborators.
//!
//! The chat transport implements [`ResponseExecutor`]; the OAuth layer
//! implements [`AuthProvider`]. Both are shared across worker tasks, so they
//! must be `Send + Sync`.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::EmbedPayload;

/// Chat-platform operations used to deliver responses and look up members.
#[async_trait]
pub trait ResponseExecutor: Send + Sync {
    /// Post a plain text message to a channel.
    async fn send_text(&self, channel_id: &str, content: &str) -> Result<()>;

    /// Post an embed to a channel.
    async fn send_embed(&self, channel_id: &str, embed: &EmbedPayload) -> Result<()>;

    /// Open (or reuse) a direct-message channel with a user; returns its channel ID.
    async fn create_direct_channel(&self, user_id: &str) -> Result<String>;

    /// React to a message.
    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()>;

    /// Delete a message.
    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()>;

    /// Role IDs held by a member of a guild.
    async fn fetch_roles(&self, guild_id: &str, user_id: &str) -> Result<Vec<String>>;

    /// Permission bitmask of a user in a channel.
    async fn fetch_permission_mask(&self, user_id: &str, channel_id: &str) -> Result<u64>;
}

/// "Is this caller authenticated" capability backed by the OAuth flow.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn is_authenticated(&self, user_id: &str) -> bool;

    /// URL the user should visit to authenticate.
    fn auth_url(&self, user_id: &str) -> String;
}
