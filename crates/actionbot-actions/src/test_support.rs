//! Recording doubles for the transport and auth capabilities.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use actionbot_core::error::{ActionBotError, Result};
use actionbot_core::traits::{AuthProvider, ResponseExecutor};
use actionbot_core::types::EmbedPayload;
use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Text { channel: String, content: String },
    Embed { channel: String, embed: EmbedPayload },
    DirectChannel { user: String },
    Reaction { channel: String, message: String, emoji: String },
    Delete { channel: String, message: String },
}

/// Executor that records every outbound call.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<Call>>,
    roles: HashMap<String, Vec<String>>,
    permissions: u64,
    fail_lookups: bool,
    fail_sends: bool,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(mut self, user: &str, roles: &[&str]) -> Self {
        self.roles
            .insert(user.into(), roles.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn with_permissions(mut self, mask: u64) -> Self {
        self.permissions = mask;
        self
    }

    pub fn failing_lookups(mut self) -> Self {
        self.fail_lookups = true;
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Text messages sent, as `(channel, content)`.
    pub fn texts(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Text { channel, content } => Some((channel, content)),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.fail_sends {
            return Err(ActionBotError::Executor("transport down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResponseExecutor for RecordingExecutor {
    async fn send_text(&self, channel_id: &str, content: &str) -> Result<()> {
        self.record(Call::Text {
            channel: channel_id.into(),
            content: content.into(),
        })
        .await
    }

    async fn send_embed(&self, channel_id: &str, embed: &EmbedPayload) -> Result<()> {
        self.record(Call::Embed {
            channel: channel_id.into(),
            embed: embed.clone(),
        })
        .await
    }

    async fn create_direct_channel(&self, user_id: &str) -> Result<String> {
        self.record(Call::DirectChannel {
            user: user_id.into(),
        })
        .await?;
        Ok(format!("dm-{user_id}"))
    }

    async fn add_reaction(&self, channel_id: &str, message_id: &str, emoji: &str) -> Result<()> {
        self.record(Call::Reaction {
            channel: channel_id.into(),
            message: message_id.into(),
            emoji: emoji.into(),
        })
        .await
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<()> {
        self.record(Call::Delete {
            channel: channel_id.into(),
            message: message_id.into(),
        })
        .await
    }

    async fn fetch_roles(&self, _guild_id: &str, user_id: &str) -> Result<Vec<String>> {
        if self.fail_lookups {
            return Err(ActionBotError::Executor("member lookup failed".into()));
        }
        Ok(self.roles.get(user_id).cloned().unwrap_or_default())
    }

    async fn fetch_permission_mask(&self, _user_id: &str, _channel_id: &str) -> Result<u64> {
        if self.fail_lookups {
            return Err(ActionBotError::Executor("permission lookup failed".into()));
        }
        Ok(self.permissions)
    }
}

/// Auth provider with a fixed set of authenticated users.
pub struct StaticAuth {
    users: HashSet<String>,
}

impl StaticAuth {
    pub fn new(users: &[&str]) -> Self {
        Self {
            users: users.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn is_authenticated(&self, user_id: &str) -> bool {
        self.users.contains(user_id)
    }

    fn auth_url(&self, user_id: &str) -> String {
        format!("https://auth.example.com/login?user={user_id}")
    }
}
