//! ActionBot configuration system.
//!
//! Field names are camelCase so that existing YAML bot configs load unchanged.
//! The `actions` list is the rule descriptor contract; it is compiled into
//! matchable rules by the action registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ActionBotError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActionBotConfig {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

impl ActionBotConfig {
    /// Load config from the default path (~/.actionbot/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path. `.yaml`/`.yml` files are parsed as
    /// YAML, everything else as TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ActionBotError::Config(format!("Failed to read config: {e}")))?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        let config = if is_yaml {
            Self::from_yaml_str(&content)?
        } else {
            Self::from_toml_str(&content)?
        };
        tracing::debug!(
            "📄 Loaded config from {} ({} actions)",
            path.display(),
            config.actions.len()
        );
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ActionBotError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ActionBotError::Config(format!("Failed to parse config: {e}")))
    }

    /// Structural checks that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.bot.prefix.is_empty() {
            return Err(ActionBotError::Config("bot prefix is required".into()));
        }
        if self.dispatcher.workers == 0 {
            return Err(ActionBotError::Config(
                "dispatcher.workers must be at least 1".into(),
            ));
        }
        if self.dispatcher.queue_capacity == 0 {
            return Err(ActionBotError::Config(
                "dispatcher.queueCapacity must be at least 1".into(),
            ));
        }
        if self.auth.enabled && self.auth.auth_url.is_empty() {
            return Err(ActionBotError::Config(
                "auth.authUrl is required when auth is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the ActionBot home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".actionbot")
    }
}

/// Bot identity and command prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_activity_type")]
    pub activity_type: String,
}

fn default_prefix() -> String { "!".into() }
fn default_activity_type() -> String { "playing".into() }

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            status: None,
            activity_type: default_activity_type(),
        }
    }
}

/// What `submit` does when the worker queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Wait for queue space; aborted when the pool shuts down.
    #[default]
    Block,
    /// Fail immediately with `QueueFull`.
    Reject,
}

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatcherConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default)]
    pub backpressure: BackpressurePolicy,
    /// Upper bound on waiting for queued work at shutdown; unbounded when unset.
    #[serde(default)]
    pub shutdown_timeout_secs: Option<u64>,
}

fn default_workers() -> usize { 10 }
fn default_queue_capacity() -> usize { 100 }

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            backpressure: BackpressurePolicy::default(),
            shutdown_timeout_secs: None,
        }
    }
}

impl DispatcherConfig {
    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_secs.map(Duration::from_secs)
    }
}

/// Engine-wide limits applied to every dispatched event, per scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitsConfig {
    #[serde(default)]
    pub user: Option<ScopeLimitConfig>,
    #[serde(default)]
    pub channel: Option<ScopeLimitConfig>,
    #[serde(default)]
    pub guild: Option<ScopeLimitConfig>,
    #[serde(default)]
    pub global: Option<ScopeLimitConfig>,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

fn default_cleanup_interval() -> u64 { 300 }

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            user: None,
            channel: None,
            guild: None,
            global: None,
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl RateLimitsConfig {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// `requests` per `window` seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeLimitConfig {
    pub requests: u32,
    pub window: u64,
}

impl ScopeLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window)
    }
}

/// OAuth gating settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Authentication URL; `{user}` is replaced with the caller ID.
    #[serde(default)]
    pub auth_url: String,
    #[serde(default)]
    pub authorized_users: Vec<String>,
}

/// Rule kind — which events a rule reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Command,
    Pattern,
    Reaction,
    Scheduled,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Command => write!(f, "command"),
            TriggerKind::Pattern => write!(f, "pattern"),
            TriggerKind::Reaction => write!(f, "reaction"),
            TriggerKind::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// A single rule descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TriggerKind,
    #[serde(default)]
    pub trigger: TriggerConfig,
    pub response: ResponseConfig,
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
    #[serde(default, alias = "requiresAuth")]
    pub require_auth: bool,
}

/// Kind-specific trigger data plus optional channel/guild allow-lists.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    /// Allow-list for command/pattern/reaction; target channels for scheduled rules.
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub guilds: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Text,
    Embed,
    Reaction,
    #[serde(rename = "direct-message", alias = "dm")]
    DirectMessage,
    Http,
    Webhook,
}

impl std::fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseKind::Text => write!(f, "text"),
            ResponseKind::Embed => write!(f, "embed"),
            ResponseKind::Reaction => write!(f, "reaction"),
            ResponseKind::DirectMessage => write!(f, "direct-message"),
            ResponseKind::Http => write!(f, "http"),
            ResponseKind::Webhook => write!(f, "webhook"),
        }
    }
}

/// Response descriptor. Which fields are required depends on `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseConfig {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub embed: Option<EmbedConfig>,
    #[serde(default)]
    pub reaction: Option<String>,
    #[serde(default)]
    pub http: Option<HttpConfig>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Delete the triggering message after this many seconds (0 = never).
    #[serde(default)]
    pub delete_after: u64,
    #[serde(default)]
    pub ephemeral: bool,
}

impl ResponseConfig {
    /// Plain text response.
    pub fn text(content: &str) -> Self {
        Self {
            kind: ResponseKind::Text,
            content: Some(content.to_string()),
            embed: None,
            reaction: None,
            http: None,
            webhook_url: None,
            delete_after: 0,
            ephemeral: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EmbedConfig {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub fields: Vec<EmbedFieldConfig>,
    #[serde(default)]
    pub footer: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub author: Option<EmbedAuthorConfig>,
    /// Stamp the embed with the send time.
    #[serde(default)]
    pub timestamp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedFieldConfig {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbedAuthorConfig {
    pub name: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Outbound HTTP call made as a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_http_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout: u64,
}

fn default_http_method() -> String { "POST".into() }
fn default_http_timeout() -> u64 { 30 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionKind {
    Role,
    User,
    Channel,
    Guild,
    Permission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    #[default]
    Equals,
    Not,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionConfig {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub operator: ConditionOperator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitScope {
    #[default]
    User,
    Channel,
    Guild,
    Global,
}

impl std::fmt::Display for RateLimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitScope::User => write!(f, "user"),
            RateLimitScope::Channel => write!(f, "channel"),
            RateLimitScope::Guild => write!(f, "guild"),
            RateLimitScope::Global => write!(f, "global"),
        }
    }
}

/// Per-rule rate limit: `requests` per `window` seconds within `scope`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    #[serde(default = "default_requests")]
    pub requests: u32,
    #[serde(default = "default_window")]
    pub window: u64,
    #[serde(default)]
    pub scope: RateLimitScope,
}

fn default_requests() -> u32 { 10 }
fn default_window() -> u64 { 60 }

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window)
    }
}

/// Sample configuration written by `actionbot generate`.
pub const SAMPLE_CONFIG: &str = r#"# ActionBot configuration

[bot]
prefix = "!"
status = "Serving the community"
activityType = "playing"

[dispatcher]
workers = 10
queueCapacity = 100
backpressure = "block"   # or "reject"

[rateLimits]
cleanupIntervalSecs = 300
user = { requests = 5, window = 10 }
global = { requests = 100, window = 60 }

[auth]
enabled = false
authUrl = "https://auth.example.com/login?user={user}"

[[actions]]
name = "ping"
description = "Replies with Pong!"
type = "command"
trigger = { command = "ping" }
response = { type = "text", content = "Pong!" }
rateLimit = { requests = 2, window = 10, scope = "user" }

[[actions]]
name = "greeting"
type = "pattern"
trigger = { pattern = "(?i)^(hello|hi)\\b" }
response = { type = "reaction", reaction = "👋" }

[[actions]]
name = "star-thanks"
type = "reaction"
trigger = { emoji = "⭐" }
response = { type = "direct-message", content = "Thanks for the star!" }

[[actions]]
name = "daily-reminder"
type = "scheduled"
trigger = { schedule = "0 0 9 * * *", channels = ["general"] }

[actions.response]
type = "embed"

[actions.response.embed]
title = "Daily reminder"
description = "Stand-up in 15 minutes."
color = 3447003
timestamp = true
"#;
