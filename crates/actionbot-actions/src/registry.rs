//! Action registry — compiles rule descriptors into immutable rules.
//!
//! Every check that can be done ahead of time happens here: regexes are
//! compiled, schedules parsed, response fields checked against the response
//! type. A registry that loaded successfully never fails on rule shape at
//! dispatch time.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use actionbot_core::config::{
    ActionConfig, ConditionConfig, EmbedConfig, RateLimitConfig, ResponseConfig, ResponseKind,
    TriggerKind,
};
use actionbot_core::error::{ActionBotError, Result};
use actionbot_scheduler::Schedule;
use regex::Regex;

/// What fires a rule.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Keyword after the bot prefix, stored lowercase.
    Command(String),
    Pattern(Regex),
    Reaction(String),
    Scheduled {
        expression: String,
        /// Channels a fire is dispatched to.
        channels: Vec<String>,
    },
}

impl Trigger {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Trigger::Command(_) => TriggerKind::Command,
            Trigger::Pattern(_) => TriggerKind::Pattern,
            Trigger::Reaction(_) => TriggerKind::Reaction,
            Trigger::Scheduled { .. } => TriggerKind::Scheduled,
        }
    }
}

/// Outbound HTTP call made as a response.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub method: reqwest::Method,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// What a rule does once it passes gating.
#[derive(Debug, Clone)]
pub enum Response {
    Text(String),
    Embed(EmbedConfig),
    /// Sent to the caller's direct-message channel; the embed wins when both are set.
    DirectMessage {
        content: Option<String>,
        embed: Option<EmbedConfig>,
    },
    /// React to the triggering message.
    Reaction(String),
    Http(HttpRequest),
    Webhook { url: String, content: String },
}

impl Response {
    pub fn kind(&self) -> ResponseKind {
        match self {
            Response::Text(_) => ResponseKind::Text,
            Response::Embed(_) => ResponseKind::Embed,
            Response::DirectMessage { .. } => ResponseKind::DirectMessage,
            Response::Reaction(_) => ResponseKind::Reaction,
            Response::Http(_) => ResponseKind::Http,
            Response::Webhook { .. } => ResponseKind::Webhook,
        }
    }
}

/// A compiled rule. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub description: String,
    pub trigger: Trigger,
    pub response: Response,
    /// All must hold (AND).
    pub conditions: Vec<ConditionConfig>,
    pub rate_limit: Option<RateLimitConfig>,
    pub require_auth: bool,
    /// Channel allow-list; empty admits every channel.
    pub channels: Vec<String>,
    /// Guild allow-list; empty admits every guild.
    pub guilds: Vec<String>,
    /// Seconds after which the triggering message is deleted (0 = never).
    pub delete_after: u64,
}

impl Rule {
    pub fn kind(&self) -> TriggerKind {
        self.trigger.kind()
    }

    /// Whether the allow-lists admit an event from `channel_id` / `guild_id`.
    pub fn admits(&self, channel_id: &str, guild_id: Option<&str>) -> bool {
        let channel_ok = self.channels.is_empty() || self.channels.iter().any(|c| c == channel_id);
        let guild_ok = self.guilds.is_empty()
            || guild_id.is_some_and(|g| self.guilds.iter().any(|allowed| allowed == g));
        channel_ok && guild_ok
    }

    /// Compile one descriptor.
    pub fn compile(config: &ActionConfig) -> Result<Self> {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(ActionBotError::invalid_rule("", "rule name is required"));
        }

        let trigger = compile_trigger(config)?;
        let response = compile_response(name, &config.response)?;

        // Allow-lists only apply to event-driven rules; scheduled rules use
        // `channels` as their targets.
        let (channels, guilds) = match trigger {
            Trigger::Scheduled { .. } => (Vec::new(), Vec::new()),
            _ => (config.trigger.channels.clone(), config.trigger.guilds.clone()),
        };

        Ok(Self {
            name: name.to_string(),
            description: config.description.clone(),
            trigger,
            response,
            conditions: config.conditions.clone(),
            rate_limit: config.rate_limit,
            require_auth: config.require_auth,
            channels,
            guilds,
            delete_after: config.response.delete_after,
        })
    }
}

fn required<'a>(rule: &str, value: Option<&'a String>, what: &str) -> Result<&'a str> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ActionBotError::invalid_rule(rule, format!("{what} is required")))
}

fn compile_trigger(config: &ActionConfig) -> Result<Trigger> {
    let name = config.name.trim();
    let trigger = &config.trigger;
    match config.kind {
        TriggerKind::Command => {
            let keyword = required(name, trigger.command.as_ref(), "trigger.command")?;
            if keyword.contains(char::is_whitespace) {
                return Err(ActionBotError::invalid_rule(
                    name,
                    "trigger.command must be a single word",
                ));
            }
            Ok(Trigger::Command(keyword.to_lowercase()))
        }
        TriggerKind::Pattern => {
            let pattern = required(name, trigger.pattern.as_ref(), "trigger.pattern")?;
            let regex = Regex::new(pattern).map_err(|e| {
                ActionBotError::invalid_rule(name, format!("invalid pattern: {e}"))
            })?;
            Ok(Trigger::Pattern(regex))
        }
        TriggerKind::Reaction => {
            let emoji = required(name, trigger.emoji.as_ref(), "trigger.emoji")?;
            Ok(Trigger::Reaction(emoji.to_string()))
        }
        TriggerKind::Scheduled => {
            let expression = required(name, trigger.schedule.as_ref(), "trigger.schedule")?;
            Schedule::parse(expression)
                .map_err(|e| ActionBotError::invalid_rule(name, e.to_string()))?;
            if trigger.channels.is_empty() {
                tracing::warn!("⚠️ Scheduled rule '{name}' has no target channels");
            }
            Ok(Trigger::Scheduled {
                expression: expression.to_string(),
                channels: trigger.channels.clone(),
            })
        }
    }
}

fn compile_response(rule: &str, response: &ResponseConfig) -> Result<Response> {
    let content = response
        .content
        .as_ref()
        .filter(|c| !c.is_empty())
        .cloned();

    match response.kind {
        ResponseKind::Text => content
            .map(Response::Text)
            .ok_or_else(|| ActionBotError::invalid_rule(rule, "text response needs content")),
        ResponseKind::Embed => response
            .embed
            .clone()
            .map(Response::Embed)
            .ok_or_else(|| ActionBotError::invalid_rule(rule, "embed response needs an embed")),
        ResponseKind::DirectMessage => {
            if content.is_none() && response.embed.is_none() {
                return Err(ActionBotError::invalid_rule(
                    rule,
                    "direct-message response needs content or an embed",
                ));
            }
            Ok(Response::DirectMessage {
                content,
                embed: response.embed.clone(),
            })
        }
        ResponseKind::Reaction => {
            let emoji = required(rule, response.reaction.as_ref(), "response.reaction")?;
            Ok(Response::Reaction(emoji.to_string()))
        }
        ResponseKind::Http => {
            let http = response.http.as_ref().ok_or_else(|| {
                ActionBotError::invalid_rule(rule, "http response needs an http section")
            })?;
            let url = required(rule, Some(&http.url), "http.url")?;
            Ok(Response::Http(HttpRequest {
                url: url.to_string(),
                method: parse_method(rule, &http.method)?,
                headers: http.headers.clone(),
                body: http.body.clone(),
                timeout: Duration::from_secs(http.timeout.max(1)),
            }))
        }
        ResponseKind::Webhook => {
            let url = required(rule, response.webhook_url.as_ref(), "response.webhookUrl")?;
            Ok(Response::Webhook {
                url: url.to_string(),
                content: content.unwrap_or_default(),
            })
        }
    }
}

fn parse_method(rule: &str, method: &str) -> Result<reqwest::Method> {
    match method.to_uppercase().as_str() {
        "GET" => Ok(reqwest::Method::GET),
        "POST" => Ok(reqwest::Method::POST),
        "PUT" => Ok(reqwest::Method::PUT),
        "PATCH" => Ok(reqwest::Method::PATCH),
        "DELETE" => Ok(reqwest::Method::DELETE),
        "HEAD" => Ok(reqwest::Method::HEAD),
        other => Err(ActionBotError::invalid_rule(
            rule,
            format!("unsupported HTTP method '{other}'"),
        )),
    }
}

/// Compiled rules in registration order.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    rules: Vec<Arc<Rule>>,
    by_name: HashMap<String, usize>,
}

impl ActionRegistry {
    /// Compile all descriptors. Fails on the first invalid one.
    pub fn load(actions: &[ActionConfig]) -> Result<Self> {
        let mut registry = Self::default();
        for config in actions {
            let rule = Rule::compile(config)?;
            if registry.by_name.contains_key(&rule.name) {
                return Err(ActionBotError::invalid_rule(
                    &rule.name,
                    "duplicate rule name",
                ));
            }
            tracing::debug!("📋 Rule loaded: '{}' ({})", rule.name, rule.kind());
            registry.by_name.insert(rule.name.clone(), registry.rules.len());
            registry.rules.push(Arc::new(rule));
        }
        tracing::info!("📋 Loaded {} rules", registry.rules.len());
        Ok(registry)
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Rule>> {
        self.by_name.get(name).map(|&i| &self.rules[i])
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules with a scheduled trigger.
    pub fn scheduled(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules
            .iter()
            .filter(|r| matches!(r.trigger, Trigger::Scheduled { .. }))
    }
}
