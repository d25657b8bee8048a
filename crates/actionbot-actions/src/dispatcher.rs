//! Execution dispatcher — gates matched events and runs responses on the
//! worker pool.
//!
//! ```text
//! matched rule + event
//!   → conditions (auth, role, channel, ...)
//!   → per-rule rate limit
//!   → engine-wide rate limits (user → channel → guild → global)
//!   → worker pool → ResponseExecutor / OutboundClient
//! ```
//!
//! Scheduled fires skip gating and go straight to the pool.

use std::sync::Arc;
use std::time::Duration;

use actionbot_core::config::{EmbedConfig, RateLimitScope};
use actionbot_core::error::{ActionBotError, Result};
use actionbot_core::traits::ResponseExecutor;
use actionbot_core::types::{
    EmbedAuthorPayload, EmbedFieldPayload, EmbedPayload, EventContext, EventKind,
};

use crate::conditions::ConditionEvaluator;
use crate::outbound::OutboundClient;
use crate::pool::{PoolStats, WorkerPool};
use crate::ratelimit::RateLimiter;
use crate::registry::{Response, Rule};

/// What a response needs at execution time, shared by all queued jobs.
struct Runtime {
    executor: Arc<dyn ResponseExecutor>,
    outbound: OutboundClient,
}

pub struct Dispatcher {
    evaluator: ConditionEvaluator,
    limiter: RateLimiter,
    pool: WorkerPool,
    runtime: Arc<Runtime>,
}

impl Dispatcher {
    pub fn new(
        evaluator: ConditionEvaluator,
        limiter: RateLimiter,
        pool: WorkerPool,
        executor: Arc<dyn ResponseExecutor>,
        outbound: OutboundClient,
    ) -> Self {
        Self {
            evaluator,
            limiter,
            pool,
            runtime: Arc::new(Runtime { executor, outbound }),
        }
    }

    /// Gate `event` and queue the rule's response.
    ///
    /// Returns `Ok(false)` when a condition or rate limit dropped the event;
    /// errors only come from the pool (`QueueFull`, `PoolClosed`).
    pub async fn submit(&self, rule: Arc<Rule>, event: EventContext) -> Result<bool> {
        if !self.evaluator.evaluate(&event, &rule).await {
            tracing::debug!(
                "Dropped '{}' for {}: conditions not met",
                rule.name,
                event.caller()
            );
            return Ok(false);
        }

        if !self.allow_rule(&rule, &event) {
            tracing::debug!(
                "Dropped '{}' for {}: rule rate limit",
                rule.name,
                event.caller()
            );
            return Ok(false);
        }

        if !self
            .limiter
            .allow(event.caller(), &event.channel_id, event.guild())
        {
            tracing::debug!(
                "Dropped '{}' for {}: rate limit",
                rule.name,
                event.caller()
            );
            return Ok(false);
        }

        self.enqueue(rule, event).await?;
        Ok(true)
    }

    /// Queue a scheduled fire for one target channel, without gating.
    pub async fn submit_scheduled(&self, rule: Arc<Rule>, channel_id: &str) -> Result<()> {
        self.enqueue(rule, EventContext::scheduled(channel_id)).await
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Drain the pool. Queued responses still run.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> Result<()> {
        self.pool.shutdown(timeout).await
    }

    fn allow_rule(&self, rule: &Rule, event: &EventContext) -> bool {
        let Some(limit) = rule.rate_limit else {
            return true;
        };
        let key = match limit.scope {
            RateLimitScope::User => format!("rule:{}:{}", rule.name, event.caller()),
            RateLimitScope::Channel => format!("rule:{}:{}", rule.name, event.channel_id),
            RateLimitScope::Guild => format!("rule:{}:{}", rule.name, event.guild()),
            RateLimitScope::Global => format!("rule:{}", rule.name),
        };
        self.limiter.allow_key(&key, limit.requests, limit.window())
    }

    async fn enqueue(&self, rule: Arc<Rule>, event: EventContext) -> Result<()> {
        let runtime = self.runtime.clone();
        tracing::debug!("📥 Queued '{}' ({}) in {}", rule.name, event.kind, event.channel_id);
        self.pool
            .submit(Box::pin(async move { runtime.run(&rule, &event).await }))
            .await
    }
}

impl Runtime {
    /// Execute a response. Failures are logged, never returned.
    async fn run(&self, rule: &Rule, event: &EventContext) {
        if let Err(e) = self.respond(rule, event).await {
            tracing::error!(
                "❌ Action '{}' failed in {}: {e}",
                rule.name,
                event.channel_id
            );
            return;
        }
        tracing::debug!("✅ Action '{}' executed in {}", rule.name, event.channel_id);

        if rule.delete_after > 0 && event.kind == EventKind::Message {
            if let Some(message_id) = event.message_id.clone() {
                self.schedule_delete(event.channel_id.clone(), message_id, rule.delete_after);
            }
        }
    }

    async fn respond(&self, rule: &Rule, event: &EventContext) -> Result<()> {
        let channel = event.channel_id.as_str();
        match &rule.response {
            Response::Text(content) => self.executor.send_text(channel, content).await,
            Response::Embed(embed) => {
                self.executor
                    .send_embed(channel, &embed_payload(embed))
                    .await
            }
            Response::DirectMessage { content, embed } => {
                let caller = event.caller_id.as_deref().ok_or_else(|| {
                    ActionBotError::Executor("direct message needs a caller".into())
                })?;
                let dm = self.executor.create_direct_channel(caller).await?;
                match (embed, content) {
                    (Some(embed), _) => self.executor.send_embed(&dm, &embed_payload(embed)).await,
                    (None, Some(content)) => self.executor.send_text(&dm, content).await,
                    (None, None) => Ok(()),
                }
            }
            Response::Reaction(emoji) => {
                let message_id = event.message_id.as_deref().ok_or_else(|| {
                    ActionBotError::Executor("reaction needs a triggering message".into())
                })?;
                self.executor.add_reaction(channel, message_id, emoji).await
            }
            Response::Http(request) => self.outbound.send(request).await.map(|_| ()),
            Response::Webhook { url, content } => self.outbound.send_webhook(url, content).await,
        }
    }

    fn schedule_delete(&self, channel_id: String, message_id: String, after_secs: u64) {
        let executor = self.executor.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(after_secs)).await;
            if let Err(e) = executor.delete_message(&channel_id, &message_id).await {
                tracing::error!("❌ Failed to delete message {message_id} in {channel_id}: {e}");
            }
        });
    }
}

/// Render an embed descriptor for the transport.
pub fn embed_payload(config: &EmbedConfig) -> EmbedPayload {
    EmbedPayload {
        title: config.title.clone(),
        description: config.description.clone(),
        color: config.color,
        fields: config
            .fields
            .iter()
            .map(|f| EmbedFieldPayload {
                name: f.name.clone(),
                value: f.value.clone(),
                inline: f.inline,
            })
            .collect(),
        footer: config.footer.clone().filter(|f| !f.is_empty()),
        image_url: config.image.clone().filter(|i| !i.is_empty()),
        thumbnail_url: config.thumbnail.clone().filter(|t| !t.is_empty()),
        author: config.author.as_ref().map(|a| EmbedAuthorPayload {
            name: a.name.clone(),
            icon_url: a.icon_url.clone(),
            url: a.url.clone(),
        }),
        timestamp: config.timestamp.then(chrono::Utc::now),
    }
}
