//! ActionEngine — the assembled dispatcher: registry, matcher, gating, worker
//! pool and scheduler behind one handle the chat transport talks to.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use actionbot_core::config::ActionBotConfig;
use actionbot_core::error::{ActionBotError, Result};
use actionbot_core::traits::{AuthProvider, ResponseExecutor};
use actionbot_core::types::{EventContext, InboundMessage, InboundReaction};
use actionbot_scheduler::{JobId, JobInfo, Scheduler, job_callback};

use crate::conditions::ConditionEvaluator;
use crate::dispatcher::Dispatcher;
use crate::matcher;
use crate::outbound::OutboundClient;
use crate::pool::{PoolStats, WorkerPool};
use crate::ratelimit::RateLimiter;
use crate::registry::{ActionRegistry, Rule, Trigger};

pub struct ActionEngine {
    prefix: String,
    registry: ActionRegistry,
    dispatcher: Arc<Dispatcher>,
    limiter: RateLimiter,
    scheduler: Scheduler,
    /// Jobs registered for scheduled rules (registered once, on first start).
    jobs: Mutex<Vec<JobId>>,
    shutdown_timeout: Option<Duration>,
}

impl ActionEngine {
    /// Validate the config, compile its rules and spawn the worker pool and
    /// limiter sweep. Must be called inside a tokio runtime.
    pub fn new(
        config: &ActionBotConfig,
        executor: Arc<dyn ResponseExecutor>,
        auth: Option<Arc<dyn AuthProvider>>,
    ) -> Result<Self> {
        config.validate()?;
        let registry = ActionRegistry::load(&config.actions)?;

        let limiter = RateLimiter::from_config(&config.rate_limits);
        let dispatcher = Dispatcher::new(
            ConditionEvaluator::new(executor.clone(), auth),
            limiter.clone(),
            WorkerPool::from_config(&config.dispatcher),
            executor,
            OutboundClient::new()?,
        );
        limiter.start_cleanup(config.rate_limits.cleanup_interval())?;

        tracing::info!(
            "🤖 ActionEngine ready: {} rules ({} scheduled), prefix '{}'",
            registry.len(),
            registry.scheduled().count(),
            config.bot.prefix
        );
        Ok(Self {
            prefix: config.bot.prefix.clone(),
            registry,
            dispatcher: Arc::new(dispatcher),
            limiter,
            scheduler: Scheduler::new(),
            jobs: Mutex::new(Vec::new()),
            shutdown_timeout: config.dispatcher.shutdown_timeout(),
        })
    }

    /// Match and dispatch a message. Returns whether a response was queued.
    pub async fn handle_inbound_message(&self, message: &InboundMessage) -> Result<bool> {
        if message.author_is_bot {
            return Ok(false);
        }
        let Some(rule) = matcher::match_message(self.registry.rules(), message, &self.prefix)
        else {
            return Ok(false);
        };
        tracing::debug!("🎯 '{}' matched message {}", rule.name, message.id);
        self.dispatcher
            .submit(rule.clone(), EventContext::from(message))
            .await
    }

    /// Match and dispatch a reaction. Returns whether a response was queued.
    pub async fn handle_inbound_reaction(&self, reaction: &InboundReaction) -> Result<bool> {
        if reaction.user_is_bot {
            return Ok(false);
        }
        let Some(rule) = matcher::match_reaction(self.registry.rules(), reaction) else {
            return Ok(false);
        };
        tracing::debug!("🎯 '{}' matched reaction {}", rule.name, reaction.emoji);
        self.dispatcher
            .submit(rule.clone(), EventContext::from(reaction))
            .await
    }

    /// Register one job per scheduled rule and start the scheduler.
    /// Each fire dispatches once per target channel.
    pub fn start_scheduler(&self) -> Result<()> {
        {
            let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
            if jobs.is_empty() {
                for rule in self.registry.scheduled() {
                    jobs.push(self.register_job(rule.clone())?);
                }
            }
        }
        self.scheduler.start()
    }

    pub async fn stop_scheduler(&self) -> Result<()> {
        self.scheduler.stop().await
    }

    pub fn is_scheduler_running(&self) -> bool {
        self.scheduler.is_running()
    }

    fn register_job(&self, rule: Arc<Rule>) -> Result<JobId> {
        let Trigger::Scheduled {
            expression,
            channels,
        } = &rule.trigger
        else {
            return Err(ActionBotError::invalid_rule(
                &rule.name,
                "not a scheduled rule",
            ));
        };
        let expression = expression.clone();
        let channels = channels.clone();
        let dispatcher = self.dispatcher.clone();
        let job_rule = rule.clone();

        self.scheduler.add_job(
            &rule.name,
            &expression,
            job_callback(move || {
                let dispatcher = dispatcher.clone();
                let rule = job_rule.clone();
                let channels = channels.clone();
                async move {
                    for channel in &channels {
                        if let Err(e) = dispatcher.submit_scheduled(rule.clone(), channel).await {
                            tracing::error!(
                                "❌ Scheduled '{}' not dispatched to {channel}: {e}",
                                rule.name
                            );
                        }
                    }
                    Ok(())
                }
            }),
        )
    }

    /// Rules in registration order.
    pub fn list_rules(&self) -> &[Arc<Rule>] {
        self.registry.rules()
    }

    pub fn list_jobs(&self) -> Vec<JobInfo> {
        self.scheduler.list_jobs()
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.dispatcher.pool_stats()
    }

    /// Stop the scheduler (if running), drain the pool, stop the limiter sweep.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("🛑 ActionEngine shutting down");
        if self.scheduler.is_running() {
            self.scheduler.stop().await?;
        }
        let drained = self.dispatcher.shutdown(self.shutdown_timeout).await;
        self.limiter.stop_cleanup();
        drained?;

        let stats = self.pool_stats();
        tracing::info!(
            "🛑 ActionEngine stopped ({} executed, {} rejected)",
            stats.completed,
            stats.rejected
        );
        Ok(())
    }
}
