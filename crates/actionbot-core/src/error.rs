//! Error types for ActionBot.

use thiserror::Error;

/// Workspace-wide error type.
#[derive(Debug, Error)]
pub enum ActionBotError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Scheduler already running")]
    AlreadyRunning,

    #[error("Scheduler not running")]
    NotRunning,

    #[error("Worker queue is full (capacity {0})")]
    QueueFull(usize),

    #[error("Worker pool is shut down")]
    PoolClosed,

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ActionBotError {
    /// Shorthand for an [`ActionBotError::InvalidRule`].
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an [`ActionBotError::InvalidSchedule`].
    pub fn invalid_schedule(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ActionBotError>;
