//! # ActionBot Core
//!
//! Shared building blocks for the ActionBot workspace:
//! - `config` — bot, dispatcher, rate-limit and action descriptor configuration
//! - `error` — the workspace-wide error type
//! - `types` — inbound events and outbound payloads
//! - `traits` — capabilities consumed from the chat transport and auth layer

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::ActionBotConfig;
pub use error::{ActionBotError, Result};
pub use traits::{AuthProvider, ResponseExecutor};
