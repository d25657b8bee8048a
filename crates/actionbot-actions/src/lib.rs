//! # ActionBot Actions
//!
//! Turns inbound chat events into responses according to the rule set.
//!
//! ## Architecture
//! ```text
//! inbound event ──▶ matcher (first match wins)
//!                     │
//!                     ▼
//!               conditions ──▶ rate limiter ──▶ worker pool ──▶ ResponseExecutor
//!                                                   ▲
//! scheduler fire (per target channel) ──────────────┘
//! ```
//!
//! - `registry` — rule descriptors compiled into immutable [`Rule`]s
//! - `matcher` — command / pattern / reaction matching
//! - `conditions` — auth, role, user, channel, guild and permission gates
//! - `ratelimit` — multi-scope token buckets
//! - `pool` — bounded worker pool with backpressure
//! - `dispatcher` — gating + response execution
//! - `engine` — [`ActionEngine`], the assembled whole

pub mod conditions;
pub mod dispatcher;
pub mod engine;
pub mod matcher;
pub mod outbound;
pub mod pool;
pub mod ratelimit;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use engine::ActionEngine;
pub use ratelimit::RateLimiter;
pub use registry::{ActionRegistry, Response, Rule, Trigger};
