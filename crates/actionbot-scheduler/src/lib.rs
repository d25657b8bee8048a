//! # ActionBot Scheduler
//!
//! Cron-driven timer for scheduled rules. Each job binds a schedule to an
//! async callback; the engine sleeps until the earliest due job, fires it on
//! a tracked task, and drains in-flight fires on `stop()`.
//!
//! ## Architecture
//! ```text
//! Scheduler (driver task)
//!   ├── job-1: "0 0 9 * * *"  → callback (dispatch to #general)
//!   ├── job-2: "@hourly"      → callback
//!   └── job-3: "@every 30s"   → callback
//!        └── fire → JoinSet (awaited on stop)
//! ```
//!
//! Schedule grammar: 6-field cron with seconds (`sec min hour dom mon dow`),
//! the descriptors `@yearly @annually @monthly @weekly @daily @midnight @hourly`,
//! and `@every <duration>` (e.g. `@every 1m30s`).

pub mod engine;
pub mod job;
pub mod schedule;

pub use engine::Scheduler;
pub use job::{JobCallback, JobId, JobInfo, job_callback};
pub use schedule::Schedule;
