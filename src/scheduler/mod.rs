//! Trigger scheduling and execution.
//!
//! The core of the system: computes two calendar-time triggers per session
//! (advance warning and start), persists them so they survive restarts, and
//! fires each one at most once from a tick-driven execution loop.
//!
//! # Usage
//!
//! ```ignore
//! // Start the scheduler service
//! let config = SchedulerConfig { ... };
//! let handle = SchedulerService::new(config).start().await?;
//!
//! // Schedule both notifications for a session (idempotent)
//! let written = handle.schedule_session(&session, "GP de Mónaco").await?;
//!
//! // Dedup check used by discovery
//! if handle.is_scheduled(&session.id).await { /* skip */ }
//! ```

pub mod cache;
pub mod error;
pub mod service;
pub mod trigger;

pub use cache::TriggerCache;
pub use error::{Result, SchedulerError};
pub use service::{DEFAULT_TICK, SchedulerConfig, SchedulerHandle, SchedulerService};
pub use trigger::{Trigger, TriggerId, TriggerKind};
