//! Gridwatch - Telegram notifier for upcoming motorsport sessions.

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod config;
pub mod store;

// ============================================================================
// Domain
// ============================================================================

pub mod discovery;
pub mod races;
pub mod scheduler;

// ============================================================================
// Delivery & HTTP
// ============================================================================

pub mod bot;
pub mod notify;
pub mod server;
