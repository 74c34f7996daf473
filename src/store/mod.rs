//! Storage abstraction for trigger persistence.
//!
//! The trait interface lives here; the file-based implementation is in the
//! `file` submodule. Naming conventions:
//!
//! - `list` - enumerate all records
//! - `load` - read a single record, returns `Option` if not found
//! - `save` - create or update (upsert semantics, must be atomic)
//! - `delete` - remove a record

pub mod error;
pub mod file;

use async_trait::async_trait;

use crate::scheduler::Trigger;

pub use error::{StorageError, StorageResult};
pub use file::FileTriggerStore;

/// Storage interface for trigger persistence.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// List all stored triggers.
    ///
    /// Used for recovering pending triggers on startup.
    async fn list(&self) -> StorageResult<Vec<Trigger>>;

    /// Load a trigger by id.
    ///
    /// Returns `Ok(None)` if the trigger doesn't exist.
    async fn load(&self, id: &str) -> StorageResult<Option<Trigger>>;

    /// Create or update a trigger (upsert semantics).
    ///
    /// Must be atomic - either fully succeeds or has no effect.
    async fn save(&self, trigger: &Trigger) -> StorageResult<()>;

    /// Delete a trigger.
    ///
    /// No-op if the trigger doesn't exist.
    async fn delete(&self, id: &str) -> StorageResult<()>;
}
