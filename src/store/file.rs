//! File-based trigger storage.
//!
//! Stores triggers as individual YAML files at `{triggers_dir}/{id}.yaml`.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::scheduler::Trigger;

use super::TriggerStore;
use super::error::{StorageError, StorageResult};

/// File-based implementation of `TriggerStore`.
///
/// Each trigger is stored as a separate YAML file in the triggers directory.
/// Uses atomic writes (temp file + rename) to prevent corruption. Saving an
/// id that already exists replaces the file, which gives `save` its upsert
/// semantics.
#[derive(Debug, Clone)]
pub struct FileTriggerStore {
    triggers_dir: PathBuf,
}

impl FileTriggerStore {
    /// Create a new file trigger store rooted at `triggers_dir`.
    pub fn new(triggers_dir: impl Into<PathBuf>) -> Self {
        Self {
            triggers_dir: triggers_dir.into(),
        }
    }

    /// Get the file path for a trigger.
    fn trigger_path(&self, id: &str) -> PathBuf {
        self.triggers_dir.join(format!("{}.yaml", id))
    }

    /// Ensure the triggers directory exists.
    async fn ensure_dir(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.triggers_dir)
            .await
            .map_err(|e| StorageError::file_io(&self.triggers_dir, e))
    }
}

#[async_trait]
impl TriggerStore for FileTriggerStore {
    async fn list(&self) -> StorageResult<Vec<Trigger>> {
        let mut triggers = Vec::new();

        let mut entries = match fs::read_dir(&self.triggers_dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::file_io(&self.triggers_dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::file_io(&self.triggers_dir, e))?
        {
            let path = entry.path();

            // Skip directories and non-YAML files
            if path.is_dir() {
                continue;
            }
            if path.extension().is_none_or(|ext| ext != "yaml") {
                continue;
            }

            let content = match fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read trigger");
                    continue;
                }
            };

            // One unreadable record must not block recovery of the rest
            match serde_saphyr::from_str::<Trigger>(&content) {
                Ok(trigger) => triggers.push(trigger),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse trigger");
                    continue;
                }
            }
        }

        Ok(triggers)
    }

    async fn load(&self, id: &str) -> StorageResult<Option<Trigger>> {
        let path = self.trigger_path(id);

        let content = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::file_io(&path, e)),
        };

        let trigger: Trigger = serde_saphyr::from_str(&content)
            .map_err(|e| StorageError::file_deserialization(&path, e.to_string()))?;

        Ok(Some(trigger))
    }

    async fn save(&self, trigger: &Trigger) -> StorageResult<()> {
        self.ensure_dir().await?;

        let path = self.trigger_path(&trigger.id);
        let temp_path = path.with_extension("yaml.tmp");

        let content = serde_saphyr::to_string(trigger)
            .map_err(|e| StorageError::serialization(e.to_string()))?;

        // Write to temp file first
        fs::write(&temp_path, content)
            .await
            .map_err(|e| StorageError::file_io(&temp_path, e))?;

        // Atomic rename
        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StorageError::file_io(&path, e))?;

        Ok(())
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.trigger_path(id);

        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::file_io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_trigger(id: &str) -> Trigger {
        Trigger {
            id: id.to_string(),
            fire_at: Utc::now() + chrono::Duration::hours(2),
            payload: "La sesión arranca pronto".to_string(),
        }
    }

    fn create_store(temp_dir: &TempDir) -> FileTriggerStore {
        FileTriggerStore::new(temp_dir.path().join("triggers"))
    }

    #[tokio::test]
    async fn list() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        store.save(&test_trigger("s1_LEAD")).await.unwrap();
        store.save(&test_trigger("s1_START")).await.unwrap();
        store.save(&test_trigger("s2_START")).await.unwrap();

        let triggers = store.list().await.unwrap();
        assert_eq!(triggers.len(), 3);
    }

    #[tokio::test]
    async fn list_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let triggers = store.list().await.unwrap();
        assert!(triggers.is_empty());
    }

    #[tokio::test]
    async fn list_skips_unparseable_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        store.save(&test_trigger("s1_START")).await.unwrap();
        std::fs::write(
            temp_dir.path().join("triggers").join("garbage.yaml"),
            ": not: [valid",
        )
        .unwrap();

        let triggers = store.list().await.unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].id, "s1_START");
    }

    #[tokio::test]
    async fn load_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let loaded = store.load("nonexistent").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let trigger = test_trigger("s1_LEAD");
        store.save(&trigger).await.unwrap();

        let loaded = store.load("s1_LEAD").await.unwrap();
        assert!(loaded.is_some());

        let loaded = loaded.unwrap();
        assert_eq!(loaded.id, "s1_LEAD");
        assert_eq!(loaded.payload, trigger.payload);
        assert_eq!(loaded.fire_at, trigger.fire_at);
    }

    #[tokio::test]
    async fn save_replaces_existing() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        let mut trigger = test_trigger("s1_START");
        store.save(&trigger).await.unwrap();

        trigger.payload = "updated".to_string();
        store.save(&trigger).await.unwrap();

        let triggers = store.list().await.unwrap();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].payload, "updated");
    }

    #[tokio::test]
    async fn delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        store.save(&test_trigger("s1_LEAD")).await.unwrap();
        assert!(store.load("s1_LEAD").await.unwrap().is_some());

        store.delete("s1_LEAD").await.unwrap();
        assert!(store.load("s1_LEAD").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_nonexistent_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_store(&temp_dir);

        store.delete("nonexistent").await.unwrap();
    }
}
