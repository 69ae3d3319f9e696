// src/bot/storage.rs - Write-through JSON snapshot store for user records and settings

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

use crate::types::{FilterKind, GroupSettings, UserRecord};

/// Snapshot layout written to disk. Missing fields load as defaults so old
/// data files remain readable after schema additions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoreState {
    #[serde(default)]
    users: HashMap<String, UserRecord>,
    #[serde(default)]
    settings: GroupSettings,
}

/// Persistent store for per-user records and group settings.
///
/// Every mutating call holds the write lock across mutate + snapshot write,
/// so mutations serialize and the file on disk always reflects the last
/// successful call. A failed write is surfaced to the caller while the
/// in-memory state keeps the mutation.
pub struct UserStore {
    path: PathBuf,
    state: RwLock<StoreState>,
}

impl UserStore {
    /// Load the snapshot at `path`. A missing or corrupt file yields the
    /// default schema; corruption never prevents startup.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<StoreState>(&bytes) {
                Ok(state) => {
                    info!("Loaded {} user records from {}", state.users.len(), path.display());
                    state
                }
                Err(e) => {
                    warn!("Corrupt data file {}, starting with defaults: {}", path.display(), e);
                    StoreState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No data file at {}, starting with defaults", path.display());
                StoreState::default()
            }
            Err(e) => {
                warn!("Failed to read data file {}, starting with defaults: {}", path.display(), e);
                StoreState::default()
            }
        };

        Self {
            path,
            state: RwLock::new(state),
        }
    }

    /// Fetch a user's record, or the default view if none exists. Never fails.
    pub async fn get(&self, user_guid: &str) -> UserRecord {
        self.state
            .read()
            .await
            .users
            .get(user_guid)
            .cloned()
            .unwrap_or_default()
    }

    /// Mutate a user's record, creating it lazily, and persist before returning.
    pub async fn update<F>(&self, user_guid: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut state = self.state.write().await;
        let record = state.users.entry(user_guid.to_string()).or_default();
        mutate(record);
        self.persist(&state).await
    }

    /// Atomic read-increment-persist of the message counter. Returns the new count.
    pub async fn increment_messages(&self, user_guid: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        let record = state.users.entry(user_guid.to_string()).or_default();
        record.messages_count += 1;
        let count = record.messages_count;
        self.persist(&state).await?;
        Ok(count)
    }

    /// Remove a user's record entirely. Deleting an absent user is a no-op.
    pub async fn delete(&self, user_guid: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.users.remove(user_guid).is_none() {
            return Ok(());
        }
        self.persist(&state).await
    }

    pub async fn settings(&self) -> GroupSettings {
        self.state.read().await.settings
    }

    pub async fn strict_mode(&self) -> bool {
        self.state.read().await.settings.strict_mode
    }

    pub async fn set_strict_mode(&self, enabled: bool) -> Result<()> {
        let mut state = self.state.write().await;
        state.settings.strict_mode = enabled;
        self.persist(&state).await
    }

    pub async fn filter(&self, kind: FilterKind) -> bool {
        self.state.read().await.settings.filters.get(kind)
    }

    pub async fn set_filter(&self, kind: FilterKind, enabled: bool) -> Result<()> {
        let mut state = self.state.write().await;
        state.settings.filters.set(kind, enabled);
        self.persist(&state).await
    }

    pub async fn set_voice_call(&self, active: bool) -> Result<()> {
        let mut state = self.state.write().await;
        state.settings.voice_call_active = active;
        self.persist(&state).await
    }

    async fn persist(&self, state: &StoreState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state).context("Failed to serialize store snapshot")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write data file {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn store_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("bot_data.json")
    }

    #[tokio::test]
    async fn missing_file_loads_default_schema() {
        let dir = tempdir().unwrap();
        let store = UserStore::load(store_path(&dir)).await;

        assert_eq!(store.get("u_absent").await, UserRecord::default());
        let settings = store.settings().await;
        assert!(!settings.strict_mode);
        assert!(!settings.voice_call_active);
        for kind in FilterKind::ALL {
            assert!(!settings.filters.get(kind));
        }
    }

    #[tokio::test]
    async fn corrupt_file_loads_default_schema() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);
        tokio::fs::write(&path, b"{not json at all").await.unwrap();

        let store = UserStore::load(&path).await;
        assert_eq!(store.get("u1").await, UserRecord::default());
        assert!(!store.strict_mode().await);
    }

    #[test_log::test(tokio::test)]
    async fn update_creates_lazily_and_round_trips() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);

        {
            let store = UserStore::load(&path).await;
            store
                .update("u1", |r| {
                    r.name = "Ali Rezaei".to_string();
                    r.title = "قهرمان".to_string();
                    r.original_content = Some("hello".to_string());
                })
                .await
                .unwrap();
            store.set_strict_mode(true).await.unwrap();
            store.set_filter(FilterKind::Gif, true).await.unwrap();
            store.set_voice_call(true).await.unwrap();
        }

        // Reload from disk and compare.
        let reloaded = UserStore::load(&path).await;
        let record = reloaded.get("u1").await;
        assert_eq!(record.name, "Ali Rezaei");
        assert_eq!(record.title, "قهرمان");
        assert_eq!(record.original_content.as_deref(), Some("hello"));
        assert_eq!(record.role, "member");

        let settings = reloaded.settings().await;
        assert!(settings.strict_mode);
        assert!(settings.filters.gif);
        assert!(settings.voice_call_active);
        assert!(!settings.filters.video);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_lose_no_updates() {
        let dir = tempdir().unwrap();
        let store = Arc::new(UserStore::load(store_path(&dir)).await);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    store.increment_messages("u1").await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.get("u1").await.messages_count, 200);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = store_path(&dir);
        let store = UserStore::load(&path).await;

        store.delete("nobody").await.unwrap();

        store.update("u1", |r| r.name = "x".to_string()).await.unwrap();
        store.delete("u1").await.unwrap();
        store.delete("u1").await.unwrap();
        assert_eq!(store.get("u1").await, UserRecord::default());

        let reloaded = UserStore::load(&path).await;
        assert_eq!(reloaded.get("u1").await, UserRecord::default());
    }

    #[tokio::test]
    async fn filter_toggles_are_idempotent() {
        let dir = tempdir().unwrap();
        let store = UserStore::load(store_path(&dir)).await;

        store.set_filter(FilterKind::Voice, true).await.unwrap();
        store.set_filter(FilterKind::Voice, true).await.unwrap();
        assert!(store.filter(FilterKind::Voice).await);

        store.set_filter(FilterKind::Voice, false).await.unwrap();
        assert!(!store.filter(FilterKind::Voice).await);
    }

    #[tokio::test]
    async fn failed_write_is_surfaced_but_state_is_kept() {
        let dir = tempdir().unwrap();
        // Parent directory does not exist, so every snapshot write fails.
        let path = dir.path().join("no_such_dir").join("bot_data.json");
        let store = UserStore::load(&path).await;

        let result = store.update("u1", |r| r.name = "Ali".to_string()).await;
        assert!(result.is_err());

        // In-memory state still reflects the attempted change.
        assert_eq!(store.get("u1").await.name, "Ali");
    }
}
