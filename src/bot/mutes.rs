// src/bot/mutes.rs - In-memory mute schedule with lazy expiry

use chrono::{DateTime, Duration, Utc};
use log::info;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MuteError {
    #[error("mute duration must be a positive number of minutes, got {0}")]
    InvalidDuration(i64),
}

/// Tracks temporary silences. Entries are ephemeral: a restart clears them,
/// and expired entries are evicted only on the next lookup for that user.
pub struct MuteScheduler {
    muted_until: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MuteScheduler {
    pub fn new() -> Self {
        Self {
            muted_until: RwLock::new(HashMap::new()),
        }
    }

    /// Mute a user for `minutes`, overwriting any existing expiry. Rejects
    /// zero and negative durations without touching the schedule.
    pub async fn mute(&self, user_guid: &str, minutes: i64) -> Result<DateTime<Utc>, MuteError> {
        if minutes <= 0 {
            return Err(MuteError::InvalidDuration(minutes));
        }

        let expiry = Utc::now() + Duration::minutes(minutes);
        self.muted_until
            .write()
            .await
            .insert(user_guid.to_string(), expiry);
        info!("Muted {} for {} minutes (until {})", user_guid, minutes, expiry);
        Ok(expiry)
    }

    /// Whether the user is currently muted. An expired entry is removed here;
    /// this is the only eviction path, there is no background sweep.
    pub async fn is_muted(&self, user_guid: &str) -> bool {
        let mut muted = self.muted_until.write().await;
        match muted.get(user_guid) {
            Some(expiry) if Utc::now() < *expiry => true,
            Some(_) => {
                muted.remove(user_guid);
                false
            }
            None => false,
        }
    }
}

impl Default for MuteScheduler {
    fn default() -> Self {
        Self::new()
    }
}
