//! Local-first persistence: a small key-value store of JSON documents, one
//! file per key under the app data directory. There is no schema migration;
//! a value that fails to parse degrades to the empty/default state without
//! surfacing an error. Writes are idempotent full-file overwrites.

use std::fs;
use std::path::PathBuf;

use tracing::warn;

use crate::chat::ChatMessage;
use crate::error::AppError;
use crate::mood::MoodEntry;

/// Storage keys, unchanged from the original product so an existing profile
/// keeps working.
pub const USER_NAME_KEY: &str = "minda_user_name";
pub const CHAT_HISTORY_KEY: &str = "serenity_chat_history";
pub const MOOD_DATA_KEY: &str = "serenity_mood_data";

/// Injected storage seam. Production uses [`JsonFileStore`]; tests substitute
/// an in-memory fake.
pub trait ProfileStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: PathBuf) -> Self {
        if !dir.exists() {
            fs::create_dir_all(&dir).ok();
        }
        Self { dir }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl ProfileStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ============================================================================
// Typed helpers
// ============================================================================

/// `None` means the key was never written (callers fall back to their seeded
/// default); a present value that fails to parse degrades to empty.
pub fn load_transcript(store: &dyn ProfileStore) -> Option<Vec<ChatMessage>> {
    store.get(CHAT_HISTORY_KEY).map(|raw| {
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Persisted transcript did not parse; starting empty");
            Vec::new()
        })
    })
}

pub fn save_transcript(
    store: &dyn ProfileStore,
    messages: &[ChatMessage],
) -> Result<(), AppError> {
    store.set(CHAT_HISTORY_KEY, &serde_json::to_string(messages)?)
}

pub fn clear_transcript(store: &dyn ProfileStore) -> Result<(), AppError> {
    store.remove(CHAT_HISTORY_KEY)
}

pub fn load_mood_series(store: &dyn ProfileStore) -> Option<Vec<MoodEntry>> {
    store.get(MOOD_DATA_KEY).map(|raw| {
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "Persisted mood series did not parse; starting empty");
            Vec::new()
        })
    })
}

pub fn save_mood_series(store: &dyn ProfileStore, entries: &[MoodEntry]) -> Result<(), AppError> {
    store.set(MOOD_DATA_KEY, &serde_json::to_string(entries)?)
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-memory stand-in for the browser-profile store.
    #[derive(Default)]
    pub struct MemoryStore {
        values: Mutex<HashMap<String, String>>,
    }

    impl ProfileStore for MemoryStore {
        fn get(&self, key: &str) -> Option<String> {
            self.values.lock().unwrap().get(key).cloned()
        }

        fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
            self.values
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<(), AppError> {
            self.values.lock().unwrap().remove(key);
            Ok(())
        }
    }
}
