use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::StoreError;

/// Persisted state of one applet instance, owned by exactly one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppletRecord {
    /// Same id as the applet instance that created it
    pub id: String,

    /// Owner of the record
    pub user_id: i64,

    /// Registry name used to rebuild the applet variant
    pub applet_name: String,

    /// Opaque to the store; owned by the applet variant
    #[serde(default)]
    pub state_data: Value,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create/read/update access to applet state, always scoped by owner
///
/// A record owned by someone else is reported as [`StoreError::NotFound`],
/// exactly like a record that does not exist.
pub trait AppletStore: Send + Sync {
    /// Insert a new record
    ///
    /// # Arguments
    /// * `id` - Record id, normally the id of the applet instance
    /// * `user_id` - Owner of the record
    /// * `applet_name` - Registry name of the applet variant
    /// * `state_data` - Initial state
    ///
    /// # Returns
    /// * `Result<AppletRecord, StoreError>` - The stored record with both timestamps set
    ///
    /// # Errors
    /// * [`StoreError::Create`] if `id` is already taken or the write fails
    fn create(
        &self,
        id: &str,
        user_id: i64,
        applet_name: &str,
        state_data: Value,
    ) -> Result<AppletRecord, StoreError>;

    /// All records owned by `user_id`, in creation order
    ///
    /// # Errors
    /// * [`StoreError::List`] if the backing storage cannot be read
    fn list(&self, user_id: i64) -> Result<Vec<AppletRecord>, StoreError>;

    /// Fetch one record
    ///
    /// # Arguments
    /// * `user_id` - Caller; must own the record
    /// * `id` - Record id
    ///
    /// # Errors
    /// * [`StoreError::NotFound`] if the record is missing or owned by someone else
    /// * [`StoreError::Get`] if the backing storage cannot be read
    fn get(&self, user_id: i64, id: &str) -> Result<AppletRecord, StoreError>;

    /// Replace `state_data` wholesale (no merge) and bump `updated_at`
    ///
    /// # Arguments
    /// * `user_id` - Caller; must own the record
    /// * `id` - Record id
    /// * `state_data` - New state
    ///
    /// # Returns
    /// * `Result<AppletRecord, StoreError>` - The record after the update
    ///
    /// # Errors
    /// * [`StoreError::NotFound`] if the record is missing or owned by someone else
    /// * [`StoreError::Update`] if the write fails; the old state is kept
    fn update(&self, user_id: i64, id: &str, state_data: Value)
    -> Result<AppletRecord, StoreError>;
}

/// Applet store kept in memory and mirrored to a JSON file
///
/// Every mutation is applied to a copy of the records, written out, and
/// only then swapped in. A failed write leaves the store as it was.
#[derive(Debug)]
pub struct FileAppletStore {
    path: Option<PathBuf>,
    records: RwLock<Vec<AppletRecord>>,
}

impl FileAppletStore {
    /// Store with no backing file
    pub fn in_memory() -> Self {
        FileAppletStore {
            path: None,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Open the store at `path`, loading any records already saved there
    ///
    /// A missing file is treated as an empty store and created on the first
    /// write.
    ///
    /// # Arguments
    /// * `path` - Location of `applet_state.json`
    ///
    /// # Errors
    /// * `InvalidData` if the file is not a JSON list of records
    /// * Any other IO error from reading the file
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&contents)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?
            }
        } else {
            Vec::new()
        };

        debug!("loaded {} applet records from {}", records.len(), path.display());

        Ok(FileAppletStore {
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn save(&self, records: &[AppletRecord]) -> Result<(), String> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(records)
            .map_err(|e| format!("failed to serialize records: {}", e))?;

        // Write a sibling file, then rename it over the target
        let tmp_path = path.with_extension("json.tmp");
        let mut file = File::create(&tmp_path)
            .map_err(|e| format!("failed to create {}: {}", tmp_path.display(), e))?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| format!("failed to write {}: {}", tmp_path.display(), e))?;
        fs::rename(&tmp_path, path)
            .map_err(|e| format!("failed to replace {}: {}", path.display(), e))?;

        Ok(())
    }
}

const LOCK_POISONED: &str = "applet store lock poisoned";

impl AppletStore for FileAppletStore {
    fn create(
        &self,
        id: &str,
        user_id: i64,
        applet_name: &str,
        state_data: Value,
    ) -> Result<AppletRecord, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Create(LOCK_POISONED.to_string()))?;

        if records.iter().any(|record| record.id == id) {
            return Err(StoreError::Create(format!(
                "UNIQUE constraint failed: applet_state.id ({})",
                id
            )));
        }

        let now = Utc::now();
        let record = AppletRecord {
            id: id.to_string(),
            user_id,
            applet_name: applet_name.to_string(),
            state_data,
            created_at: now,
            updated_at: now,
        };

        let mut next = records.clone();
        next.push(record.clone());
        self.save(&next).map_err(StoreError::Create)?;
        *records = next;

        debug!("created applet record {} ({}) for user {}", id, applet_name, user_id);
        Ok(record)
    }

    fn list(&self, user_id: i64) -> Result<Vec<AppletRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::List(LOCK_POISONED.to_string()))?;

        Ok(records
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    fn get(&self, user_id: i64, id: &str) -> Result<AppletRecord, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Get(LOCK_POISONED.to_string()))?;

        records
            .iter()
            .find(|record| record.user_id == user_id && record.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn update(
        &self,
        user_id: i64,
        id: &str,
        state_data: Value,
    ) -> Result<AppletRecord, StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Update(LOCK_POISONED.to_string()))?;

        let index = records
            .iter()
            .position(|record| record.user_id == user_id && record.id == id)
            .ok_or(StoreError::NotFound)?;

        let mut next = records.clone();
        let record = &mut next[index];
        record.state_data = state_data;
        record.updated_at = Utc::now();
        let updated = record.clone();

        self.save(&next).map_err(StoreError::Update)?;
        *records = next;

        debug!("updated applet record {} for user {}", id, user_id);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_then_get() {
        let store = FileAppletStore::in_memory();
        let created = store.create("a1", 7, "chat_history", json!({})).unwrap();
        assert_eq!(created.created_at, created.updated_at);

        let fetched = store.get(7, "a1").unwrap();
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let store = FileAppletStore::in_memory();
        store.create("a1", 7, "chat_history", json!({})).unwrap();

        let err = store.create("a1", 8, "chat_history", json!({})).unwrap_err();
        assert!(matches!(err, StoreError::Create(_)));
        assert!(err.to_string().starts_with("Failed to create AppletState: "));
        assert_eq!(store.list(8).unwrap().len(), 0);
    }

    #[test]
    fn test_update_unknown_record() {
        let store = FileAppletStore::in_memory();
        let err = store.update(7, "missing", json!({})).unwrap_err();
        assert_eq!(err, StoreError::NotFound);
        assert_eq!(err.to_string(), "AppletState not found");
    }

    #[test]
    fn test_update_replaces_instead_of_merging() {
        let store = FileAppletStore::in_memory();
        store
            .create("a1", 7, "chat_history", json!({"history": ["a"], "extra": 1}))
            .unwrap();

        let updated = store.update(7, "a1", json!({"history": ["b"]})).unwrap();
        assert_eq!(updated.state_data, json!({"history": ["b"]}));
        assert!(updated.updated_at >= updated.created_at);
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileAppletStore::open(dir.path().join("missing_dir").join("applets.json"))
            .unwrap();

        let err = store.create("a1", 7, "chat_history", json!({})).unwrap_err();
        assert!(matches!(err, StoreError::Create(_)));
        assert!(store.list(7).unwrap().is_empty());
    }
}
