//! Blocked-count persistence
//!
//! The counter is a best-effort statistic shared by every open tab. Each
//! increment is a plain get-then-set of the whole record with no
//! compare-and-swap, so two tabs incrementing at the same moment can lose
//! one update. That inexactness is accepted.

use serde_json::Value;

use crate::settings::{default_record, read_count, BLOCKED_COUNT_FIELD};
use crate::store::{SettingsStore, StoreError};

/// Read-modify-write incrementer for the persisted counter.
#[derive(Debug, Clone)]
pub struct CounterPersister {
    storage_key: String,
}

impl CounterPersister {
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
        }
    }

    /// Add one to the stored counter and return the value written.
    ///
    /// Every other field of the record is written back unchanged.
    pub async fn increment<S: SettingsStore>(&self, store: &S) -> Result<u64, StoreError> {
        let record = store.get(&self.storage_key).await?;
        let (updated, count) = bump_record(record);
        store.set(&self.storage_key, updated).await?;
        Ok(count)
    }
}

/// Increment the counter inside a raw record.
///
/// A missing or non-object record is replaced by the default record.
pub fn bump_record(record: Option<Value>) -> (Value, u64) {
    let mut map = match record {
        Some(Value::Object(map)) => map,
        _ => default_record(),
    };
    let count = read_count(&map).saturating_add(1);
    map.insert(BLOCKED_COUNT_FIELD.to_string(), Value::from(count));
    (Value::Object(map), count)
}
