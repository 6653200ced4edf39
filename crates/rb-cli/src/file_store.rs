//! JSON file store
//!
//! A whole-file JSON object standing in for the browser's key-value storage.
//! Writes go to a sibling temp file first and are renamed into place.

use std::cell::RefCell;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rb_core::store::ChangeCallback;
use rb_core::{ChangeSource, SettingsStore, StorageChanges, StoreError};
use serde_json::{Map, Value};

#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    listeners: Rc<RefCell<Vec<ChangeCallback>>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            listeners: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "Failed to read '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if text.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(StoreError::Decode(format!(
                "'{}' does not hold a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(StoreError::Decode(e.to_string())),
        }
    }

    async fn write_all(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(map).map_err(|e| StoreError::Encode(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, text)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to write '{}': {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to replace '{}': {}", self.path.display(), e))
        })
    }
}

impl SettingsStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut map = self.read_all().await?;
        map.insert(key.to_string(), value);
        self.write_all(&map).await?;

        let changes = StorageChanges::new([key]);
        let listeners: Vec<ChangeCallback> = self.listeners.borrow().clone();
        for listener in listeners {
            listener(&changes);
        }
        Ok(())
    }
}

impl ChangeSource for FileStore {
    fn subscribe(&self, callback: ChangeCallback) {
        self.listeners.borrow_mut().push(callback);
    }
}
