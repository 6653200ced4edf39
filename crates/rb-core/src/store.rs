//! Persistence seam
//!
//! The engine talks to an opaque asynchronous key-value map. Hosts provide
//! the real backend (extension-scoped or page-scoped storage); this module
//! defines the contract plus an in-memory store that several engine
//! instances can share, which is how concurrent tabs are modelled in tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

/// Error type for persistence operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to encode record: {0}")]
    Encode(String),
    #[error("Failed to decode record: {0}")]
    Decode(String),
}

/// Asynchronous get/set map holding JSON records.
///
/// Futures are not required to be `Send`: the engine runs on one thread.
#[allow(async_fn_in_trait)]
pub trait SettingsStore {
    /// Fetch the record stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace the record stored under `key`.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

// =============================================================================
// Change notifications
// =============================================================================

/// Top-level keys touched by one write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageChanges {
    keys: Vec<String>,
}

impl StorageChanges {
    pub fn new<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// Callback invoked with each change batch.
pub type ChangeCallback = Rc<dyn Fn(&StorageChanges)>;

/// Something that reports writes to the persistence backend.
pub trait ChangeSource {
    fn subscribe(&self, callback: ChangeCallback);
}

// =============================================================================
// In-memory store
// =============================================================================

/// Shared in-memory store. Clones share the same map and subscribers.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    records: RefCell<HashMap<String, Value>>,
    listeners: RefCell<Vec<ChangeCallback>>,
    unavailable: Cell<bool>,
    yielding: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `get`/`set` suspend once before completing, so concurrent
    /// callers interleave the way real asynchronous storage does.
    pub fn with_yielding(self) -> Self {
        self.inner.yielding.set(true);
        self
    }

    /// Simulate a backend outage. While unavailable every call fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.set(unavailable);
    }

    /// Write a record without notifying subscribers.
    pub fn seed(&self, key: &str, value: Value) {
        self.inner.records.borrow_mut().insert(key.to_string(), value);
    }

    /// Current record under `key`, read synchronously.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.inner.records.borrow().get(key).cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.unavailable.get() {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }

    async fn suspend(&self) {
        if self.inner.yielding.get() {
            futures_lite::future::yield_now().await;
        }
    }

    fn notify(&self, changes: &StorageChanges) {
        // Clone out so callbacks may subscribe or write without re-borrowing.
        let listeners: Vec<ChangeCallback> = self.inner.listeners.borrow().clone();
        for listener in listeners {
            listener(changes);
        }
    }
}

impl SettingsStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.suspend().await;
        self.check_available()?;
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.suspend().await;
        self.check_available()?;
        self.inner.records.borrow_mut().insert(key.to_string(), value);
        self.notify(&StorageChanges::new([key]));
        Ok(())
    }
}

impl ChangeSource for MemoryStore {
    fn subscribe(&self, callback: ChangeCallback) {
        self.inner.listeners.borrow_mut().push(callback);
    }
}
