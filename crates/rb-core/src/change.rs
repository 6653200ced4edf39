//! Storage change subscription

use std::rc::Rc;

use crate::scheduler::{Stimulus, StimulusSender};
use crate::store::{ChangeSource, StorageChanges};

/// Turns storage change notifications for one namespace into
/// [`Stimulus::SettingsChanged`] work items.
#[derive(Debug, Clone)]
pub struct ChangeListener {
    storage_key: String,
}

impl ChangeListener {
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
        }
    }

    /// Does this change batch touch our record?
    pub fn is_relevant(&self, changes: &StorageChanges) -> bool {
        changes.contains(&self.storage_key)
    }

    /// Subscribe to `source`, forwarding relevant changes to `sender`.
    ///
    /// The callback only enqueues; the refresh itself runs when the engine
    /// drains the queue.
    pub fn attach<C, E>(&self, source: &C, sender: StimulusSender<E>)
    where
        C: ChangeSource,
        E: 'static,
    {
        let listener = self.clone();
        source.subscribe(Rc::new(move |changes: &StorageChanges| {
            if listener.is_relevant(changes) {
                log::debug!("Settings record '{}' changed", listener.storage_key);
                sender.send(Stimulus::SettingsChanged);
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::StimulusQueue;
    use crate::settings::STORAGE_KEY;
    use crate::store::{MemoryStore, SettingsStore};
    use serde_json::json;

    #[test]
    fn test_relevance() {
        let listener = ChangeListener::new(STORAGE_KEY);
        assert!(listener.is_relevant(&StorageChanges::new([STORAGE_KEY, "other"])));
        assert!(!listener.is_relevant(&StorageChanges::new(["other"])));
        assert!(!listener.is_relevant(&StorageChanges::default()));
    }

    #[tokio::test]
    async fn test_writes_enqueue_refresh() {
        let store = MemoryStore::new();
        let queue: StimulusQueue<u32> = StimulusQueue::new();
        ChangeListener::new(STORAGE_KEY).attach(&store, queue.sender());

        store.set("unrelated", json!(1)).await.unwrap();
        assert!(queue.is_empty());

        store.set(STORAGE_KEY, json!({})).await.unwrap();
        store.set(STORAGE_KEY, json!({ "blockedCount": 1 })).await.unwrap();
        assert_eq!(queue.pop(), Some(Stimulus::SettingsChanged));
        assert_eq!(queue.pop(), None);
    }
}
