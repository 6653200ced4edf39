//! Shared counter race
//!
//! Several engine instances (one per tab) bump the same persisted counter
//! with a plain read-modify-write. Run concurrently, their reads can all
//! land before any write, and increments are lost. Must run inside a
//! `LocalSet`.

use rb_core::counter::CounterPersister;
use rb_core::{MemoryStore, STORAGE_KEY};
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaceReport {
    pub start: u64,
    pub instances: u64,
    pub failed: u64,
    pub final_count: u64,
}

impl RaceReport {
    pub fn expected(&self) -> u64 {
        self.start
            .saturating_add(self.instances)
            .saturating_sub(self.failed)
    }

    pub fn lost(&self) -> u64 {
        self.expected().saturating_sub(self.final_count)
    }
}

fn seeded_store(start: u64) -> MemoryStore {
    let store = MemoryStore::new().with_yielding();
    store.seed(STORAGE_KEY, json!({ "keywords": [], "blockedCount": start }));
    store
}

fn final_count(store: &MemoryStore) -> u64 {
    store
        .peek(STORAGE_KEY)
        .and_then(|record| record["blockedCount"].as_u64())
        .unwrap_or(0)
}

pub async fn run_race(instances: u64, start: u64, sequential: bool) -> RaceReport {
    let store = seeded_store(start);
    let mut failed = 0;

    if sequential {
        for _ in 0..instances {
            if let Err(e) = CounterPersister::new(STORAGE_KEY).increment(&store).await {
                log::warn!("Increment failed: {}", e);
                failed += 1;
            }
        }
    } else {
        let tasks: Vec<_> = (0..instances)
            .map(|_| {
                let store = store.clone();
                tokio::task::spawn_local(async move {
                    CounterPersister::new(STORAGE_KEY).increment(&store).await
                })
            })
            .collect();

        for task in tasks {
            match task.await {
                Ok(Ok(count)) => log::debug!("Instance wrote {}", count),
                Ok(Err(e)) => {
                    log::warn!("Increment failed: {}", e);
                    failed += 1;
                }
                Err(e) => {
                    log::warn!("Instance task failed: {}", e);
                    failed += 1;
                }
            }
        }
    }

    RaceReport {
        start,
        instances,
        failed,
        final_count: final_count(&store),
    }
}
