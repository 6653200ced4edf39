//! Filtering engine
//!
//! One [`Engine`] per page. It owns the keyword cache, the observation loop
//! and the counter persister, and consumes stimuli one at a time. A stimulus
//! is processed in two phases: the synchronous scan (match, suppress and mark
//! for the whole batch without yielding), then the asynchronous counter
//! increments the scan requested. Store calls are the only suspension points.

use std::cell::Cell;
use std::rc::Rc;

use crate::change::ChangeListener;
use crate::config::{ConfigError, EngineConfig};
use crate::counter::CounterPersister;
use crate::document::Document;
use crate::keywords::{KeywordCache, KeywordSet};
use crate::marker::Marker;
use crate::observer::{ObservationLoop, ScanOutcome};
use crate::scheduler::{ScanTiming, Stimulus, StimulusQueue, StimulusSender};
use crate::store::{ChangeSource, SettingsStore};

/// Running totals for one engine instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Scans that got past the empty-keyword fast path.
    pub scans: u64,
    /// Scans skipped because no keyword was enabled.
    pub skipped_scans: u64,
    pub evaluated: u64,
    pub suppressed: u64,
    /// Increments that failed to persist.
    pub failed_increments: u64,
    /// Local view of the shared counter.
    pub blocked_count: u64,
}

pub struct Engine<S: SettingsStore> {
    store: S,
    cache: KeywordCache,
    listener: ChangeListener,
    observer: ObservationLoop,
    counter: CounterPersister,
    timing: ScanTiming,
    stats: Cell<EngineStats>,
}

impl<S: SettingsStore> Engine<S> {
    /// Build an engine over `store`. Fails only on an invalid configuration.
    pub fn new(config: &EngineConfig, store: S) -> Result<Self, ConfigError> {
        config.validate()?;
        let selectors = config.block_selectors()?;

        Ok(Self {
            store,
            cache: KeywordCache::new(config.storage_key.clone()),
            listener: ChangeListener::new(config.storage_key.clone()),
            observer: ObservationLoop::new(selectors, Marker::new(config.checked_flag.clone())),
            counter: CounterPersister::new(config.storage_key.clone()),
            timing: config.timing(),
            stats: Cell::new(EngineStats::default()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn timing(&self) -> ScanTiming {
        self.timing
    }

    pub fn observer(&self) -> &ObservationLoop {
        &self.observer
    }

    /// Current keyword set.
    pub fn keywords(&self) -> Rc<KeywordSet> {
        self.cache.current_set()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            blocked_count: self.cache.blocked_count(),
            ..self.stats.get()
        }
    }

    /// Load the keyword set for the first time.
    pub async fn start(&self) -> Rc<KeywordSet> {
        let set = self.cache.refresh(&self.store).await;
        log::info!("Engine started with {} active keywords", set.len());
        set
    }

    /// Forward storage changes for our record into `sender`.
    pub fn listen<C, E>(&self, source: &C, sender: StimulusSender<E>)
    where
        C: ChangeSource,
        E: 'static,
    {
        self.listener.attach(source, sender);
    }

    /// Process one stimulus to completion.
    pub async fn handle<D: Document>(
        &self,
        doc: &mut D,
        stimulus: Stimulus<D::Element>,
    ) -> ScanOutcome {
        let outcome = match stimulus {
            Stimulus::SettingsChanged => {
                self.cache.refresh(&self.store).await;
                return ScanOutcome::default();
            }
            Stimulus::NodesAdded(roots) => self.scan(doc, Some(roots.as_slice())),
            Stimulus::Tick => self.scan(doc, None),
        };

        self.flush_increments().await;
        outcome
    }

    /// Drain `queue`, handling every stimulus in order.
    pub async fn run_pending<D: Document>(
        &self,
        doc: &mut D,
        queue: &StimulusQueue<D::Element>,
    ) -> ScanOutcome {
        let mut total = ScanOutcome::default();
        while let Some(stimulus) = queue.pop() {
            total.merge(self.handle(doc, stimulus).await);
        }
        total
    }

    fn scan<D: Document>(&self, doc: &mut D, roots: Option<&[D::Element]>) -> ScanOutcome {
        let keywords = self.cache.current_set();
        let outcome = self.observer.scan(doc, roots, &keywords);

        let mut stats = self.stats.get();
        if outcome.skipped {
            stats.skipped_scans += 1;
        } else {
            stats.scans += 1;
        }
        stats.evaluated += outcome.evaluated as u64;
        stats.suppressed += outcome.suppressed as u64;
        self.stats.set(stats);

        for _ in 0..outcome.suppressed {
            self.cache.bump_blocked_count();
        }
        outcome
    }

    async fn flush_increments(&self) {
        let pending = self.observer.take_pending_increments();
        for _ in 0..pending {
            match self.counter.increment(&self.store).await {
                Ok(count) => {
                    log::trace!("Blocked count now {}", count);
                    self.cache.note_blocked_count(count);
                }
                Err(e) => {
                    log::warn!("Failed to persist blocked count: {}", e);
                    let mut stats = self.stats.get();
                    stats.failed_increments += 1;
                    self.stats.set(stats);
                }
            }
        }
    }
}
