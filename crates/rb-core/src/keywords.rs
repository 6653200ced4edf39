//! Keyword set and cache
//!
//! The cache holds the enabled, lowercased projection of the user's keyword
//! list. It is rebuilt wholesale on every refresh and swapped in as a single
//! `Rc`, so a reader holding the previous set keeps seeing exactly that set.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::settings::StoredSettings;
use crate::store::SettingsStore;

// =============================================================================
// KeywordSet
// =============================================================================

/// Immutable set of lowercased keywords used for matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordSet {
    words: Vec<String>,
}

impl KeywordSet {
    /// Build from raw keyword texts. Texts are lowercased; empty texts are
    /// dropped since they would match every block.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for word in words {
            let lowered = word.as_ref().to_lowercase();
            if lowered.is_empty() || out.contains(&lowered) {
                continue;
            }
            out.push(lowered);
        }
        Self { words: out }
    }

    /// Project the enabled keywords of a settings record.
    pub fn from_settings(settings: &StoredSettings) -> Self {
        Self::new(settings.enabled_texts())
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.words.iter().map(String::as_str)
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.iter().any(|w| w == word)
    }
}

// =============================================================================
// KeywordCache
// =============================================================================

/// In-memory keyword set, refreshed from the persistence store.
pub struct KeywordCache {
    storage_key: String,
    current: RefCell<Rc<KeywordSet>>,
    last_blocked_count: Cell<u64>,
    issued: Cell<u64>,
    applied: Cell<u64>,
}

impl KeywordCache {
    /// Create an empty cache reading the record under `storage_key`.
    pub fn new(storage_key: impl Into<String>) -> Self {
        Self {
            storage_key: storage_key.into(),
            current: RefCell::new(Rc::new(KeywordSet::default())),
            last_blocked_count: Cell::new(0),
            issued: Cell::new(0),
            applied: Cell::new(0),
        }
    }

    /// Latest keyword set.
    pub fn current_set(&self) -> Rc<KeywordSet> {
        Rc::clone(&self.current.borrow())
    }

    /// Counter value seen by the last refresh, plus local suppressions since.
    pub fn blocked_count(&self) -> u64 {
        self.last_blocked_count.get()
    }

    /// Record a counter value observed elsewhere (e.g. after an increment).
    pub fn note_blocked_count(&self, count: u64) {
        self.last_blocked_count.set(count);
    }

    /// Bump the local view of the counter by one.
    pub fn bump_blocked_count(&self) {
        self.last_blocked_count.set(self.last_blocked_count.get() + 1);
    }

    /// Fetch the record and swap in a fresh set.
    ///
    /// A failed fetch or absent record yields an empty set. When refreshes
    /// overlap, a refresh that was issued earlier never replaces the result
    /// of one issued later.
    pub async fn refresh<S: SettingsStore>(&self, store: &S) -> Rc<KeywordSet> {
        let ticket = self.issued.get() + 1;
        self.issued.set(ticket);

        let settings = match store.get(&self.storage_key).await {
            Ok(record) => StoredSettings::from_value(record.as_ref()),
            Err(e) => {
                log::warn!("Keyword refresh failed, filtering disabled: {}", e);
                StoredSettings::default()
            }
        };

        if ticket < self.applied.get() {
            log::debug!("Discarding stale keyword refresh #{}", ticket);
            return self.current_set();
        }
        self.applied.set(ticket);

        let set = Rc::new(KeywordSet::from_settings(&settings));
        log::debug!("Keyword set refreshed: {} active", set.len());
        self.last_blocked_count.set(settings.blocked_count);
        self.replace(Rc::clone(&set));
        set
    }

    /// Swap in a new set.
    pub fn replace(&self, set: Rc<KeywordSet>) {
        *self.current.borrow_mut() = set;
    }
}
