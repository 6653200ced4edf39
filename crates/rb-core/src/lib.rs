//! ReddBlock Core Library
//!
//! This crate provides the in-page filtering engine for the ReddBlock feed
//! filter. It watches a growing feed of content blocks, hides every block
//! whose text contains one of the user's keywords, and keeps a persisted
//! count of hidden blocks.
//!
//! # Architecture
//!
//! The engine is host-agnostic. The page is reached through the
//! [`Document`] trait, persistence through [`SettingsStore`], and work
//! arrives as [`Stimulus`] items on a single-threaded queue fed by
//! structural-change notifications, timer ticks and storage changes.
//!
//! # Modules
//!
//! - `settings`: persisted record, lenient decoding, keyword list edits
//! - `store`: persistence seam and a shared in-memory store
//! - `keywords`: keyword set and cache
//! - `change`: storage change subscription
//! - `matcher`: case-insensitive substring matching
//! - `document`: host document seam and block selectors
//! - `arena`: arena-backed document
//! - `marker`: evaluation marks
//! - `suppressor`: block collapsing
//! - `counter`: blocked-count persistence
//! - `observer`: candidate discovery and evaluation
//! - `scheduler`: stimulus queue and timing
//! - `engine`: the per-page engine
//! - `suggest`: keyword suggestion seam
//! - `config`: engine configuration
//! - `hash`: keyword id hashing

pub mod arena;
pub mod change;
pub mod config;
pub mod counter;
pub mod document;
pub mod engine;
pub mod hash;
pub mod keywords;
pub mod marker;
pub mod matcher;
pub mod observer;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod suggest;
pub mod suppressor;

// Re-export commonly used types
pub use arena::{ArenaDocument, ElementSpec, NodeId};
pub use config::{ConfigError, EngineConfig};
pub use document::{BlockSelector, Document};
pub use engine::{Engine, EngineStats};
pub use keywords::{KeywordCache, KeywordSet};
pub use matcher::matches;
pub use observer::{Evaluation, ScanOutcome};
pub use scheduler::{ScanTiming, Stimulus, StimulusQueue, StimulusSender};
pub use settings::{Keyword, SettingsPatch, StoredSettings, STORAGE_KEY};
pub use store::{ChangeSource, MemoryStore, SettingsStore, StorageChanges, StoreError};
pub use suppressor::SuppressStyle;
