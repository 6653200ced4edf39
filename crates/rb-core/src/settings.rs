//! Persisted settings record
//!
//! One record per extension namespace, stored under [`STORAGE_KEY`]:
//!
//! ```json
//! { "keywords": [{ "id": "k1", "text": "spoiler", "enabled": true, "createdAt": 0 }],
//!   "blockedCount": 0 }
//! ```
//!
//! Decoding is lenient. Anything that cannot be read degrades to the default
//! record rather than failing, so a corrupted record means "no filtering".

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::hash::{keyword_id, ID_SEED};
use crate::store::{SettingsStore, StoreError};

/// Key of the settings record in the persistence store.
pub const STORAGE_KEY: &str = "reddbock_settings";

/// Field name of the suppressed-block counter inside the record.
pub const BLOCKED_COUNT_FIELD: &str = "blockedCount";

/// Field name of the keyword list inside the record.
pub const KEYWORDS_FIELD: &str = "keywords";

// =============================================================================
// Records
// =============================================================================

/// A user-configured keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyword {
    #[serde(default)]
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_ai_generated: Option<bool>,
    /// Fields this version does not know about, written back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The full settings record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSettings {
    pub keywords: Vec<Keyword>,
    pub blocked_count: u64,
}

impl StoredSettings {
    /// Decode a raw record, defaulting whatever is missing or malformed.
    ///
    /// Keyword entries that fail to decode are dropped individually.
    pub fn from_value(record: Option<&Value>) -> Self {
        let Some(Value::Object(map)) = record else {
            return Self::default();
        };

        let keywords = match map.get(KEYWORDS_FIELD) {
            Some(Value::Array(entries)) => entries
                .iter()
                .filter_map(|entry| Keyword::deserialize(entry).ok())
                .collect(),
            _ => Vec::new(),
        };

        Self {
            keywords,
            blocked_count: read_count(map),
        }
    }

    /// Encode to the persisted JSON shape.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }

    /// Lowercased text of every enabled keyword.
    pub fn enabled_texts(&self) -> impl Iterator<Item = String> + '_ {
        self.keywords
            .iter()
            .filter(|k| k.enabled)
            .map(|k| k.text.to_lowercase())
    }

    /// Add a keyword. Returns `false` if the trimmed text is empty or already
    /// present (case-insensitively).
    pub fn add_keyword(&mut self, text: &str, ai_generated: bool, now_ms: u64) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let lowered = text.to_lowercase();
        if self.keywords.iter().any(|k| k.text.to_lowercase() == lowered) {
            return false;
        }

        let mut seed = ID_SEED;
        let mut id = keyword_id(text, now_ms, seed);
        while self.keywords.iter().any(|k| k.id == id) {
            seed = seed.wrapping_add(1);
            id = keyword_id(text, now_ms, seed);
        }

        self.keywords.push(Keyword {
            id,
            text: text.to_string(),
            enabled: true,
            created_at: now_ms,
            is_ai_generated: Some(ai_generated),
            extra: Map::new(),
        });
        true
    }

    /// Remove the keyword with `id`. Returns whether anything was removed.
    pub fn remove_keyword(&mut self, id: &str) -> bool {
        let before = self.keywords.len();
        self.keywords.retain(|k| k.id != id);
        self.keywords.len() != before
    }

    /// Flip the enabled state of the keyword with `id`.
    ///
    /// Returns the new state, or `None` if no such keyword exists.
    pub fn toggle_keyword(&mut self, id: &str) -> Option<bool> {
        let keyword = self.keywords.iter_mut().find(|k| k.id == id)?;
        keyword.enabled = !keyword.enabled;
        Some(keyword.enabled)
    }

    /// Drop every keyword. The counter is untouched.
    pub fn clear_keywords(&mut self) {
        self.keywords.clear();
    }
}

/// Number of keyword entries in a raw record that
/// [`StoredSettings::from_value`] drops because they do not decode.
pub fn undecodable_keywords(record: Option<&Value>) -> usize {
    match record.and_then(|r| r.get(KEYWORDS_FIELD)) {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter(|entry| Keyword::deserialize(*entry).is_err())
            .count(),
        _ => 0,
    }
}

/// Read the counter field of a record object, treating anything that is not
/// a non-negative number as zero.
pub fn read_count(map: &Map<String, Value>) -> u64 {
    match map.get(BLOCKED_COUNT_FIELD) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64))
            .unwrap_or(0),
        _ => 0,
    }
}

// =============================================================================
// Partial updates
// =============================================================================

/// A partial record update. Present fields replace the stored ones, absent
/// fields are preserved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub keywords: Option<Vec<Keyword>>,
    pub blocked_count: Option<u64>,
}

impl SettingsPatch {
    pub fn keywords(keywords: Vec<Keyword>) -> Self {
        Self {
            keywords: Some(keywords),
            blocked_count: None,
        }
    }

    /// Shallow-merge this patch into a raw record.
    pub fn apply(&self, record: Option<Value>) -> Value {
        let mut map = match record {
            Some(Value::Object(map)) => map,
            _ => default_record(),
        };

        if let Some(keywords) = &self.keywords {
            let encoded = serde_json::to_value(keywords).unwrap_or(Value::Array(Vec::new()));
            map.insert(KEYWORDS_FIELD.to_string(), encoded);
        }
        if let Some(count) = self.blocked_count {
            map.insert(BLOCKED_COUNT_FIELD.to_string(), Value::from(count));
        }

        Value::Object(map)
    }
}

/// The record used when nothing usable is stored.
pub fn default_record() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(KEYWORDS_FIELD.to_string(), Value::Array(Vec::new()));
    map.insert(BLOCKED_COUNT_FIELD.to_string(), Value::from(0u64));
    map
}

/// Load and decode the record. Store failures degrade to the default record.
pub async fn load_settings<S: SettingsStore>(store: &S, key: &str) -> StoredSettings {
    match store.get(key).await {
        Ok(record) => StoredSettings::from_value(record.as_ref()),
        Err(e) => {
            log::warn!("Failed to load settings '{}': {}", key, e);
            StoredSettings::default()
        }
    }
}

/// Read-merge-write of the record.
pub async fn save_settings<S: SettingsStore>(
    store: &S,
    key: &str,
    patch: &SettingsPatch,
) -> Result<(), StoreError> {
    let existing = store.get(key).await?;
    store.set(key, patch.apply(existing)).await
}
