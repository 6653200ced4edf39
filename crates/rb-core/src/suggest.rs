//! Keyword suggestion seam
//!
//! Suggestions come from an external text-generation service. This module
//! owns the request wording and the response contract (a JSON array of
//! strings); hosts supply the transport through [`KeywordSuggester`].

use serde_json::Value;

use crate::settings::StoredSettings;

/// Error type for suggestion calls.
#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    #[error("Suggestion request failed: {0}")]
    Request(String),
    #[error("Suggestion service returned no text")]
    EmptyResponse,
    #[error("Suggestion response is not a JSON array of strings: {0}")]
    Malformed(String),
}

/// External service returning keywords related to a base keyword.
#[allow(async_fn_in_trait)]
pub trait KeywordSuggester {
    async fn suggest(&self, base: &str) -> Result<Vec<String>, SuggestError>;
}

/// Request text sent to the text-generation service.
pub fn suggestion_prompt(base: &str) -> String {
    format!(
        "Generate a list of exactly 10-12 keywords or phrases related to \"{}\" that someone \
         might want to block in their social media feed to completely avoid this topic. \
         Focus on synonyms, sub-topics, or common associated terms. \
         Return as a plain JSON array of strings.",
        base.trim()
    )
}

/// Parse the service response. Entries are trimmed; blank entries dropped.
pub fn parse_suggestions(text: &str) -> Result<Vec<String>, SuggestError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(SuggestError::EmptyResponse);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| SuggestError::Malformed(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(SuggestError::Malformed("expected an array".to_string()));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s.trim().to_string()),
            other => Err(SuggestError::Malformed(format!("unexpected entry {}", other))),
        })
        .filter(|entry| !matches!(entry, Ok(s) if s.is_empty()))
        .collect()
}

/// Add every suggestion as an AI-generated keyword. Returns how many were new.
pub fn apply_suggestions(settings: &mut StoredSettings, words: &[String], now_ms: u64) -> usize {
    words
        .iter()
        .filter(|word| settings.add_keyword(word, true, now_ms))
        .count()
}

/// Ask `suggester` for keywords related to `base` and add them.
///
/// A blank base or a failed call adds nothing.
pub async fn suggest_and_apply<G: KeywordSuggester>(
    suggester: &G,
    settings: &mut StoredSettings,
    base: &str,
    now_ms: u64,
) -> usize {
    if base.trim().is_empty() {
        return 0;
    }
    match suggester.suggest(base).await {
        Ok(words) => apply_suggestions(settings, &words, now_ms),
        Err(e) => {
            log::warn!("Keyword suggestion for '{}' failed: {}", base.trim(), e);
            0
        }
    }
}
