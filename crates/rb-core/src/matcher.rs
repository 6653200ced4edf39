//! Keyword Matching
//!
//! This is the hot path - every new content block goes through here.
//! Matching is a literal, case-insensitive substring test: no tokenizing and
//! no word boundaries, so "cat" matches "concatenate" as well as "Cats".

use crate::keywords::KeywordSet;

/// Does any keyword occur in `text`?
///
/// `keywords` must already be lowercased (a [`KeywordSet`] always is).
pub fn matches(text: &str, keywords: &KeywordSet) -> bool {
    first_match(text, keywords).is_some()
}

/// The first keyword (in set order) that occurs in `text`.
pub fn first_match<'k>(text: &str, keywords: &'k KeywordSet) -> Option<&'k str> {
    if keywords.is_empty() || text.is_empty() {
        return None;
    }

    let haystack = text.to_lowercase();
    keywords.iter().find(|keyword| haystack.contains(*keyword))
}
