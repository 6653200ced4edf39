//! Host document seam
//!
//! The engine never owns content blocks. It reaches them through a
//! [`Document`] implementation supplied by the host: the live DOM in the
//! browser, or [`crate::arena::ArenaDocument`] everywhere else.

use std::fmt;
use std::hash::Hash;

use crate::suppressor::SuppressStyle;

/// Access to the observed document.
pub trait Document {
    /// Stable handle to one element.
    type Element: Clone + Eq + Hash + fmt::Debug;

    /// Elements matching `selector`, in document order.
    ///
    /// With a `root`, the search covers the root itself and its descendants;
    /// without one, the whole connected document.
    fn select(&self, root: Option<&Self::Element>, selector: &BlockSelector) -> Vec<Self::Element>;

    /// Is the element still attached to the document?
    fn is_connected(&self, element: &Self::Element) -> bool;

    /// Rendered text of an element, if it has any.
    fn text_content(&self, element: &Self::Element) -> Option<String>;

    /// Is the named boolean flag present on the element?
    fn has_flag(&self, element: &Self::Element, name: &str) -> bool;

    /// Attach the named boolean flag to the element.
    fn set_flag(&mut self, element: &Self::Element, name: &str);

    /// Apply presentation state to the element.
    fn apply_style(&mut self, element: &Self::Element, style: SuppressStyle);
}

// =============================================================================
// Block selectors
// =============================================================================

/// Error type for selector parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("Empty selector")]
    Empty,
    #[error("Unsupported selector: {0}")]
    Unsupported(String),
}

/// A structural selector identifying content blocks.
///
/// Supports the subset of CSS that block selectors need: `tag`, `.class`,
/// `[attr="value"]` and `tag[attr="value"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSelector {
    source: String,
    tag: Option<String>,
    class: Option<String>,
    attribute: Option<(String, String)>,
}

impl BlockSelector {
    /// Parse a selector string.
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }
        let unsupported = || SelectorError::Unsupported(trimmed.to_string());

        if let Some(class) = trimmed.strip_prefix('.') {
            if !is_ident(class) {
                return Err(unsupported());
            }
            return Ok(Self {
                source: trimmed.to_string(),
                tag: None,
                class: Some(class.to_string()),
                attribute: None,
            });
        }

        let (tag_part, attribute) = match trimmed.find('[') {
            Some(open) => {
                let inner = trimmed[open + 1..].strip_suffix(']').ok_or_else(unsupported)?;
                let (name, value) = inner.split_once('=').ok_or_else(unsupported)?;
                let value = strip_quotes(value.trim()).ok_or_else(unsupported)?;
                let name = name.trim();
                if !is_ident(name) {
                    return Err(unsupported());
                }
                (&trimmed[..open], Some((name.to_string(), value.to_string())))
            }
            None => (trimmed, None),
        };

        let tag = if tag_part.is_empty() {
            None
        } else if is_ident(tag_part) {
            Some(tag_part.to_ascii_lowercase())
        } else {
            return Err(unsupported());
        };

        if tag.is_none() && attribute.is_none() {
            return Err(unsupported());
        }

        Ok(Self {
            source: trimmed.to_string(),
            tag,
            class: None,
            attribute,
        })
    }

    /// The selector as CSS, for hosts with a native selector engine.
    pub fn as_css(&self) -> &str {
        &self.source
    }

    /// Evaluate against an element's tag, attributes and classes.
    pub fn matches_parts<'a, A, C>(&self, tag: &str, attribute: A, mut classes: C) -> bool
    where
        A: Fn(&str) -> Option<&'a str>,
        C: Iterator<Item = &'a str>,
    {
        if let Some(expected) = &self.tag {
            if !tag.eq_ignore_ascii_case(expected) {
                return false;
            }
        }
        if let Some((name, value)) = &self.attribute {
            if attribute(name.as_str()) != Some(value.as_str()) {
                return false;
            }
        }
        if let Some(class) = &self.class {
            if !classes.any(|c| c == class.as_str()) {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for BlockSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn strip_quotes(value: &str) -> Option<&str> {
    ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q).and_then(|v| v.strip_suffix(*q)))
        .or_else(|| is_ident(value).then_some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_attrs(_: &str) -> Option<&'static str> {
        None
    }

    #[test]
    fn test_parse_tag() {
        let sel = BlockSelector::parse("shreddit-post").unwrap();
        assert!(sel.matches_parts("SHREDDIT-POST", no_attrs, std::iter::empty()));
        assert!(!sel.matches_parts("div", no_attrs, std::iter::empty()));
        assert_eq!(sel.as_css(), "shreddit-post");
    }

    #[test]
    fn test_parse_tag_with_attribute() {
        let sel = BlockSelector::parse(r#"div[data-testid="post-container"]"#).unwrap();
        let attrs = |name: &str| (name == "data-testid").then_some("post-container");
        assert!(sel.matches_parts("div", attrs, std::iter::empty()));
        assert!(!sel.matches_parts("span", attrs, std::iter::empty()));
        assert!(!sel.matches_parts("div", no_attrs, std::iter::empty()));
    }

    #[test]
    fn test_parse_bare_attribute() {
        let sel = BlockSelector::parse("[data-kind='post']").unwrap();
        let attrs = |name: &str| (name == "data-kind").then_some("post");
        assert!(sel.matches_parts("article", attrs, std::iter::empty()));
    }

    #[test]
    fn test_parse_class() {
        let sel = BlockSelector::parse(".Post").unwrap();
        assert!(sel.matches_parts("div", no_attrs, ["x", "Post"].into_iter()));
        assert!(!sel.matches_parts("div", no_attrs, ["post"].into_iter()));
    }

    #[test]
    fn test_rejects_unsupported() {
        assert_eq!(BlockSelector::parse("  "), Err(SelectorError::Empty));
        assert!(BlockSelector::parse("div > .Post").is_err());
        assert!(BlockSelector::parse("div[data-x").is_err());
        assert!(BlockSelector::parse("[]").is_err());
        assert!(BlockSelector::parse(".").is_err());
    }
}
