//! Evaluation marks
//!
//! The mark is a boolean flag stored on the element itself, so it follows
//! the element wherever it is re-parented and disappears with it.

use crate::document::Document;

/// Default flag name attached to evaluated blocks.
pub const CHECKED_FLAG: &str = "data-reddbock-checked";

/// Idempotency ledger for evaluated blocks. Marks are never cleared.
#[derive(Debug, Clone)]
pub struct Marker {
    flag: String,
}

impl Default for Marker {
    fn default() -> Self {
        Self::new(CHECKED_FLAG)
    }
}

impl Marker {
    pub fn new(flag: impl Into<String>) -> Self {
        Self { flag: flag.into() }
    }

    pub fn flag_name(&self) -> &str {
        &self.flag
    }

    pub fn is_marked<D: Document>(&self, doc: &D, element: &D::Element) -> bool {
        doc.has_flag(element, &self.flag)
    }

    pub fn mark<D: Document>(&self, doc: &mut D, element: &D::Element) {
        doc.set_flag(element, &self.flag);
    }
}
