//! Block suppression
//!
//! A suppressed block stays in the document but is collapsed out of both the
//! visual flow and layout: no gap is left in the feed.

use std::cell::Cell;

use crate::document::Document;

bitflags::bitflags! {
    /// Presentation overrides applied to a block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SuppressStyle: u8 {
        /// display: none
        const DISPLAY_NONE = 1 << 0;
        /// visibility: hidden
        const VISIBILITY_HIDDEN = 1 << 1;
        /// height: 0
        const ZERO_HEIGHT = 1 << 2;
        /// margin: 0
        const ZERO_MARGIN = 1 << 3;
        /// padding: 0
        const ZERO_PADDING = 1 << 4;
        /// overflow: hidden
        const OVERFLOW_HIDDEN = 1 << 5;

        /// Everything above: the block takes no space and paints nothing.
        const COLLAPSED = Self::DISPLAY_NONE.bits()
            | Self::VISIBILITY_HIDDEN.bits()
            | Self::ZERO_HEIGHT.bits()
            | Self::ZERO_MARGIN.bits()
            | Self::ZERO_PADDING.bits()
            | Self::OVERFLOW_HIDDEN.bits();
    }
}

impl SuppressStyle {
    /// CSS declarations for the set flags, as `(property, value)` pairs.
    pub fn declarations(self) -> impl Iterator<Item = (&'static str, &'static str)> {
        const TABLE: [(SuppressStyle, &str, &str); 6] = [
            (SuppressStyle::DISPLAY_NONE, "display", "none"),
            (SuppressStyle::VISIBILITY_HIDDEN, "visibility", "hidden"),
            (SuppressStyle::ZERO_HEIGHT, "height", "0"),
            (SuppressStyle::ZERO_MARGIN, "margin", "0"),
            (SuppressStyle::ZERO_PADDING, "padding", "0"),
            (SuppressStyle::OVERFLOW_HIDDEN, "overflow", "hidden"),
        ];
        TABLE
            .into_iter()
            .filter(move |(flag, _, _)| self.contains(*flag))
            .map(|(_, property, value)| (property, value))
    }

    /// Does this state remove the block from layout?
    pub fn occupies_no_space(self) -> bool {
        self.contains(Self::DISPLAY_NONE)
    }
}

/// Hides matched blocks and queues one counter increment per block.
#[derive(Debug, Default)]
pub struct Suppressor {
    pending: Cell<u32>,
}

impl Suppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collapse `element` and request an increment.
    pub fn suppress<D: Document>(&self, doc: &mut D, element: &D::Element) {
        doc.apply_style(element, SuppressStyle::COLLAPSED);
        self.pending.set(self.pending.get() + 1);
    }

    /// Increments requested since the last call.
    pub fn take_pending(&self) -> u32 {
        self.pending.replace(0)
    }
}
