//! Observation loop
//!
//! Finds candidate blocks and evaluates each unmarked one exactly once.
//! Structural-change batches only search the inserted subtrees; timer ticks
//! sweep the whole document to catch anything the notifications missed.

use std::collections::HashSet;

use crate::document::{BlockSelector, Document};
use crate::keywords::KeywordSet;
use crate::marker::Marker;
use crate::matcher::first_match;
use crate::suppressor::Suppressor;

/// What happened to one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Already evaluated earlier; nothing done.
    AlreadyMarked,
    /// Evaluated, no keyword matched.
    Passed,
    /// Evaluated and hidden.
    Suppressed,
}

/// Summary of one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Distinct candidate blocks found.
    pub candidates: usize,
    /// Candidates evaluated by this scan.
    pub evaluated: usize,
    /// Candidates hidden by this scan.
    pub suppressed: usize,
    /// The keyword set was empty, so nothing was looked at.
    pub skipped: bool,
}

impl ScanOutcome {
    pub fn merge(&mut self, other: ScanOutcome) {
        self.candidates += other.candidates;
        self.evaluated += other.evaluated;
        self.suppressed += other.suppressed;
        self.skipped |= other.skipped;
    }
}

pub struct ObservationLoop {
    selectors: Vec<BlockSelector>,
    marker: Marker,
    suppressor: Suppressor,
}

impl ObservationLoop {
    pub fn new(selectors: Vec<BlockSelector>, marker: Marker) -> Self {
        Self {
            selectors,
            marker,
            suppressor: Suppressor::new(),
        }
    }

    pub fn marker(&self) -> &Marker {
        &self.marker
    }

    pub fn selectors(&self) -> &[BlockSelector] {
        &self.selectors
    }

    /// Counter increments requested by suppressions since the last call.
    pub fn take_pending_increments(&self) -> u32 {
        self.suppressor.take_pending()
    }

    /// Distinct candidate blocks under `roots`, or in the whole document when
    /// `roots` is `None`. Selectors are tried in order; an element matched by
    /// several selectors is listed once. Roots and blocks no longer attached
    /// to the document are left out.
    pub fn candidates<D: Document>(
        &self,
        doc: &D,
        roots: Option<&[D::Element]>,
    ) -> Vec<D::Element> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for selector in &self.selectors {
            let found = match roots {
                Some(roots) => roots
                    .iter()
                    .filter(|root| doc.is_connected(root))
                    .flat_map(|root| doc.select(Some(root), selector))
                    .collect::<Vec<_>>(),
                None => doc.select(None, selector),
            };
            for element in found {
                if !doc.is_connected(&element) {
                    continue;
                }
                if seen.insert(element.clone()) {
                    out.push(element);
                }
            }
        }

        out
    }

    /// Scan `roots` (or the whole document) against `keywords`.
    ///
    /// An empty keyword set short-circuits before any candidate lookup and
    /// leaves every block unmarked, so blocks rendered before the first
    /// keyword exists are picked up by later scans.
    pub fn scan<D: Document>(
        &self,
        doc: &mut D,
        roots: Option<&[D::Element]>,
        keywords: &KeywordSet,
    ) -> ScanOutcome {
        if keywords.is_empty() {
            return ScanOutcome {
                skipped: true,
                ..ScanOutcome::default()
            };
        }

        let candidates = self.candidates(doc, roots);
        let mut outcome = ScanOutcome {
            candidates: candidates.len(),
            ..ScanOutcome::default()
        };

        for element in &candidates {
            match self.evaluate(doc, element, keywords) {
                Evaluation::AlreadyMarked => {}
                Evaluation::Passed => outcome.evaluated += 1,
                Evaluation::Suppressed => {
                    outcome.evaluated += 1;
                    outcome.suppressed += 1;
                }
            }
        }

        if outcome.evaluated > 0 {
            log::debug!(
                "Scan: {} candidates, {} evaluated, {} suppressed",
                outcome.candidates,
                outcome.evaluated,
                outcome.suppressed
            );
        }
        outcome
    }

    /// Evaluate one block: check the mark, match, suppress, then mark.
    pub fn evaluate<D: Document>(
        &self,
        doc: &mut D,
        element: &D::Element,
        keywords: &KeywordSet,
    ) -> Evaluation {
        if self.marker.is_marked(doc, element) {
            return Evaluation::AlreadyMarked;
        }

        let text = doc.text_content(element).unwrap_or_default();
        let result = match first_match(&text, keywords) {
            Some(keyword) => {
                log::trace!("Suppressing {:?} (matched '{}')", element, keyword);
                self.suppressor.suppress(doc, element);
                Evaluation::Suppressed
            }
            None => Evaluation::Passed,
        };

        self.marker.mark(doc, element);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{ArenaDocument, ElementSpec, NodeId};
    use crate::config::EngineConfig;
    use crate::suppressor::SuppressStyle;

    fn observer() -> ObservationLoop {
        let selectors = EngineConfig::default().block_selectors().unwrap();
        ObservationLoop::new(selectors, Marker::default())
    }

    fn add(doc: &mut ArenaDocument, spec: ElementSpec) -> NodeId {
        let id = doc.build(&spec);
        let root = doc.root();
        doc.append_child(root, id);
        id
    }

    #[test]
    fn test_candidates_cover_every_layout_once() {
        let mut doc = ArenaDocument::new();
        add(&mut doc, ElementSpec::new("shreddit-post").text("a"));
        add(&mut doc, ElementSpec::new("div").attr("data-testid", "post-container").text("b"));
        add(&mut doc, ElementSpec::new("div").class("Post").text("c"));
        add(&mut doc, ElementSpec::new("div").class("link").class("Post").text("d"));
        add(&mut doc, ElementSpec::new("div").class("comment").text("e"));

        assert_eq!(observer().candidates(&doc, None).len(), 4);
    }

    #[test]
    fn test_roots_limit_the_search() {
        let mut doc = ArenaDocument::new();
        let old = add(&mut doc, ElementSpec::new("shreddit-post").text("old"));
        let batch = add(
            &mut doc,
            ElementSpec::new("div").child(ElementSpec::new("shreddit-post").text("new")),
        );

        let found = observer().candidates(&doc, Some(&[batch][..]));
        assert_eq!(found.len(), 1);
        assert_ne!(found[0], old);
    }

    #[test]
    fn test_detached_roots_are_not_candidates() {
        let mut doc = ArenaDocument::new();
        let detached = doc.build(&ElementSpec::new("shreddit-post").text("spoiler"));
        let removed = add(
            &mut doc,
            ElementSpec::new("div").child(ElementSpec::new("shreddit-post").text("spoiler")),
        );
        doc.detach(removed);
        let observer = observer();

        assert!(observer.candidates(&doc, Some(&[detached, removed][..])).is_empty());

        let outcome = observer.scan(&mut doc, Some(&[detached, removed][..]), &KeywordSet::new(["spoiler"]));
        assert_eq!(outcome.suppressed, 0);
        assert_eq!(observer.take_pending_increments(), 0);
        assert_eq!(doc.style(detached), SuppressStyle::empty());
        assert!(!observer.marker().is_marked(&doc, &detached));
    }

    #[test]
    fn test_scan_suppresses_and_marks() {
        let mut doc = ArenaDocument::new();
        let hit = add(&mut doc, ElementSpec::new("shreddit-post").text("Huge SPOILER inside"));
        let miss = add(&mut doc, ElementSpec::new("shreddit-post").text("cute dog"));
        let observer = observer();
        let keywords = KeywordSet::new(["spoiler"]);

        let outcome = observer.scan(&mut doc, None, &keywords);
        assert_eq!(outcome.evaluated, 2);
        assert_eq!(outcome.suppressed, 1);
        assert_eq!(observer.take_pending_increments(), 1);
        assert_eq!(doc.style(hit), SuppressStyle::COLLAPSED);
        assert_eq!(doc.style(miss), SuppressStyle::empty());
        assert!(observer.marker().is_marked(&doc, &hit));
        assert!(observer.marker().is_marked(&doc, &miss));

        let again = observer.scan(&mut doc, None, &keywords);
        assert_eq!(again.evaluated, 0);
        assert_eq!(again.candidates, 2);
        assert_eq!(observer.take_pending_increments(), 0);
    }

    #[test]
    fn test_empty_keywords_skip_without_marking() {
        let mut doc = ArenaDocument::new();
        let block = add(&mut doc, ElementSpec::new("shreddit-post").text("spoiler"));
        let observer = observer();

        let outcome = observer.scan(&mut doc, None, &KeywordSet::default());
        assert!(outcome.skipped);
        assert_eq!(outcome.candidates, 0);
        assert!(!observer.marker().is_marked(&doc, &block));
    }

    #[test]
    fn test_block_without_text_is_marked_not_suppressed() {
        let mut doc = ArenaDocument::new();
        let block = add(&mut doc, ElementSpec::new("shreddit-post"));
        let observer = observer();

        let result = observer.evaluate(&mut doc, &block, &KeywordSet::new(["x"]));
        assert_eq!(result, Evaluation::Passed);
        assert!(observer.marker().is_marked(&doc, &block));
    }

    #[test]
    fn test_nested_blocks_are_evaluated_separately() {
        let mut doc = ArenaDocument::new();
        let outer = add(
            &mut doc,
            ElementSpec::new("div")
                .attr("data-testid", "post-container")
                .child(ElementSpec::new("shreddit-post").text("spoiler")),
        );
        let observer = observer();
        let outcome = observer.scan(&mut doc, Some(&[outer][..]), &KeywordSet::new(["spoiler"]));
        assert_eq!(outcome.candidates, 2);
        assert_eq!(outcome.suppressed, 2);
    }
}
