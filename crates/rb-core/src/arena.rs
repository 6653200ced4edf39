//! Arena-backed document
//!
//! A small DOM-like tree stored as a flat arena indexed by [`NodeId`]. Flags
//! and inline style live on the node itself, the same way the browser keeps
//! attributes on the element. Used by tests and by the CLI to replay feed
//! fixtures through the engine.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::document::{BlockSelector, Document};
use crate::suppressor::SuppressStyle;

/// Index of a node in the arena. Stable for the lifetime of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// One element.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub classes: Vec<String>,
    pub text: String,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub style: SuppressStyle,
}

/// Declarative element description, as found in feed fixtures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ElementSpec {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub classes: Vec<String>,
    pub text: String,
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn child(mut self, child: ElementSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// Arena document. Node 0 is the `body` root.
#[derive(Debug, Clone)]
pub struct ArenaDocument {
    nodes: Vec<Node>,
}

impl Default for ArenaDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ArenaDocument {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                tag: "body".to_string(),
                ..Node::default()
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: tag.into(),
            ..Node::default()
        });
        id
    }

    /// Build a detached subtree from a spec and return its root.
    pub fn build(&mut self, spec: &ElementSpec) -> NodeId {
        let id = self.create_element(spec.tag.clone());
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.attributes = spec.attributes.clone();
            node.classes = spec.classes.clone();
            node.text = spec.text.clone();
        }
        for child in &spec.children {
            let child_id = self.build(child);
            self.append_child(id, child_id);
        }
        id
    }

    /// Move `child` under `parent`, detaching it from any previous parent.
    ///
    /// Appending a node under itself or one of its descendants is ignored.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if parent.0 >= self.nodes.len() || child.0 >= self.nodes.len() {
            return;
        }
        if self.ancestors_or_self(parent).any(|id| id == child) {
            return;
        }
        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
    }

    /// Remove `id` from its parent. The subtree stays in the arena.
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes.get(id.0).and_then(|n| n.parent) else {
            return;
        };
        self.nodes[parent.0].children.retain(|c| *c != id);
        self.nodes[id.0].parent = None;
    }

    /// Is the node attached (transitively) to the root?
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.ancestors_or_self(id).any(|a| a == self.root())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.attributes.insert(name.to_string(), value.to_string());
        }
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)?.attributes.get(name).map(String::as_str)
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.nodes.get_mut(id.0) {
            node.text = text.to_string();
        }
    }

    pub fn style(&self, id: NodeId) -> SuppressStyle {
        self.node(id).map(|n| n.style).unwrap_or_default()
    }

    fn ancestors_or_self(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let start = (id.0 < self.nodes.len()).then_some(id);
        std::iter::successors(start, move |current| self.nodes[current.0].parent)
    }

    fn collect_text(&self, id: NodeId, out: &mut Vec<String>) {
        let Some(node) = self.node(id) else {
            return;
        };
        let own = node.text.trim();
        if !own.is_empty() {
            out.push(own.to_string());
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    fn select_into(&self, id: NodeId, selector: &BlockSelector, out: &mut Vec<NodeId>) {
        let Some(node) = self.node(id) else {
            return;
        };
        let attribute = |name: &str| node.attributes.get(name).map(String::as_str);
        if selector.matches_parts(&node.tag, attribute, node.classes.iter().map(String::as_str)) {
            out.push(id);
        }
        for child in &node.children {
            self.select_into(*child, selector, out);
        }
    }
}

impl Document for ArenaDocument {
    type Element = NodeId;

    fn select(&self, root: Option<&NodeId>, selector: &BlockSelector) -> Vec<NodeId> {
        let start = root.copied().unwrap_or_else(|| self.root());
        let mut out = Vec::new();
        self.select_into(start, selector, &mut out);
        out
    }

    fn is_connected(&self, element: &NodeId) -> bool {
        ArenaDocument::is_connected(self, *element)
    }

    fn text_content(&self, element: &NodeId) -> Option<String> {
        let mut parts = Vec::new();
        self.collect_text(*element, &mut parts);
        (!parts.is_empty()).then(|| parts.join("\n"))
    }

    fn has_flag(&self, element: &NodeId, name: &str) -> bool {
        self.attribute(*element, name).is_some()
    }

    fn set_flag(&mut self, element: &NodeId, name: &str) {
        self.set_attribute(*element, name, "true");
    }

    fn apply_style(&mut self, element: &NodeId, style: SuppressStyle) {
        if let Some(node) = self.nodes.get_mut(element.0) {
            node.style |= style;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(text: &str) -> ElementSpec {
        ElementSpec::new("shreddit-post").child(ElementSpec::new("h3").text(text))
    }

    #[test]
    fn test_build_and_select() {
        let mut doc = ArenaDocument::new();
        let feed = doc.build(&ElementSpec::new("main").child(post("one")).child(post("two")));
        doc.append_child(doc.root(), feed);

        let sel = BlockSelector::parse("shreddit-post").unwrap();
        let found = doc.select(None, &sel);
        assert_eq!(found.len(), 2);
        assert_eq!(doc.text_content(&found[1]).as_deref(), Some("two"));

        let within = doc.select(Some(&found[0]), &sel);
        assert_eq!(within, vec![found[0]]);
    }

    #[test]
    fn test_detached_nodes_are_not_in_document_queries() {
        let mut doc = ArenaDocument::new();
        let a = doc.build(&post("a"));
        let sel = BlockSelector::parse("shreddit-post").unwrap();
        assert!(doc.select(None, &sel).is_empty());
        assert!(!doc.is_connected(a));

        doc.append_child(doc.root(), a);
        assert!(doc.is_connected(a));
        assert_eq!(doc.select(None, &sel), vec![a]);

        doc.detach(a);
        assert!(doc.select(None, &sel).is_empty());
        assert_eq!(doc.select(Some(&a), &sel), vec![a]);
    }

    #[test]
    fn test_reparenting_moves_the_node() {
        let mut doc = ArenaDocument::new();
        let left = doc.create_element("div");
        let right = doc.create_element("div");
        let item = doc.build(&post("x"));
        doc.append_child(doc.root(), left);
        doc.append_child(doc.root(), right);
        doc.append_child(left, item);
        doc.append_child(right, item);

        assert!(doc.node(left).unwrap().children.is_empty());
        assert_eq!(doc.node(right).unwrap().children, vec![item]);
        assert_eq!(doc.node(item).unwrap().parent, Some(right));
    }

    #[test]
    fn test_refuses_cycles() {
        let mut doc = ArenaDocument::new();
        let outer = doc.create_element("div");
        let inner = doc.create_element("div");
        doc.append_child(outer, inner);
        doc.append_child(inner, outer);
        assert_eq!(doc.node(outer).unwrap().parent, None);
    }

    #[test]
    fn test_flags_and_style_live_on_the_node() {
        let mut doc = ArenaDocument::new();
        let a = doc.build(&post("a"));
        assert!(!doc.has_flag(&a, "data-checked"));
        doc.set_flag(&a, "data-checked");
        assert!(doc.has_flag(&a, "data-checked"));
        assert_eq!(doc.attribute(a, "data-checked"), Some("true"));

        doc.apply_style(&a, SuppressStyle::DISPLAY_NONE);
        assert_eq!(doc.style(a), SuppressStyle::DISPLAY_NONE);
    }

    #[test]
    fn test_empty_text_is_none() {
        let mut doc = ArenaDocument::new();
        let a = doc.build(&ElementSpec::new("div").child(ElementSpec::new("img")));
        assert_eq!(doc.text_content(&a), None);
    }
}
