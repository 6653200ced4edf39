//! Live page document
//!
//! Adapts the browser DOM to the engine's [`Document`] seam. JS objects
//! carry no hashable identity, so every element handed to the engine is
//! tagged with a numeric id stored as an expando property.

use std::cell::Cell;
use std::hash::{Hash, Hasher};

use rb_core::{BlockSelector, Document, SuppressStyle};
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Element, HtmlElement, NodeList};

const IDENTITY_PROPERTY: &str = "__reddblockId";

thread_local! {
    static NEXT_ID: Cell<u32> = const { Cell::new(1) };
}

/// An element plus its stable identity.
#[derive(Clone, Debug)]
pub struct DomElement {
    id: u32,
    element: Element,
}

impl DomElement {
    pub fn new(element: Element) -> Self {
        let key = JsValue::from_str(IDENTITY_PROPERTY);
        let existing = js_sys::Reflect::get(&element, &key)
            .ok()
            .and_then(|value| value.as_f64());

        let id = match existing {
            Some(id) => id as u32,
            None => {
                let id = NEXT_ID.with(|next| next.replace(next.get().wrapping_add(1)));
                let _ = js_sys::Reflect::set(&element, &key, &JsValue::from(id));
                id
            }
        };

        Self { id, element }
    }

    pub fn element(&self) -> &Element {
        &self.element
    }
}

impl PartialEq for DomElement {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DomElement {}

impl Hash for DomElement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The page's `document`.
#[derive(Clone)]
pub struct WebDocument {
    document: web_sys::Document,
}

impl WebDocument {
    pub fn new(document: web_sys::Document) -> Self {
        Self { document }
    }
}

fn collect(list: NodeList, out: &mut Vec<DomElement>) {
    for index in 0..list.length() {
        if let Some(element) = list.get(index).and_then(|node| node.dyn_into::<Element>().ok()) {
            out.push(DomElement::new(element));
        }
    }
}

impl Document for WebDocument {
    type Element = DomElement;

    fn select(&self, root: Option<&DomElement>, selector: &BlockSelector) -> Vec<DomElement> {
        let css = selector.as_css();
        let mut out = Vec::new();

        let list = match root {
            Some(root) => {
                if root.element.matches(css).unwrap_or(false) {
                    out.push(root.clone());
                }
                root.element.query_selector_all(css)
            }
            None => self.document.query_selector_all(css),
        };

        match list {
            Ok(list) => collect(list, &mut out),
            Err(e) => log::warn!("Selector {} rejected by the page: {:?}", css, e),
        }
        out
    }

    fn is_connected(&self, element: &DomElement) -> bool {
        element.element.is_connected()
    }

    fn text_content(&self, element: &DomElement) -> Option<String> {
        match element.element.dyn_ref::<HtmlElement>() {
            Some(html) => Some(html.inner_text()),
            None => element.element.text_content(),
        }
    }

    fn has_flag(&self, element: &DomElement, flag: &str) -> bool {
        element.element.has_attribute(flag)
    }

    fn set_flag(&mut self, element: &DomElement, flag: &str) {
        if let Err(e) = element.element.set_attribute(flag, "true") {
            log::warn!("Could not mark element: {:?}", e);
        }
    }

    fn apply_style(&mut self, element: &DomElement, style: SuppressStyle) {
        let Some(html) = element.element.dyn_ref::<HtmlElement>() else {
            return;
        };
        let declarations = html.style();
        for (property, value) in style.declarations() {
            let _ = declarations.set_property(property, value);
        }
    }
}
