//! Browser persistence backends
//!
//! Extension-scoped `chrome.storage.local` when the page runs as a content
//! script, page-scoped `localStorage` otherwise. Records cross the JS
//! boundary as JSON text.

use std::cell::RefCell;
use std::rc::Rc;

use rb_core::store::ChangeCallback;
use rb_core::{ChangeSource, SettingsStore, StorageChanges, StoreError};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = get)]
    fn chrome_local_get(keys: &JsValue) -> Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = set)]
    fn chrome_local_set(items: &JsValue) -> Result<js_sys::Promise, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "onChanged"], js_name = addListener)]
    fn chrome_on_changed(callback: &js_sys::Function) -> Result<(), JsValue>;
}

fn unavailable(e: JsValue) -> StoreError {
    StoreError::Unavailable(format!("{:?}", e))
}

fn js_to_json(value: &JsValue) -> Result<Value, StoreError> {
    let text: String = js_sys::JSON::stringify(value)
        .map_err(|e| StoreError::Decode(format!("{:?}", e)))?
        .into();
    serde_json::from_str(&text).map_err(|e| StoreError::Decode(e.to_string()))
}

fn json_to_js(value: &Value) -> Result<JsValue, StoreError> {
    let text = serde_json::to_string(value).map_err(|e| StoreError::Encode(e.to_string()))?;
    js_sys::JSON::parse(&text).map_err(|e| StoreError::Encode(format!("{:?}", e)))
}

fn property(target: &JsValue, name: &str) -> JsValue {
    js_sys::Reflect::get(target, &JsValue::from_str(name)).unwrap_or(JsValue::UNDEFINED)
}

// =============================================================================
// chrome.storage.local
// =============================================================================

#[derive(Clone, Copy, Default)]
pub struct ChromeStore;

impl ChromeStore {
    /// Is the extension storage API reachable from this context?
    pub fn available() -> bool {
        let chrome = property(&js_sys::global(), "chrome");
        if !chrome.is_object() {
            return false;
        }
        property(&property(&chrome, "storage"), "local").is_object()
    }
}

impl SettingsStore for ChromeStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let keys = js_sys::Array::of1(&JsValue::from_str(key));
        let promise = chrome_local_get(&keys).map_err(unavailable)?;
        let items = JsFuture::from(promise).await.map_err(unavailable)?;

        let value = property(&items, key);
        if value.is_undefined() || value.is_null() {
            return Ok(None);
        }
        js_to_json(&value).map(Some)
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let items = js_sys::Object::new();
        js_sys::Reflect::set(&items, &JsValue::from_str(key), &json_to_js(&value)?)
            .map_err(|e| StoreError::Encode(format!("{:?}", e)))?;

        let promise = chrome_local_set(&items).map_err(unavailable)?;
        JsFuture::from(promise).await.map_err(unavailable)?;
        Ok(())
    }
}

impl ChangeSource for ChromeStore {
    fn subscribe(&self, callback: ChangeCallback) {
        let listener = Closure::<dyn FnMut(JsValue, JsValue)>::new(move |changes: JsValue, _area: JsValue| {
            let Some(changes) = changes.dyn_ref::<js_sys::Object>() else {
                return;
            };
            let keys = js_sys::Object::keys(changes);
            callback(&StorageChanges::new(keys.iter().filter_map(|key| key.as_string())));
        });

        if let Err(e) = chrome_on_changed(listener.as_ref().unchecked_ref()) {
            log::warn!("Could not subscribe to storage changes: {:?}", e);
            return;
        }
        // Listeners live for the page.
        listener.forget();
    }
}

// =============================================================================
// localStorage
// =============================================================================

/// Page-scoped fallback. Writes from this page notify local subscribers
/// directly; writes from other pages arrive as `storage` events.
#[derive(Clone)]
pub struct LocalStore {
    window: web_sys::Window,
    storage: web_sys::Storage,
    listeners: Rc<RefCell<Vec<ChangeCallback>>>,
}

impl LocalStore {
    pub fn new(window: web_sys::Window) -> Result<Self, StoreError> {
        let storage = window
            .local_storage()
            .map_err(unavailable)?
            .ok_or_else(|| StoreError::Unavailable("localStorage is disabled".to_string()))?;

        Ok(Self {
            window,
            storage,
            listeners: Rc::new(RefCell::new(Vec::new())),
        })
    }
}

impl SettingsStore for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self.storage.get_item(key).map_err(unavailable)? {
            Some(text) => serde_json::from_str(&text)
                .map(Some)
                .map_err(|e| StoreError::Decode(e.to_string())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let text = serde_json::to_string(&value).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.storage.set_item(key, &text).map_err(unavailable)?;

        let changes = StorageChanges::new([key]);
        let listeners: Vec<ChangeCallback> = self.listeners.borrow().clone();
        for listener in listeners {
            listener(&changes);
        }
        Ok(())
    }
}

impl ChangeSource for LocalStore {
    fn subscribe(&self, callback: ChangeCallback) {
        self.listeners.borrow_mut().push(Rc::clone(&callback));

        let listener = Closure::<dyn FnMut(web_sys::StorageEvent)>::new(move |event: web_sys::StorageEvent| {
            // A cleared storage area reports no key.
            let changes = match event.key() {
                Some(key) => StorageChanges::new([key]),
                None => StorageChanges::default(),
            };
            callback(&changes);
        });

        if let Err(e) = self
            .window
            .add_event_listener_with_callback("storage", listener.as_ref().unchecked_ref())
        {
            log::warn!("Could not subscribe to storage events: {:?}", e);
            return;
        }
        listener.forget();
    }
}

// =============================================================================
// Host store
// =============================================================================

/// Whichever backend the page supports.
#[derive(Clone)]
pub enum HostStore {
    Chrome(ChromeStore),
    Local(LocalStore),
}

impl HostStore {
    pub fn detect(window: &web_sys::Window) -> Result<Self, StoreError> {
        if ChromeStore::available() {
            return Ok(Self::Chrome(ChromeStore));
        }
        log::info!("Extension storage not found, using localStorage");
        LocalStore::new(window.clone()).map(Self::Local)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chrome(_) => "chrome.storage.local",
            Self::Local(_) => "localStorage",
        }
    }
}

impl SettingsStore for HostStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        match self {
            Self::Chrome(store) => store.get(key).await,
            Self::Local(store) => store.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        match self {
            Self::Chrome(store) => store.set(key, value).await,
            Self::Local(store) => store.set(key, value).await,
        }
    }
}

impl ChangeSource for HostStore {
    fn subscribe(&self, callback: ChangeCallback) {
        match self {
            Self::Chrome(store) => store.subscribe(callback),
            Self::Local(store) => store.subscribe(callback),
        }
    }
}
