//! WebAssembly bindings for ReddBlock
//!
//! Runs the filtering engine inside the page. Three producers feed one
//! stimulus queue: a `MutationObserver` on the body, the initial-delay and
//! periodic timers, and storage change notifications. A single pump task
//! drains the queue, so stimuli are handled strictly one after another.

mod dom;
mod storage;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use rb_core::{
    ChangeSource, Engine, EngineConfig, KeywordSet, Stimulus, StimulusQueue, StorageChanges,
};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{Element, MutationObserver, MutationObserverInit, MutationRecord};

pub use dom::{DomElement, WebDocument};
pub use storage::{ChromeStore, HostStore, LocalStore};

// =============================================================================
// Logging
// =============================================================================

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format_record(record.level(), record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            log::Level::Debug | log::Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

fn format_record(level: log::Level, args: &std::fmt::Arguments) -> String {
    format!("[ReddBlock] {} {}", level, args)
}

fn init_logging(level: log::LevelFilter) {
    console_error_panic_hook::set_once();
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn parse_level(level: Option<String>) -> log::LevelFilter {
    level
        .and_then(|level| level.parse().ok())
        .unwrap_or(log::LevelFilter::Info)
}

// =============================================================================
// Host state
// =============================================================================

struct Host {
    engine: Engine<HostStore>,
    document: WebDocument,
    queue: StimulusQueue<DomElement>,
    pumping: Cell<bool>,
}

thread_local! {
    static HOST: RefCell<Option<Rc<Host>>> = const { RefCell::new(None) };
}

fn current_host() -> Option<Rc<Host>> {
    HOST.with(|host| host.borrow().clone())
}

/// Queue a stimulus and make sure the pump is running.
fn submit(host: &Rc<Host>, stimulus: Stimulus<DomElement>) {
    if host.queue.sender().send(stimulus) {
        pump(host);
    }
}

/// Drain the queue on a local task. At most one pump runs at a time.
fn pump(host: &Rc<Host>) {
    if host.pumping.replace(true) {
        return;
    }
    let host = Rc::clone(host);
    spawn_local(async move {
        let mut document = host.document.clone();
        while let Some(stimulus) = host.queue.pop() {
            let outcome = host.engine.handle(&mut document, stimulus).await;
            if outcome.suppressed > 0 {
                log::debug!("Suppressed {} blocks", outcome.suppressed);
            }
        }
        host.pumping.set(false);
    });
}

fn parse_config(config: &JsValue) -> Result<EngineConfig, JsValue> {
    if config.is_undefined() || config.is_null() {
        return Ok(EngineConfig::default());
    }
    let text: String = match config.as_string() {
        Some(text) => text,
        None => js_sys::JSON::stringify(config)?.into(),
    };
    EngineConfig::from_json(&text).map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))
}

fn observe_mutations(host: &Rc<Host>, document: &web_sys::Document) -> Result<(), JsValue> {
    let body = document
        .body()
        .ok_or_else(|| JsValue::from_str("Document has no body"))?;

    let observed = Rc::clone(host);
    let callback = Closure::<dyn FnMut(js_sys::Array, MutationObserver)>::new(
        move |records: js_sys::Array, _observer: MutationObserver| {
            let mut added = Vec::new();
            for record in records.iter() {
                let Ok(record) = record.dyn_into::<MutationRecord>() else {
                    continue;
                };
                let nodes = record.added_nodes();
                for index in 0..nodes.length() {
                    if let Some(element) = nodes.get(index).and_then(|n| n.dyn_into::<Element>().ok()) {
                        added.push(DomElement::new(element));
                    }
                }
            }
            submit(&observed, Stimulus::NodesAdded(added));
        },
    );

    let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
    let options = MutationObserverInit::new();
    options.set_child_list(true);
    options.set_subtree(true);
    observer.observe_with_options(&body, &options)?;

    callback.forget();
    Ok(())
}

/// Timer delay clamped to the range `setTimeout` accepts.
fn timer_ms(delay: Duration) -> i32 {
    i32::try_from(delay.as_millis()).unwrap_or(i32::MAX)
}

fn schedule_ticks(host: &Rc<Host>, window: &web_sys::Window) -> Result<(), JsValue> {
    let timing = host.engine.timing();

    let first = Rc::clone(host);
    let initial = Closure::<dyn FnMut()>::new(move || submit(&first, Stimulus::Tick));
    window.set_timeout_with_callback_and_timeout_and_arguments_0(
        initial.as_ref().unchecked_ref(),
        timer_ms(timing.initial_delay),
    )?;
    initial.forget();

    let periodic = Rc::clone(host);
    let interval = Closure::<dyn FnMut()>::new(move || submit(&periodic, Stimulus::Tick));
    window.set_interval_with_callback_and_timeout_and_arguments_0(
        interval.as_ref().unchecked_ref(),
        timer_ms(timing.interval),
    )?;
    interval.forget();

    Ok(())
}

// =============================================================================
// Exports
// =============================================================================

/// Start filtering this page.
///
/// `config` is an optional engine configuration object (or JSON string).
/// `log_level` defaults to `info`.
#[wasm_bindgen]
pub fn start(config: JsValue, log_level: Option<String>) -> Result<(), JsValue> {
    init_logging(parse_level(log_level));

    if current_host().is_some() {
        return Err(JsValue::from_str("Already started. Reload the page to restart."));
    }

    let config = parse_config(&config)?;
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("No document"))?;

    let store = HostStore::detect(&window)
        .map_err(|e| JsValue::from_str(&format!("No storage backend: {}", e)))?;
    let engine = Engine::new(&config, store.clone())
        .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?;

    let host = Rc::new(Host {
        engine,
        document: WebDocument::new(document.clone()),
        queue: StimulusQueue::new(),
        pumping: Cell::new(false),
    });

    // The listener enqueues; this subscriber runs after it and wakes the pump.
    host.engine.listen(&store, host.queue.sender());
    let woken = Rc::clone(&host);
    store.subscribe(Rc::new(move |_: &StorageChanges| pump(&woken)));

    observe_mutations(&host, &document)?;
    schedule_ticks(&host, &window)?;

    HOST.with(|slot| *slot.borrow_mut() = Some(Rc::clone(&host)));
    log::info!("ReddBlock started using {}", store.kind());

    // Initial keyword load goes through the queue like any other refresh.
    submit(&host, Stimulus::SettingsChanged);
    Ok(())
}

#[wasm_bindgen]
pub fn is_started() -> bool {
    current_host().is_some()
}

/// Queue a full sweep now instead of waiting for the next tick.
#[wasm_bindgen]
pub fn scan_now() -> bool {
    match current_host() {
        Some(host) => {
            submit(&host, Stimulus::Tick);
            true
        }
        None => false,
    }
}

#[wasm_bindgen]
pub fn get_stats() -> JsValue {
    let result = js_sys::Object::new();
    let Some(host) = current_host() else {
        let _ = js_sys::Reflect::set(&result, &"started".into(), &JsValue::from(false));
        return result.into();
    };

    let stats = host.engine.stats();
    let _ = js_sys::Reflect::set(&result, &"started".into(), &JsValue::from(true));
    let _ = js_sys::Reflect::set(&result, &"keywords".into(), &JsValue::from(host.engine.keywords().len() as u32));
    let _ = js_sys::Reflect::set(&result, &"scans".into(), &JsValue::from(stats.scans as f64));
    let _ = js_sys::Reflect::set(&result, &"skippedScans".into(), &JsValue::from(stats.skipped_scans as f64));
    let _ = js_sys::Reflect::set(&result, &"evaluated".into(), &JsValue::from(stats.evaluated as f64));
    let _ = js_sys::Reflect::set(&result, &"suppressed".into(), &JsValue::from(stats.suppressed as f64));
    let _ = js_sys::Reflect::set(&result, &"failedIncrements".into(), &JsValue::from(stats.failed_increments as f64));
    let _ = js_sys::Reflect::set(&result, &"blockedCount".into(), &JsValue::from(stats.blocked_count as f64));
    result.into()
}

/// Would `text` be hidden under `keywords` (an array of strings)?
#[wasm_bindgen]
pub fn matches_text(text: &str, keywords: JsValue) -> bool {
    let keywords = js_sys::Array::from(&keywords);
    let set = KeywordSet::new(keywords.iter().filter_map(|value| value.as_string()));
    rb_core::matches(text, &set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(None), log::LevelFilter::Info);
        assert_eq!(parse_level(Some("debug".to_string())), log::LevelFilter::Debug);
        assert_eq!(parse_level(Some("WARN".to_string())), log::LevelFilter::Warn);
        assert_eq!(parse_level(Some("loud".to_string())), log::LevelFilter::Info);
    }

    #[test]
    fn test_timer_ms_saturates() {
        assert_eq!(timer_ms(Duration::from_millis(2000)), 2000);
        assert_eq!(timer_ms(Duration::from_millis(i32::MAX as u64)), i32::MAX);
        assert_eq!(timer_ms(Duration::from_millis(1 << 31)), i32::MAX);
        assert_eq!(timer_ms(Duration::MAX), i32::MAX);
    }

    #[test]
    fn test_format_record() {
        let line = format_record(log::Level::Warn, &format_args!("{} blocks", 3));
        assert_eq!(line, "[ReddBlock] WARN 3 blocks");
    }
}
