use std::cell::RefCell;
use std::rc::Rc;

use rb_core::counter::CounterPersister;
use rb_core::settings::{load_settings, save_settings};
use rb_core::{
    ArenaDocument, BlockSelector, Document, ElementSpec, Engine, EngineConfig, KeywordSet,
    MemoryStore, NodeId, SettingsPatch, SettingsStore, Stimulus, StimulusQueue, StoreError,
    SuppressStyle, STORAGE_KEY,
};
use serde_json::{json, Value};

type EventLog = Rc<RefCell<Vec<String>>>;

/// Arena document that records every style and mark write.
struct RecordingDocument {
    inner: ArenaDocument,
    log: EventLog,
}

impl Document for RecordingDocument {
    type Element = NodeId;

    fn select(&self, root: Option<&NodeId>, selector: &BlockSelector) -> Vec<NodeId> {
        self.inner.select(root, selector)
    }

    fn is_connected(&self, element: &NodeId) -> bool {
        Document::is_connected(&self.inner, element)
    }

    fn text_content(&self, element: &NodeId) -> Option<String> {
        self.inner.text_content(element)
    }

    fn has_flag(&self, element: &NodeId, name: &str) -> bool {
        self.inner.has_flag(element, name)
    }

    fn set_flag(&mut self, element: &NodeId, name: &str) {
        self.log.borrow_mut().push(format!("mark {:?}", element));
        self.inner.set_flag(element, name);
    }

    fn apply_style(&mut self, element: &NodeId, style: SuppressStyle) {
        self.log.borrow_mut().push(format!("style {:?}", element));
        self.inner.apply_style(element, style);
    }
}

/// Store that records each call once it resumes.
struct RecordingStore {
    inner: MemoryStore,
    log: EventLog,
}

impl SettingsStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let result = self.inner.get(key).await;
        self.log.borrow_mut().push("get".to_string());
        result
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let result = self.inner.set(key, value).await;
        self.log.borrow_mut().push("set".to_string());
        result
    }
}

fn store_with(keywords: serde_json::Value, blocked_count: u64) -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(STORAGE_KEY, json!({ "keywords": keywords, "blockedCount": blocked_count }));
    store
}

fn insert(doc: &mut ArenaDocument, spec: ElementSpec) -> NodeId {
    let id = doc.build(&spec);
    let root = doc.root();
    doc.append_child(root, id);
    id
}

fn blocked_count(store: &MemoryStore) -> u64 {
    store.peek(STORAGE_KEY).unwrap()["blockedCount"].as_u64().unwrap()
}

#[tokio::test]
async fn test_matched_block_is_hidden_counted_and_marked() {
    let store = store_with(json!([{ "id": "1", "text": "spoiler", "enabled": true, "createdAt": 0 }]), 0);
    let engine = Engine::new(&EngineConfig::default(), store.clone()).unwrap();
    engine.start().await;

    let mut doc = ArenaDocument::new();
    let block = insert(&mut doc, ElementSpec::new("shreddit-post").text("Huge SPOILER inside"));
    let outcome = engine.handle(&mut doc, Stimulus::NodesAdded(vec![block])).await;

    assert_eq!(outcome.suppressed, 1);
    assert_eq!(doc.style(block), SuppressStyle::COLLAPSED);
    assert!(doc.style(block).occupies_no_space());
    assert_eq!(blocked_count(&store), 1);
    assert!(engine.observer().marker().is_marked(&doc, &block));
}

#[tokio::test]
async fn test_empty_keyword_set_leaves_blocks_unmarked_until_first_keyword() {
    let store = store_with(json!([]), 0);
    let engine = Engine::new(&EngineConfig::default(), store.clone()).unwrap();
    let queue = StimulusQueue::new();
    engine.listen(&store, queue.sender());
    engine.start().await;

    let mut doc = ArenaDocument::new();
    let block = insert(&mut doc, ElementSpec::new("shreddit-post").text("spoiler ahead"));
    let outcome = engine.handle(&mut doc, Stimulus::NodesAdded(vec![block])).await;

    assert!(outcome.skipped);
    assert_eq!(doc.style(block), SuppressStyle::empty());
    assert!(!engine.observer().marker().is_marked(&doc, &block));
    assert_eq!(engine.stats().skipped_scans, 1);

    // Once a keyword exists, the periodic sweep picks the block up.
    let mut settings = load_settings(&store, STORAGE_KEY).await;
    settings.add_keyword("Spoiler", false, 1);
    save_settings(&store, STORAGE_KEY, &SettingsPatch::keywords(settings.keywords))
        .await
        .unwrap();
    engine.run_pending(&mut doc, &queue).await;
    let outcome = engine.handle(&mut doc, Stimulus::Tick).await;

    assert_eq!(outcome.suppressed, 1);
    assert!(engine.observer().marker().is_marked(&doc, &block));
}

#[tokio::test]
async fn test_block_delivered_twice_is_evaluated_once() {
    let store = store_with(json!([{ "text": "leak", "enabled": true }]), 5);
    let engine = Engine::new(&EngineConfig::default(), store.clone()).unwrap();
    engine.start().await;

    let mut doc = ArenaDocument::new();
    let first_parent = insert(&mut doc, ElementSpec::new("div"));
    let second_parent = insert(&mut doc, ElementSpec::new("section"));
    let block = doc.build(&ElementSpec::new("div").class("Post").text("episode leak"));
    doc.append_child(first_parent, block);

    let first = engine.handle(&mut doc, Stimulus::NodesAdded(vec![block])).await;
    doc.append_child(second_parent, block);
    let second = engine.handle(&mut doc, Stimulus::NodesAdded(vec![second_parent])).await;

    assert_eq!(first.suppressed, 1);
    assert_eq!(second.candidates, 1);
    assert_eq!(second.evaluated, 0);
    assert_eq!(blocked_count(&store), 6);
}

#[tokio::test]
async fn test_failed_refresh_stops_suppression_until_repopulated() {
    let store = store_with(json!([{ "text": "leak", "enabled": true }]), 0);
    let engine = Engine::new(&EngineConfig::default(), store.clone()).unwrap();
    engine.start().await;
    assert_eq!(engine.keywords().len(), 1);

    store.set_unavailable(true);
    let mut doc = ArenaDocument::new();
    engine.handle(&mut doc, Stimulus::SettingsChanged).await;
    assert!(engine.keywords().is_empty());

    let block = insert(&mut doc, ElementSpec::new("shreddit-post").text("leak"));
    let outcome = engine.handle(&mut doc, Stimulus::Tick).await;
    assert!(outcome.skipped);
    assert_eq!(doc.style(block), SuppressStyle::empty());

    store.set_unavailable(false);
    engine.handle(&mut doc, Stimulus::SettingsChanged).await;
    let outcome = engine.handle(&mut doc, Stimulus::Tick).await;
    assert_eq!(outcome.suppressed, 1);
}

#[tokio::test]
async fn test_disabling_a_keyword_affects_only_new_blocks() {
    let store = store_with(
        json!([{ "id": "k", "text": "cat", "enabled": true, "createdAt": 0 }]),
        0,
    );
    let engine = Engine::new(&EngineConfig::default(), store.clone()).unwrap();
    engine.start().await;

    let mut doc = ArenaDocument::new();
    let old = insert(&mut doc, ElementSpec::new("shreddit-post").text("concatenate"));
    engine.handle(&mut doc, Stimulus::Tick).await;
    assert_eq!(doc.style(old), SuppressStyle::COLLAPSED);

    let mut settings = load_settings(&store, STORAGE_KEY).await;
    settings.toggle_keyword("k");
    settings.add_keyword("dog", false, 1);
    save_settings(&store, STORAGE_KEY, &SettingsPatch::keywords(settings.keywords))
        .await
        .unwrap();
    engine.handle(&mut doc, Stimulus::SettingsChanged).await;
    assert_eq!(*engine.keywords(), KeywordSet::new(["dog"]));

    let new = insert(&mut doc, ElementSpec::new("shreddit-post").text("Cats"));
    engine.handle(&mut doc, Stimulus::NodesAdded(vec![new])).await;

    assert_eq!(doc.style(old), SuppressStyle::COLLAPSED);
    assert_eq!(doc.style(new), SuppressStyle::empty());
}

#[tokio::test]
async fn test_concurrent_increments_may_lose_an_update() {
    let store = store_with(json!([]), 10).with_yielding();
    let tab_a = CounterPersister::new(STORAGE_KEY);
    let tab_b = CounterPersister::new(STORAGE_KEY);

    let (a, b) = tokio::join!(tab_a.increment(&store), tab_b.increment(&store));
    assert!(a.is_ok() && b.is_ok());

    let final_count = blocked_count(&store);
    assert!(matches!(final_count, 11 | 12), "unexpected count {final_count}");
    // Both reads happen before either write, so one update is lost.
    assert_eq!(final_count, 11);
}

#[tokio::test]
async fn test_sequential_increments_from_two_tabs_both_land() {
    let store = store_with(json!([]), 10).with_yielding();
    let tab_a = CounterPersister::new(STORAGE_KEY);
    let tab_b = CounterPersister::new(STORAGE_KEY);

    tab_a.increment(&store).await.unwrap();
    tab_b.increment(&store).await.unwrap();
    assert_eq!(blocked_count(&store), 12);
}

#[tokio::test]
async fn test_two_engines_share_one_counter() {
    let store = store_with(json!([{ "text": "spoiler", "enabled": true }]), 0);
    let first = Engine::new(&EngineConfig::default(), store.clone()).unwrap();
    let second = Engine::new(&EngineConfig::default(), store.clone()).unwrap();
    first.start().await;
    second.start().await;

    let mut page_a = ArenaDocument::new();
    let mut page_b = ArenaDocument::new();
    insert(&mut page_a, ElementSpec::new("shreddit-post").text("spoiler one"));
    insert(&mut page_b, ElementSpec::new("shreddit-post").text("spoiler two"));

    first.handle(&mut page_a, Stimulus::Tick).await;
    second.handle(&mut page_b, Stimulus::Tick).await;

    assert_eq!(blocked_count(&store), 2);
    assert_eq!(first.stats().suppressed, 1);
    assert_eq!(second.stats().suppressed, 1);
}

#[tokio::test]
async fn test_counter_write_preserves_keywords() {
    let keywords = json!([{ "id": "1", "text": "Spoiler", "enabled": true, "createdAt": 17, "isAiGenerated": true }]);
    let store = store_with(keywords.clone(), 3);
    let engine = Engine::new(&EngineConfig::default(), store.clone()).unwrap();
    engine.start().await;

    let mut doc = ArenaDocument::new();
    insert(&mut doc, ElementSpec::new("shreddit-post").text("spoiler"));
    engine.handle(&mut doc, Stimulus::Tick).await;

    let record = store.peek(STORAGE_KEY).unwrap();
    assert_eq!(record["keywords"], keywords);
    assert_eq!(record["blockedCount"], 4);
}

#[tokio::test]
async fn test_batch_is_hidden_and_marked_before_any_store_call_resumes() {
    const BLOCKS: usize = 5;
    let store = store_with(json!([{ "text": "spoiler", "enabled": true }]), 0).with_yielding();
    let log: EventLog = Rc::default();
    let engine = Engine::new(
        &EngineConfig::default(),
        RecordingStore {
            inner: store.clone(),
            log: Rc::clone(&log),
        },
    )
    .unwrap();
    engine.start().await;
    log.borrow_mut().clear();

    let mut doc = RecordingDocument {
        inner: ArenaDocument::new(),
        log: Rc::clone(&log),
    };
    let blocks: Vec<NodeId> = (0..BLOCKS)
        .map(|i| insert(&mut doc.inner, ElementSpec::new("shreddit-post").text(format!("spoiler {i}"))))
        .collect();

    let outcome = engine.handle(&mut doc, Stimulus::NodesAdded(blocks.clone())).await;
    assert_eq!(outcome.suppressed, BLOCKS);

    let events = log.borrow();
    let first_store_call = events
        .iter()
        .position(|e| e == "get" || e == "set")
        .expect("counter was never persisted");
    let (dom_writes, store_calls) = events.split_at(first_store_call);
    assert_eq!(dom_writes.len(), 2 * BLOCKS);
    for block in &blocks {
        assert!(dom_writes.contains(&format!("style {:?}", block)));
        assert!(dom_writes.contains(&format!("mark {:?}", block)));
    }
    assert!(store_calls.iter().all(|e| e == "get" || e == "set"));
    assert_eq!(store_calls.len(), 2 * BLOCKS);

    for block in &blocks {
        assert_eq!(doc.inner.style(*block), SuppressStyle::COLLAPSED);
    }
    assert_eq!(blocked_count(&store), BLOCKS as u64);
    assert_eq!(engine.stats().blocked_count, BLOCKS as u64);
}

#[tokio::test]
async fn test_block_removed_before_its_batch_is_not_counted() {
    let store = store_with(json!([{ "text": "spoiler", "enabled": true }]), 7);
    let engine = Engine::new(&EngineConfig::default(), store.clone()).unwrap();
    engine.start().await;

    let mut doc = ArenaDocument::new();
    let kept = insert(&mut doc, ElementSpec::new("shreddit-post").text("spoiler kept"));
    let removed = insert(&mut doc, ElementSpec::new("shreddit-post").text("spoiler removed"));
    doc.detach(removed);

    let outcome = engine.handle(&mut doc, Stimulus::NodesAdded(vec![kept, removed])).await;
    assert_eq!(outcome.suppressed, 1);
    assert_eq!(doc.style(removed), SuppressStyle::empty());
    assert!(!engine.observer().marker().is_marked(&doc, &removed));
    assert_eq!(blocked_count(&store), 8);
}
