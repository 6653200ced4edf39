//! Feed replay
//!
//! Loads a JSON feed fixture into an arena document batch by batch, the way
//! an infinite-scroll page grows, and runs the engine over every insertion.
//! A final tick sweeps the whole document like the periodic timer would.

use std::path::Path;

use rb_core::{
    ArenaDocument, Document, ElementSpec, Engine, EngineConfig, NodeId, ScanOutcome, Stimulus,
    StimulusQueue,
};
use serde::Deserialize;

use crate::file_store::FileStore;

/// Feed fixture: successive insertion batches of top-level elements.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Feed {
    pub batches: Vec<Vec<ElementSpec>>,
}

impl Feed {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
        serde_json::from_str(&text).map_err(|e| format!("Invalid feed '{}': {}", path.display(), e))
    }
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub batches: Vec<ScanOutcome>,
    pub sweep: ScanOutcome,
    pub hidden: Vec<String>,
    pub visible: Vec<String>,
    pub blocked_count: u64,
}

fn insert_batch(doc: &mut ArenaDocument, batch: &[ElementSpec]) -> Vec<NodeId> {
    let root = doc.root();
    batch
        .iter()
        .map(|spec| {
            let id = doc.build(spec);
            doc.append_child(root, id);
            id
        })
        .collect()
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 60 {
        format!("{}...", flat.chars().take(57).collect::<String>())
    } else {
        flat
    }
}

pub async fn run_scan(store: FileStore, config: &EngineConfig, feed: &Feed) -> Result<ScanReport, String> {
    let engine = Engine::new(config, store.clone()).map_err(|e| format!("Invalid config: {}", e))?;
    let queue = StimulusQueue::new();
    engine.listen(&store, queue.sender());
    engine.start().await;

    let mut doc = ArenaDocument::new();
    let mut report = ScanReport::default();

    for (index, batch) in feed.batches.iter().enumerate() {
        let inserted = insert_batch(&mut doc, batch);
        log::debug!("Batch {}: inserted {} elements", index, inserted.len());
        queue.sender().send(Stimulus::NodesAdded(inserted));
        report.batches.push(engine.run_pending(&mut doc, &queue).await);
    }

    queue.sender().send(Stimulus::Tick);
    report.sweep = engine.run_pending(&mut doc, &queue).await;

    for block in engine.observer().candidates(&doc, None) {
        let text = preview(&doc.text_content(&block).unwrap_or_default());
        if doc.style(block).occupies_no_space() {
            report.hidden.push(text);
        } else {
            report.visible.push(text);
        }
    }
    report.blocked_count = engine.stats().blocked_count;
    Ok(report)
}
