//! ReddBlock CLI
//!
//! CLI tool for managing the keyword list, replaying feed fixtures through
//! the engine, and exercising the shared blocked counter.

mod file_store;
mod gemini;
mod race;
mod scan;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};
use env_logger::Env;
use serde_json::Value;

use rb_core::settings::{save_settings, undecodable_keywords, SettingsPatch, StoredSettings};
use rb_core::suggest::{apply_suggestions, KeywordSuggester};
use rb_core::{EngineConfig, SettingsStore};

use crate::file_store::FileStore;
use crate::gemini::{GeminiConfig, GeminiSuggester};
use crate::scan::Feed;

#[derive(Parser)]
#[command(name = "rb-cli")]
#[command(about = "ReddBlock keyword filter tools")]
struct Cli {
    /// JSON file standing in for the browser's storage
    #[arg(short, long, global = true, default_value = "reddblock-storage.json")]
    store: PathBuf,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the keyword list
    Keywords {
        #[command(subcommand)]
        action: KeywordAction,
    },

    /// Show the keyword list and blocked count
    Stats,

    /// Replay a feed fixture through the engine
    Scan {
        /// Feed fixture file
        #[arg(short, long)]
        feed: PathBuf,
    },

    /// Run several tabs' counter increments against one shared record
    Race {
        /// Number of engine instances
        #[arg(short, long, default_value_t = 2)]
        instances: u64,

        /// Initial blocked count
        #[arg(long, default_value_t = 10)]
        start: u64,

        /// Run the increments one after another instead
        #[arg(long)]
        sequential: bool,
    },

    /// Ask the text-generation service for related keywords
    Suggest {
        /// Base keyword
        keyword: String,

        /// Add the suggestions to the keyword list
        #[arg(short, long)]
        apply: bool,
    },
}

#[derive(Subcommand)]
enum KeywordAction {
    /// List all keywords
    List,
    /// Add a keyword
    Add { text: String },
    /// Remove a keyword by id or text
    Remove { target: String },
    /// Enable or disable a keyword by id or text
    Toggle { target: String },
    /// Remove every keyword
    Clear,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let result = load_config(cli.config.as_deref()).and_then(|config| {
        let store = FileStore::new(&cli.store);
        match cli.command {
            Commands::Keywords { action } => block_on(cmd_keywords(&store, &config, action)),
            Commands::Stats => block_on(cmd_stats(&store, &config)),
            Commands::Scan { feed } => block_on(cmd_scan(store, &config, &feed)),
            Commands::Race {
                instances,
                start,
                sequential,
            } => block_on(cmd_race(instances, start, sequential)),
            Commands::Suggest { keyword, apply } => {
                block_on(cmd_suggest(&store, &config, &keyword, apply))
            }
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Run a command future on a current-thread runtime. The engine's futures
/// are not `Send`, so everything stays on this thread inside a `LocalSet`.
fn block_on<F>(future: F) -> Result<(), String>
where
    F: Future<Output = Result<(), String>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    let local = tokio::task::LocalSet::new();
    runtime.block_on(local.run_until(future))
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, String> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    EngineConfig::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path.display(), e))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Unlike the engine, the CLI refuses to edit a record it could not read.
async fn read_record(store: &FileStore, key: &str) -> Result<Option<Value>, String> {
    store
        .get(key)
        .await
        .map_err(|e| format!("Failed to load settings from '{}': {}", store.path().display(), e))
}

async fn read_settings(store: &FileStore, key: &str) -> Result<StoredSettings, String> {
    let record = read_record(store, key).await?;
    Ok(StoredSettings::from_value(record.as_ref()))
}

/// Settings that are about to be written back.
async fn read_settings_for_edit(store: &FileStore, key: &str) -> Result<StoredSettings, String> {
    let record = read_record(store, key).await?;
    check_editable(record.as_ref())?;
    Ok(StoredSettings::from_value(record.as_ref()))
}

/// Writing the list back would lose entries that did not decode.
fn check_editable(record: Option<&Value>) -> Result<(), String> {
    match undecodable_keywords(record) {
        0 => Ok(()),
        n => Err(format!(
            "{} stored keyword entries could not be read; refusing to rewrite the keyword list",
            n
        )),
    }
}

async fn write_keywords(store: &FileStore, key: &str, settings: StoredSettings) -> Result<(), String> {
    save_settings(store, key, &SettingsPatch::keywords(settings.keywords))
        .await
        .map_err(|e| format!("Failed to save settings: {}", e))
}

/// Keyword id for `target`, matching ids exactly and texts case-insensitively.
fn resolve_id(settings: &StoredSettings, target: &str) -> Result<String, String> {
    let lowered = target.trim().to_lowercase();
    settings
        .keywords
        .iter()
        .find(|k| k.id == target)
        .or_else(|| settings.keywords.iter().find(|k| k.text.to_lowercase() == lowered))
        .map(|k| k.id.clone())
        .ok_or_else(|| format!("No keyword matches '{}'", target))
}

fn print_keywords(settings: &StoredSettings) {
    if settings.keywords.is_empty() {
        println!("No keywords yet");
        return;
    }
    for keyword in &settings.keywords {
        println!(
            "  [{}] {:<10} {}{}",
            if keyword.enabled { "x" } else { " " },
            keyword.id,
            keyword.text,
            if keyword.is_ai_generated == Some(true) { "  (AI)" } else { "" }
        );
    }
}

async fn cmd_keywords(store: &FileStore, config: &EngineConfig, action: KeywordAction) -> Result<(), String> {
    let key = config.storage_key.as_str();
    if let KeywordAction::List = action {
        print_keywords(&read_settings(store, key).await?);
        return Ok(());
    }

    let mut settings = read_settings_for_edit(store, key).await?;
    match action {
        KeywordAction::List => {}
        KeywordAction::Add { text } => {
            if !settings.add_keyword(&text, false, now_ms()) {
                return Err(format!("'{}' is empty or already listed", text.trim()));
            }
            println!("Added '{}'", text.trim());
        }
        KeywordAction::Remove { target } => {
            let id = resolve_id(&settings, &target)?;
            settings.remove_keyword(&id);
            println!("Removed '{}'", target);
        }
        KeywordAction::Toggle { target } => {
            let id = resolve_id(&settings, &target)?;
            let enabled = settings.toggle_keyword(&id).unwrap_or(false);
            println!("'{}' is now {}", target, if enabled { "enabled" } else { "disabled" });
        }
        KeywordAction::Clear => {
            let removed = settings.keywords.len();
            settings.clear_keywords();
            println!("Removed {} keywords", removed);
        }
    }

    write_keywords(store, key, settings).await
}

async fn cmd_stats(store: &FileStore, config: &EngineConfig) -> Result<(), String> {
    let settings = read_settings(store, &config.storage_key).await?;
    let enabled = settings.keywords.iter().filter(|k| k.enabled).count();

    println!("Store:     {}", store.path().display());
    println!("Keywords:  {} ({} enabled)", settings.keywords.len(), enabled);
    println!("Blocked:   {}", settings.blocked_count);
    println!();
    print_keywords(&settings);

    Ok(())
}

async fn cmd_scan(store: FileStore, config: &EngineConfig, feed_path: &Path) -> Result<(), String> {
    let feed = Feed::load(feed_path)?;
    let start = Instant::now();
    let report = scan::run_scan(store, config, &feed).await?;
    let elapsed = start.elapsed();

    for (index, outcome) in report.batches.iter().enumerate() {
        if outcome.skipped {
            println!("  batch {:>3}: skipped (no enabled keywords)", index);
        } else {
            println!(
                "  batch {:>3}: {} candidates, {} evaluated, {} hidden",
                index, outcome.candidates, outcome.evaluated, outcome.suppressed
            );
        }
    }
    println!(
        "  sweep    : {} candidates, {} evaluated, {} hidden",
        report.sweep.candidates, report.sweep.evaluated, report.sweep.suppressed
    );
    println!();

    println!("Hidden ({}):", report.hidden.len());
    for text in &report.hidden {
        println!("  - {}", text);
    }
    println!("Visible ({}):", report.visible.len());
    for text in &report.visible {
        println!("  - {}", text);
    }
    println!();
    println!("Blocked count: {}", report.blocked_count);
    println!("Time:          {:.1}ms", elapsed.as_secs_f64() * 1000.0);

    Ok(())
}

async fn cmd_race(instances: u64, start: u64, sequential: bool) -> Result<(), String> {
    if instances == 0 {
        return Err("At least one instance is required".to_string());
    }

    let report = race::run_race(instances, start, sequential).await;

    println!(
        "{} instances, {} from {}",
        report.instances,
        if sequential { "sequential" } else { "concurrent" },
        report.start
    );
    println!("  Expected:  {}", report.expected());
    println!("  Final:     {}", report.final_count);
    println!("  Lost:      {}", report.lost());
    if report.failed > 0 {
        println!("  Failed:    {}", report.failed);
    }

    Ok(())
}

async fn cmd_suggest(store: &FileStore, config: &EngineConfig, keyword: &str, apply: bool) -> Result<(), String> {
    if keyword.trim().is_empty() {
        return Err("Keyword is empty".to_string());
    }

    let suggester = GeminiSuggester::new(GeminiConfig::from_env()?);
    let words = suggester
        .suggest(keyword)
        .await
        .map_err(|e| format!("Suggestion failed: {}", e))?;

    println!("Suggestions for '{}':", keyword.trim());
    for word in &words {
        println!("  - {}", word);
    }

    if apply {
        let key = config.storage_key.as_str();
        let mut settings = read_settings_for_edit(store, key).await?;
        let added = apply_suggestions(&mut settings, &words, now_ms());
        write_keywords(store, key, settings).await?;
        println!("Added {} new keywords", added);
    }

    Ok(())
}
