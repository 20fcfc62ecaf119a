//! Command-line entry point for the mailsieve pipeline.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use mailsieve::config::AppConfig;
use mailsieve::db::Database;
use mailsieve::logging::{init_logging, OperationTimer};
use mailsieve::nlp::Normalizer;
use mailsieve::pipeline::Pipeline;
use mailsieve::store::ContentStore;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture dirty-directory artifacts into the content store
    Ingest {
        /// Directory of incoming .eml/.mbox files (defaults to config)
        #[arg(short, long)]
        input_dir: Option<String>,

        /// Worker pool size (defaults to config)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Parse, normalize, and persist every stored message
    Index {
        /// Worker pool size (defaults to config)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Run intake and indexing back to back
    Run {
        /// Directory of incoming .eml/.mbox files (defaults to config)
        #[arg(short, long)]
        input_dir: Option<String>,

        /// Worker pool size (defaults to config)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Show one indexed message with participants and token counts
    Show {
        /// Message id
        id: i64,
    },
    /// Show row counts for every index table
    Stats,
}

fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging; the guard must outlive the run
    let _log_guard = init_logging(
        Some(&config.get_log_level()),
        config.logging.file_path.as_deref().map(Path::new),
    )?;

    info!("Starting mailsieve");

    // Parse command line arguments
    let cli = Cli::parse();

    let db = Arc::new(Database::new(
        &config.get_database_path(),
        config.database.max_connections,
    )?);
    let store = Arc::new(ContentStore::open(&config.ingest.storage_dir)?);
    let normalizer = Arc::new(Normalizer::with_lexicon(
        config.nlp.lexicon_path.as_deref().map(Path::new),
    )?);
    let pipeline = Pipeline::new(Arc::clone(&db), store, normalizer);

    match &cli.command {
        Commands::Ingest { input_dir, workers } => {
            let timer = OperationTimer::new("ingest");
            let dir = input_dir.as_deref().unwrap_or(&config.ingest.dirty_dir);
            let stats = pipeline.ingest(dir, workers.unwrap_or(config.ingest.workers))?;
            let _ = timer.finish();
            info!(
                processed = stats.processed,
                failed = stats.failed,
                "Ingest complete"
            );
        }
        Commands::Index { workers } => {
            let timer = OperationTimer::new("index");
            let stats = pipeline.index(workers.unwrap_or(config.ingest.workers))?;
            let _ = timer.finish();
            info!(
                processed = stats.processed,
                failed = stats.failed,
                "Index complete"
            );
        }
        Commands::Run { input_dir, workers } => {
            let timer = OperationTimer::new("run");
            let dir = input_dir.as_deref().unwrap_or(&config.ingest.dirty_dir);
            let (ingest_stats, index_stats) =
                pipeline.run(dir, workers.unwrap_or(config.ingest.workers))?;
            let _ = timer.finish();
            info!(
                ingested = ingest_stats.processed,
                ingest_failures = ingest_stats.failed,
                indexed = index_stats.processed,
                index_failures = index_stats.failed,
                "Pipeline complete"
            );
        }
        Commands::Show { id } => show_message(&db, *id)?,
        Commands::Stats => show_stats(&db)?,
    }

    Ok(())
}

#[allow(clippy::print_stdout)]
fn show_message(db: &Database, id: i64) -> Result<()> {
    let view = db
        .fetch_message_view(id)?
        .with_context(|| format!("No message with id {id}"))?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn show_stats(db: &Database) -> Result<()> {
    let stats = db.index_stats()?;
    println!("messages:            {}", stats.messages);
    println!("addresses:           {}", stats.addresses);
    println!("words:               {}", stats.words);
    println!("subject occurrences: {}", stats.subject_occurrences);
    println!("body occurrences:    {}", stats.body_occurrences);
    Ok(())
}
