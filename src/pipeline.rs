//! Pipeline orchestration: intake and indexing stages.
//!
//! Stage one captures dirty-directory artifacts into the content store;
//! stage two drives every stored message through parsing, normalization,
//! and persistence. The stages run as separate pool drains and are never
//! interleaved for the same message. Per-message failures are caught at
//! the worker boundary with enough context (digest, stage) for replay.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::db::Database;
use crate::error::Result;
use crate::intake;
use crate::metrics::MetricsCollector;
use crate::models::OccurrenceKind;
use crate::nlp::{count_tokens, normalize_address, Normalizer};
use crate::parser::parse_message;
use crate::pool::{PoolStats, WorkerPool};
use crate::store::ContentStore;

/// The full ingestion and indexing pipeline.
///
/// Shared state is read-only (normalizer) or internally synchronized
/// (database connection pool, content store), so one `Pipeline` is shared
/// across all workers of both stages.
pub struct Pipeline {
    db: Arc<Database>,
    store: Arc<ContentStore>,
    normalizer: Arc<Normalizer>,
    metrics: MetricsCollector,
}

impl Pipeline {
    /// Assemble a pipeline over an opened database and content store.
    #[must_use]
    pub fn new(db: Arc<Database>, store: Arc<ContentStore>, normalizer: Arc<Normalizer>) -> Self {
        Self {
            db,
            store,
            normalizer,
            metrics: MetricsCollector::default(),
        }
    }

    /// Stage one: capture every artifact in `dirty_dir` into the content
    /// store, deduplicated by digest.
    pub fn ingest(&self, dirty_dir: impl AsRef<Path>, workers: usize) -> Result<PoolStats> {
        let started = Instant::now();
        let stats = intake::ingest_directory(&self.store, dirty_dir, workers)?;

        self.metrics.record_ingested(stats.processed);
        self.metrics.record_failures("ingest", stats.failed);
        self.metrics.record_stage_duration("ingest", started.elapsed());
        Ok(stats)
    }

    /// Stage two: parse, normalize, and persist every stored message.
    pub fn index(&self, workers: usize) -> Result<PoolStats> {
        let started = Instant::now();
        let digests = self.store.list()?;
        info!(queued = digests.len(), workers, "Starting index stage");

        let pool = {
            let db = Arc::clone(&self.db);
            let store = Arc::clone(&self.store);
            let normalizer = Arc::clone(&self.normalizer);
            WorkerPool::start(workers, move |digest: &String| {
                process_one(&db, &store, &normalizer, digest)
            })?
        };

        for digest in digests {
            pool.submit(digest)?;
        }
        let stats = pool.join();

        self.metrics.record_indexed(stats.processed);
        self.metrics.record_failures("index", stats.failed);
        self.metrics.record_stage_duration("index", started.elapsed());
        info!(
            processed = stats.processed,
            failed = stats.failed,
            "Index stage finished"
        );
        Ok(stats)
    }

    /// Run both stages back to back.
    pub fn run(&self, dirty_dir: impl AsRef<Path>, workers: usize) -> Result<(PoolStats, PoolStats)> {
        let ingest_stats = self.ingest(dirty_dir, workers)?;
        let index_stats = self.index(workers)?;
        Ok((ingest_stats, index_stats))
    }

    /// The database this pipeline persists into.
    #[must_use]
    pub fn db(&self) -> &Database {
        &self.db
    }
}

/// Process one stored message end to end.
///
/// Reads the stored bytes, extracts structured signal, normalizes
/// addresses and text, and persists everything through the idempotent
/// upsert contracts. Occurrence counts accumulate, so re-processing the
/// same digest is additive rather than idempotent for counts.
pub fn process_one(
    db: &Database,
    store: &ContentStore,
    normalizer: &Normalizer,
    digest: &str,
) -> Result<()> {
    let raw = store.read(digest)?;
    let parsed = parse_message(&raw);

    let addresses: HashSet<String> = parsed
        .participants
        .iter()
        .map(|raw_addr| normalize_address(raw_addr))
        .filter(|addr| !addr.is_empty())
        .collect();
    let subject_tokens = normalizer.normalize_text(&parsed.subject);
    let body_tokens = normalizer.normalize_text(&parsed.body);

    let message_id = db.upsert_message(digest)?;

    for address in &addresses {
        let address_id = db.upsert_address(address)?;
        db.link_participant(message_id, address_id)?;
    }

    let subject_counts = count_tokens(&subject_tokens);
    let body_counts = count_tokens(&body_tokens);

    // One vocabulary batch for both tables saves a round-trip per token
    let vocabulary: Vec<String> = subject_counts
        .keys()
        .chain(body_counts.keys())
        .collect::<HashSet<_>>()
        .into_iter()
        .cloned()
        .collect();
    let word_ids = db.upsert_words_batch(&vocabulary)?;

    let subject_rows: Vec<(i64, i64, i64)> = subject_counts
        .iter()
        .filter_map(|(token, count)| word_ids.get(token).map(|&id| (message_id, id, *count)))
        .collect();
    let body_rows: Vec<(i64, i64, i64)> = body_counts
        .iter()
        .filter_map(|(token, count)| word_ids.get(token).map(|&id| (message_id, id, *count)))
        .collect();

    db.accumulate_occurrences(OccurrenceKind::Subject, &subject_rows)?;
    db.accumulate_occurrences(OccurrenceKind::Body, &body_rows)?;

    info!(
        message_id,
        digest = %digest,
        addresses = addresses.len(),
        subject_words = subject_counts.len(),
        body_words = body_counts.len(),
        "Indexed message"
    );
    Ok(())
}
