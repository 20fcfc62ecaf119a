//! Mailsieve - Email Ingestion and Word-Occurrence Indexing
//!
//! A Rust library for ingesting raw email messages, deduplicating them by
//! content digest, normalizing their text, and persisting a word-occurrence
//! index suitable for downstream analysis.
//!
//! # Features
//!
//! - Content-addressed dedup of `.eml` files and `.mbox` archives
//! - MIME parsing with HTML sanitization and graceful degradation
//! - Token and address normalization (stopwords, lexicon, stemming)
//! - Fixed-size worker pool with per-item failure isolation
//! - Idempotent SQLite persistence with count-accumulating upserts

/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Error types
pub mod error;
/// Intake of dirty-directory artifacts
pub mod intake;
/// Logging setup and utilities
pub mod logging;
/// Streaming mbox archive splitting
pub mod mbox;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Text and address normalization
pub mod nlp;
/// MIME structure parsing
pub mod parser;
/// Pipeline orchestration
pub mod pipeline;
/// Bounded worker pool
pub mod pool;
/// Database schema definitions
pub mod schema;
/// Content-addressed message storage
pub mod store;

// Re-export key components for easier access
pub use db::Database;
pub use error::{MailsieveError, Result};
pub use models::{MessageView, OccurrenceKind, ParsedMessage};
pub use nlp::Normalizer;
pub use pipeline::Pipeline;
pub use store::ContentStore;
