//! Data models for parsed messages and the stored index
//!
//! This module contains the data structures used throughout the pipeline,
//! from MIME parsing output to database row views.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured signal extracted from one raw message by the MIME parser.
///
/// All fields degrade to empty rather than failing: a message with no
/// recognizable headers parses to empty participants, subject, and body.
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    /// Raw participant addresses (From, To, Cc, Bcc), set-collapsed,
    /// not yet normalized
    pub participants: HashSet<String>,
    /// Raw subject header value, empty if absent
    pub subject: String,
    /// Resolved body text: all textual parts joined with a single space,
    /// HTML parts sanitized to plain text
    pub body: String,
}

/// Database representation of a stored message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbMessage {
    /// Database primary key
    pub id: i64,
    /// Content digest of the raw message bytes
    pub digest: String,
    /// Timestamp of the most recent processing pass
    pub last_updated: DateTime<Utc>,
}

/// A token and its accumulated occurrence count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordCount {
    /// Normalized (stemmed) token
    pub token: String,
    /// Accumulated occurrence count, always positive
    pub count: i64,
}

/// Joined read-back of one message: participants plus per-table token counts.
///
/// Any of the joined sets may be empty; a message with no indexed words is
/// still a valid view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    /// The message row itself
    pub message: DbMessage,
    /// Normalized participant addresses linked to this message
    pub participants: Vec<String>,
    /// Subject token counts
    pub subject_words: Vec<WordCount>,
    /// Body token counts
    pub body_words: Vec<WordCount>,
}

/// Which occurrence table a batch of counts belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceKind {
    /// Tokens drawn from the subject header
    Subject,
    /// Tokens drawn from the resolved body text
    Body,
}

impl OccurrenceKind {
    /// The backing table name for this occurrence kind
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::Subject => crate::schema::subject_occurrences::TABLE,
            Self::Body => crate::schema::body_occurrences::TABLE,
        }
    }
}
