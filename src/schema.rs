//! Database schema definitions
//!
//! This module provides constants for table and column names used with rusqlite.

/// Messages table schema
pub mod messages {
    /// Table name
    pub const TABLE: &str = "messages";
    /// Primary key column
    pub const ID: &str = "id";
    /// Content digest column (unique)
    pub const DIGEST: &str = "digest";
    /// Last-processed timestamp column
    pub const LAST_UPDATED: &str = "last_updated";
}

/// Addresses table schema
pub mod addresses {
    /// Table name
    pub const TABLE: &str = "addresses";
    /// Primary key column
    pub const ID: &str = "id";
    /// Normalized address column (unique)
    pub const ADDRESS: &str = "address";
}

/// Participants link table schema
pub mod participants {
    /// Table name
    pub const TABLE: &str = "participants";
    /// Foreign key to messages table
    pub const MESSAGE_ID: &str = "message_id";
    /// Foreign key to addresses table
    pub const ADDRESS_ID: &str = "address_id";
}

/// Vocabulary table schema
pub mod words {
    /// Table name
    pub const TABLE: &str = "words";
    /// Primary key column
    pub const ID: &str = "id";
    /// Normalized token column (unique)
    pub const TOKEN: &str = "token";
}

/// Subject occurrences table schema
pub mod subject_occurrences {
    /// Table name
    pub const TABLE: &str = "subject_occurrences";
    /// Primary key column
    pub const ID: &str = "id";
    /// Foreign key to messages table
    pub const MESSAGE_ID: &str = "message_id";
    /// Foreign key to words table
    pub const WORD_ID: &str = "word_id";
    /// Accumulated occurrence count column
    pub const COUNT: &str = "count";
}

/// Body occurrences table schema
pub mod body_occurrences {
    /// Table name
    pub const TABLE: &str = "body_occurrences";
    /// Primary key column
    pub const ID: &str = "id";
    /// Foreign key to messages table
    pub const MESSAGE_ID: &str = "message_id";
    /// Foreign key to words table
    pub const WORD_ID: &str = "word_id";
    /// Accumulated occurrence count column
    pub const COUNT: &str = "count";
}
