//! Database operations and connection pooling.
//!
//! The persistence layer exclusively owns the five index tables and is the
//! only writer. All operations are idempotent upserts resolved at the
//! storage layer through unique constraints plus conflict clauses, so
//! concurrent workers never coordinate with each other. Each worker checks
//! a connection out of an r2d2 pool; a single handle is never shared
//! unsynchronized across threads.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{DbMessage, MessageView, OccurrenceKind, WordCount};
use crate::schema::{addresses, body_occurrences, messages, participants, subject_occurrences, words};

/// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
/// Type alias for one checked-out pooled connection
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Database manager for handling connections and index operations
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection pool and run migrations.
    pub fn new(database_path: &str, max_connections: u32) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // WAL plus a busy timeout lets pooled writers serialize at the
        // storage layer instead of failing fast on lock contention.
        let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA foreign_keys = ON;",
            )
        });
        let pool = Pool::builder()
            .max_size(max_connections)
            .build(manager)
            .context("Failed to create database connection pool")?;

        // Run migrations
        let conn = pool.get().context("Failed to get migration connection")?;
        Self::run_migrations(&conn)?;

        Ok(Self { pool })
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!(
            "../migrations/2025-08-01-000000_create_tables/up.sql"
        ))
        .context("Failed to run initial migration")?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get().context("Failed to get database connection")?)
    }

    /// Insert a message row, or refresh its timestamp if the digest is
    /// already known. Returns the stable message id either way.
    pub fn upsert_message(&self, digest: &str) -> Result<i64> {
        let conn = self.get_connection()?;
        let id = conn.query_row(
            &format!(
                "INSERT INTO {table} ({digest_col}, {updated_col})
                 VALUES (?1, ?2)
                 ON CONFLICT ({digest_col})
                 DO UPDATE SET {updated_col} = excluded.{updated_col}
                 RETURNING {id_col}",
                table = messages::TABLE,
                digest_col = messages::DIGEST,
                updated_col = messages::LAST_UPDATED,
                id_col = messages::ID,
            ),
            params![digest, Utc::now()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Insert a normalized address if absent, returning its stable id.
    pub fn upsert_address(&self, address: &str) -> Result<i64> {
        let conn = self.get_connection()?;
        // The no-op DO UPDATE keeps RETURNING populated on conflict
        let id = conn.query_row(
            &format!(
                "INSERT INTO {table} ({addr_col})
                 VALUES (?1)
                 ON CONFLICT ({addr_col})
                 DO UPDATE SET {addr_col} = excluded.{addr_col}
                 RETURNING {id_col}",
                table = addresses::TABLE,
                addr_col = addresses::ADDRESS,
                id_col = addresses::ID,
            ),
            params![address],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Link an address to a message; a no-op when the pair already exists.
    pub fn link_participant(&self, message_id: i64, address_id: i64) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute(
            &format!(
                "INSERT INTO {table} ({msg_col}, {addr_col})
                 VALUES (?1, ?2)
                 ON CONFLICT ({msg_col}, {addr_col}) DO NOTHING",
                table = participants::TABLE,
                msg_col = participants::MESSAGE_ID,
                addr_col = participants::ADDRESS_ID,
            ),
            params![message_id, address_id],
        )?;
        Ok(())
    }

    /// Insert every token that is not yet in the vocabulary, then resolve
    /// ids for all of them (pre-existing included) in one read.
    pub fn upsert_words_batch(&self, tokens: &[String]) -> Result<HashMap<String, i64>> {
        if tokens.is_empty() {
            return Ok(HashMap::new());
        }

        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;

        {
            let mut insert = tx.prepare_cached(&format!(
                "INSERT INTO {table} ({token_col})
                 VALUES (?1)
                 ON CONFLICT ({token_col}) DO NOTHING",
                table = words::TABLE,
                token_col = words::TOKEN,
            ))?;
            for token in tokens {
                insert.execute(params![token])?;
            }
        }

        let mut ids = HashMap::with_capacity(tokens.len());
        {
            let placeholders = vec!["?"; tokens.len()].join(", ");
            let mut select = tx.prepare(&format!(
                "SELECT {id_col}, {token_col} FROM {table} WHERE {token_col} IN ({placeholders})",
                table = words::TABLE,
                id_col = words::ID,
                token_col = words::TOKEN,
            ))?;
            let rows = select.query_map(
                rusqlite::params_from_iter(tokens.iter()),
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )?;
            for row in rows {
                let (id, token) = row?;
                ids.insert(token, id);
            }
        }

        tx.commit()?;
        Ok(ids)
    }

    /// Accumulate occurrence counts for one message into one table.
    ///
    /// Each `(message_id, word_id, count)` tuple inserts a new row or adds
    /// `count` to the existing one. The whole batch commits in a single
    /// transaction: all rows become visible together or the batch can be
    /// retried as a unit.
    pub fn accumulate_occurrences(
        &self,
        kind: OccurrenceKind,
        rows: &[(i64, i64, i64)],
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(&format!(
                "INSERT INTO {table} (message_id, word_id, count)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (message_id, word_id)
                 DO UPDATE SET count = count + excluded.count",
                table = kind.table(),
            ))?;
            for (message_id, word_id, count) in rows {
                upsert.execute(params![message_id, word_id, count])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Get a message row by digest.
    pub fn get_message_by_digest(&self, digest: &str) -> Result<Option<DbMessage>> {
        let conn = self.get_connection()?;
        let message = conn
            .query_row(
                &format!(
                    "SELECT {id}, {digest_col}, {updated} FROM {table} WHERE {digest_col} = ?1",
                    table = messages::TABLE,
                    id = messages::ID,
                    digest_col = messages::DIGEST,
                    updated = messages::LAST_UPDATED,
                ),
                params![digest],
                |row| {
                    Ok(DbMessage {
                        id: row.get(0)?,
                        digest: row.get(1)?,
                        last_updated: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(message)
    }

    /// Fetch one message joined with its participants and token counts.
    ///
    /// Every joined set may be empty; only a missing message row yields
    /// `None`.
    pub fn fetch_message_view(&self, message_id: i64) -> Result<Option<MessageView>> {
        let conn = self.get_connection()?;

        let message = conn
            .query_row(
                &format!(
                    "SELECT {id}, {digest}, {updated} FROM {table} WHERE {id} = ?1",
                    table = messages::TABLE,
                    id = messages::ID,
                    digest = messages::DIGEST,
                    updated = messages::LAST_UPDATED,
                ),
                params![message_id],
                |row| {
                    Ok(DbMessage {
                        id: row.get(0)?,
                        digest: row.get(1)?,
                        last_updated: row.get(2)?,
                    })
                },
            )
            .optional()?;

        let Some(message) = message else {
            return Ok(None);
        };

        let mut view = MessageView {
            message,
            participants: Vec::new(),
            subject_words: Vec::new(),
            body_words: Vec::new(),
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT a.{addr} FROM {parts} p
             JOIN {addrs} a ON p.{addr_id} = a.{id}
             WHERE p.{msg_id} = ?1
             ORDER BY a.{addr}",
            parts = participants::TABLE,
            addrs = addresses::TABLE,
            addr = addresses::ADDRESS,
            addr_id = participants::ADDRESS_ID,
            id = addresses::ID,
            msg_id = participants::MESSAGE_ID,
        ))?;
        let rows = stmt.query_map(params![message_id], |row| row.get::<_, String>(0))?;
        for row in rows {
            view.participants.push(row?);
        }

        view.subject_words = self.word_counts(&conn, subject_occurrences::TABLE, message_id)?;
        view.body_words = self.word_counts(&conn, body_occurrences::TABLE, message_id)?;

        Ok(Some(view))
    }

    fn word_counts(
        &self,
        conn: &Connection,
        table: &str,
        message_id: i64,
    ) -> Result<Vec<WordCount>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT w.{token}, o.count FROM {table} o
             JOIN {words} w ON o.word_id = w.{id}
             WHERE o.message_id = ?1
             ORDER BY w.{token}",
            words = words::TABLE,
            token = words::TOKEN,
            id = words::ID,
        ))?;
        let rows = stmt.query_map(params![message_id], |row| {
            Ok(WordCount {
                token: row.get(0)?,
                count: row.get(1)?,
            })
        })?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row?);
        }
        Ok(counts)
    }

    /// Row counts across every index table.
    pub fn index_stats(&self) -> Result<IndexStats> {
        let conn = self.get_connection()?;
        let count = |table: &str| -> Result<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
            Ok(usize::try_from(n).unwrap_or(0))
        };

        Ok(IndexStats {
            messages: count(messages::TABLE)?,
            addresses: count(addresses::TABLE)?,
            words: count(words::TABLE)?,
            subject_occurrences: count(subject_occurrences::TABLE)?,
            body_occurrences: count(body_occurrences::TABLE)?,
        })
    }

    /// Drop and recreate every table. Destructive; intended for tests and
    /// explicit full re-imports.
    pub fn reset(&self) -> Result<()> {
        let conn = self.get_connection()?;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {so};
             DROP TABLE IF EXISTS {bo};
             DROP TABLE IF EXISTS {p};
             DROP TABLE IF EXISTS {w};
             DROP TABLE IF EXISTS {a};
             DROP TABLE IF EXISTS {m};",
            so = subject_occurrences::TABLE,
            bo = body_occurrences::TABLE,
            p = participants::TABLE,
            w = words::TABLE,
            a = addresses::TABLE,
            m = messages::TABLE,
        ))?;
        Self::run_migrations(&conn)?;
        Ok(())
    }
}

/// Row counts for each index table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    /// Stored message rows
    pub messages: usize,
    /// Distinct normalized addresses
    pub addresses: usize,
    /// Vocabulary size
    pub words: usize,
    /// Subject occurrence rows
    pub subject_occurrences: usize,
    /// Body occurrence rows
    pub body_occurrences: usize,
}

/// Initialize the database connection from the environment.
pub fn establish_connection() -> Result<Database> {
    let database_path =
        env::var("DATABASE_URL").unwrap_or_else(|_| "data/index.db".to_string());
    Database::new(&database_path, 10)
}
