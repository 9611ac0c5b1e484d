//! SQLite connection manager
//!
//! Owns the single connection, bootstraps the schema, tracks the head id and
//! runs every mutation as one unit of work.

use std::cell::RefCell;
use rusqlite::{Connection, Transaction};
use crate::config::MemebaseConfig;
use crate::query::QueryEngine;
use crate::{Error, Result};
use super::sql::Statements;

const IN_MEMORY: &str = ":memory:";

/// SQLite-backed meme store.
///
/// Assumes it is the only writer for as long as it is open: ids are handed
/// out from an in-memory counter seeded from the stored maxima at open time,
/// so two stores opened on the same file can allocate colliding ids.
pub struct MemeStore {
    conn: Connection,
    location: String,
    statements: Statements,
    head_id: i64,
    last_error: RefCell<String>,
}

impl MemeStore {
    /// Open the configured database file (creates it if missing)
    pub fn open(config: &MemebaseConfig) -> Result<Self> {
        config.tables.validate().map_err(logged)?;
        let conn = Connection::open(&config.database).map_err(|source| {
            logged(Error::Connection {
                location: config.database.clone(),
                source,
            })
        })?;
        Self::bootstrap(conn, config.database.clone(), config)
    }

    /// Open a private in-memory database with the configured layout (for testing)
    pub fn open_in_memory(config: &MemebaseConfig) -> Result<Self> {
        config.tables.validate().map_err(logged)?;
        let conn = Connection::open_in_memory().map_err(|source| {
            logged(Error::Connection {
                location: IN_MEMORY.to_string(),
                source,
            })
        })?;
        Self::bootstrap(conn, IN_MEMORY.to_string(), config)
    }

    /// Create missing tables, then seed the head id from both record tables
    fn bootstrap(mut conn: Connection, location: String, config: &MemebaseConfig) -> Result<Self> {
        let schema_err = |source: rusqlite::Error| {
            logged(Error::Schema {
                context: "Failed to initialize the DB".to_string(),
                source,
            })
        };

        let tx = conn.transaction().map_err(schema_err)?;
        for stmt in config.schema.render(&config.tables) {
            tx.execute_batch(&stmt).map_err(schema_err)?;
        }
        tx.commit().map_err(schema_err)?;

        let statements = Statements::new(&config.tables);
        let meme_max: i64 = conn
            .query_row(&statements.max_meme_id(), [], |row| row.get(0))
            .map_err(|source| {
                logged(Error::Schema {
                    context: "Failed to get the MAX id from the MemeDB".to_string(),
                    source,
                })
            })?;
        let cache_max: i64 = conn
            .query_row(&statements.max_cache_id(), [], |row| row.get(0))
            .map_err(|source| {
                logged(Error::Schema {
                    context: "Failed to get the MAX id from the Cache".to_string(),
                    source,
                })
            })?;

        let head_id = meme_max.max(cache_max);
        tracing::info!("Opened meme DB at {}", location);
        tracing::debug!("Head id {} (memes {}, cache {})", head_id, meme_max, cache_max);

        Ok(Self {
            conn,
            location,
            statements,
            head_id,
            last_error: RefCell::new(String::new()),
        })
    }

    /// Release the connection
    pub fn close(self) -> Result<()> {
        let location = self.location;
        self.conn
            .close()
            .map_err(|(_, source)| logged(Error::Close(source)))?;
        tracing::info!("Closed meme DB at {}", location);
        Ok(())
    }

    /// Where this store was opened from
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Highest id allocated so far
    pub fn head_id(&self) -> i64 {
        self.head_id
    }

    /// Message of the most recent failure; empty after a successful call
    pub fn last_error(&self) -> String {
        self.last_error.borrow().clone()
    }

    /// Read-side view over this store
    pub fn query(&self) -> QueryEngine<'_> {
        QueryEngine::new(self)
    }

    /// Row counts of the three tables
    pub fn stats(&self) -> Result<StoreStats> {
        let result = self.count_rows();
        self.track(result)
    }

    fn count_rows(&self) -> Result<StoreStats> {
        let count = |sql: String| -> Result<usize> {
            let n: i64 = self
                .conn
                .query_row(&sql, [], |row| row.get(0))
                .map_err(|source| Error::Query {
                    context: "Failed counting rows".to_string(),
                    source,
                })?;
            Ok(n as usize)
        };
        Ok(StoreStats {
            memes: count(self.statements.count_memes())?,
            cached: count(self.statements.count_cache())?,
            tags: count(self.statements.count_tags())?,
        })
    }

    // ========== Crate-internal plumbing ==========

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn statements(&self) -> &Statements {
        &self.statements
    }

    /// Allocate a fresh id. Never consults storage.
    pub(crate) fn next_id(&mut self) -> i64 {
        self.head_id += 1;
        self.head_id
    }

    /// Log a failure and make it the last error
    pub(crate) fn record_failure(&self, err: &Error) {
        let message = err.to_string();
        tracing::error!("{}", message);
        *self.last_error.borrow_mut() = message;
    }

    /// Record the outcome of a public operation
    pub(crate) fn track<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.last_error.borrow_mut().clear(),
            Err(err) => self.record_failure(err),
        }
        result
    }

    /// Run `steps` inside one transaction: commit if they all succeed,
    /// otherwise roll back and report the failure as [`Error::RolledBack`].
    pub(crate) fn unit_of_work<T>(
        &mut self,
        steps: impl FnOnce(&Transaction<'_>, &Statements) -> Result<T>,
    ) -> Result<T> {
        let tx = self.conn.transaction().map_err(|source| Error::Mutation {
            context: "Failed to begin a transaction".to_string(),
            source,
        })?;

        match steps(&tx, &self.statements) {
            Ok(value) => {
                // a failed COMMIT leaves the transaction open; dropping it rolls back
                tx.commit().map_err(|source| {
                    Error::RolledBack(Box::new(Error::Mutation {
                        context: "Failed to commit".to_string(),
                        source,
                    }))
                })?;
                Ok(value)
            }
            Err(err) => {
                tracing::error!("Performing DB rollback...");
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!("Rollback failed: {}", rollback_err);
                }
                Err(Error::RolledBack(Box::new(err)))
            }
        }
    }
}

fn logged(err: Error) -> Error {
    tracing::error!("{}", err);
    err
}

/// Database statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StoreStats {
    pub memes: usize,
    pub cached: usize,
    pub tags: usize,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Memes: {}", self.memes)?;
        writeln!(f, "  Cached: {}", self.cached)?;
        writeln!(f, "  Tags: {}", self.tags)
    }
}
