//! # Memebase - curated meme links behind a review cache
//!
//! Transactional SQLite persistence for a bot that collects meme links.
//!
//! Memebase provides:
//! - A canonical table of approved memes with submitter, curator and timestamp
//! - A pending-review cache sharing the same id space
//! - Free-form tags with random lookup by tag intersection
//! - All-or-nothing store/cache/promote/demote/reject mutations
//! - Staleness scans for retiring old entries

pub mod config;
pub mod storage;
pub mod query;

// Re-exports for convenient access
pub use config::MemebaseConfig;
pub use storage::{MemeStore, StoreStats};
pub use query::{QueryEngine, MemeRecord, CachedMeme, TagCount};

/// Result type alias for Memebase operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Memebase operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to open the DB at {location}: {source}")]
    Connection {
        location: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Failed to close the DB: {0}")]
    Close(#[source] rusqlite::Error),

    #[error("{context}: {source}")]
    Schema {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("This meme was already submitted by {submitter}")]
    DuplicateLink { link: String, submitter: String },

    #[error("{context}: {source}")]
    Mutation {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{context}: {source}")]
    Query {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("No meme exists in the {table} with ID {id}")]
    NotFound { table: &'static str, id: i64 },

    #[error("Invalid table name: {0:?}")]
    InvalidTableName(String),

    #[error("[ ROLLBACK ] {0}")]
    RolledBack(Box<Error>),
}

impl Error {
    /// The error underneath any rollback marker
    pub fn root(&self) -> &Error {
        match self {
            Error::RolledBack(inner) => inner.root(),
            other => other,
        }
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self, Error::RolledBack(_))
    }
}
