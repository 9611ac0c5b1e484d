//! Database schema definitions
//!
//! Each template carries the `{table}` token in place of its table name and
//! may hold more than one statement.

/// Default template for the canonical meme table
pub const CREATE_MEMES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY,
    link TEXT NOT NULL UNIQUE,
    submitter TEXT NOT NULL,
    curator TEXT NOT NULL,
    timestamp TEXT
)
"#;

/// Default template for the pending-review cache
pub const CREATE_CACHE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY,
    link TEXT NOT NULL UNIQUE,
    submitter TEXT NOT NULL
)
"#;

/// Default template for the tag lookup table
pub const CREATE_TAGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER NOT NULL,
    tag TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_{table}_id ON {table}(id);
CREATE INDEX IF NOT EXISTS idx_{table}_tag ON {table}(tag)
"#;
