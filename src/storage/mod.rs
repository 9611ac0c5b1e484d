//! Storage Layer - SQLite-backed persistence
//!
//! Three tables, named by configuration:
//! - memes(id, link, submitter, curator, timestamp)
//! - cache(id, link, submitter)
//! - tags(id, tag)

pub mod schema;
pub mod sql;
pub mod sqlite;
mod mutations;

pub use sqlite::{MemeStore, StoreStats};
pub use sql::Param;
