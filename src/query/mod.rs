pub mod engine;
pub mod records;

pub use engine::QueryEngine;
pub use records::{MemeRecord, CachedMeme, TagCount};
