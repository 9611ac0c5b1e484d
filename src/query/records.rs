//! Rows returned by reads

use serde::Serialize;

/// An approved meme
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemeRecord {
    pub id: i64,
    pub link: String,
    pub submitter: String,
    pub curator: String,
    pub timestamp: Option<String>,
}

impl MemeRecord {
    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            link: row.get(1)?,
            submitter: row.get(2)?,
            curator: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }
}

/// A meme waiting for review
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedMeme {
    pub id: i64,
    pub link: String,
    pub submitter: String,
}

impl CachedMeme {
    pub(crate) fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            link: row.get(1)?,
            submitter: row.get(2)?,
        })
    }
}

/// A tag and how many approved memes carry it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: i64,
}

impl std::fmt::Display for TagCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.tag, self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_count_display() {
        let tc = TagCount { tag: "books".into(), count: 3 };
        assert_eq!(tc.to_string(), "books (3)");
    }
}
