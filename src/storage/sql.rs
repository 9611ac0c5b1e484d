//! Typed parameters and statement text
//!
//! Table names come from validated configuration and columns from the
//! constants below. Values are never spliced into SQL text; they are bound
//! positionally through [`Param`].

use std::collections::HashSet;
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, ValueRef};
use crate::config::TableNames;

/// Column names shared by the three tables
pub mod col {
    pub const ID: &str = "id";
    pub const LINK: &str = "link";
    pub const SUBMITTER: &str = "submitter";
    pub const CURATOR: &str = "curator";
    pub const TIMESTAMP: &str = "timestamp";
    pub const TAG: &str = "tag";
}

/// A positional statement parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Int(i64),
    Text(String),
}

impl ToSql for Param {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Param::Int(value) => ToSqlOutput::Borrowed(ValueRef::Integer(*value)),
            Param::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
        })
    }
}

impl From<i64> for Param {
    fn from(value: i64) -> Self {
        Param::Int(value)
    }
}

impl From<&str> for Param {
    fn from(value: &str) -> Self {
        Param::Text(value.to_string())
    }
}

impl From<String> for Param {
    fn from(value: String) -> Self {
        Param::Text(value)
    }
}

/// Numbered placeholders `?first, ?first+1, ...` for a variable-arity `IN` list
pub fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|n| format!("?{}", n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Tags in first-seen order, without repeats
pub fn distinct_tags<S: AsRef<str>>(tags: &[S]) -> Vec<&str> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|tag| tag.as_ref())
        .filter(|tag| seen.insert(*tag))
        .collect()
}

/// Statement text resolved once against the configured table names
#[derive(Debug, Clone)]
pub struct Statements {
    memes: String,
    cache: String,
    tags: String,
}

impl Statements {
    pub fn new(tables: &TableNames) -> Self {
        Self {
            memes: tables.memes.clone(),
            cache: tables.cache.clone(),
            tags: tables.tags.clone(),
        }
    }

    pub fn max_meme_id(&self) -> String {
        format!("SELECT COALESCE(MAX({id}), 0) FROM {t}", id = col::ID, t = self.memes)
    }

    pub fn max_cache_id(&self) -> String {
        format!("SELECT COALESCE(MAX({id}), 0) FROM {t}", id = col::ID, t = self.cache)
    }

    pub fn count_memes(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", self.memes)
    }

    pub fn count_cache(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", self.cache)
    }

    pub fn count_tags(&self) -> String {
        format!("SELECT COUNT(*) FROM {}", self.tags)
    }

    // ========== Mutations ==========

    pub fn insert_meme(&self) -> String {
        format!(
            "INSERT INTO {t} ({id}, {link}, {sub}, {cur}, {ts}) VALUES (?1, ?2, ?3, ?4, ?5)",
            t = self.memes,
            id = col::ID,
            link = col::LINK,
            sub = col::SUBMITTER,
            cur = col::CURATOR,
            ts = col::TIMESTAMP,
        )
    }

    pub fn insert_cache(&self) -> String {
        format!(
            "INSERT INTO {t} ({id}, {link}, {sub}) VALUES (?1, ?2, ?3)",
            t = self.cache,
            id = col::ID,
            link = col::LINK,
            sub = col::SUBMITTER,
        )
    }

    pub fn insert_tag(&self) -> String {
        format!(
            "INSERT INTO {t} ({id}, {tag}) VALUES (?1, ?2)",
            t = self.tags,
            id = col::ID,
            tag = col::TAG,
        )
    }

    pub fn delete_meme(&self) -> String {
        format!("DELETE FROM {} WHERE {} = ?1", self.memes, col::ID)
    }

    pub fn delete_cache(&self) -> String {
        format!("DELETE FROM {} WHERE {} = ?1", self.cache, col::ID)
    }

    pub fn delete_tags(&self) -> String {
        format!("DELETE FROM {} WHERE {} = ?1", self.tags, col::ID)
    }

    // ========== Reads ==========

    pub fn select_meme(&self) -> String {
        format!(
            "SELECT {id}, {link}, {sub}, {cur}, {ts} FROM {t} WHERE {id} = ?1",
            t = self.memes,
            id = col::ID,
            link = col::LINK,
            sub = col::SUBMITTER,
            cur = col::CURATOR,
            ts = col::TIMESTAMP,
        )
    }

    pub fn select_cache(&self) -> String {
        format!(
            "SELECT {id}, {link}, {sub} FROM {t} WHERE {id} = ?1",
            t = self.cache,
            id = col::ID,
            link = col::LINK,
            sub = col::SUBMITTER,
        )
    }

    /// Submitter of the row holding `?1` as its link in either record table
    pub fn link_owner(&self) -> String {
        format!(
            "SELECT {sub} FROM (\
                SELECT {link}, {sub} FROM {cache} \
                UNION ALL \
                SELECT {link}, {sub} FROM {memes}\
             ) WHERE {link} = ?1 LIMIT 1",
            sub = col::SUBMITTER,
            link = col::LINK,
            cache = self.cache,
            memes = self.memes,
        )
    }

    /// One random canonical link carrying all of `tag_count` distinct tags.
    ///
    /// Binds the tags as `?1..?n` and the tag count as `?n+1`.
    pub fn random_link_with_tags(&self, tag_count: usize) -> String {
        format!(
            "SELECT m.{link} FROM {memes} m \
             INNER JOIN (\
                SELECT {id} FROM {tags} WHERE {tag} IN ({list}) \
                GROUP BY {id} HAVING COUNT(DISTINCT {tag}) = ?{count}\
             ) n ON m.{id} = n.{id} \
             ORDER BY RANDOM() LIMIT 1",
            link = col::LINK,
            id = col::ID,
            tag = col::TAG,
            memes = self.memes,
            tags = self.tags,
            list = placeholders(1, tag_count),
            count = tag_count + 1,
        )
    }

    /// One random canonical link among records with at least one tag
    pub fn random_tagged_link(&self) -> String {
        format!(
            "SELECT {link} FROM {memes} WHERE {id} IN (SELECT {id} FROM {tags}) \
             ORDER BY RANDOM() LIMIT 1",
            link = col::LINK,
            id = col::ID,
            memes = self.memes,
            tags = self.tags,
        )
    }

    pub fn meme_link(&self) -> String {
        format!("SELECT {} FROM {} WHERE {} = ?1", col::LINK, self.memes, col::ID)
    }

    pub fn cache_link(&self) -> String {
        format!("SELECT {} FROM {} WHERE {} = ?1", col::LINK, self.cache, col::ID)
    }

    /// Tags attached to canonical records, with occurrence counts
    pub fn tag_counts(&self) -> String {
        format!(
            "SELECT t.{tag}, COUNT(*) FROM {tags} t \
             INNER JOIN {memes} m ON m.{id} = t.{id} \
             GROUP BY t.{tag} ORDER BY t.{tag} ASC",
            tag = col::TAG,
            id = col::ID,
            tags = self.tags,
            memes = self.memes,
        )
    }

    pub fn tags_for_id(&self) -> String {
        format!(
            "SELECT {tag} FROM {t} WHERE {id} = ?1 ORDER BY {tag} ASC",
            tag = col::TAG,
            id = col::ID,
            t = self.tags,
        )
    }

    pub fn cache_ids(&self) -> String {
        format!("SELECT {id} FROM {t} ORDER BY {id}", id = col::ID, t = self.cache)
    }

    pub fn stale_meme_ids(&self) -> String {
        format!(
            "SELECT {id} FROM {t} WHERE {ts} IS NULL OR {ts} < ?1 ORDER BY {id}",
            id = col::ID,
            ts = col::TIMESTAMP,
            t = self.memes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1, 0), "");
        assert_eq!(placeholders(1, 1), "?1");
        assert_eq!(placeholders(2, 3), "?2, ?3, ?4");
    }

    #[test]
    fn test_distinct_tags() {
        assert_eq!(distinct_tags(&["b", "a", "b", "c", "a"]), vec!["b", "a", "c"]);
        assert!(distinct_tags::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_tag_query_binds_count_after_tags() {
        let stmts = Statements::new(&TableNames::default());
        let sql = stmts.random_link_with_tags(3);
        assert!(sql.contains("IN (?1, ?2, ?3)"));
        assert!(sql.contains("COUNT(DISTINCT tag) = ?4"));
        assert!(sql.contains("FROM memes m"));
        assert!(sql.contains("FROM tag_lookup"));
    }

    #[test]
    fn test_param_binding() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let params = [Param::from(7i64), Param::from("seven")];
        let (n, s): (i64, String) = conn
            .query_row("SELECT ?1, ?2", rusqlite::params_from_iter(params.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(n, 7);
        assert_eq!(s, "seven");
    }
}
