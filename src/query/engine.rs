//! Query engine implementation
//!
//! Provides the read side of the store:
//! - Link uniqueness across memes and cache
//! - Random lookup by tag intersection
//! - Direct lookups by id
//! - Tag listings, cache listing and staleness scans
//!
//! Every read is a single statement, so a failure never leaves a half-read
//! result behind: lists are collected whole or not at all.

use rusqlite::{OptionalExtension, params_from_iter};
use crate::storage::MemeStore;
use crate::storage::sql::{distinct_tags, Param};
use crate::{Error, Result};
use super::records::{CachedMeme, MemeRecord, TagCount};

/// Query engine over an open store
pub struct QueryEngine<'a> {
    store: &'a MemeStore,
}

impl<'a> QueryEngine<'a> {
    /// Create a new query engine
    pub fn new(store: &'a MemeStore) -> Self {
        Self { store }
    }

    /// True when no meme in either table uses `link`.
    ///
    /// On a clash the last error names whoever submitted it first.
    pub fn unique_link(&self, link: &str) -> Result<bool> {
        let result = self.find_link_owner(link);
        match self.store.track(result)? {
            Some(submitter) => {
                self.store.record_failure(&Error::DuplicateLink {
                    link: link.to_string(),
                    submitter,
                });
                Ok(false)
            }
            None => Ok(true),
        }
    }

    /// A random approved meme carrying every one of `tags` (extra tags are
    /// fine). With no tags, any approved meme that has at least one tag.
    pub fn get<S: AsRef<str>>(&self, tags: &[S]) -> Result<Option<String>> {
        let result = self.random_link(tags);
        self.store.track(result)
    }

    /// Link of the approved meme with this id
    pub fn get_by_id(&self, id: i64) -> Result<Option<String>> {
        let sql = self.store.statements().meme_link();
        let result = self.link_by_id(&sql, id, "MemeDB");
        self.store.track(result)
    }

    /// Link of the cached meme with this id
    pub fn get_cache(&self, id: i64) -> Result<Option<String>> {
        let sql = self.store.statements().cache_link();
        let result = self.link_by_id(&sql, id, "Cache");
        self.store.track(result)
    }

    /// Every tag used by an approved meme with its count, alphabetically
    pub fn get_tags(&self) -> Result<Vec<TagCount>> {
        let result = self.tag_counts();
        self.store.track(result)
    }

    /// Tags of one meme (approved or cached), alphabetically
    pub fn get_tags_for(&self, id: i64) -> Result<Vec<String>> {
        let sql = self.store.statements().tags_for_id();
        let result = self.collect(&sql, &[Param::Int(id)], "Failed getting tags");
        self.store.track(result)
    }

    /// Ids of every cached meme
    pub fn get_all_cache_ids(&self) -> Result<Vec<i64>> {
        let sql = self.store.statements().cache_ids();
        let result = self.collect(&sql, &[], "Failed retrieving all ids from the cache");
        self.store.track(result)
    }

    /// Ids of approved memes with no timestamp or one before `cutoff`
    pub fn get_all_old_meme_ids(&self, cutoff: &str) -> Result<Vec<i64>> {
        let sql = self.store.statements().stale_meme_ids();
        let result = self.collect(
            &sql,
            &[Param::from(cutoff)],
            "Failed retrieving old ids from the MemeDB",
        );
        self.store.track(result)
    }

    /// Full row of an approved meme
    pub fn meme(&self, id: i64) -> Result<Option<MemeRecord>> {
        let result = self.find_meme(id);
        self.store.track(result)
    }

    /// Full row of a cached meme
    pub fn cached(&self, id: i64) -> Result<Option<CachedMeme>> {
        let result = self.find_cached(id);
        self.store.track(result)
    }

    // ========== Untracked reads shared with the mutator ==========

    pub(crate) fn find_link_owner(&self, link: &str) -> Result<Option<String>> {
        self.store
            .connection()
            .query_row(&self.store.statements().link_owner(), [link], |row| row.get(0))
            .optional()
            .map_err(failed(format!("Encountered an error validating uniqueness for {}", link)))
    }

    pub(crate) fn find_meme(&self, id: i64) -> Result<Option<MemeRecord>> {
        self.store
            .connection()
            .query_row(&self.store.statements().select_meme(), [id], MemeRecord::from_row)
            .optional()
            .map_err(failed(format!("Failed to find a meme with an ID of {}", id)))
    }

    pub(crate) fn find_cached(&self, id: i64) -> Result<Option<CachedMeme>> {
        self.store
            .connection()
            .query_row(&self.store.statements().select_cache(), [id], CachedMeme::from_row)
            .optional()
            .map_err(failed(format!("Failed to find a meme in the cache with an ID of {}", id)))
    }

    // ========== Helpers ==========

    fn random_link<S: AsRef<str>>(&self, tags: &[S]) -> Result<Option<String>> {
        let conn = self.store.connection();
        let statements = self.store.statements();
        let tags = distinct_tags(tags);

        if tags.is_empty() {
            return conn
                .query_row(&statements.random_tagged_link(), [], |row| row.get(0))
                .optional()
                .map_err(failed("Failed to extract a random meme"));
        }

        let mut params: Vec<Param> = tags.iter().map(|tag| Param::from(*tag)).collect();
        params.push(Param::Int(tags.len() as i64));

        conn.query_row(
            &statements.random_link_with_tags(tags.len()),
            params_from_iter(params.iter()),
            |row| row.get(0),
        )
        .optional()
        .map_err(failed(format!("Failed to extract a random meme with {} tags", tags.len())))
    }

    fn link_by_id(&self, sql: &str, id: i64, table: &str) -> Result<Option<String>> {
        self.store
            .connection()
            .query_row(sql, [id], |row| row.get(0))
            .optional()
            .map_err(failed(format!("Failed looking up ID {} in the {}", id, table)))
    }

    fn tag_counts(&self) -> Result<Vec<TagCount>> {
        let context = "Failed getting tags";
        let conn = self.store.connection();
        let mut stmt = conn
            .prepare(&self.store.statements().tag_counts())
            .map_err(failed(context))?;

        let counts = stmt
            .query_map([], |row| {
                Ok(TagCount {
                    tag: row.get(0)?,
                    count: row.get(1)?,
                })
            })
            .map_err(failed(context))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(failed(context))?;

        Ok(counts)
    }

    /// Run a single-column query and collect every row
    fn collect<T: rusqlite::types::FromSql>(
        &self,
        sql: &str,
        params: &[Param],
        context: &str,
    ) -> Result<Vec<T>> {
        let conn = self.store.connection();
        let mut stmt = conn.prepare(sql).map_err(failed(context))?;

        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| row.get(0))
            .map_err(failed(context))?
            .collect::<rusqlite::Result<Vec<T>>>()
            .map_err(failed(context))?;

        Ok(rows)
    }
}

fn failed(context: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Error {
    let context = context.into();
    move |source| Error::Query { context, source }
}
