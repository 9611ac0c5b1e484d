//! Record/tag mutations
//!
//! Every operation here is all-or-nothing: the steps run in one transaction
//! and any failing step rolls the whole operation back.

use rusqlite::Transaction;
use crate::query::CachedMeme;
use crate::{Error, Result};
use super::sql::{distinct_tags, Param, Statements};
use super::sqlite::MemeStore;

#[derive(Debug, Clone, Copy)]
enum Target {
    Memes,
    Cache,
}

impl MemeStore {
    /// Insert an approved meme directly. The submitter is also its curator.
    pub fn store<S: AsRef<str>>(&mut self, submitter: &str, link: &str, tags: &[S]) -> Result<i64> {
        let result = self.insert_new(Target::Memes, submitter, link, tags);
        self.track(result)
    }

    /// Insert a meme into the review cache
    pub fn cache<S: AsRef<str>>(&mut self, submitter: &str, link: &str, tags: &[S]) -> Result<i64> {
        let result = self.insert_new(Target::Cache, submitter, link, tags);
        self.track(result)
    }

    /// Move a cached meme into the meme table, replacing its tags with `tags`.
    /// Returns the submitter.
    pub fn promote<S: AsRef<str>>(&mut self, id: i64, curator: &str, tags: &[S]) -> Result<String> {
        let result = self.promote_cached(id, curator, tags);
        self.track(result)
    }

    /// Move a meme back into the review cache. Its tags stay in place.
    /// Returns the submitter.
    pub fn demote(&mut self, id: i64) -> Result<String> {
        let result = self.demote_meme(id);
        self.track(result)
    }

    /// Delete a cached meme and its tags. Returns the submitter.
    pub fn reject(&mut self, id: i64) -> Result<String> {
        let result = self.reject_cached(id);
        self.track(result)
    }

    fn insert_new<S: AsRef<str>>(
        &mut self,
        target: Target,
        submitter: &str,
        link: &str,
        tags: &[S],
    ) -> Result<i64> {
        if let Some(previous) = self.query().find_link_owner(link)? {
            return Err(Error::DuplicateLink {
                link: link.to_string(),
                submitter: previous,
            });
        }

        let id = self.next_id();
        let tags = distinct_tags(tags);
        self.unit_of_work(|tx, sql| {
            match target {
                Target::Memes => execute(
                    tx,
                    &sql.insert_meme(),
                    &[id.into(), link.into(), submitter.into(), submitter.into(), now().into()],
                    || format!("Failed to insert meme into the DB: ({}, {}, {})", id, link, submitter),
                )?,
                Target::Cache => execute(
                    tx,
                    &sql.insert_cache(),
                    &[id.into(), link.into(), submitter.into()],
                    || format!("Failed to insert meme into the cache: ({}, {}, {})", id, link, submitter),
                )?,
            }
            insert_tags(tx, sql, id, &tags)?;
            tracing::debug!("Inserted meme {} ({:?}) with {} tags", id, target, tags.len());
            Ok(id)
        })
    }

    fn promote_cached<S: AsRef<str>>(&mut self, id: i64, curator: &str, tags: &[S]) -> Result<String> {
        let CachedMeme { link, submitter, .. } = self
            .query()
            .find_cached(id)?
            .ok_or(Error::NotFound { table: "cache", id })?;

        let tags = distinct_tags(tags);
        self.unit_of_work(|tx, sql| {
            execute(
                tx,
                &sql.insert_meme(),
                &[id.into(), link.as_str().into(), submitter.as_str().into(), curator.into(), now().into()],
                || format!("Failed to promote meme to MemeDB: ({}, {}, {}, {})", id, link, submitter, curator),
            )?;
            execute(tx, &sql.delete_cache(), &[id.into()], || {
                format!("Failed to remove meme from cache: ({}, {}, {})", id, link, submitter)
            })?;
            execute(tx, &sql.delete_tags(), &[id.into()], || {
                format!("Failed to remove old tags from the tag lookup: ({}, {}, {})", id, link, submitter)
            })?;
            insert_tags(tx, sql, id, &tags)?;
            tracing::debug!("Promoted meme {} (curator {})", id, curator);
            Ok(submitter)
        })
    }

    // Tag rows are left alone here, unlike promote and reject. A demoted meme
    // keeps its tags while cached; tag queries only count canonical memes.
    fn demote_meme(&mut self, id: i64) -> Result<String> {
        let meme = self
            .query()
            .find_meme(id)?
            .ok_or(Error::NotFound { table: "MemeDB", id })?;

        self.unit_of_work(|tx, sql| {
            execute(
                tx,
                &sql.insert_cache(),
                &[id.into(), meme.link.as_str().into(), meme.submitter.as_str().into()],
                || {
                    format!(
                        "Failed to demote meme to cache: ({}, {}, {}, {})",
                        id, meme.link, meme.submitter, meme.curator
                    )
                },
            )?;
            execute(tx, &sql.delete_meme(), &[id.into()], || {
                format!(
                    "Failed to remove meme from MemeDB: ({}, {}, {}, {})",
                    id, meme.link, meme.submitter, meme.curator
                )
            })?;
            tracing::debug!("Demoted meme {}", id);
            Ok(meme.submitter)
        })
    }

    fn reject_cached(&mut self, id: i64) -> Result<String> {
        let CachedMeme { link, submitter, .. } = self
            .query()
            .find_cached(id)?
            .ok_or(Error::NotFound { table: "cache", id })?;

        self.unit_of_work(|tx, sql| {
            execute(tx, &sql.delete_cache(), &[id.into()], || {
                format!("Failed to remove meme from cache: ({}, {})", id, link)
            })?;
            execute(tx, &sql.delete_tags(), &[id.into()], || {
                format!("Failed to remove meme from tag lookup: ({}, {})", id, link)
            })?;
            tracing::debug!("Rejected meme {}", id);
            Ok(submitter)
        })
    }
}

fn execute(
    tx: &Transaction<'_>,
    sql: &str,
    params: &[Param],
    context: impl FnOnce() -> String,
) -> Result<()> {
    tx.execute(sql, rusqlite::params_from_iter(params.iter()))
        .map(|_| ())
        .map_err(|source| Error::Mutation {
            context: context(),
            source,
        })
}

fn insert_tags(tx: &Transaction<'_>, sql: &Statements, id: i64, tags: &[&str]) -> Result<()> {
    let stmt = sql.insert_tag();
    for tag in tags {
        execute(tx, &stmt, &[id.into(), (*tag).into()], || {
            format!("Encountered an error inserting tag {} into DB", tag)
        })?;
    }
    Ok(())
}

/// Creation/promotion time; sorts lexicographically in time order
fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemebaseConfig;
    use crate::storage::StoreStats;

    fn open() -> MemeStore {
        MemeStore::open_in_memory(&MemebaseConfig::default()).unwrap()
    }

    /// Store whose schema refuses empty tags, a curator named "mallory"
    /// and cached memes from "banned", for failure injection
    fn open_guarded() -> MemeStore {
        let mut config = MemebaseConfig::default();
        config.schema.memes = "CREATE TABLE IF NOT EXISTS {table} (\
            id INTEGER PRIMARY KEY, link TEXT NOT NULL UNIQUE, submitter TEXT NOT NULL, \
            curator TEXT NOT NULL CHECK (curator <> 'mallory'), timestamp TEXT)"
            .to_string();
        config.schema.cache = "CREATE TABLE IF NOT EXISTS {table} (\
            id INTEGER PRIMARY KEY, link TEXT NOT NULL UNIQUE, \
            submitter TEXT NOT NULL CHECK (submitter <> 'banned'))"
            .to_string();
        config.schema.tags = "CREATE TABLE IF NOT EXISTS {table} (\
            id INTEGER NOT NULL, tag TEXT NOT NULL CHECK (length(tag) > 0))"
            .to_string();
        MemeStore::open_in_memory(&config).unwrap()
    }

    /// Store whose triggers refuse deleting memes from "pinned" and
    /// tag rows reading "locked"
    fn open_delete_locked() -> MemeStore {
        let mut config = MemebaseConfig::default();
        config.schema.memes = format!(
            "{}; CREATE TRIGGER IF NOT EXISTS no_del_{{table}} BEFORE DELETE ON {{table}} \
             WHEN old.submitter = 'pinned' BEGIN SELECT RAISE(ABORT, 'pinned'); END",
            crate::storage::schema::CREATE_MEMES_TABLE
        );
        config.schema.tags = "CREATE TABLE IF NOT EXISTS {table} (id INTEGER NOT NULL, tag TEXT NOT NULL); \
            CREATE TRIGGER IF NOT EXISTS no_del_{table} BEFORE DELETE ON {table} \
            WHEN old.tag = 'locked' BEGIN SELECT RAISE(ABORT, 'locked'); END"
            .to_string();
        MemeStore::open_in_memory(&config).unwrap()
    }

    #[test]
    fn test_store_assigns_sequential_ids() {
        let mut store = open();
        assert_eq!(store.store("Ziggy", "http://x/1", &["meta", "books"]).unwrap(), 1);
        assert_eq!(store.cache("Ziggy", "http://x/2", &["server"]).unwrap(), 2);
        assert_eq!(store.store("Ziggy", "http://x/3", &["dog"]).unwrap(), 3);
        assert_eq!(store.stats().unwrap(), StoreStats { memes: 2, cached: 1, tags: 4 });
    }

    #[test]
    fn test_store_sets_curator_and_timestamp() {
        let mut store = open();
        let id = store.store("Ziggy", "http://x/1", &["meta"]).unwrap();
        let meme = store.query().meme(id).unwrap().unwrap();
        assert_eq!(meme.submitter, "Ziggy");
        assert_eq!(meme.curator, "Ziggy");
        assert!(meme.timestamp.is_some());
    }

    #[test]
    fn test_duplicate_link_rejected_across_tables() {
        let mut store = open();
        store.store("Ziggy", "http://x/1", &["meta"]).unwrap();
        store.cache("Daniel", "http://x/2", &["yeet"]).unwrap();

        let err = store.cache("Other", "http://x/1", &["meta"]).unwrap_err();
        assert!(matches!(err, Error::DuplicateLink { ref submitter, .. } if submitter == "Ziggy"));
        assert_eq!(store.last_error(), "This meme was already submitted by Ziggy");

        let err = store.store("Other", "http://x/2", &["meta"]).unwrap_err();
        assert!(matches!(err, Error::DuplicateLink { ref submitter, .. } if submitter == "Daniel"));

        // no id was burned and nothing changed
        assert_eq!(store.head_id(), 2);
        assert_eq!(store.query().get_by_id(1).unwrap().as_deref(), Some("http://x/1"));
        assert_eq!(store.query().get_tags_for(1).unwrap(), vec!["meta"]);
        assert_eq!(store.stats().unwrap(), StoreStats { memes: 1, cached: 1, tags: 2 });
    }

    #[test]
    fn test_success_clears_last_error() {
        let mut store = open();
        store.store("Ziggy", "http://x/1", &["meta"]).unwrap();
        assert!(store.store("Ziggy", "http://x/1", &["meta"]).is_err());
        assert!(!store.last_error().is_empty());
        store.store("Ziggy", "http://x/2", &["meta"]).unwrap();
        assert_eq!(store.last_error(), "");
    }

    #[test]
    fn test_repeated_tags_stored_once() {
        let mut store = open();
        let id = store.store("Ziggy", "http://x/1", &["a", "b", "a"]).unwrap();
        assert_eq!(store.query().get_tags_for(id).unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_failed_tag_insert_rolls_back_store() {
        let mut store = open_guarded();
        let err = store.store("Ziggy", "http://x/1", &["fine", ""]).unwrap_err();
        assert!(err.is_rolled_back());
        assert!(matches!(err.root(), Error::Mutation { .. }));
        assert!(store.last_error().starts_with("[ ROLLBACK ] Encountered an error inserting tag"));
        assert_eq!(store.stats().unwrap(), StoreStats { memes: 0, cached: 0, tags: 0 });

        // the link is still free and the burned id is never reused
        assert_eq!(store.store("Ziggy", "http://x/1", &["fine"]).unwrap(), 2);
    }

    #[test]
    fn test_failed_tag_insert_rolls_back_cache() {
        let mut store = open_guarded();
        assert!(store.cache("Ziggy", "http://x/1", &["", "fine"]).is_err());
        assert_eq!(store.stats().unwrap(), StoreStats { memes: 0, cached: 0, tags: 0 });
        assert!(store.query().unique_link("http://x/1").unwrap());
    }

    #[test]
    fn test_promote_moves_and_replaces_tags() {
        let mut store = open();
        let id = store.cache("Daniel", "http://x/1", &["daniel", "ugly", "yeet"]).unwrap();

        let submitter = store.promote(id, "Ziggy", &["daniel", "yeet"]).unwrap();
        assert_eq!(submitter, "Daniel");

        let meme = store.query().meme(id).unwrap().unwrap();
        assert_eq!(meme.curator, "Ziggy");
        assert_eq!(meme.submitter, "Daniel");
        assert_eq!(meme.link, "http://x/1");
        assert!(store.query().get_cache(id).unwrap().is_none());
        assert_eq!(store.query().get_tags_for(id).unwrap(), vec!["daniel", "yeet"]);
    }

    #[test]
    fn test_promote_cleans_orphaned_tags() {
        let mut store = open();
        let id = store.store("Ziggy", "http://x/1", &["old"]).unwrap();
        store.demote(id).unwrap();
        store.promote(id, "Ziggy", &["new"]).unwrap();
        assert_eq!(store.query().get_tags_for(id).unwrap(), vec!["new"]);
    }

    #[test]
    fn test_promote_failure_leaves_cache_untouched() {
        let mut store = open_guarded();
        let id = store.cache("Daniel", "http://x/1", &["yeet"]).unwrap();

        let err = store.promote(id, "mallory", &["other"]).unwrap_err();
        assert!(err.is_rolled_back());
        assert_eq!(store.query().get_cache(id).unwrap().as_deref(), Some("http://x/1"));
        assert!(store.query().get_by_id(id).unwrap().is_none());
        assert_eq!(store.query().get_tags_for(id).unwrap(), vec!["yeet"]);

        // a bad replacement tag fails after the delete steps, still all-or-nothing
        assert!(store.promote(id, "Ziggy", &["ok", ""]).is_err());
        assert_eq!(store.query().get_tags_for(id).unwrap(), vec!["yeet"]);
        assert_eq!(store.stats().unwrap(), StoreStats { memes: 0, cached: 1, tags: 1 });
    }

    #[test]
    fn test_promote_unknown_id() {
        let mut store = open();
        let err = store.promote(42, "Ziggy", &["x"]).unwrap_err();
        assert!(matches!(err, Error::NotFound { id: 42, .. }));
        assert!(!err.is_rolled_back());
        assert_eq!(store.last_error(), "No meme exists in the cache with ID 42");
    }

    #[test]
    fn test_demote_keeps_tags() {
        let mut store = open();
        let id = store.store("Ziggy", "http://x/1", &["meta", "books"]).unwrap();

        assert_eq!(store.demote(id).unwrap(), "Ziggy");
        assert!(store.query().get_by_id(id).unwrap().is_none());
        assert_eq!(store.query().get_cache(id).unwrap().as_deref(), Some("http://x/1"));
        assert_eq!(store.query().get_tags_for(id).unwrap(), vec!["books", "meta"]);
        // but they no longer count as canonical tags
        assert!(store.query().get_tags().unwrap().is_empty());
    }

    #[test]
    fn test_demote_failure_rolls_back() {
        let mut store = open_guarded();
        let id = store.store("banned", "http://x/1", &["meta"]).unwrap();
        assert!(store.demote(id).unwrap_err().is_rolled_back());
        assert_eq!(store.query().get_by_id(id).unwrap().as_deref(), Some("http://x/1"));
        assert!(store.query().get_cache(id).unwrap().is_none());
    }

    #[test]
    fn test_demote_failed_delete_rolls_back_cache_insert() {
        let mut store = open_delete_locked();
        let id = store.store("pinned", "http://x/1", &["meta"]).unwrap();

        let err = store.demote(id).unwrap_err();
        assert!(err.is_rolled_back());
        assert!(store.last_error().starts_with("[ ROLLBACK ] Failed to remove meme from MemeDB"));
        assert_eq!(store.query().get_by_id(id).unwrap().as_deref(), Some("http://x/1"));
        assert!(store.query().get_cache(id).unwrap().is_none());
        assert_eq!(store.stats().unwrap(), StoreStats { memes: 1, cached: 0, tags: 1 });
    }

    #[test]
    fn test_demote_unknown_id() {
        let mut store = open();
        assert!(matches!(store.demote(7), Err(Error::NotFound { id: 7, .. })));
    }

    #[test]
    fn test_reject_deletes_cache_row_and_tags() {
        let mut store = open();
        let keep = store.cache("a", "http://x/1", &["t"]).unwrap();
        let id = store.cache("b", "http://x/2", &["t", "u"]).unwrap();

        assert_eq!(store.reject(id).unwrap(), "b");
        assert!(store.query().get_cache(id).unwrap().is_none());
        assert!(store.query().get_tags_for(id).unwrap().is_empty());
        assert_eq!(store.query().get_all_cache_ids().unwrap(), vec![keep]);
        assert!(store.query().unique_link("http://x/2").unwrap());
    }

    #[test]
    fn test_reject_failure_rolls_back() {
        let mut store = open_delete_locked();
        let id = store.cache("b", "http://x/2", &["locked"]).unwrap();

        let err = store.reject(id).unwrap_err();
        assert!(err.is_rolled_back());
        assert!(matches!(err.root(), Error::Mutation { .. }));
        assert!(store.last_error().starts_with("[ ROLLBACK ] Failed to remove meme from tag lookup"));
        assert_eq!(store.query().get_cache(id).unwrap().as_deref(), Some("http://x/2"));
        assert_eq!(store.query().get_tags_for(id).unwrap(), vec!["locked"]);
        assert_eq!(store.stats().unwrap(), StoreStats { memes: 0, cached: 1, tags: 1 });
    }

    #[test]
    fn test_reject_canonical_id_is_not_found() {
        let mut store = open();
        let id = store.store("a", "http://x/1", &["t"]).unwrap();
        assert!(matches!(store.reject(id), Err(Error::NotFound { .. })));
        assert_eq!(store.query().get_by_id(id).unwrap().as_deref(), Some("http://x/1"));
    }

    #[test]
    fn test_round_trip_keeps_id() {
        let mut store = open();
        let id = store.cache("u", "http://x/1", &["a"]).unwrap();
        store.promote(id, "c", &["a"]).unwrap();
        store.demote(id).unwrap();
        store.promote(id, "d", &["b"]).unwrap();
        assert_eq!(store.query().meme(id).unwrap().unwrap().curator, "d");
        assert_eq!(store.head_id(), id);
    }
}
