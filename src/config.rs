use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::storage::schema;

/// Token replaced by the real table name in every schema template
pub const TABLE_TOKEN: &str = "{table}";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemebaseConfig {
    /// Storage location; `:memory:` opens a private in-memory database
    pub database: String,
    /// Memes stamped before this are considered stale
    pub stale_before: Option<String>,
    pub tables: TableNames,
    pub schema: SchemaTemplates,
}

impl Default for MemebaseConfig {
    fn default() -> Self {
        Self {
            database: default_database_path().to_string_lossy().into_owned(),
            stale_before: None,
            tables: TableNames::default(),
            schema: SchemaTemplates::default(),
        }
    }
}

/// Names of the three tables, resolved from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub memes: String,
    pub cache: String,
    pub tags: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            memes: "memes".to_string(),
            cache: "meme_cache".to_string(),
            tags: "tag_lookup".to_string(),
        }
    }
}

impl TableNames {
    /// Table names end up inside SQL text, so only plain identifiers pass.
    pub fn validate(&self) -> crate::Result<()> {
        for name in [&self.memes, &self.cache, &self.tags] {
            if !is_identifier(name) {
                return Err(crate::Error::InvalidTableName(name.clone()));
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Table creation templates, each containing [`TABLE_TOKEN`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaTemplates {
    pub memes: String,
    pub cache: String,
    pub tags: String,
}

impl Default for SchemaTemplates {
    fn default() -> Self {
        Self {
            memes: schema::CREATE_MEMES_TABLE.to_string(),
            cache: schema::CREATE_CACHE_TABLE.to_string(),
            tags: schema::CREATE_TAGS_TABLE.to_string(),
        }
    }
}

impl SchemaTemplates {
    /// Substitute each table's real name into its template
    pub fn render(&self, tables: &TableNames) -> Vec<String> {
        vec![
            self.memes.replace(TABLE_TOKEN, &tables.memes),
            self.cache.replace(TABLE_TOKEN, &tables.cache),
            self.tags.replace(TABLE_TOKEN, &tables.tags),
        ]
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("memebase.toml")
}

pub fn default_database_path() -> PathBuf {
    PathBuf::from("meme.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<MemebaseConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: MemebaseConfig = toml::from_str(&contents)?;
    config.tables.validate()?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &MemebaseConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: MemebaseConfig = toml::from_str(
            r#"
            database = "bot/meme.db"
            stale_before = "2020-01-01 00:00:00"

            [tables]
            memes = "approved"
            "#,
        )
        .unwrap();

        assert_eq!(config.database, "bot/meme.db");
        assert_eq!(config.stale_before.as_deref(), Some("2020-01-01 00:00:00"));
        assert_eq!(config.tables.memes, "approved");
        assert_eq!(config.tables.cache, "meme_cache");
        assert_eq!(config.schema, SchemaTemplates::default());
    }

    #[test]
    fn test_render_substitutes_table_names() {
        let tables = TableNames {
            memes: "a".into(),
            cache: "b".into(),
            tags: "c".into(),
        };
        let rendered = SchemaTemplates::default().render(&tables);
        assert!(rendered[0].contains("CREATE TABLE IF NOT EXISTS a "));
        assert!(rendered[1].contains("CREATE TABLE IF NOT EXISTS b "));
        assert!(rendered[2].contains("CREATE TABLE IF NOT EXISTS c "));
        assert!(rendered.iter().all(|s| !s.contains(TABLE_TOKEN)));
    }

    #[test]
    fn test_table_names_rejects_non_identifiers() {
        assert!(TableNames::default().validate().is_ok());

        let mut tables = TableNames::default();
        tables.tags = "tags; DROP TABLE memes".into();
        assert!(matches!(tables.validate(), Err(crate::Error::InvalidTableName(_))));

        tables.tags = "1tags".into();
        assert!(tables.validate().is_err());

        tables.tags = String::new();
        assert!(tables.validate().is_err());
    }

    #[test]
    fn test_write_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memebase.toml");

        write_config(&path, &MemebaseConfig::default(), false).unwrap();
        assert!(write_config(&path, &MemebaseConfig::default(), false).is_err());
        write_config(&path, &MemebaseConfig::default(), true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.tables, TableNames::default());
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).unwrap().is_none());
    }
}
