//! Memebase CLI - drive the meme store from a shell or a bot process

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use memebase::config::{self, MemebaseConfig};
use memebase::MemeStore;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "memebase")]
#[command(version)]
#[command(about = "Curated meme links behind a review cache")]
#[command(long_about = r#"
Memebase keeps approved memes and a pending-review cache in SQLite:
  • Submissions land in the cache (or straight in the meme table)
  • Curators promote, demote or reject them
  • Random lookup by tag intersection

Example usage:
  memebase init
  memebase cache --submitter Ziggy --link https://x/1.png --tags meta,books
  memebase promote --id 1 --curator Ziggy --tags meta,books
  memebase get --tags books
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true, default_value = "memebase.toml")]
    config: PathBuf,

    /// Database location (overrides the config file)
    #[arg(short, long, global = true)]
    database: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    #[command(flatten)]
    Data(DataCommands),
}

/// Commands that run against an open store
#[derive(Subcommand)]
enum DataCommands {
    /// Add an approved meme directly
    Store {
        #[arg(short, long)]
        submitter: String,

        #[arg(short, long)]
        link: String,

        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Submit a meme for review
    Cache {
        #[arg(short, long)]
        submitter: String,

        #[arg(short, long)]
        link: String,

        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Approve a cached meme with its confirmed tags
    Promote {
        #[arg(short, long)]
        id: i64,

        #[arg(long)]
        curator: String,

        /// Comma-separated tags, replacing the submitted ones
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Send an approved meme back to the cache
    Demote {
        #[arg(short, long)]
        id: i64,
    },

    /// Delete a cached meme and its tags
    Reject {
        #[arg(short, long)]
        id: i64,
    },

    /// Fetch an approved meme by id, or a random one carrying all tags
    Get {
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,

        #[arg(short, long, conflicts_with = "tags")]
        id: Option<i64>,
    },

    /// Fetch a cached meme by id
    GetCache {
        #[arg(short, long)]
        id: i64,
    },

    /// List approved tags with counts, or the tags of one meme
    Tags {
        #[arg(short, long)]
        id: Option<i64>,
    },

    /// List the ids waiting in the cache
    CacheIds,

    /// List approved memes older than a cutoff
    Stale {
        /// Cutoff timestamp (defaults to `stale_before` from the config)
        #[arg(short, long)]
        before: Option<String>,
    },

    /// Show row counts
    Stats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let command = match cli.command {
        Commands::Init { force } => {
            config::write_config(&cli.config, &MemebaseConfig::default(), force)?;
            println!("✅ Wrote default config to {}", cli.config.display());
            return Ok(());
        }
        Commands::Data(command) => command,
    };

    let mut settings = config::load_config(Some(&cli.config))?.unwrap_or_default();
    if let Some(database) = cli.database {
        settings.database = database;
    }
    config::ensure_db_dir(std::path::Path::new(&settings.database))?;

    let mut store = MemeStore::open(&settings)?;
    let outcome = run(&mut store, &settings, command, cli.json);
    store.close()?;
    outcome
}

fn run(
    store: &mut MemeStore,
    settings: &MemebaseConfig,
    command: DataCommands,
    json: bool,
) -> anyhow::Result<()> {
    match command {
        DataCommands::Store { submitter, link, tags } => {
            let id = store.store(&submitter, &link, &tags)?;
            emit(json, serde_json::json!({ "id": id }), || format!("✅ Stored meme {}", id))?;
        }

        DataCommands::Cache { submitter, link, tags } => {
            let id = store.cache(&submitter, &link, &tags)?;
            emit(json, serde_json::json!({ "id": id }), || format!("📥 Cached meme {}", id))?;
        }

        DataCommands::Promote { id, curator, tags } => {
            let submitter = store.promote(id, &curator, &tags)?;
            emit(json, serde_json::json!({ "id": id, "submitter": submitter }), || {
                format!("⬆️  Promoted meme {} (submitted by {})", id, submitter)
            })?;
        }

        DataCommands::Demote { id } => {
            let submitter = store.demote(id)?;
            emit(json, serde_json::json!({ "id": id, "submitter": submitter }), || {
                format!("⬇️  Demoted meme {} (submitted by {})", id, submitter)
            })?;
        }

        DataCommands::Reject { id } => {
            let submitter = store.reject(id)?;
            emit(json, serde_json::json!({ "id": id, "submitter": submitter }), || {
                format!("🗑️  Rejected meme {} (submitted by {})", id, submitter)
            })?;
        }

        DataCommands::Get { tags, id } => {
            let engine = store.query();
            let link = match id {
                Some(id) => engine.get_by_id(id)?,
                None => engine.get(&tags)?,
            };
            emit(json, serde_json::json!({ "link": link }), || {
                link.clone().unwrap_or_else(|| "∅ No meme found.".to_string())
            })?;
        }

        DataCommands::GetCache { id } => {
            let link = store.query().get_cache(id)?;
            emit(json, serde_json::json!({ "link": link }), || {
                link.clone().unwrap_or_else(|| "∅ No cached meme found.".to_string())
            })?;
        }

        DataCommands::Tags { id } => match id {
            Some(id) => {
                let tags = store.query().get_tags_for(id)?;
                emit(json, serde_json::json!({ "id": id, "tags": tags }), || tags.join("\n"))?;
            }
            None => {
                let counts = store.query().get_tags()?;
                emit(json, serde_json::to_value(&counts)?, || {
                    counts.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
                })?;
            }
        },

        DataCommands::CacheIds => {
            let ids = store.query().get_all_cache_ids()?;
            emit(json, serde_json::json!({ "ids": ids }), || {
                list_ids(&ids, "∅ The cache is empty.")
            })?;
        }

        DataCommands::Stale { before } => {
            let cutoff = before
                .or_else(|| settings.stale_before.clone())
                .ok_or_else(|| anyhow::anyhow!("no cutoff given (use --before or set stale_before)"))?;
            let ids = store.query().get_all_old_meme_ids(&cutoff)?;
            emit(json, serde_json::json!({ "before": cutoff, "ids": ids }), || {
                list_ids(&ids, "∅ No stale memes.")
            })?;
        }

        DataCommands::Stats => {
            let stats = store.stats()?;
            emit(json, serde_json::to_value(stats)?, || {
                format!("📊 Memebase Statistics ({})\n{}", store.location(), stats)
            })?;
        }
    }

    Ok(())
}

fn emit(json: bool, data: serde_json::Value, human: impl FnOnce() -> String) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{}", human());
    }
    Ok(())
}

fn list_ids(ids: &[i64], empty: &str) -> String {
    if ids.is_empty() {
        return empty.to_string();
    }
    ids.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_parses_without_store_command() {
        let cli = Cli::try_parse_from(["memebase", "init", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::Init { force: true }));
    }

    #[test]
    fn test_store_commands_parse_flat() {
        let cli = Cli::try_parse_from(["memebase", "cache-ids", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Data(DataCommands::CacheIds)));

        let cli = Cli::try_parse_from(["memebase", "get", "--tags", "dog,cat"]).unwrap();
        match cli.command {
            Commands::Data(DataCommands::Get { tags, id }) => {
                assert_eq!(tags, vec!["dog", "cat"]);
                assert!(id.is_none());
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn test_list_ids() {
        assert_eq!(list_ids(&[], "∅ The cache is empty."), "∅ The cache is empty.");
        assert_eq!(list_ids(&[1, 3], "∅"), "1\n3");
    }
}
