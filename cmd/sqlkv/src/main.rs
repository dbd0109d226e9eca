//! sqlkv CLI - inspect and edit key-value tables stored in SQLite files.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use giztoy_sqlkv::{Codec, KVError, KVMapping, SqliteStore, StoreConfig};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

/// sqlkv - a command line interface for SQLite key-value tables.
///
/// The store is described either by flags or by a YAML config file
/// (`path`, `table`, `codec`, `busy_timeout_ms`); flags win over the file.
#[derive(Parser)]
#[command(name = "sqlkv")]
#[command(about = "SQLite-backed key-value table tool")]
#[command(version)]
pub struct Cli {
    /// Store config file (YAML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Table name (default is ApplicationConfiguration)
    #[arg(short = 't', long, global = true)]
    pub table: Option<String>,

    /// Value codec: json or binary
    #[arg(long, global = true)]
    pub codec: Option<Codec>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the value of a key
    Get { key: String },
    /// Set a key to a JSON value
    Set {
        key: String,
        value: String,
        /// Store VALUE as a plain string instead of parsing it as JSON
        #[arg(short = 's', long)]
        string: bool,
    },
    /// Delete a key
    Del { key: String },
    /// Exit successfully if the key exists
    Has { key: String },
    /// Print the number of entries
    Len,
    /// List keys, one per line
    Keys,
    /// Stream entries as JSON lines
    Items,
    /// Print the whole table as a JSON object
    Dump,
    /// Delete every entry
    Clear,
}

fn store_config(cli: &Cli) -> Result<StoreConfig> {
    let mut cfg = match (&cli.config, &cli.db) {
        (Some(path), _) => StoreConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        (None, Some(db)) => StoreConfig::new(db),
        (None, None) => bail!("no database given, use --db or --config"),
    };
    if let Some(db) = &cli.db {
        cfg.path = db.clone();
    }
    if let Some(table) = &cli.table {
        cfg.table = table.clone();
    }
    if let Some(codec) = cli.codec {
        cfg.codec = codec;
    }
    Ok(cfg)
}

/// Runs a command. Returns false when a `has` lookup misses.
fn run(cli: &Cli, out: &mut impl Write) -> Result<bool> {
    let cfg = store_config(cli)?;
    let mut store: SqliteStore = SqliteStore::open_with_config(&cfg)
        .with_context(|| format!("failed to open {}", cfg.path.display()))?;

    let mut found = true;
    match &cli.command {
        Commands::Get { key } => {
            let value = store.get(key)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?;
        }
        Commands::Set { key, value, string } => {
            let value = if *string {
                Value::String(value.clone())
            } else {
                serde_json::from_str(value)
                    .with_context(|| format!("value for {key} is not JSON (use -s for strings)"))?
            };
            store.set(key, &value)?;
        }
        Commands::Del { key } => store.delete(key)?,
        Commands::Has { key } => found = store.contains(key)?,
        Commands::Len => writeln!(out, "{}", store.len()?)?,
        Commands::Keys => {
            for key in store.iter_keys()? {
                writeln!(out, "{}", key?)?;
            }
        }
        Commands::Items => {
            for item in store.iter_items()? {
                let (key, value) = item?;
                writeln!(out, "{}", json!({ "key": key, "value": value }))?;
            }
        }
        Commands::Dump => {
            let map: serde_json::Map<String, Value> = store.items()?.into_iter().collect();
            writeln!(out, "{}", serde_json::to_string_pretty(&Value::Object(map))?)?;
        }
        Commands::Clear => store.clear()?,
    }

    store.close()?;
    Ok(found)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_target(false)
            .init();
    }

    let stdout = io::stdout();
    match run(&cli, &mut stdout.lock()) {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            if let Some(KVError::NotFound(key)) = e.downcast_ref::<KVError>() {
                eprintln!("sqlkv: no such key: {key}");
                std::process::exit(1);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn exec(args: &[&str]) -> Result<(bool, String)> {
        let cli = Cli::try_parse_from(std::iter::once("sqlkv").chain(args.iter().copied()))?;
        let mut out = Vec::new();
        let found = run(&cli, &mut out)?;
        Ok((found, String::from_utf8(out)?))
    }

    #[test]
    fn set_get_and_list() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("kv.sqlite");
        let db = db.to_str().unwrap();

        exec(&["--db", db, "set", "hello", "\"world\""]).unwrap();
        exec(&["--db", db, "set", "-s", "goodbye", "cruel world"]).unwrap();
        exec(&["--db", db, "set", "n", "{\"x\": 1}"]).unwrap();

        let (_, out) = exec(&["--db", db, "get", "hello"]).unwrap();
        assert_eq!(out.trim(), "\"world\"");

        let (_, out) = exec(&["--db", db, "keys"]).unwrap();
        assert_eq!(out, "hello\ngoodbye\nn\n");

        let (_, out) = exec(&["--db", db, "len"]).unwrap();
        assert_eq!(out.trim(), "3");

        let (_, out) = exec(&["--db", db, "items"]).unwrap();
        let first: Value = serde_json::from_str(out.lines().next().unwrap()).unwrap();
        assert_eq!(first, json!({"key": "hello", "value": "world"}));

        let (_, out) = exec(&["--db", db, "dump"]).unwrap();
        let dumped: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(dumped["n"], json!({"x": 1}));
    }

    #[test]
    fn has_del_and_clear() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("kv.sqlite");
        let db = db.to_str().unwrap();

        exec(&["--db", db, "-t", "cfg", "set", "k", "1"]).unwrap();
        assert!(exec(&["--db", db, "-t", "cfg", "has", "k"]).unwrap().0);
        assert!(!exec(&["--db", db, "has", "k"]).unwrap().0);

        exec(&["--db", db, "-t", "cfg", "del", "k"]).unwrap();
        let err = exec(&["--db", db, "-t", "cfg", "del", "k"]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KVError>(),
            Some(KVError::NotFound(_))
        ));

        exec(&["--db", db, "-t", "cfg", "set", "a", "true"]).unwrap();
        exec(&["--db", db, "-t", "cfg", "clear"]).unwrap();
        let (_, out) = exec(&["--db", db, "-t", "cfg", "len"]).unwrap();
        assert_eq!(out.trim(), "0");
    }

    #[test]
    fn config_file_with_overrides() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("kv.sqlite");
        let cfg = dir.path().join("store.yaml");
        std::fs::write(
            &cfg,
            format!("path: {}\ntable: fromfile\ncodec: binary\n", db.display()),
        )
        .unwrap();
        let cfg = cfg.to_str().unwrap();

        exec(&["--config", cfg, "set", "k", "[1, 2]"]).unwrap();
        let (_, out) = exec(&["--config", cfg, "get", "k"]).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&out).unwrap(), json!([1, 2]));

        // Same file, JSON codec: the binary payload is not readable.
        let err = exec(&["--config", cfg, "--codec", "json", "get", "k"]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KVError>(),
            Some(KVError::Serialization(_))
        ));

        let (_, out) = exec(&["--config", cfg, "-t", "other", "len"]).unwrap();
        assert_eq!(out.trim(), "0");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(exec(&["len"]).is_err());
        assert!(exec(&["--db", "x.sqlite", "--codec", "pickle", "len"]).is_err());

        let dir = tempdir().unwrap();
        let db = dir.path().join("kv.sqlite");
        assert!(exec(&["--db", db.to_str().unwrap(), "set", "k", "not json"]).is_err());
    }
}
