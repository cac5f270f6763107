//! Run configuration from CLI arguments and environment variables

use crate::schema::DEFAULT_BATCH_SIZE;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

pub const DEFAULT_NEO4J_URI: &str = "bolt://localhost:7687";
pub const DEFAULT_NEO4J_USER: &str = "neo4j";

#[derive(Parser, Debug)]
#[command(name = "graph-loader", about = "Load a REDS occurrence workbook into Neo4j")]
pub struct Args {
    /// Workbook with the `ocorrencias` sheet and optional `dim_*` sheets
    #[arg(long, env = "WORKBOOK_PATH")]
    pub workbook: PathBuf,

    /// Fact rows per batch
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Run against an in-memory graph; nothing is written to Neo4j
    #[arg(long)]
    pub dry_run: bool,

    /// Also write every extracted dimension as `dim_<name>.csv` here
    #[arg(long)]
    pub export_dir: Option<PathBuf>,

    /// Do not create uniqueness constraints before loading
    #[arg(long)]
    pub skip_constraints: bool,
}

/// Neo4j connection settings
#[derive(Clone)]
pub struct StoreConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

impl StoreConfig {
    /// `NEO4J_URI` and `NEO4J_USER` have defaults; `NEO4J_PASS` is required.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Ok(Self {
            uri: non_empty("NEO4J_URI").unwrap_or_else(|| DEFAULT_NEO4J_URI.to_string()),
            user: non_empty("NEO4J_USER").unwrap_or_else(|| DEFAULT_NEO4J_USER.to_string()),
            password: non_empty("NEO4J_PASS").context("NEO4J_PASS env var missing")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub workbook_path: PathBuf,
    pub batch_size: usize,
    pub dry_run: bool,
    pub export_dir: Option<PathBuf>,
    pub ensure_constraints: bool,
    /// `None` on a dry run
    pub store: Option<StoreConfig>,
}

impl LoaderConfig {
    pub fn from_args(args: Args) -> Result<Self> {
        Self::build(args, |key| std::env::var(key).ok())
    }

    fn build(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if args.batch_size == 0 {
            bail!("--batch-size must be at least 1");
        }

        let store = if args.dry_run {
            None
        } else {
            Some(StoreConfig::from_lookup(lookup)?)
        };

        Ok(Self {
            workbook_path: args.workbook,
            batch_size: args.batch_size,
            dry_run: args.dry_run,
            export_dir: args.export_dir,
            ensure_constraints: !args.skip_constraints,
            store,
        })
    }

    pub fn log_redacted(&self) {
        info!(
            workbook = %self.workbook_path.display(),
            batch_size = self.batch_size,
            dry_run = self.dry_run,
            export_dir = ?self.export_dir,
            constraints = self.ensure_constraints,
            neo4j_uri = self.store.as_ref().map(|s| s.uri.as_str()).unwrap_or("-"),
            neo4j_user = self.store.as_ref().map(|s| s.user.as_str()).unwrap_or("-"),
            "configuration loaded"
        );
    }
}
