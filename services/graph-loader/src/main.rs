//! Graph Loader - Loads a REDS occurrence workbook into Neo4j
//!
//! Responsibilities:
//! - Read the `ocorrencias` fact sheet and any pre-supplied `dim_*` sheets
//! - Extract deduplicated dimensions (municipio, bairro, naturezas, unidades,
//!   setores, causa, tempo, meio)
//! - Merge dimension nodes and hierarchy edges, then every occurrence and its
//!   edges, in fixed-size batches
//!
//! CRITICAL: every write is a MERGE on a natural key.
//! Re-running over the same workbook leaves the graph unchanged.

mod config;
mod dimensions;
mod export;
mod graph;
mod loader;
mod sanitize;
mod schema;
mod table;
mod workbook;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Args, LoaderConfig};
use graph::{MemoryGraph, Neo4jStore};
use loader::{run_pipeline, LoadReport, PipelineOptions};
use tracing_subscriber::EnvFilter;
use workbook::Workbook;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("graph_loader=info".parse()?))
        .init();

    let config = LoaderConfig::from_args(Args::parse())?;

    println!("=== REDS Graph Loader ===");
    println!("Workbook: {}", config.workbook_path.display());
    println!("Mode: {}", if config.dry_run { "dry-run" } else { "live" });
    config.log_redacted();

    // Fatal workbook checks happen before the store is touched
    let workbook = Workbook::open(&config.workbook_path)
        .with_context(|| format!("Failed to read workbook {}", config.workbook_path.display()))?;
    loader::FactColumns::resolve(workbook.facts()?)?;

    let options = PipelineOptions {
        batch_size: config.batch_size,
        export_dir: config.export_dir.clone(),
    };

    let report = match &config.store {
        None => {
            let graph = MemoryGraph::new();
            let report = run_pipeline(&workbook, &graph, &options).await?;
            println!("\nDry run - nothing written to Neo4j");
            println!(
                "In-memory graph: {} nodes, {} relationships",
                graph.node_count(),
                graph.edge_count()
            );
            for (label, count) in graph.label_counts() {
                println!("  {:<20} {}", label, count);
            }
            for (rel_type, count) in graph.rel_counts() {
                println!("  {:<20} {}", rel_type, count);
            }
            report
        }
        Some(store_config) => {
            let store = Neo4jStore::connect(store_config)
                .await
                .context("Failed to connect to Neo4j")?;
            if config.ensure_constraints {
                store
                    .ensure_constraints()
                    .await
                    .context("Failed to create uniqueness constraints")?;
            }
            run_pipeline(&workbook, &store, &options).await?
        }
    };

    finish(&report)
}

fn finish(report: &LoadReport) -> Result<()> {
    report.log_summary();

    println!("\n=== Load Complete ===");
    println!("{}", serde_json::to_string_pretty(report)?);
    if report.failed_merges > 0 {
        println!(
            "{} merges skipped (missing endpoints) - re-run after fixing the source",
            report.failed_merges
        );
    }
    Ok(())
}
