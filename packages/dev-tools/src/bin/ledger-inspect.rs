//! Ledger Inspector
//!
//! Opens a Quire database read-only in spirit (it never writes) and prints one
//! page's live block tree followed by its version history.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ledger-inspect -- <database path> <page id> [version limit]
//!
//! # Dump one version's snapshot as JSON
//! cargo run --bin ledger-inspect -- ./data/quire.db <page id> --version 3
//! ```
//!
//! Logging defaults to `info` and honours `RUST_LOG`.

use anyhow::{bail, Context};
use clap::Parser;
use quire_core::db::node_store::{self, ArchiveFilter};
use quire_core::db::{ledger_store, DatabaseService};
use quire_core::models::{NodeKind, PageVersionSummary};
use quire_core::CoreConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Print a page's block tree and version history
#[derive(Parser, Debug)]
#[command(name = "ledger-inspect", about, long_about = None)]
struct Cli {
    /// Path to the Quire database file
    db_path: PathBuf,

    /// Page to inspect
    page_id: String,

    /// Number of versions to list (clamped by configuration)
    limit: Option<usize>,

    /// Dump this version's snapshot as JSON instead of the overview
    #[arg(long, value_name = "N", conflicts_with = "limit")]
    version: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let db_path = cli.db_path.display().to_string();
    let page_id = cli.page_id;

    let config = CoreConfig::from_env().with_database_path(cli.db_path.clone());
    let db = DatabaseService::with_config(&config)
        .await
        .with_context(|| format!("failed to open {}", db_path))?;
    let conn = db.connect_with_timeout().await?;

    let Some(page) = node_store::get_page(&conn, &page_id).await? else {
        bail!("page {} not found in {}", page_id, db_path);
    };
    tracing::info!(page_id = %page.id, version = page.version, "loaded page");

    match cli.version {
        Some(number) => {
            let Some(version) = ledger_store::get_version(&conn, &page.id, number).await? else {
                bail!("page {} has no version {}", page.id, number);
            };
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        None => {
            println!("{} ({})", page.title, page.id);
            if page.is_archived {
                println!("  [archived]");
            }

            let nodes =
                node_store::list_tree_nodes(&conn, NodeKind::Block, &page.id, ArchiveFilter::LiveOnly)
                    .await?;
            let blocks: HashMap<String, String> = node_store::list_blocks(&conn, &page.id, ArchiveFilter::LiveOnly)
                .await?
                .into_iter()
                .map(|block| (block.id, block.block_type))
                .collect();

            println!("\nBlocks ({}):", nodes.len());
            for root in nodes.iter().filter(|node| node.is_root()) {
                for node in node_store::depth_first_subtree(root, &nodes) {
                    let depth = ancestor_depth(&node.id, &nodes);
                    let block_type = blocks.get(&node.id).map(String::as_str).unwrap_or("?");
                    println!("{}- [{}] {} (order {})", "  ".repeat(depth + 1), block_type, node.id, node.order);
                }
            }

            let limit = config.clamp_version_limit(cli.limit);
            let versions = ledger_store::list_versions(&conn, &page.id, limit).await?;
            let total = ledger_store::count_versions(&conn, &page.id).await?;
            println!("\nVersions (showing {} of {}):", versions.len(), total);
            for version in versions.iter().map(PageVersionSummary::from) {
                println!(
                    "  v{:<4} {}  {:>3} blocks  by {}  {}",
                    version.version_number,
                    version.created_at.format("%Y-%m-%d %H:%M:%S"),
                    version.blocks_count,
                    version.created_by,
                    version.change_summary.as_deref().unwrap_or("")
                );
            }
        }
    }

    Ok(())
}

/// Number of ancestors of `id` within `nodes`
fn ancestor_depth(id: &str, nodes: &[quire_core::models::TreeNode]) -> usize {
    let parents: HashMap<&str, Option<&str>> = nodes
        .iter()
        .map(|node| (node.id.as_str(), node.parent_id.as_deref()))
        .collect();
    let mut depth = 0;
    let mut cursor = parents.get(id).copied().flatten();
    while let Some(parent) = cursor {
        depth += 1;
        if depth > nodes.len() {
            break;
        }
        cursor = parents.get(parent).copied().flatten();
    }
    depth
}
