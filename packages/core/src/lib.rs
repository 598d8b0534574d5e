//! Quire Core - Hierarchical Content Tree Engine
//!
//! This crate provides the tree engine behind Quire workspaces: pages nested
//! in a workspace, blocks nested in a page, threaded comments on either, and
//! an append-only version ledger with full restore.
//!
//! # Architecture
//!
//! - **Flat adjacency tables**: every node row is `(id, parent_id, container, position, payload)`;
//!   trees are rebuilt at query time, never held as object graphs
//! - **One transaction per operation**: moves, duplications, snapshots, restores and comment
//!   mutations each run in a single `BEGIN IMMEDIATE` transaction
//! - **libsql**: embedded SQLite-compatible database with foreign-key cascades
//! - **Constructor injection**: database, id generator and permission oracle are passed in
//!   through `ServiceContext`, never read from globals
//!
//! # Modules
//!
//! - [`config`] - Runtime settings (`CoreConfig`)
//! - [`models`] - Data structures (Page, Block, Comment, PageVersion, etc.)
//! - [`db`] - Database layer with libsql integration
//! - [`services`] - Tree operations (move, duplicate, snapshot, restore, comments)
//! - [`utils`] - Mention parsing

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::CoreConfig;
pub use models::*;
pub use services::*;
