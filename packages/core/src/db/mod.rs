//! Database Layer
//!
//! This module handles all database interactions using embedded libsql:
//!
//! - Database initialization and connection management (`DatabaseService`)
//! - Immediate transactions, one per logical operation
//! - Per-table SQL: node store (pages and blocks), ledger store, comment
//!   store, access store
//!
//! Store functions are free functions taking a `&libsql::Connection`, so a
//! service can run several of them inside one transaction.

pub mod access_store;
pub mod comment_store;
mod database;
mod error;
pub mod ledger_store;
pub mod node_store;
mod rows;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use node_store::ArchiveFilter;
pub use rows::parse_timestamp;
