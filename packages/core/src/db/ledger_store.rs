//! Ledger Store - `page_versions` Table Access
//!
//! Ledger rows are append-only: this module only inserts and reads them.
//! Rows disappear solely through the `page_id` cascade when their page is
//! permanently deleted.

use crate::db::error::DatabaseError;
use crate::db::rows::{self, collect_rows, first_row, version_from_row, VERSION_COLUMNS};
use crate::models::PageVersion;
use libsql::{params, Connection};

/// The number the next snapshot of `page_id` will receive
///
/// Must be read inside the same immediate transaction as the insert that
/// uses it; the `(page_id, version_number)` unique index backs this up.
pub async fn next_version_number(conn: &Connection, page_id: &str) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COALESCE(MAX(version_number), 0) + 1 AS next_number
             FROM page_versions WHERE page_id = ?",
            params![page_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("compute next version number", e))?;

    match rows.next().await? {
        Some(row) => rows::get(&row, "next_number"),
        None => Ok(1),
    }
}

pub async fn insert_version(conn: &Connection, version: &PageVersion) -> Result<(), DatabaseError> {
    let snapshot = serde_json::to_string(&version.content_snapshot)
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to encode snapshot: {}", e)))?;

    conn.execute(
        "INSERT INTO page_versions (id, page_id, version_number, title, icon, cover_image,
                                    content_snapshot, created_by, change_summary, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            version.id.as_str(),
            version.page_id.as_str(),
            version.version_number,
            version.title.as_str(),
            version.icon.as_deref(),
            version.cover_image.as_deref(),
            snapshot,
            version.created_by.as_str(),
            version.change_summary.as_deref(),
            rows::timestamp_text(&version.created_at)
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("insert page version", e))?;
    Ok(())
}

/// Newest first
pub async fn list_versions(
    conn: &Connection,
    page_id: &str,
    limit: usize,
) -> Result<Vec<PageVersion>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM page_versions WHERE page_id = ?
         ORDER BY version_number DESC LIMIT ?",
        VERSION_COLUMNS
    );
    let rows = conn
        .query(&sql, params![page_id, limit as i64])
        .await
        .map_err(|e| DatabaseError::from_statement("list page versions", e))?;
    collect_rows(rows, version_from_row).await
}

pub async fn get_version(
    conn: &Connection,
    page_id: &str,
    version_number: i64,
) -> Result<Option<PageVersion>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM page_versions WHERE page_id = ? AND version_number = ?",
        VERSION_COLUMNS
    );
    let rows = conn
        .query(&sql, params![page_id, version_number])
        .await
        .map_err(|e| DatabaseError::from_statement("load page version", e))?;
    first_row(rows, version_from_row).await
}

pub async fn get_version_by_id(
    conn: &Connection,
    id: &str,
) -> Result<Option<PageVersion>, DatabaseError> {
    let sql = format!("SELECT {} FROM page_versions WHERE id = ?", VERSION_COLUMNS);
    let rows = conn
        .query(&sql, params![id])
        .await
        .map_err(|e| DatabaseError::from_statement("load page version", e))?;
    first_row(rows, version_from_row).await
}

pub async fn count_versions(conn: &Connection, page_id: &str) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) AS total FROM page_versions WHERE page_id = ?",
            params![page_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("count page versions", e))?;

    match rows.next().await? {
        Some(row) => rows::get(&row, "total"),
        None => Ok(0),
    }
}
