//! Node Store - Adjacency Table Access for Pages and Blocks
//!
//! Pages and blocks share one storage shape: a flat table of
//! `(id, parent_id, <container>, position, version, is_archived, payload...)`.
//! The structural functions here take a [`NodeKind`] and work on either
//! table; the payload functions are kind-specific.
//!
//! Every function takes the connection it runs on, so callers can compose
//! several of them inside one transaction opened with
//! `DatabaseService::begin_immediate`.
//!
//! Sibling order is `ORDER BY position, rowid`: equal positions fall back to
//! insertion sequence.

use crate::db::error::DatabaseError;
use crate::db::rows::{
    self, block_from_row, bool_to_i64, collect_rows, first_row, page_from_row, BLOCK_COLUMNS,
    PAGE_COLUMNS,
};
use crate::models::{Block, NodeKind, Page, TreeNode};
use libsql::{params, Connection};
use std::collections::{HashMap, HashSet};

/// Table layout for one node kind
#[derive(Debug, Clone, Copy)]
struct NodeTable {
    table: &'static str,
    container_column: &'static str,
}

fn node_table(kind: NodeKind) -> NodeTable {
    match kind {
        NodeKind::Page => NodeTable {
            table: "pages",
            container_column: "workspace_id",
        },
        NodeKind::Block => NodeTable {
            table: "blocks",
            container_column: "page_id",
        },
    }
}

/// Which archive state a listing includes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFilter {
    LiveOnly,
    ArchivedOnly,
    All,
}

impl ArchiveFilter {
    fn clause(&self) -> &'static str {
        match self {
            ArchiveFilter::LiveOnly => " AND is_archived = 0",
            ArchiveFilter::ArchivedOnly => " AND is_archived = 1",
            ArchiveFilter::All => "",
        }
    }
}

fn tree_node_from_row(row: &libsql::Row, kind: NodeKind) -> Result<TreeNode, DatabaseError> {
    Ok(TreeNode {
        id: rows::get(row, "id")?,
        kind,
        parent_id: rows::get(row, "parent_id")?,
        container_id: rows::get(row, "container_id")?,
        order: rows::get(row, "position")?,
        version: rows::get(row, "version")?,
        is_archived: rows::get::<i64>(row, "is_archived")? != 0,
    })
}

//
// STRUCTURAL OPERATIONS (kind-agnostic)
//

pub async fn get_tree_node(
    conn: &Connection,
    kind: NodeKind,
    id: &str,
) -> Result<Option<TreeNode>, DatabaseError> {
    let t = node_table(kind);
    let sql = format!(
        "SELECT id, parent_id, {} AS container_id, position, version, is_archived
         FROM {} WHERE id = ?",
        t.container_column, t.table
    );
    let mut rows = conn
        .query(&sql, params![id])
        .await
        .map_err(|e| DatabaseError::from_statement("load tree node", e))?;

    match rows.next().await? {
        Some(row) => tree_node_from_row(&row, kind).map(Some),
        None => Ok(None),
    }
}

/// All nodes of one container in sibling order
pub async fn list_tree_nodes(
    conn: &Connection,
    kind: NodeKind,
    container_id: &str,
    filter: ArchiveFilter,
) -> Result<Vec<TreeNode>, DatabaseError> {
    let t = node_table(kind);
    let sql = format!(
        "SELECT id, parent_id, {container} AS container_id, position, version, is_archived
         FROM {table} WHERE {container} = ?{filter}
         ORDER BY position, rowid",
        container = t.container_column,
        table = t.table,
        filter = filter.clause()
    );
    let mut rows = conn
        .query(&sql, params![container_id])
        .await
        .map_err(|e| DatabaseError::from_statement("list tree nodes", e))?;

    let mut nodes = Vec::new();
    while let Some(row) = rows.next().await? {
        nodes.push(tree_node_from_row(&row, kind)?);
    }
    Ok(nodes)
}

/// Set parent and position in one statement, bumping the row version
///
/// With `expected_version`, the update only applies when the stored version
/// still matches. Returns the number of rows changed (0 on mismatch).
pub async fn update_placement(
    conn: &Connection,
    kind: NodeKind,
    id: &str,
    parent_id: Option<&str>,
    order: i64,
    expected_version: Option<i64>,
) -> Result<u64, DatabaseError> {
    let t = node_table(kind);
    let sql = format!(
        "UPDATE {} SET parent_id = ?1, position = ?2, version = version + 1, updated_at = ?3
         WHERE id = ?4 AND (?5 IS NULL OR version = ?5)",
        t.table
    );
    conn.execute(
        &sql,
        params![parent_id, order, rows::now_text(), id, expected_version],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("update placement", e))
}

/// Point a freshly inserted node at its parent (link pass of a clone)
pub async fn link_parent(
    conn: &Connection,
    kind: NodeKind,
    id: &str,
    parent_id: Option<&str>,
) -> Result<u64, DatabaseError> {
    let t = node_table(kind);
    let sql = format!("UPDATE {} SET parent_id = ? WHERE id = ?", t.table);
    conn.execute(&sql, params![parent_id, id])
        .await
        .map_err(|e| DatabaseError::from_statement("link parent", e))
}

/// Flip the archive flag on a set of nodes
pub async fn set_archived(
    conn: &Connection,
    kind: NodeKind,
    ids: &[String],
    archived: bool,
) -> Result<u64, DatabaseError> {
    let t = node_table(kind);
    let sql = format!(
        "UPDATE {} SET is_archived = ?, version = version + 1, updated_at = ? WHERE id = ?",
        t.table
    );
    let now = rows::now_text();
    let mut changed = 0;
    for id in ids {
        changed += conn
            .execute(&sql, params![bool_to_i64(archived), now.as_str(), id.as_str()])
            .await
            .map_err(|e| DatabaseError::from_statement("set archived", e))?;
    }
    Ok(changed)
}

/// Permanently delete a node; descendants go with it through the
/// `parent_id` cascade
pub async fn delete_node(conn: &Connection, kind: NodeKind, id: &str) -> Result<u64, DatabaseError> {
    let t = node_table(kind);
    let sql = format!("DELETE FROM {} WHERE id = ?", t.table);
    conn.execute(&sql, params![id])
        .await
        .map_err(|e| DatabaseError::from_statement("delete node", e))
}

/// Subtree of `root` in depth-first pre-order, siblings in stored order
///
/// `nodes` is the container listing (already in sibling order); nodes not
/// reachable from `root` through it are ignored. A corrupt cycle is cut at
/// the first repeated id.
pub fn depth_first_subtree(root: &TreeNode, nodes: &[TreeNode]) -> Vec<TreeNode> {
    let mut children: HashMap<&str, Vec<&TreeNode>> = HashMap::new();
    for node in nodes {
        if let Some(parent_id) = node.parent_id.as_deref() {
            children.entry(parent_id).or_default().push(node);
        }
    }

    let mut ordered = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&TreeNode> = vec![root];

    while let Some(node) = stack.pop() {
        if !seen.insert(node.id.as_str()) {
            continue;
        }
        ordered.push(node.clone());
        if let Some(kids) = children.get(node.id.as_str()) {
            stack.extend(kids.iter().rev());
        }
    }

    ordered
}

//
// PAGE ROWS
//

pub async fn get_page(conn: &Connection, id: &str) -> Result<Option<Page>, DatabaseError> {
    let sql = format!("SELECT {} FROM pages WHERE id = ?", PAGE_COLUMNS);
    let rows = conn
        .query(&sql, params![id])
        .await
        .map_err(|e| DatabaseError::from_statement("load page", e))?;
    first_row(rows, page_from_row).await
}

pub async fn insert_page(conn: &Connection, page: &Page) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO pages (id, workspace_id, parent_id, title, icon, cover_image, position,
                            is_archived, created_by, version, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            page.id.as_str(),
            page.workspace_id.as_str(),
            page.parent_id.as_deref(),
            page.title.as_str(),
            page.icon.as_deref(),
            page.cover_image.as_deref(),
            page.order,
            bool_to_i64(page.is_archived),
            page.created_by.as_str(),
            page.version,
            rows::timestamp_text(&page.created_at),
            rows::timestamp_text(&page.updated_at)
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("insert page", e))?;
    Ok(())
}

/// Write title/icon/cover back and bump the version
pub async fn update_page_metadata(conn: &Connection, page: &Page) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE pages SET title = ?, icon = ?, cover_image = ?, version = version + 1,
                          updated_at = ?
         WHERE id = ?",
        params![
            page.title.as_str(),
            page.icon.as_deref(),
            page.cover_image.as_deref(),
            rows::now_text(),
            page.id.as_str()
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("update page", e))
}

pub async fn list_pages(
    conn: &Connection,
    workspace_id: &str,
    filter: ArchiveFilter,
) -> Result<Vec<Page>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM pages WHERE workspace_id = ?{} ORDER BY position, rowid",
        PAGE_COLUMNS,
        filter.clause()
    );
    let rows = conn
        .query(&sql, params![workspace_id])
        .await
        .map_err(|e| DatabaseError::from_statement("list pages", e))?;
    collect_rows(rows, page_from_row).await
}

//
// BLOCK ROWS
//

pub async fn get_block(conn: &Connection, id: &str) -> Result<Option<Block>, DatabaseError> {
    let sql = format!("SELECT {} FROM blocks WHERE id = ?", BLOCK_COLUMNS);
    let rows = conn
        .query(&sql, params![id])
        .await
        .map_err(|e| DatabaseError::from_statement("load block", e))?;
    first_row(rows, block_from_row).await
}

pub async fn insert_block(conn: &Connection, block: &Block) -> Result<(), DatabaseError> {
    let content = serde_json::to_string(&block.content)
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to encode content: {}", e)))?;
    conn.execute(
        "INSERT INTO blocks (id, page_id, parent_id, block_type, content, position,
                             is_archived, version, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            block.id.as_str(),
            block.page_id.as_str(),
            block.parent_id.as_deref(),
            block.block_type.as_str(),
            content,
            block.order,
            bool_to_i64(block.is_archived),
            block.version,
            rows::timestamp_text(&block.created_at),
            rows::timestamp_text(&block.updated_at)
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("insert block", e))?;
    Ok(())
}

/// Write type and content back and bump the version
pub async fn update_block_payload(conn: &Connection, block: &Block) -> Result<u64, DatabaseError> {
    let content = serde_json::to_string(&block.content)
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to encode content: {}", e)))?;
    conn.execute(
        "UPDATE blocks SET block_type = ?, content = ?, version = version + 1, updated_at = ?
         WHERE id = ?",
        params![
            block.block_type.as_str(),
            content,
            rows::now_text(),
            block.id.as_str()
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("update block", e))
}

/// Blocks of a page in sibling order
pub async fn list_blocks(
    conn: &Connection,
    page_id: &str,
    filter: ArchiveFilter,
) -> Result<Vec<Block>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM blocks WHERE page_id = ?{} ORDER BY position, rowid",
        BLOCK_COLUMNS,
        filter.clause()
    );
    let rows = conn
        .query(&sql, params![page_id])
        .await
        .map_err(|e| DatabaseError::from_statement("list blocks", e))?;
    collect_rows(rows, block_from_row).await
}

/// Remove every block of a page, archived ones included
pub async fn delete_blocks_of_page(conn: &Connection, page_id: &str) -> Result<u64, DatabaseError> {
    conn.execute("DELETE FROM blocks WHERE page_id = ?", params![page_id])
        .await
        .map_err(|e| DatabaseError::from_statement("delete page blocks", e))
}
