//! Generic Tree Node Structures
//!
//! Pages and blocks are both stored as rows of a flat adjacency table:
//! `(id, parent_id, container_id, order, payload)`. This module defines the
//! kind-agnostic view of such a row that the tree algorithms (move, duplicate,
//! restore) operate on, independent of each kind's payload.
//!
//! # Containers
//!
//! | Kind  | Table    | Container column | Container is |
//! |-------|----------|------------------|--------------|
//! | Page  | `pages`  | `workspace_id`   | a workspace  |
//! | Block | `blocks` | `page_id`        | a page       |
//!
//! A node's parent, if set, always lives in the same container.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation errors for node creation and updates
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field '{field}' is too long (max {max} characters)")]
    TooLong { field: String, max: usize },

    #[error("Invalid block type: {0}")]
    InvalidBlockType(String),

    #[error("Block content must be a JSON object")]
    InvalidContent,

    #[error("Invalid reaction type: {0}")]
    InvalidReactionType(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

/// Which adjacency table a tree operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Page,
    Block,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Page => "page",
            NodeKind::Block => "block",
        }
    }

    /// Human-readable name of this kind's container
    pub fn container_label(&self) -> &'static str {
        match self {
            NodeKind::Page => "workspace",
            NodeKind::Block => "page",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural view of a page or block row (no payload)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub kind: NodeKind,
    pub parent_id: Option<String>,
    pub container_id: String,
    pub order: i64,
    /// Row version stamp, incremented by every mutation
    pub version: i64,
    pub is_archived: bool,
}

impl TreeNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The page whose permissions govern this node
    pub fn governing_page_id(&self) -> &str {
        match self.kind {
            NodeKind::Page => &self.id,
            NodeKind::Block => &self.container_id,
        }
    }
}

/// Result of a delete operation
///
/// Deleting a missing row is not an error; `existed` reports whether
/// anything was removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResult {
    pub existed: bool,
}

impl DeleteResult {
    pub fn existed() -> Self {
        Self { existed: true }
    }

    pub fn not_found() -> Self {
        Self { existed: false }
    }
}

/// Deserialize a field that distinguishes "absent" from explicit `null`
///
/// - field missing: `None` (leave unchanged)
/// - `null`: `Some(None)` (clear)
/// - value: `Some(Some(v))` (set)
pub(crate) fn deserialize_optional_field<'de, T, D>(
    deserializer: D,
) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Ok(Some(Option::deserialize(deserializer)?))
}
