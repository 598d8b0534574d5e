//! Page Version (Ledger Entry) Models
//!
//! A `PageVersion` is an immutable snapshot of a page's metadata and its block
//! tree. The block tree is stored as an ordered array of `BlockDescriptor`s
//! whose ids are the live ids at capture time; restoring remaps them to fresh
//! ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One block as captured in a snapshot
///
/// The JSON shape (`id`, `type`, `content`, `order`, `parent_block_id`,
/// `is_archived`) is what gets persisted in `page_versions.content_snapshot`.
/// Entries written before the archive flag existed read back as live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub block_type: String,
    pub content: Value,
    pub order: i64,
    pub parent_block_id: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVersion {
    pub id: String,
    pub page_id: String,
    pub version_number: i64,
    pub title: String,
    pub icon: Option<String>,
    pub cover_image: Option<String>,
    pub content_snapshot: Vec<BlockDescriptor>,
    pub created_by: String,
    pub change_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lightweight listing row (no snapshot payload)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVersionSummary {
    pub id: String,
    pub version_number: i64,
    pub title: String,
    pub created_by: String,
    pub change_summary: Option<String>,
    pub blocks_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&PageVersion> for PageVersionSummary {
    fn from(version: &PageVersion) -> Self {
        Self {
            id: version.id.clone(),
            version_number: version.version_number,
            title: version.title.clone(),
            created_by: version.created_by.clone(),
            change_summary: version.change_summary.clone(),
            blocks_count: version.content_snapshot.len(),
            created_at: version.created_at,
        }
    }
}
