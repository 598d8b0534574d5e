//! Page and Block Models
//!
//! Pages live in a workspace and nest under other pages; blocks live in a page
//! and nest under other blocks. Both carry an integer sibling `order` (not
//! unique; ties break by insertion sequence) and an `is_archived` soft-delete
//! flag.

use super::node::{deserialize_optional_field, NodeKind, TreeNode, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest accepted block type identifier
pub const MAX_BLOCK_TYPE_LENGTH: usize = 50;

/// Longest accepted page title
pub const MAX_TITLE_LENGTH: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub workspace_id: String,
    pub parent_id: Option<String>,
    pub title: String,
    pub icon: Option<String>,
    pub cover_image: Option<String>,
    pub order: i64,
    pub is_archived: bool,
    pub created_by: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Page {
    pub fn as_tree_node(&self) -> TreeNode {
        TreeNode {
            id: self.id.clone(),
            kind: NodeKind::Page,
            parent_id: self.parent_id.clone(),
            container_id: self.workspace_id.clone(),
            order: self.order,
            version: self.version,
            is_archived: self.is_archived,
        }
    }
}

/// A page with its non-archived child pages, recursively
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTree {
    pub page: Page,
    pub children: Vec<PageTree>,
}

/// Parameters for creating a page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPage {
    pub workspace_id: String,
    pub parent_id: Option<String>,
    pub title: String,
    pub icon: Option<String>,
    pub cover_image: Option<String>,
    pub order: i64,
}

impl NewPage {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workspace_id.trim().is_empty() {
            return Err(ValidationError::MissingField("workspace_id".to_string()));
        }
        validate_title(&self.title)
    }
}

/// Partial page metadata update
///
/// `icon` and `cover_image` use the double-Option pattern:
/// - `None`: leave unchanged
/// - `Some(None)`: clear
/// - `Some(Some(v))`: set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub icon: Option<Option<String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub cover_image: Option<Option<String>>,
}

impl PageUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = Some(icon);
        self
    }

    pub fn with_cover_image(mut self, cover_image: Option<String>) -> Self {
        self.cover_image = Some(cover_image);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.icon.is_none() && self.cover_image.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.title {
            Some(title) => validate_title(title),
            None => Ok(()),
        }
    }

    /// Merge this update into `page`, returning whether any field changed
    pub fn apply_to(&self, page: &mut Page) -> bool {
        let mut changed = false;
        if let Some(title) = &self.title {
            if &page.title != title {
                page.title = title.clone();
                changed = true;
            }
        }
        if let Some(icon) = &self.icon {
            if &page.icon != icon {
                page.icon = icon.clone();
                changed = true;
            }
        }
        if let Some(cover) = &self.cover_image {
            if &page.cover_image != cover {
                page.cover_image = cover.clone();
                changed = true;
            }
        }
        changed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub page_id: String,
    pub parent_id: Option<String>,
    pub block_type: String,
    /// Free-form key/value document
    pub content: Value,
    pub order: i64,
    pub is_archived: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Block {
    pub fn as_tree_node(&self) -> TreeNode {
        TreeNode {
            id: self.id.clone(),
            kind: NodeKind::Block,
            parent_id: self.parent_id.clone(),
            container_id: self.page_id.clone(),
            order: self.order,
            version: self.version,
            is_archived: self.is_archived,
        }
    }
}

/// Parameters for creating a block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlock {
    pub page_id: String,
    pub parent_id: Option<String>,
    pub block_type: String,
    pub content: Value,
    pub order: i64,
}

impl NewBlock {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page_id.trim().is_empty() {
            return Err(ValidationError::MissingField("page_id".to_string()));
        }
        validate_block_type(&self.block_type)?;
        validate_block_content(&self.content)
    }
}

/// Partial block update (type and content only; structure changes go through move)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
}

impl BlockUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_type(mut self, block_type: impl Into<String>) -> Self {
        self.block_type = Some(block_type.into());
        self
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = Some(content);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.block_type.is_none() && self.content.is_none()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(block_type) = &self.block_type {
            validate_block_type(block_type)?;
        }
        if let Some(content) = &self.content {
            validate_block_content(content)?;
        }
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "title".to_string(),
            max: MAX_TITLE_LENGTH,
        });
    }
    Ok(())
}

fn validate_block_type(block_type: &str) -> Result<(), ValidationError> {
    let trimmed = block_type.trim();
    if trimmed.is_empty() || block_type.chars().count() > MAX_BLOCK_TYPE_LENGTH {
        return Err(ValidationError::InvalidBlockType(block_type.to_string()));
    }
    Ok(())
}

fn validate_block_content(content: &Value) -> Result<(), ValidationError> {
    if content.is_object() {
        Ok(())
    } else {
        Err(ValidationError::InvalidContent)
    }
}
