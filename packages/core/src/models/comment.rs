//! Threaded Comment Models
//!
//! A comment targets exactly one page or one block. Replies point at their
//! parent through `parent_id` and carry a `thread_depth` one greater than the
//! parent's, capped by configuration (5 by default).

use super::node::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reaction identifiers accepted by `add_reaction`
pub const ALLOWED_REACTIONS: &[&str] = &[
    "thumbs_up",
    "heart",
    "laugh",
    "surprised",
    "sad",
    "rocket",
    "eyes",
    "party",
    "fire",
];

/// What a comment is attached to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum CommentTarget {
    Page(String),
    Block(String),
}

impl CommentTarget {
    /// Build a target from the two nullable columns
    ///
    /// Returns `None` unless exactly one of the two ids is set.
    pub fn from_columns(page_id: Option<String>, block_id: Option<String>) -> Option<Self> {
        match (page_id, block_id) {
            (Some(page_id), None) => Some(CommentTarget::Page(page_id)),
            (None, Some(block_id)) => Some(CommentTarget::Block(block_id)),
            _ => None,
        }
    }

    pub fn page_id(&self) -> Option<&str> {
        match self {
            CommentTarget::Page(id) => Some(id),
            CommentTarget::Block(_) => None,
        }
    }

    pub fn block_id(&self) -> Option<&str> {
        match self {
            CommentTarget::Page(_) => None,
            CommentTarget::Block(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub target: CommentTarget,
    pub parent_id: Option<String>,
    pub thread_depth: i64,
    pub content: String,
    pub author_id: String,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

/// A comment with its replies, recursively
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThread {
    pub comment: Comment,
    pub replies: Vec<CommentThread>,
}

impl CommentThread {
    /// Number of comments in this thread, root included
    pub fn comment_count(&self) -> usize {
        1 + self
            .replies
            .iter()
            .map(CommentThread::comment_count)
            .sum::<usize>()
    }
}

/// Parameters for creating a comment
///
/// `page_id` and `block_id` are kept as two nullable fields so callers can
/// pass through whatever they received; the service rejects anything but
/// exactly one of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub page_id: Option<String>,
    pub block_id: Option<String>,
    pub parent_id: Option<String>,
    pub content: String,
}

impl NewComment {
    pub fn on_page(page_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            page_id: Some(page_id.into()),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn on_block(block_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            block_id: Some(block_id.into()),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn reply_to(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Paginated listing of top-level comments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentPage {
    pub comments: Vec<Comment>,
    pub total: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: String,
    pub comment_id: String,
    pub user_id: String,
    pub reaction_type: String,
    pub created_at: DateTime<Utc>,
}

/// Reactions of one type on a comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub reaction_type: String,
    pub count: i64,
    pub viewer_has_reacted: bool,
}

pub fn validate_reaction_type(reaction_type: &str) -> Result<(), ValidationError> {
    if ALLOWED_REACTIONS.contains(&reaction_type) {
        Ok(())
    } else {
        Err(ValidationError::InvalidReactionType(reaction_type.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mention {
    pub id: String,
    pub comment_id: String,
    pub mentioned_user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    pub comment_id: String,
    pub file_name: String,
    pub file_url: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub uploaded_by: String,
    pub order_index: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAttachment {
    pub file_name: String,
    pub file_url: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
    pub order_index: i64,
}

impl NewAttachment {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.file_name.trim().is_empty() {
            return Err(ValidationError::MissingField("file_name".to_string()));
        }
        if self.file_url.trim().is_empty() {
            return Err(ValidationError::MissingField("file_url".to_string()));
        }
        if self.file_name.chars().count() > 500 {
            return Err(ValidationError::TooLong {
                field: "file_name".to_string(),
                max: 500,
            });
        }
        if self.file_url.chars().count() > 1000 {
            return Err(ValidationError::TooLong {
                field: "file_url".to_string(),
                max: 1000,
            });
        }
        Ok(())
    }
}
