//! Comment Service - Threaded Discussion on Pages and Blocks
//!
//! Comments form a depth-capped tree per target. A reply's `thread_depth` is
//! its parent's plus one; replying to a comment already at the configured cap
//! fails with `InvalidOperation` rather than being flattened.
//!
//! # Deletion
//!
//! - **Soft delete** keeps the row (so replies keep their parent) and replaces
//!   the body with the configured placeholder.
//! - **Hard delete** removes the row; the reply subtree, reactions, mentions
//!   and attachments follow through `ON DELETE CASCADE`.
//!
//! # Mentions
//!
//! `@[Name](<uuid>)` mentions are stored only for members of the workspace the
//! target page belongs to. Anyone else is dropped without an error.

use crate::db::node_store;
use crate::db::{access_store, comment_store};
use crate::models::{
    validate_reaction_type, Attachment, Comment, CommentPage, CommentTarget, CommentThread,
    DeleteResult, Mention, NewAttachment, NewComment, Page, PermissionLevel, Reaction,
    ReactionSummary,
};
use crate::services::context::ServiceContext;
use crate::services::error::TreeServiceError;
use crate::services::permission::require_level;
use crate::utils::extract_mentions;
use chrono::Utc;
use libsql::Connection;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CommentService {
    ctx: ServiceContext,
}

impl CommentService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    //
    // COMMENT LIFECYCLE
    //

    pub async fn create_comment(
        &self,
        actor_id: &str,
        params: NewComment,
    ) -> Result<Comment, TreeServiceError> {
        let NewComment {
            page_id,
            block_id,
            parent_id,
            content,
        } = params;
        let target = CommentTarget::from_columns(page_id, block_id).ok_or_else(|| {
            TreeServiceError::invalid_operation("a comment targets exactly one page or block")
        })?;
        self.validate_content(&content)?;

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Comment, TreeServiceError> = async {
            let page = self.target_page(&conn, &target).await?;
            require_level(
                self.ctx.permissions.as_ref(),
                &page.id,
                actor_id,
                PermissionLevel::Comment,
            )
            .await?;

            let thread_depth = match parent_id.as_deref() {
                Some(parent_id) => self.reply_depth(&conn, parent_id, &target).await?,
                None => 0,
            };

            let now = Utc::now();
            let comment = Comment {
                id: self.ctx.ids.next_id(),
                target,
                parent_id,
                thread_depth,
                content,
                author_id: actor_id.to_string(),
                is_deleted: false,
                deleted_at: None,
                deleted_by: None,
                created_at: now,
                updated_at: now,
                edited_at: None,
            };
            comment_store::insert_comment(&conn, &comment).await?;
            self.store_mentions(&conn, &comment, &page.workspace_id)
                .await?;
            Ok(comment)
        }
        .await;
        self.ctx.finish(&conn, "create comment", result).await
    }

    /// Replace the body and re-derive mentions; author only
    pub async fn edit_comment(
        &self,
        actor_id: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<Comment, TreeServiceError> {
        self.validate_content(content)?;

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Comment, TreeServiceError> = async {
            let comment = self.load(&conn, comment_id).await?;
            if comment.is_deleted {
                return Err(TreeServiceError::invalid_operation(
                    "a deleted comment cannot be edited",
                ));
            }
            if comment.author_id != actor_id {
                return Err(TreeServiceError::permission_denied(
                    actor_id,
                    PermissionLevel::Edit,
                    format!("comment {}", comment_id),
                ));
            }

            comment_store::update_content(&conn, comment_id, content).await?;
            comment_store::delete_mentions(&conn, comment_id).await?;

            let updated = self.load(&conn, comment_id).await?;
            let page = self.target_page(&conn, &updated.target).await?;
            self.store_mentions(&conn, &updated, &page.workspace_id)
                .await?;
            Ok(updated)
        }
        .await;
        self.ctx.finish(&conn, "edit comment", result).await
    }

    /// Redact a comment in place; author or workspace administrator
    pub async fn soft_delete(
        &self,
        actor_id: &str,
        comment_id: &str,
    ) -> Result<Comment, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Comment, TreeServiceError> = async {
            let comment = self.load(&conn, comment_id).await?;
            if comment.author_id != actor_id && !self.is_admin_for(&conn, &comment, actor_id).await?
            {
                return Err(TreeServiceError::permission_denied(
                    actor_id,
                    PermissionLevel::Edit,
                    format!("comment {}", comment_id),
                ));
            }

            if !comment.is_deleted {
                comment_store::soft_delete(
                    &conn,
                    comment_id,
                    actor_id,
                    &self.ctx.config.deleted_comment_placeholder,
                )
                .await?;
                tracing::info!(comment_id, actor_id, "soft-deleted comment");
            }
            self.load(&conn, comment_id).await
        }
        .await;
        self.ctx.finish(&conn, "soft delete comment", result).await
    }

    /// Remove a comment and its whole reply subtree; administrators only
    pub async fn hard_delete(
        &self,
        actor_id: &str,
        comment_id: &str,
    ) -> Result<DeleteResult, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<DeleteResult, TreeServiceError> = async {
            let Some(comment) = comment_store::get_comment(&conn, comment_id).await? else {
                return Ok(DeleteResult::not_found());
            };
            if !self.is_admin_for(&conn, &comment, actor_id).await? {
                return Err(TreeServiceError::permission_denied(
                    actor_id,
                    PermissionLevel::Edit,
                    format!("comment {}", comment_id),
                ));
            }

            let removed_thread = comment_store::list_thread(&conn, comment_id).await?.len();
            comment_store::hard_delete(&conn, comment_id).await?;
            tracing::info!(
                comment_id,
                actor_id,
                comments = removed_thread,
                "hard-deleted comment thread"
            );
            Ok(DeleteResult::existed())
        }
        .await;
        self.ctx.finish(&conn, "hard delete comment", result).await
    }

    //
    // REACTIONS
    //

    /// Add a reaction; repeating an existing `(comment, user, type)` returns
    /// the stored row
    pub async fn add_reaction(
        &self,
        actor_id: &str,
        comment_id: &str,
        reaction_type: &str,
    ) -> Result<Reaction, TreeServiceError> {
        validate_reaction_type(reaction_type)
            .map_err(|e| TreeServiceError::invalid_operation(e.to_string()))?;

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Reaction, TreeServiceError> = async {
            let comment = self.load(&conn, comment_id).await?;
            let page = self.target_page(&conn, &comment.target).await?;
            require_level(
                self.ctx.permissions.as_ref(),
                &page.id,
                actor_id,
                PermissionLevel::Comment,
            )
            .await?;

            let candidate = Reaction {
                id: self.ctx.ids.next_id(),
                comment_id: comment_id.to_string(),
                user_id: actor_id.to_string(),
                reaction_type: reaction_type.to_string(),
                created_at: Utc::now(),
            };
            if !comment_store::insert_reaction_if_absent(&conn, &candidate).await? {
                tracing::debug!(comment_id, actor_id, reaction_type, "reaction already present");
            }

            comment_store::get_reaction(&conn, comment_id, actor_id, reaction_type)
                .await?
                .ok_or_else(|| TreeServiceError::not_found("reaction", &candidate.id))
        }
        .await;
        self.ctx.finish(&conn, "add reaction", result).await
    }

    /// Returns whether a reaction was removed
    pub async fn remove_reaction(
        &self,
        actor_id: &str,
        comment_id: &str,
        reaction_type: &str,
    ) -> Result<bool, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<bool, TreeServiceError> = async {
            let removed =
                comment_store::delete_reaction(&conn, comment_id, actor_id, reaction_type).await?;
            Ok(removed > 0)
        }
        .await;
        self.ctx.finish(&conn, "remove reaction", result).await
    }

    /// Reaction counts per type, flagging the ones `actor_id` added
    pub async fn reaction_summary(
        &self,
        actor_id: &str,
        comment_id: &str,
    ) -> Result<Vec<ReactionSummary>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let comment = self.load(&conn, comment_id).await?;
        self.require_view(&conn, &comment.target, actor_id).await?;
        Ok(comment_store::reaction_summary(&conn, comment_id, Some(actor_id)).await?)
    }

    //
    // ATTACHMENTS
    //

    /// Attach a file reference to a comment; author only
    pub async fn add_attachment(
        &self,
        actor_id: &str,
        comment_id: &str,
        params: NewAttachment,
    ) -> Result<Attachment, TreeServiceError> {
        params.validate()?;

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Attachment, TreeServiceError> = async {
            let comment = self.load(&conn, comment_id).await?;
            if comment.author_id != actor_id {
                return Err(TreeServiceError::permission_denied(
                    actor_id,
                    PermissionLevel::Edit,
                    format!("comment {}", comment_id),
                ));
            }

            let attachment = Attachment {
                id: self.ctx.ids.next_id(),
                comment_id: comment_id.to_string(),
                file_name: params.file_name.clone(),
                file_url: params.file_url.clone(),
                file_size: params.file_size,
                mime_type: params.mime_type.clone(),
                uploaded_by: actor_id.to_string(),
                order_index: params.order_index,
                created_at: Utc::now(),
            };
            comment_store::insert_attachment(&conn, &attachment).await?;
            Ok(attachment)
        }
        .await;
        self.ctx.finish(&conn, "add attachment", result).await
    }

    pub async fn list_attachments(
        &self,
        actor_id: &str,
        comment_id: &str,
    ) -> Result<Vec<Attachment>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let comment = self.load(&conn, comment_id).await?;
        self.require_view(&conn, &comment.target, actor_id).await?;
        Ok(comment_store::list_attachments(&conn, comment_id).await?)
    }

    //
    // READS
    //
    // Every read needs `view` on the page the comment's target belongs to.

    /// A soft-deleted comment is returned only with `include_deleted`
    pub async fn get_comment(
        &self,
        actor_id: &str,
        comment_id: &str,
        include_deleted: bool,
    ) -> Result<Option<Comment>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let Some(comment) = comment_store::get_comment(&conn, comment_id).await? else {
            return Ok(None);
        };
        self.require_view(&conn, &comment.target, actor_id).await?;
        Ok(Some(comment).filter(|c| include_deleted || !c.is_deleted))
    }

    /// Top-level comments on a target, newest first
    pub async fn list_comments(
        &self,
        actor_id: &str,
        target: &CommentTarget,
        limit: usize,
        offset: usize,
        include_deleted: bool,
    ) -> Result<CommentPage, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        self.require_view(&conn, target, actor_id).await?;
        let comments =
            comment_store::list_top_level(&conn, target, limit, offset, include_deleted).await?;
        let total = comment_store::count_top_level(&conn, target, include_deleted).await?;
        let has_more = (offset + comments.len()) < total as usize;
        Ok(CommentPage {
            comments,
            total,
            has_more,
        })
    }

    /// A comment with its nested replies, each level oldest first
    pub async fn thread(
        &self,
        actor_id: &str,
        root_id: &str,
    ) -> Result<CommentThread, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let root = self.load(&conn, root_id).await?;
        self.require_view(&conn, &root.target, actor_id).await?;
        let comments = comment_store::list_thread(&conn, root_id).await?;
        build_thread(root_id, comments).ok_or_else(|| TreeServiceError::not_found("comment", root_id))
    }

    /// Direct, non-deleted replies
    pub async fn replies_count(
        &self,
        actor_id: &str,
        comment_id: &str,
    ) -> Result<i64, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let comment = self.load(&conn, comment_id).await?;
        self.require_view(&conn, &comment.target, actor_id).await?;
        Ok(comment_store::count_replies(&conn, comment_id).await?)
    }

    pub async fn mentions(
        &self,
        actor_id: &str,
        comment_id: &str,
    ) -> Result<Vec<Mention>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let comment = self.load(&conn, comment_id).await?;
        self.require_view(&conn, &comment.target, actor_id).await?;
        Ok(comment_store::list_mentions(&conn, comment_id).await?)
    }

    //
    // HELPERS
    //

    fn validate_content(&self, content: &str) -> Result<(), TreeServiceError> {
        let length = content.chars().count();
        if content.trim().is_empty() || length > self.ctx.config.max_comment_length {
            return Err(TreeServiceError::invalid_operation(format!(
                "comment content must be 1 to {} characters",
                self.ctx.config.max_comment_length
            )));
        }
        Ok(())
    }

    async fn load(&self, conn: &Connection, comment_id: &str) -> Result<Comment, TreeServiceError> {
        comment_store::get_comment(conn, comment_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found("comment", comment_id))
    }

    /// The page a target belongs to (the block's page for block targets)
    async fn target_page(
        &self,
        conn: &Connection,
        target: &CommentTarget,
    ) -> Result<Page, TreeServiceError> {
        let page_id = match target {
            CommentTarget::Page(page_id) => page_id.clone(),
            CommentTarget::Block(block_id) => {
                node_store::get_block(conn, block_id)
                    .await?
                    .ok_or_else(|| TreeServiceError::not_found("block", block_id))?
                    .page_id
            }
        };
        node_store::get_page(conn, &page_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found("page", &page_id))
    }

    async fn require_view(
        &self,
        conn: &Connection,
        target: &CommentTarget,
        actor_id: &str,
    ) -> Result<(), TreeServiceError> {
        let page = self.target_page(conn, target).await?;
        require_level(
            self.ctx.permissions.as_ref(),
            &page.id,
            actor_id,
            PermissionLevel::View,
        )
        .await
    }

    async fn reply_depth(
        &self,
        conn: &Connection,
        parent_id: &str,
        target: &CommentTarget,
    ) -> Result<i64, TreeServiceError> {
        let parent = self.load(conn, parent_id).await?;
        if &parent.target != target {
            return Err(TreeServiceError::invalid_operation(
                "a reply must target the same page or block as its parent",
            ));
        }
        if parent.thread_depth >= self.ctx.config.max_thread_depth {
            return Err(TreeServiceError::invalid_operation(
                "maximum thread depth reached",
            ));
        }
        Ok(parent.thread_depth + 1)
    }

    async fn is_admin_for(
        &self,
        conn: &Connection,
        comment: &Comment,
        actor_id: &str,
    ) -> Result<bool, TreeServiceError> {
        let page = self.target_page(conn, &comment.target).await?;
        Ok(access_store::get_member(conn, &page.workspace_id, actor_id)
            .await?
            .is_some_and(|member| member.role.is_administrative()))
    }

    async fn store_mentions(
        &self,
        conn: &Connection,
        comment: &Comment,
        workspace_id: &str,
    ) -> Result<(), TreeServiceError> {
        for user_id in extract_mentions(&comment.content) {
            if access_store::get_member(conn, workspace_id, &user_id)
                .await?
                .is_none()
            {
                tracing::debug!(
                    comment_id = %comment.id,
                    user_id = %user_id,
                    "dropped mention of non-member"
                );
                continue;
            }
            let mention = Mention {
                id: self.ctx.ids.next_id(),
                comment_id: comment.id.clone(),
                mentioned_user_id: user_id,
                created_at: Utc::now(),
            };
            comment_store::insert_mention(conn, &mention).await?;
        }
        Ok(())
    }
}

/// Nest a flat thread listing under `root_id`
fn build_thread(root_id: &str, comments: Vec<Comment>) -> Option<CommentThread> {
    let mut root = None;
    let mut children: HashMap<String, Vec<Comment>> = HashMap::new();
    for comment in comments {
        if comment.id == root_id {
            root = Some(comment);
        } else if let Some(parent_id) = comment.parent_id.clone() {
            children.entry(parent_id).or_default().push(comment);
        }
    }

    fn attach(comment: Comment, children: &mut HashMap<String, Vec<Comment>>) -> CommentThread {
        let replies = children
            .remove(&comment.id)
            .unwrap_or_default()
            .into_iter()
            .map(|reply| attach(reply, children))
            .collect();
        CommentThread { comment, replies }
    }

    root.map(|comment| attach(comment, &mut children))
}


#[cfg(test)]
#[path = "comment_service_test.rs"]
mod comment_service_test;
