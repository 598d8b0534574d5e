//! Comment Store - Comment Tree and Side Tables
//!
//! Covers `comments`, `comment_reactions`, `comment_mentions` and
//! `comment_attachments`. Hard deletes rely on the `ON DELETE CASCADE`
//! declared on every side table and on `comments.parent_id`.

use crate::db::error::DatabaseError;
use crate::db::rows::{
    self, attachment_from_row, bool_to_i64, collect_rows, comment_from_row, first_row,
    mention_from_row, reaction_from_row, COMMENT_COLUMNS,
};
use crate::models::{Attachment, Comment, CommentTarget, Mention, Reaction, ReactionSummary};
use libsql::{params, Connection};

fn target_columns(target: &CommentTarget) -> (&'static str, &str) {
    match target {
        CommentTarget::Page(id) => ("page_id", id.as_str()),
        CommentTarget::Block(id) => ("block_id", id.as_str()),
    }
}

//
// COMMENTS
//

pub async fn get_comment(conn: &Connection, id: &str) -> Result<Option<Comment>, DatabaseError> {
    let sql = format!("SELECT {} FROM comments WHERE id = ?", COMMENT_COLUMNS);
    let rows = conn
        .query(&sql, params![id])
        .await
        .map_err(|e| DatabaseError::from_statement("load comment", e))?;
    first_row(rows, comment_from_row).await
}

pub async fn insert_comment(conn: &Connection, comment: &Comment) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO comments (id, page_id, block_id, parent_id, thread_depth, content, author_id,
                               is_deleted, deleted_at, deleted_by, created_at, updated_at, edited_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, ?, NULL)",
        params![
            comment.id.as_str(),
            comment.target.page_id(),
            comment.target.block_id(),
            comment.parent_id.as_deref(),
            comment.thread_depth,
            comment.content.as_str(),
            comment.author_id.as_str(),
            bool_to_i64(comment.is_deleted),
            rows::timestamp_text(&comment.created_at),
            rows::timestamp_text(&comment.updated_at)
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("insert comment", e))?;
    Ok(())
}

/// Replace the body and stamp the edit time
pub async fn update_content(
    conn: &Connection,
    id: &str,
    content: &str,
) -> Result<u64, DatabaseError> {
    let now = rows::now_text();
    conn.execute(
        "UPDATE comments SET content = ?, edited_at = ?, updated_at = ? WHERE id = ?",
        params![content, now.as_str(), now.as_str(), id],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("update comment", e))
}

/// Mark deleted and redact the body; the row stays so replies keep their parent
pub async fn soft_delete(
    conn: &Connection,
    id: &str,
    actor_id: &str,
    placeholder: &str,
) -> Result<u64, DatabaseError> {
    let now = rows::now_text();
    conn.execute(
        "UPDATE comments SET is_deleted = 1, deleted_at = ?, deleted_by = ?, content = ?,
                             updated_at = ?
         WHERE id = ?",
        params![now.as_str(), actor_id, placeholder, now.as_str(), id],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("soft delete comment", e))
}

pub async fn hard_delete(conn: &Connection, id: &str) -> Result<u64, DatabaseError> {
    conn.execute("DELETE FROM comments WHERE id = ?", params![id])
        .await
        .map_err(|e| DatabaseError::from_statement("delete comment", e))
}

/// One page of top-level comments on a target, newest first
pub async fn list_top_level(
    conn: &Connection,
    target: &CommentTarget,
    limit: usize,
    offset: usize,
    include_deleted: bool,
) -> Result<Vec<Comment>, DatabaseError> {
    let (column, id) = target_columns(target);
    let deleted_clause = if include_deleted {
        ""
    } else {
        " AND is_deleted = 0"
    };
    let sql = format!(
        "SELECT {} FROM comments
         WHERE {} = ? AND parent_id IS NULL{}
         ORDER BY created_at DESC, rowid DESC
         LIMIT ? OFFSET ?",
        COMMENT_COLUMNS, column, deleted_clause
    );
    let rows = conn
        .query(&sql, params![id, limit as i64, offset as i64])
        .await
        .map_err(|e| DatabaseError::from_statement("list comments", e))?;
    collect_rows(rows, comment_from_row).await
}

pub async fn count_top_level(
    conn: &Connection,
    target: &CommentTarget,
    include_deleted: bool,
) -> Result<i64, DatabaseError> {
    let (column, id) = target_columns(target);
    let deleted_clause = if include_deleted {
        ""
    } else {
        " AND is_deleted = 0"
    };
    let sql = format!(
        "SELECT COUNT(*) AS total FROM comments WHERE {} = ? AND parent_id IS NULL{}",
        column, deleted_clause
    );
    let mut rows = conn
        .query(&sql, params![id])
        .await
        .map_err(|e| DatabaseError::from_statement("count comments", e))?;
    match rows.next().await? {
        Some(row) => rows::get(&row, "total"),
        None => Ok(0),
    }
}

/// A comment and all of its transitive replies, oldest first
pub async fn list_thread(conn: &Connection, root_id: &str) -> Result<Vec<Comment>, DatabaseError> {
    let sql = format!(
        "WITH RECURSIVE thread(id) AS (
             SELECT id FROM comments WHERE id = ?
             UNION
             SELECT c.id FROM comments c JOIN thread t ON c.parent_id = t.id
         )
         SELECT {} FROM comments WHERE id IN (SELECT id FROM thread)
         ORDER BY created_at ASC, rowid ASC",
        COMMENT_COLUMNS
    );
    let rows = conn
        .query(&sql, params![root_id])
        .await
        .map_err(|e| DatabaseError::from_statement("load comment thread", e))?;
    collect_rows(rows, comment_from_row).await
}

/// Direct, non-deleted replies
pub async fn count_replies(conn: &Connection, id: &str) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) AS total FROM comments WHERE parent_id = ? AND is_deleted = 0",
            params![id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("count replies", e))?;
    match rows.next().await? {
        Some(row) => rows::get(&row, "total"),
        None => Ok(0),
    }
}

//
// REACTIONS
//

/// Insert a reaction unless the `(comment, user, type)` triple already exists
///
/// Returns `true` when a row was inserted.
pub async fn insert_reaction_if_absent(
    conn: &Connection,
    reaction: &Reaction,
) -> Result<bool, DatabaseError> {
    let inserted = conn
        .execute(
            "INSERT INTO comment_reactions (id, comment_id, user_id, reaction_type, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (comment_id, user_id, reaction_type) DO NOTHING",
            params![
                reaction.id.as_str(),
                reaction.comment_id.as_str(),
                reaction.user_id.as_str(),
                reaction.reaction_type.as_str(),
                rows::timestamp_text(&reaction.created_at)
            ],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("insert reaction", e))?;
    Ok(inserted > 0)
}

pub async fn get_reaction(
    conn: &Connection,
    comment_id: &str,
    user_id: &str,
    reaction_type: &str,
) -> Result<Option<Reaction>, DatabaseError> {
    let rows = conn
        .query(
            "SELECT id, comment_id, user_id, reaction_type, created_at FROM comment_reactions
             WHERE comment_id = ? AND user_id = ? AND reaction_type = ?",
            params![comment_id, user_id, reaction_type],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("load reaction", e))?;
    first_row(rows, reaction_from_row).await
}

pub async fn delete_reaction(
    conn: &Connection,
    comment_id: &str,
    user_id: &str,
    reaction_type: &str,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM comment_reactions WHERE comment_id = ? AND user_id = ? AND reaction_type = ?",
        params![comment_id, user_id, reaction_type],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("delete reaction", e))
}

/// Per-type counts, with whether `viewer_id` is among the reactors
pub async fn reaction_summary(
    conn: &Connection,
    comment_id: &str,
    viewer_id: Option<&str>,
) -> Result<Vec<ReactionSummary>, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT reaction_type,
                    COUNT(*) AS total,
                    SUM(CASE WHEN user_id = ?1 THEN 1 ELSE 0 END) AS mine
             FROM comment_reactions
             WHERE comment_id = ?2
             GROUP BY reaction_type
             ORDER BY MIN(rowid)",
            params![viewer_id, comment_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("summarize reactions", e))?;

    let mut summary = Vec::new();
    while let Some(row) = rows.next().await? {
        summary.push(ReactionSummary {
            reaction_type: rows::get(&row, "reaction_type")?,
            count: rows::get(&row, "total")?,
            viewer_has_reacted: rows::get::<i64>(&row, "mine")? > 0,
        });
    }
    Ok(summary)
}

//
// MENTIONS
//

pub async fn insert_mention(conn: &Connection, mention: &Mention) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO comment_mentions (id, comment_id, mentioned_user_id, created_at)
         VALUES (?, ?, ?, ?)
         ON CONFLICT (comment_id, mentioned_user_id) DO NOTHING",
        params![
            mention.id.as_str(),
            mention.comment_id.as_str(),
            mention.mentioned_user_id.as_str(),
            rows::timestamp_text(&mention.created_at)
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("insert mention", e))?;
    Ok(())
}

pub async fn delete_mentions(conn: &Connection, comment_id: &str) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM comment_mentions WHERE comment_id = ?",
        params![comment_id],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("delete mentions", e))
}

pub async fn list_mentions(conn: &Connection, comment_id: &str) -> Result<Vec<Mention>, DatabaseError> {
    let rows = conn
        .query(
            "SELECT id, comment_id, mentioned_user_id, created_at FROM comment_mentions
             WHERE comment_id = ? ORDER BY rowid",
            params![comment_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("list mentions", e))?;
    collect_rows(rows, mention_from_row).await
}

//
// ATTACHMENTS
//

pub async fn insert_attachment(
    conn: &Connection,
    attachment: &Attachment,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO comment_attachments (id, comment_id, file_name, file_url, file_size,
                                          mime_type, uploaded_by, order_index, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            attachment.id.as_str(),
            attachment.comment_id.as_str(),
            attachment.file_name.as_str(),
            attachment.file_url.as_str(),
            attachment.file_size,
            attachment.mime_type.as_deref(),
            attachment.uploaded_by.as_str(),
            attachment.order_index,
            rows::timestamp_text(&attachment.created_at)
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("insert attachment", e))?;
    Ok(())
}

pub async fn list_attachments(
    conn: &Connection,
    comment_id: &str,
) -> Result<Vec<Attachment>, DatabaseError> {
    let rows = conn
        .query(
            "SELECT id, comment_id, file_name, file_url, file_size, mime_type, uploaded_by,
                    order_index, created_at
             FROM comment_attachments WHERE comment_id = ?
             ORDER BY order_index, rowid",
            params![comment_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("list attachments", e))?;
    collect_rows(rows, attachment_from_row).await
}
