//! Row Conversion Helpers
//!
//! Columns are looked up by name so the SELECT lists in the store modules can
//! be reordered freely. Booleans are stored as `0`/`1` integers and
//! timestamps as RFC 3339 text.

use crate::db::error::DatabaseError;
use crate::models::{
    Attachment, Block, BlockDescriptor, Comment, CommentTarget, Invitation, InvitationStatus,
    Mention, Page, PageFavorite, PageGrant, PageVersion, PermissionLevel, Reaction, Workspace,
    WorkspaceMember, WorkspaceRole,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Typed extraction of a single SQLite value
pub(crate) trait FromColumn: Sized {
    fn from_column(value: libsql::Value, column: &str) -> Result<Self, DatabaseError>;
}

impl FromColumn for String {
    fn from_column(value: libsql::Value, column: &str) -> Result<Self, DatabaseError> {
        match value {
            libsql::Value::Text(text) => Ok(text),
            libsql::Value::Null => Err(DatabaseError::malformed_row(format!(
                "column `{}` expected text but was NULL",
                column
            ))),
            _ => Err(DatabaseError::malformed_row(format!(
                "column `{}` expected text value",
                column
            ))),
        }
    }
}

impl FromColumn for i64 {
    fn from_column(value: libsql::Value, column: &str) -> Result<Self, DatabaseError> {
        match value {
            libsql::Value::Integer(num) => Ok(num),
            _ => Err(DatabaseError::malformed_row(format!(
                "column `{}` expected integer value",
                column
            ))),
        }
    }
}

impl<T: FromColumn> FromColumn for Option<T> {
    fn from_column(value: libsql::Value, column: &str) -> Result<Self, DatabaseError> {
        match value {
            libsql::Value::Null => Ok(None),
            other => T::from_column(other, column).map(Some),
        }
    }
}

/// Read a column by name
pub(crate) fn get<T: FromColumn>(row: &libsql::Row, column: &str) -> Result<T, DatabaseError> {
    for idx in 0..row.column_count() {
        if row
            .column_name(idx)
            .is_some_and(|name| name.eq_ignore_ascii_case(column))
        {
            let value = row.get_value(idx)?;
            return T::from_column(value, column);
        }
    }
    Err(DatabaseError::malformed_row(format!(
        "column `{}` not found in row",
        column
    )))
}

/// Drain a result set through `map`
pub(crate) async fn collect_rows<T>(
    mut rows: libsql::Rows,
    map: fn(&libsql::Row) -> Result<T, DatabaseError>,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    while let Some(row) = rows.next().await? {
        out.push(map(&row)?);
    }
    Ok(out)
}

/// First row of a result set, if any
pub(crate) async fn first_row<T>(
    mut rows: libsql::Rows,
    map: fn(&libsql::Row) -> Result<T, DatabaseError>,
) -> Result<Option<T>, DatabaseError> {
    match rows.next().await? {
        Some(row) => map(&row).map(Some),
        None => Ok(None),
    }
}

fn get_bool(row: &libsql::Row, column: &str) -> Result<bool, DatabaseError> {
    Ok(get::<i64>(row, column)? != 0)
}

fn get_timestamp(row: &libsql::Row, column: &str) -> Result<DateTime<Utc>, DatabaseError> {
    parse_timestamp(&get::<String>(row, column)?)
}

fn get_optional_timestamp(
    row: &libsql::Row,
    column: &str,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    get::<Option<String>>(row, column)?
        .map(|raw| parse_timestamp(&raw))
        .transpose()
}

pub(crate) fn bool_to_i64(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

/// Current time in the stored text format
pub(crate) fn now_text() -> String {
    timestamp_text(&Utc::now())
}

pub(crate) fn timestamp_text(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Parse a stored timestamp
///
/// Accepts RFC 3339 (written by this crate) and SQLite's
/// `CURRENT_TIMESTAMP` form (`YYYY-MM-DD HH:MM:SS`), which is UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| DatabaseError::malformed_row(format!("bad timestamp '{}': {}", raw, e)))
}

fn parse_json(raw: &str, column: &str) -> Result<Value, DatabaseError> {
    serde_json::from_str(raw)
        .map_err(|e| DatabaseError::malformed_row(format!("column `{}` is not JSON: {}", column, e)))
}

pub(crate) const PAGE_COLUMNS: &str = "id, workspace_id, parent_id, title, icon, cover_image, \
     position, is_archived, created_by, version, created_at, updated_at";

pub(crate) fn page_from_row(row: &libsql::Row) -> Result<Page, DatabaseError> {
    Ok(Page {
        id: get(row, "id")?,
        workspace_id: get(row, "workspace_id")?,
        parent_id: get(row, "parent_id")?,
        title: get(row, "title")?,
        icon: get(row, "icon")?,
        cover_image: get(row, "cover_image")?,
        order: get(row, "position")?,
        is_archived: get_bool(row, "is_archived")?,
        created_by: get(row, "created_by")?,
        version: get(row, "version")?,
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_timestamp(row, "updated_at")?,
    })
}

pub(crate) const BLOCK_COLUMNS: &str = "id, page_id, parent_id, block_type, content, position, \
     is_archived, version, created_at, updated_at";

pub(crate) fn block_from_row(row: &libsql::Row) -> Result<Block, DatabaseError> {
    Ok(Block {
        id: get(row, "id")?,
        page_id: get(row, "page_id")?,
        parent_id: get(row, "parent_id")?,
        block_type: get(row, "block_type")?,
        content: parse_json(&get::<String>(row, "content")?, "content")?,
        order: get(row, "position")?,
        is_archived: get_bool(row, "is_archived")?,
        version: get(row, "version")?,
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_timestamp(row, "updated_at")?,
    })
}

pub(crate) const VERSION_COLUMNS: &str = "id, page_id, version_number, title, icon, cover_image, \
     content_snapshot, created_by, change_summary, created_at";

pub(crate) fn version_from_row(row: &libsql::Row) -> Result<PageVersion, DatabaseError> {
    let raw_snapshot: String = get(row, "content_snapshot")?;
    let content_snapshot: Vec<BlockDescriptor> = serde_json::from_str(&raw_snapshot)
        .map_err(|e| DatabaseError::malformed_row(format!("invalid content_snapshot: {}", e)))?;

    Ok(PageVersion {
        id: get(row, "id")?,
        page_id: get(row, "page_id")?,
        version_number: get(row, "version_number")?,
        title: get(row, "title")?,
        icon: get(row, "icon")?,
        cover_image: get(row, "cover_image")?,
        content_snapshot,
        created_by: get(row, "created_by")?,
        change_summary: get(row, "change_summary")?,
        created_at: get_timestamp(row, "created_at")?,
    })
}

pub(crate) const COMMENT_COLUMNS: &str = "id, page_id, block_id, parent_id, thread_depth, content, \
     author_id, is_deleted, deleted_at, deleted_by, created_at, updated_at, edited_at";

pub(crate) fn comment_from_row(row: &libsql::Row) -> Result<Comment, DatabaseError> {
    let id: String = get(row, "id")?;
    let target = CommentTarget::from_columns(get(row, "page_id")?, get(row, "block_id")?)
        .ok_or_else(|| {
            DatabaseError::malformed_row(format!("comment {} has no single target", id))
        })?;

    Ok(Comment {
        id,
        target,
        parent_id: get(row, "parent_id")?,
        thread_depth: get(row, "thread_depth")?,
        content: get(row, "content")?,
        author_id: get(row, "author_id")?,
        is_deleted: get_bool(row, "is_deleted")?,
        deleted_at: get_optional_timestamp(row, "deleted_at")?,
        deleted_by: get(row, "deleted_by")?,
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_timestamp(row, "updated_at")?,
        edited_at: get_optional_timestamp(row, "edited_at")?,
    })
}

pub(crate) fn reaction_from_row(row: &libsql::Row) -> Result<Reaction, DatabaseError> {
    Ok(Reaction {
        id: get(row, "id")?,
        comment_id: get(row, "comment_id")?,
        user_id: get(row, "user_id")?,
        reaction_type: get(row, "reaction_type")?,
        created_at: get_timestamp(row, "created_at")?,
    })
}

pub(crate) fn mention_from_row(row: &libsql::Row) -> Result<Mention, DatabaseError> {
    Ok(Mention {
        id: get(row, "id")?,
        comment_id: get(row, "comment_id")?,
        mentioned_user_id: get(row, "mentioned_user_id")?,
        created_at: get_timestamp(row, "created_at")?,
    })
}

pub(crate) fn attachment_from_row(row: &libsql::Row) -> Result<Attachment, DatabaseError> {
    Ok(Attachment {
        id: get(row, "id")?,
        comment_id: get(row, "comment_id")?,
        file_name: get(row, "file_name")?,
        file_url: get(row, "file_url")?,
        file_size: get(row, "file_size")?,
        mime_type: get(row, "mime_type")?,
        uploaded_by: get(row, "uploaded_by")?,
        order_index: get(row, "order_index")?,
        created_at: get_timestamp(row, "created_at")?,
    })
}

pub(crate) fn workspace_from_row(row: &libsql::Row) -> Result<Workspace, DatabaseError> {
    Ok(Workspace {
        id: get(row, "id")?,
        name: get(row, "name")?,
        owner_id: get(row, "owner_id")?,
        created_at: get_timestamp(row, "created_at")?,
    })
}

pub(crate) fn member_from_row(row: &libsql::Row) -> Result<WorkspaceMember, DatabaseError> {
    let raw_role: String = get(row, "role")?;
    let role: WorkspaceRole = raw_role.parse().map_err(DatabaseError::malformed_row)?;
    Ok(WorkspaceMember {
        workspace_id: get(row, "workspace_id")?,
        user_id: get(row, "user_id")?,
        role,
        joined_at: get_timestamp(row, "joined_at")?,
    })
}

pub(crate) fn grant_from_row(row: &libsql::Row) -> Result<PageGrant, DatabaseError> {
    let raw_level: String = get(row, "level")?;
    let level: PermissionLevel = raw_level.parse().map_err(DatabaseError::malformed_row)?;
    Ok(PageGrant {
        id: get(row, "id")?,
        page_id: get(row, "page_id")?,
        user_id: get(row, "user_id")?,
        level,
        granted_by: get(row, "granted_by")?,
        created_at: get_timestamp(row, "created_at")?,
        updated_at: get_timestamp(row, "updated_at")?,
    })
}

pub(crate) fn favorite_from_row(row: &libsql::Row) -> Result<PageFavorite, DatabaseError> {
    Ok(PageFavorite {
        id: get(row, "id")?,
        user_id: get(row, "user_id")?,
        page_id: get(row, "page_id")?,
        created_at: get_timestamp(row, "created_at")?,
    })
}

pub(crate) const INVITATION_COLUMNS: &str = "id, workspace_id, inviter_id, invitee_email, role, \
     token, status, expires_at, created_at, accepted_at";

pub(crate) fn invitation_from_row(row: &libsql::Row) -> Result<Invitation, DatabaseError> {
    let role: WorkspaceRole = get::<String>(row, "role")?
        .parse()
        .map_err(DatabaseError::malformed_row)?;
    let status: InvitationStatus = get::<String>(row, "status")?
        .parse()
        .map_err(DatabaseError::malformed_row)?;
    Ok(Invitation {
        id: get(row, "id")?,
        workspace_id: get(row, "workspace_id")?,
        inviter_id: get(row, "inviter_id")?,
        invitee_email: get(row, "invitee_email")?,
        role,
        token: get(row, "token")?,
        status,
        expires_at: get_timestamp(row, "expires_at")?,
        created_at: get_timestamp(row, "created_at")?,
        accepted_at: get_optional_timestamp(row, "accepted_at")?,
    })
}
