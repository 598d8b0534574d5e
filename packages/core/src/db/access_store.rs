//! Access Store - Workspaces, Membership, Page Grants, Favorites and
//! Invitations

use crate::db::error::DatabaseError;
use crate::db::rows::{
    self, collect_rows, favorite_from_row, first_row, grant_from_row, invitation_from_row,
    member_from_row, page_from_row, workspace_from_row, INVITATION_COLUMNS, PAGE_COLUMNS,
};
use crate::models::{
    Invitation, InvitationStatus, Page, PageFavorite, PageGrant, PermissionLevel, Workspace,
    WorkspaceMember, WorkspaceRole,
};
use chrono::{DateTime, Utc};
use libsql::{params, Connection};

//
// WORKSPACES
//

pub async fn insert_workspace(conn: &Connection, workspace: &Workspace) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO workspaces (id, name, owner_id, created_at) VALUES (?, ?, ?, ?)",
        params![
            workspace.id.as_str(),
            workspace.name.as_str(),
            workspace.owner_id.as_str(),
            rows::timestamp_text(&workspace.created_at)
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("insert workspace", e))?;
    Ok(())
}

pub async fn get_workspace(conn: &Connection, id: &str) -> Result<Option<Workspace>, DatabaseError> {
    let rows = conn
        .query(
            "SELECT id, name, owner_id, created_at FROM workspaces WHERE id = ?",
            params![id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("load workspace", e))?;
    first_row(rows, workspace_from_row).await
}

//
// MEMBERSHIP
//

pub async fn insert_member(conn: &Connection, member: &WorkspaceMember) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO workspace_members (workspace_id, user_id, role, joined_at) VALUES (?, ?, ?, ?)",
        params![
            member.workspace_id.as_str(),
            member.user_id.as_str(),
            member.role.as_str(),
            rows::timestamp_text(&member.joined_at)
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("insert workspace member", e))?;
    Ok(())
}

pub async fn get_member(
    conn: &Connection,
    workspace_id: &str,
    user_id: &str,
) -> Result<Option<WorkspaceMember>, DatabaseError> {
    let rows = conn
        .query(
            "SELECT workspace_id, user_id, role, joined_at FROM workspace_members
             WHERE workspace_id = ? AND user_id = ?",
            params![workspace_id, user_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("load workspace member", e))?;
    first_row(rows, member_from_row).await
}

pub async fn update_member_role(
    conn: &Connection,
    workspace_id: &str,
    user_id: &str,
    role: WorkspaceRole,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE workspace_members SET role = ? WHERE workspace_id = ? AND user_id = ?",
        params![role.as_str(), workspace_id, user_id],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("update member role", e))
}

pub async fn delete_member(
    conn: &Connection,
    workspace_id: &str,
    user_id: &str,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM workspace_members WHERE workspace_id = ? AND user_id = ?",
        params![workspace_id, user_id],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("delete workspace member", e))
}

/// Members in join order
pub async fn list_members(
    conn: &Connection,
    workspace_id: &str,
) -> Result<Vec<WorkspaceMember>, DatabaseError> {
    let rows = conn
        .query(
            "SELECT workspace_id, user_id, role, joined_at FROM workspace_members
             WHERE workspace_id = ? ORDER BY joined_at, rowid",
            params![workspace_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("list workspace members", e))?;
    collect_rows(rows, member_from_row).await
}

pub async fn count_owners(conn: &Connection, workspace_id: &str) -> Result<i64, DatabaseError> {
    let mut result = conn
        .query(
            "SELECT COUNT(*) AS total FROM workspace_members WHERE workspace_id = ? AND role = 'owner'",
            params![workspace_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("count owners", e))?;
    match result.next().await? {
        Some(row) => rows::get(&row, "total"),
        None => Ok(0),
    }
}

//
// PAGE GRANTS
//

/// Insert or replace the level of the `(page, user)` grant
pub async fn upsert_grant(conn: &Connection, grant: &PageGrant) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO page_permissions (id, page_id, user_id, level, granted_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (page_id, user_id)
         DO UPDATE SET level = excluded.level,
                       granted_by = excluded.granted_by,
                       updated_at = excluded.updated_at",
        params![
            grant.id.as_str(),
            grant.page_id.as_str(),
            grant.user_id.as_str(),
            grant.level.as_str(),
            grant.granted_by.as_deref(),
            rows::timestamp_text(&grant.created_at),
            rows::timestamp_text(&grant.updated_at)
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("upsert page grant", e))?;
    Ok(())
}

pub async fn get_grant(
    conn: &Connection,
    page_id: &str,
    user_id: &str,
) -> Result<Option<PageGrant>, DatabaseError> {
    let rows = conn
        .query(
            "SELECT id, page_id, user_id, level, granted_by, created_at, updated_at
             FROM page_permissions WHERE page_id = ? AND user_id = ?",
            params![page_id, user_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("load page grant", e))?;
    first_row(rows, grant_from_row).await
}

pub async fn delete_grant(
    conn: &Connection,
    page_id: &str,
    user_id: &str,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM page_permissions WHERE page_id = ? AND user_id = ?",
        params![page_id, user_id],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("delete page grant", e))
}

pub async fn list_grants(conn: &Connection, page_id: &str) -> Result<Vec<PageGrant>, DatabaseError> {
    let rows = conn
        .query(
            "SELECT id, page_id, user_id, level, granted_by, created_at, updated_at
             FROM page_permissions WHERE page_id = ? ORDER BY created_at, rowid",
            params![page_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("list page grants", e))?;
    collect_rows(rows, grant_from_row).await
}

//
// FAVORITES
//

/// Returns `false` when the user already favorited the page
pub async fn insert_favorite_if_absent(
    conn: &Connection,
    favorite: &PageFavorite,
) -> Result<bool, DatabaseError> {
    let inserted = conn
        .execute(
            "INSERT INTO page_favorites (id, user_id, page_id, created_at) VALUES (?, ?, ?, ?)
             ON CONFLICT (user_id, page_id) DO NOTHING",
            params![
                favorite.id.as_str(),
                favorite.user_id.as_str(),
                favorite.page_id.as_str(),
                rows::timestamp_text(&favorite.created_at)
            ],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("insert page favorite", e))?;
    Ok(inserted > 0)
}

pub async fn get_favorite(
    conn: &Connection,
    user_id: &str,
    page_id: &str,
) -> Result<Option<PageFavorite>, DatabaseError> {
    let rows = conn
        .query(
            "SELECT id, user_id, page_id, created_at FROM page_favorites
             WHERE user_id = ? AND page_id = ?",
            params![user_id, page_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("load page favorite", e))?;
    first_row(rows, favorite_from_row).await
}

pub async fn delete_favorite(
    conn: &Connection,
    user_id: &str,
    page_id: &str,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM page_favorites WHERE user_id = ? AND page_id = ?",
        params![user_id, page_id],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("delete page favorite", e))
}

/// Live favorited pages, most recently favorited first
pub async fn list_favorite_pages(
    conn: &Connection,
    user_id: &str,
    limit: usize,
    offset: usize,
) -> Result<Vec<Page>, DatabaseError> {
    let columns = PAGE_COLUMNS
        .split(',')
        .map(|column| format!("p.{0} AS {0}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {} FROM page_favorites f JOIN pages p ON p.id = f.page_id
         WHERE f.user_id = ? AND p.is_archived = 0
         ORDER BY f.created_at DESC, f.rowid DESC LIMIT ? OFFSET ?",
        columns
    );
    let rows = conn
        .query(&sql, params![user_id, limit as i64, offset as i64])
        .await
        .map_err(|e| DatabaseError::from_statement("list favorite pages", e))?;
    collect_rows(rows, page_from_row).await
}

/// Every favorite of the user, archived pages included
pub async fn count_favorites(conn: &Connection, user_id: &str) -> Result<i64, DatabaseError> {
    let mut result = conn
        .query(
            "SELECT COUNT(*) AS total FROM page_favorites WHERE user_id = ?",
            params![user_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("count favorites", e))?;
    match result.next().await? {
        Some(row) => rows::get(&row, "total"),
        None => Ok(0),
    }
}

//
// INVITATIONS
//

pub async fn insert_invitation(
    conn: &Connection,
    invitation: &Invitation,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO workspace_invitations (id, workspace_id, inviter_id, invitee_email, role,
                                            token, status, expires_at, created_at, accepted_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            invitation.id.as_str(),
            invitation.workspace_id.as_str(),
            invitation.inviter_id.as_str(),
            invitation.invitee_email.as_str(),
            invitation.role.as_str(),
            invitation.token.as_str(),
            invitation.status.as_str(),
            rows::timestamp_text(&invitation.expires_at),
            rows::timestamp_text(&invitation.created_at),
            invitation.accepted_at.as_ref().map(rows::timestamp_text)
        ],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("insert invitation", e))?;
    Ok(())
}

pub async fn get_invitation(
    conn: &Connection,
    id: &str,
) -> Result<Option<Invitation>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM workspace_invitations WHERE id = ?",
        INVITATION_COLUMNS
    );
    let rows = conn
        .query(&sql, params![id])
        .await
        .map_err(|e| DatabaseError::from_statement("load invitation", e))?;
    first_row(rows, invitation_from_row).await
}

pub async fn get_invitation_by_token(
    conn: &Connection,
    token: &str,
) -> Result<Option<Invitation>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM workspace_invitations WHERE token = ?",
        INVITATION_COLUMNS
    );
    let rows = conn
        .query(&sql, params![token])
        .await
        .map_err(|e| DatabaseError::from_statement("load invitation by token", e))?;
    first_row(rows, invitation_from_row).await
}

/// The open invitation for an address, if any (`email` must be normalized)
pub async fn get_pending_invitation(
    conn: &Connection,
    workspace_id: &str,
    email: &str,
) -> Result<Option<Invitation>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM workspace_invitations
         WHERE workspace_id = ? AND invitee_email = ? AND status = 'pending'",
        INVITATION_COLUMNS
    );
    let rows = conn
        .query(&sql, params![workspace_id, email])
        .await
        .map_err(|e| DatabaseError::from_statement("load pending invitation", e))?;
    first_row(rows, invitation_from_row).await
}

/// Newest first, optionally narrowed to one status
pub async fn list_invitations(
    conn: &Connection,
    workspace_id: &str,
    status: Option<InvitationStatus>,
) -> Result<Vec<Invitation>, DatabaseError> {
    let status_clause = if status.is_some() { " AND status = ?2" } else { "" };
    let sql = format!(
        "SELECT {} FROM workspace_invitations WHERE workspace_id = ?1{}
         ORDER BY created_at DESC, rowid DESC",
        INVITATION_COLUMNS, status_clause
    );
    let rows = match status {
        Some(status) => conn.query(&sql, params![workspace_id, status.as_str()]).await,
        None => conn.query(&sql, params![workspace_id]).await,
    }
    .map_err(|e| DatabaseError::from_statement("list invitations", e))?;
    collect_rows(rows, invitation_from_row).await
}

/// Move a pending invitation to `status`; returns rows changed
pub async fn close_invitation(
    conn: &Connection,
    id: &str,
    status: InvitationStatus,
    accepted_at: Option<&DateTime<Utc>>,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE workspace_invitations SET status = ?, accepted_at = ?
         WHERE id = ? AND status = 'pending'",
        params![status.as_str(), accepted_at.map(rows::timestamp_text), id],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("close invitation", e))
}

/// Mark every pending invitation past `now` as expired
pub async fn expire_invitations(
    conn: &Connection,
    now: &DateTime<Utc>,
) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE workspace_invitations SET status = 'expired'
         WHERE status = 'pending' AND expires_at <= ?",
        params![rows::timestamp_text(now)],
    )
    .await
    .map_err(|e| DatabaseError::from_statement("expire invitations", e))
}

/// The inputs of an effective-level computation, read in one query
#[derive(Debug, Clone)]
pub struct AccessFacts {
    pub page_author: String,
    pub role: Option<WorkspaceRole>,
    pub grant: Option<PermissionLevel>,
}

/// `None` when the page does not exist
pub async fn load_access_facts(
    conn: &Connection,
    page_id: &str,
    user_id: &str,
) -> Result<Option<AccessFacts>, DatabaseError> {
    let mut result = conn
        .query(
            "SELECT p.created_by AS created_by, m.role AS role, g.level AS level
             FROM pages p
             LEFT JOIN workspace_members m
                    ON m.workspace_id = p.workspace_id AND m.user_id = ?2
             LEFT JOIN page_permissions g
                    ON g.page_id = p.id AND g.user_id = ?2
             WHERE p.id = ?1",
            params![page_id, user_id],
        )
        .await
        .map_err(|e| DatabaseError::from_statement("load access facts", e))?;

    let Some(row) = result.next().await? else {
        return Ok(None);
    };

    let role = rows::get::<Option<String>>(&row, "role")?
        .map(|raw| raw.parse::<WorkspaceRole>())
        .transpose()
        .map_err(DatabaseError::malformed_row)?;
    let grant = rows::get::<Option<String>>(&row, "level")?
        .map(|raw| raw.parse::<PermissionLevel>())
        .transpose()
        .map_err(DatabaseError::malformed_row)?;

    Ok(Some(AccessFacts {
        page_author: rows::get(&row, "created_by")?,
        role,
        grant,
    }))
}
