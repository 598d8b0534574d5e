//! Workspace Service - Workspaces and Membership
//!
//! A workspace is the container of the page tree. Its members carry one of
//! four roles; `owner` and `admin` are administrative and manage membership.
//! A workspace always keeps at least one owner.
//!
//! # Invitations
//!
//! Administrators invite by email address. An invitation is `pending` until
//! it is accepted, revoked or expires; only one pending invitation exists per
//! address and workspace, and inviting the same address again while it is
//! still valid returns that invitation unchanged. Accepting adds the member
//! with the invited role.

use crate::db::access_store;
use crate::models::{
    DeleteResult, Invitation, InvitationStatus, NewInvitation, PermissionLevel, ValidationError,
    Workspace, WorkspaceMember, WorkspaceRole,
};
use crate::services::context::ServiceContext;
use crate::services::error::TreeServiceError;
use chrono::{Duration, Utc};
use libsql::Connection;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkspaceService {
    ctx: ServiceContext,
}

impl WorkspaceService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Create a workspace with `owner_id` as its first owner
    pub async fn create_workspace(
        &self,
        name: &str,
        owner_id: &str,
    ) -> Result<Workspace, TreeServiceError> {
        if name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()).into());
        }
        if owner_id.trim().is_empty() {
            return Err(ValidationError::MissingField("owner_id".to_string()).into());
        }

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Workspace, TreeServiceError> = async {
            let now = Utc::now();
            let workspace = Workspace {
                id: self.ctx.ids.next_id(),
                name: name.trim().to_string(),
                owner_id: owner_id.to_string(),
                created_at: now,
            };
            access_store::insert_workspace(&conn, &workspace).await?;
            access_store::insert_member(
                &conn,
                &WorkspaceMember {
                    workspace_id: workspace.id.clone(),
                    user_id: owner_id.to_string(),
                    role: WorkspaceRole::Owner,
                    joined_at: now,
                },
            )
            .await?;
            tracing::info!(workspace_id = %workspace.id, owner_id, "created workspace");
            Ok(workspace)
        }
        .await;
        self.ctx.finish(&conn, "create workspace", result).await
    }

    pub async fn get_workspace(&self, workspace_id: &str) -> Result<Workspace, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        access_store::get_workspace(&conn, workspace_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found("workspace", workspace_id))
    }

    /// Add a member; an existing membership is a `Conflict`
    pub async fn add_member(
        &self,
        actor_id: &str,
        workspace_id: &str,
        user_id: &str,
        role: WorkspaceRole,
    ) -> Result<WorkspaceMember, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<WorkspaceMember, TreeServiceError> = async {
            self.require_admin(&conn, workspace_id, actor_id).await?;

            let member = WorkspaceMember {
                workspace_id: workspace_id.to_string(),
                user_id: user_id.to_string(),
                role,
                joined_at: Utc::now(),
            };
            access_store::insert_member(&conn, &member).await?;
            tracing::info!(workspace_id, user_id, role = %role, "added workspace member");
            Ok(member)
        }
        .await;
        self.ctx.finish(&conn, "add workspace member", result).await
    }

    pub async fn update_member_role(
        &self,
        actor_id: &str,
        workspace_id: &str,
        user_id: &str,
        role: WorkspaceRole,
    ) -> Result<WorkspaceMember, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<WorkspaceMember, TreeServiceError> = async {
            self.require_admin(&conn, workspace_id, actor_id).await?;
            let member = self.load_member(&conn, workspace_id, user_id).await?;

            if member.role == WorkspaceRole::Owner && role != WorkspaceRole::Owner {
                self.ensure_not_last_owner(&conn, workspace_id).await?;
            }
            access_store::update_member_role(&conn, workspace_id, user_id, role).await?;
            self.load_member(&conn, workspace_id, user_id).await
        }
        .await;
        self.ctx.finish(&conn, "update member role", result).await
    }

    /// Remove a member; administrators may remove anyone, members themselves
    pub async fn remove_member(
        &self,
        actor_id: &str,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<DeleteResult, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<DeleteResult, TreeServiceError> = async {
            if actor_id != user_id {
                self.require_admin(&conn, workspace_id, actor_id).await?;
            }
            let Some(member) = access_store::get_member(&conn, workspace_id, user_id).await?
            else {
                return Ok(DeleteResult::not_found());
            };
            if member.role == WorkspaceRole::Owner {
                self.ensure_not_last_owner(&conn, workspace_id).await?;
            }
            access_store::delete_member(&conn, workspace_id, user_id).await?;
            tracing::info!(workspace_id, user_id, "removed workspace member");
            Ok(DeleteResult::existed())
        }
        .await;
        self.ctx.finish(&conn, "remove workspace member", result).await
    }

    /// Members in join order; members only
    pub async fn list_members(
        &self,
        actor_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<WorkspaceMember>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        if access_store::get_member(&conn, workspace_id, actor_id)
            .await?
            .is_none()
        {
            return Err(TreeServiceError::permission_denied(
                actor_id,
                PermissionLevel::View,
                format!("workspace {}", workspace_id),
            ));
        }
        Ok(access_store::list_members(&conn, workspace_id).await?)
    }

    pub async fn is_member(
        &self,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<bool, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        Ok(access_store::get_member(&conn, workspace_id, user_id)
            .await?
            .is_some())
    }

    //
    // INVITATIONS
    //

    /// Invite an address; re-inviting an address with a valid pending
    /// invitation returns the existing one
    pub async fn invite_member(
        &self,
        actor_id: &str,
        workspace_id: &str,
        params: NewInvitation,
    ) -> Result<Invitation, TreeServiceError> {
        let email = params.normalized_email()?;

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Invitation, TreeServiceError> = async {
            self.require_admin(&conn, workspace_id, actor_id).await?;

            let now = Utc::now();
            if let Some(existing) =
                access_store::get_pending_invitation(&conn, workspace_id, &email).await?
            {
                if existing.is_acceptable_at(now) {
                    tracing::debug!(workspace_id, invitation_id = %existing.id, "invitation already pending");
                    return Ok(existing);
                }
                access_store::close_invitation(&conn, &existing.id, InvitationStatus::Expired, None)
                    .await?;
            }

            let lifetime = params
                .expires_in
                .unwrap_or_else(|| Duration::days(self.ctx.config.invitation_ttl_days));
            let invitation = Invitation {
                id: self.ctx.ids.next_id(),
                workspace_id: workspace_id.to_string(),
                inviter_id: actor_id.to_string(),
                invitee_email: email.clone(),
                role: params.role,
                token: invitation_token(),
                status: InvitationStatus::Pending,
                expires_at: now + lifetime,
                created_at: now,
                accepted_at: None,
            };
            access_store::insert_invitation(&conn, &invitation).await?;
            tracing::info!(
                workspace_id,
                invitation_id = %invitation.id,
                role = %invitation.role,
                "invited workspace member"
            );
            Ok(invitation)
        }
        .await;
        self.ctx.finish(&conn, "invite member", result).await
    }

    /// Redeem an invitation token as `user_id`, whose address is `email`
    pub async fn accept_invitation(
        &self,
        user_id: &str,
        email: &str,
        token: &str,
    ) -> Result<WorkspaceMember, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<WorkspaceMember, TreeServiceError> = async {
            let invitation = access_store::get_invitation_by_token(&conn, token)
                .await?
                .ok_or_else(|| TreeServiceError::not_found("invitation", "by token"))?;

            let now = Utc::now();
            if invitation.status != InvitationStatus::Pending {
                return Err(TreeServiceError::invalid_operation(format!(
                    "invitation is {}",
                    invitation.status
                )));
            }
            if !invitation.is_acceptable_at(now) {
                return Err(TreeServiceError::invalid_operation("invitation has expired"));
            }
            if !email.trim().eq_ignore_ascii_case(&invitation.invitee_email) {
                return Err(TreeServiceError::permission_denied(
                    user_id,
                    PermissionLevel::View,
                    format!("invitation {}", invitation.id),
                ));
            }
            if access_store::get_member(&conn, &invitation.workspace_id, user_id)
                .await?
                .is_some()
            {
                return Err(TreeServiceError::conflict(format!(
                    "{} is already a member of workspace {}",
                    user_id, invitation.workspace_id
                )));
            }

            let member = WorkspaceMember {
                workspace_id: invitation.workspace_id.clone(),
                user_id: user_id.to_string(),
                role: invitation.role,
                joined_at: now,
            };
            access_store::insert_member(&conn, &member).await?;
            access_store::close_invitation(
                &conn,
                &invitation.id,
                InvitationStatus::Accepted,
                Some(&now),
            )
            .await?;
            tracing::info!(
                workspace_id = %member.workspace_id,
                user_id,
                role = %member.role,
                "accepted invitation"
            );
            Ok(member)
        }
        .await;
        self.ctx.finish(&conn, "accept invitation", result).await
    }

    /// Withdraw a pending invitation
    pub async fn revoke_invitation(
        &self,
        actor_id: &str,
        workspace_id: &str,
        invitation_id: &str,
    ) -> Result<Invitation, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Invitation, TreeServiceError> = async {
            self.require_admin(&conn, workspace_id, actor_id).await?;
            let invitation = self
                .load_invitation(&conn, workspace_id, invitation_id)
                .await?;
            if invitation.status != InvitationStatus::Pending {
                return Err(TreeServiceError::invalid_operation(format!(
                    "invitation is {}",
                    invitation.status
                )));
            }
            access_store::close_invitation(&conn, invitation_id, InvitationStatus::Revoked, None)
                .await?;
            self.load_invitation(&conn, workspace_id, invitation_id).await
        }
        .await;
        self.ctx.finish(&conn, "revoke invitation", result).await
    }

    /// Invitations of a workspace, newest first; administrators only
    pub async fn list_invitations(
        &self,
        actor_id: &str,
        workspace_id: &str,
        status: Option<InvitationStatus>,
    ) -> Result<Vec<Invitation>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        self.require_admin(&conn, workspace_id, actor_id).await?;
        Ok(access_store::list_invitations(&conn, workspace_id, status).await?)
    }

    /// Mark every pending invitation past its expiry as `expired`
    pub async fn expire_invitations(&self) -> Result<u64, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<u64, TreeServiceError> = async {
            let expired = access_store::expire_invitations(&conn, &Utc::now()).await?;
            if expired > 0 {
                tracing::info!(expired, "expired workspace invitations");
            }
            Ok(expired)
        }
        .await;
        self.ctx.finish(&conn, "expire invitations", result).await
    }

    async fn load_invitation(
        &self,
        conn: &Connection,
        workspace_id: &str,
        invitation_id: &str,
    ) -> Result<Invitation, TreeServiceError> {
        access_store::get_invitation(conn, invitation_id)
            .await?
            .filter(|invitation| invitation.workspace_id == workspace_id)
            .ok_or_else(|| TreeServiceError::not_found("invitation", invitation_id))
    }

    async fn load_member(
        &self,
        conn: &Connection,
        workspace_id: &str,
        user_id: &str,
    ) -> Result<WorkspaceMember, TreeServiceError> {
        access_store::get_member(conn, workspace_id, user_id)
            .await?
            .ok_or_else(|| {
                TreeServiceError::not_found("member", format!("{}/{}", workspace_id, user_id))
            })
    }

    async fn require_admin(
        &self,
        conn: &Connection,
        workspace_id: &str,
        actor_id: &str,
    ) -> Result<(), TreeServiceError> {
        if access_store::get_workspace(conn, workspace_id).await?.is_none() {
            return Err(TreeServiceError::not_found("workspace", workspace_id));
        }
        let is_admin = access_store::get_member(conn, workspace_id, actor_id)
            .await?
            .is_some_and(|member| member.role.is_administrative());
        if !is_admin {
            return Err(TreeServiceError::permission_denied(
                actor_id,
                PermissionLevel::Edit,
                format!("workspace {}", workspace_id),
            ));
        }
        Ok(())
    }

    async fn ensure_not_last_owner(
        &self,
        conn: &Connection,
        workspace_id: &str,
    ) -> Result<(), TreeServiceError> {
        if access_store::count_owners(conn, workspace_id).await? <= 1 {
            return Err(TreeServiceError::invalid_operation(
                "a workspace must keep at least one owner",
            ));
        }
        Ok(())
    }
}

/// Two random v4 UUIDs as hex, URL-safe
fn invitation_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

#[cfg(test)]
#[path = "workspace_service_test.rs"]
mod workspace_service_test;
