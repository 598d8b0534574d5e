//! Workspace Membership and Page Access Models
//!
//! Also holds the two per-user side records of a workspace: page favorites
//! and pending invitations.

use crate::models::ValidationError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceRole {
    Owner,
    Admin,
    Editor,
    Viewer,
}

impl WorkspaceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkspaceRole::Owner => "owner",
            WorkspaceRole::Admin => "admin",
            WorkspaceRole::Editor => "editor",
            WorkspaceRole::Viewer => "viewer",
        }
    }

    /// Owners and admins hold implicit edit access to every page
    pub fn is_administrative(&self) -> bool {
        matches!(self, WorkspaceRole::Owner | WorkspaceRole::Admin)
    }

    /// Whether members with this role may create content
    pub fn can_author(&self) -> bool {
        !matches!(self, WorkspaceRole::Viewer)
    }
}

impl fmt::Display for WorkspaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkspaceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(WorkspaceRole::Owner),
            "admin" => Ok(WorkspaceRole::Admin),
            "editor" => Ok(WorkspaceRole::Editor),
            "viewer" => Ok(WorkspaceRole::Viewer),
            other => Err(format!("unknown workspace role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceMember {
    pub workspace_id: String,
    pub user_id: String,
    pub role: WorkspaceRole,
    pub joined_at: DateTime<Utc>,
}

/// Effective access to a page
///
/// Variants are declared in ascending order so the derived `Ord` gives
/// `None < View < Comment < Edit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    None,
    View,
    Comment,
    Edit,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::None => "none",
            PermissionLevel::View => "view",
            PermissionLevel::Comment => "comment",
            PermissionLevel::Edit => "edit",
        }
    }

    /// Whether this level includes everything `required` allows
    pub fn satisfies(&self, required: PermissionLevel) -> bool {
        *self >= required
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(PermissionLevel::None),
            "view" => Ok(PermissionLevel::View),
            "comment" => Ok(PermissionLevel::Comment),
            "edit" => Ok(PermissionLevel::Edit),
            other => Err(format!("unknown permission level '{}'", other)),
        }
    }
}

/// An explicit per-user grant on a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageGrant {
    pub id: String,
    pub page_id: String,
    pub user_id: String,
    pub level: PermissionLevel,
    pub granted_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A page bookmarked by a user; at most one per `(user, page)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageFavorite {
    pub id: String,
    pub user_id: String,
    pub page_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
    Revoked,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Expired => "expired",
            InvitationStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "expired" => Ok(InvitationStatus::Expired),
            "revoked" => Ok(InvitationStatus::Revoked),
            other => Err(format!("unknown invitation status '{}'", other)),
        }
    }
}

/// An offer of membership sent to an email address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: String,
    pub workspace_id: String,
    pub inviter_id: String,
    pub invitee_email: String,
    pub role: WorkspaceRole,
    pub token: String,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Invitation {
    /// Pending and not past its expiry
    pub fn is_acceptable_at(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && self.expires_at > now
    }
}

/// Longest accepted invitee address
pub const MAX_EMAIL_LENGTH: usize = 255;

/// Parameters for inviting someone to a workspace
#[derive(Debug, Clone)]
pub struct NewInvitation {
    pub email: String,
    pub role: WorkspaceRole,
    /// Overrides the configured lifetime
    pub expires_in: Option<Duration>,
}

impl NewInvitation {
    pub fn new(email: impl Into<String>, role: WorkspaceRole) -> Self {
        Self {
            email: email.into(),
            role,
            expires_in: None,
        }
    }

    pub fn expires_in(mut self, lifetime: Duration) -> Self {
        self.expires_in = Some(lifetime);
        self
    }

    /// Trimmed, lowercased address; rejects anything without a local part
    /// and a domain
    pub fn normalized_email(&self) -> Result<String, ValidationError> {
        normalize_email(&self.email)
    }
}

pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::MissingField("email".to_string()));
    }
    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            field: "email".to_string(),
            max: MAX_EMAIL_LENGTH,
        });
    }
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
        {
            Ok(email)
        }
        _ => Err(ValidationError::InvalidEmail(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_levels_are_totally_ordered() {
        assert!(PermissionLevel::Edit > PermissionLevel::Comment);
        assert!(PermissionLevel::Comment > PermissionLevel::View);
        assert!(PermissionLevel::View > PermissionLevel::None);
        assert!(PermissionLevel::Edit.satisfies(PermissionLevel::View));
        assert!(!PermissionLevel::View.satisfies(PermissionLevel::Comment));
        assert_eq!(
            [PermissionLevel::View, PermissionLevel::Edit, PermissionLevel::None]
                .into_iter()
                .max(),
            Some(PermissionLevel::Edit)
        );
    }

    #[test]
    fn test_role_round_trip_and_admin_flag() {
        for role in ["owner", "admin", "editor", "viewer"] {
            let parsed: WorkspaceRole = role.parse().unwrap();
            assert_eq!(parsed.as_str(), role);
        }
        assert!(WorkspaceRole::Admin.is_administrative());
        assert!(!WorkspaceRole::Editor.is_administrative());
        assert!(!WorkspaceRole::Viewer.can_author());
        assert!("guest".parse::<WorkspaceRole>().is_err());
    }

    #[test]
    fn test_invitation_emails_are_normalized() {
        let invite = NewInvitation::new("  Dana@Example.COM ", WorkspaceRole::Editor);
        assert_eq!(invite.normalized_email().unwrap(), "dana@example.com");

        assert!(matches!(
            normalize_email("   "),
            Err(ValidationError::MissingField(_))
        ));
        for bad in ["dana", "@example.com", "dana@", "a@b@c"] {
            assert!(matches!(
                normalize_email(bad),
                Err(ValidationError::InvalidEmail(_))
            ));
        }
    }

    #[test]
    fn test_invitation_acceptable_only_while_pending_and_fresh() {
        let now = Utc::now();
        let mut invitation = Invitation {
            id: "i1".to_string(),
            workspace_id: "w1".to_string(),
            inviter_id: "alice".to_string(),
            invitee_email: "dana@example.com".to_string(),
            role: WorkspaceRole::Viewer,
            token: "t".to_string(),
            status: InvitationStatus::Pending,
            expires_at: now + Duration::days(1),
            created_at: now,
            accepted_at: None,
        };
        assert!(invitation.is_acceptable_at(now));
        assert!(!invitation.is_acceptable_at(now + Duration::days(2)));

        invitation.status = InvitationStatus::Revoked;
        assert!(!invitation.is_acceptable_at(now));
        assert_eq!("revoked".parse::<InvitationStatus>().unwrap(), invitation.status);
    }
}
