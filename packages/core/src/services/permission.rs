//! Permission Resolution
//!
//! The tree services never decide access themselves. Before mutating (or
//! reading) a page they ask a [`PermissionOracle`] for the caller's effective
//! level and compare it with what the operation needs:
//!
//! | Operation                                  | Required |
//! |--------------------------------------------|----------|
//! | move, duplicate into, snapshot, restore    | `edit`   |
//! | page/block create, update, archive, delete | `edit`   |
//! | comment create, reactions                  | `comment`|
//! | reads                                      | `view`   |
//!
//! [`StorePermissionOracle`] resolves levels from the `page_permissions` and
//! `workspace_members` tables. Embedding applications may substitute their
//! own oracle through `ServiceContext::with_permission_oracle`.

use crate::db::access_store::{self, AccessFacts};
use crate::db::DatabaseService;
use crate::models::PermissionLevel;
use crate::services::error::TreeServiceError;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait PermissionOracle: Send + Sync {
    /// Effective level of `user_id` on `page_id`
    ///
    /// `PermissionLevel::None` when the page does not exist.
    async fn effective_level(
        &self,
        page_id: &str,
        user_id: &str,
    ) -> Result<PermissionLevel, TreeServiceError>;
}

/// Maximum of the explicit grant, authorship and administrative role
pub fn resolve_level(facts: &AccessFacts, user_id: &str) -> PermissionLevel {
    let mut level = facts.grant.unwrap_or(PermissionLevel::None);

    if facts.page_author == user_id {
        level = level.max(PermissionLevel::Edit);
    }
    if facts.role.is_some_and(|role| role.is_administrative()) {
        level = level.max(PermissionLevel::Edit);
    }

    level
}

/// Oracle backed by the access tables of the core's own database
#[derive(Debug, Clone)]
pub struct StorePermissionOracle {
    db: Arc<DatabaseService>,
}

impl StorePermissionOracle {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PermissionOracle for StorePermissionOracle {
    async fn effective_level(
        &self,
        page_id: &str,
        user_id: &str,
    ) -> Result<PermissionLevel, TreeServiceError> {
        let conn = self.db.connect_with_timeout().await?;
        let facts = access_store::load_access_facts(&conn, page_id, user_id).await?;
        Ok(facts
            .map(|facts| resolve_level(&facts, user_id))
            .unwrap_or(PermissionLevel::None))
    }
}

/// Fail with `PermissionDenied` unless `user_id` holds `required` on `page_id`
pub(crate) async fn require_level(
    oracle: &dyn PermissionOracle,
    page_id: &str,
    user_id: &str,
    required: PermissionLevel,
) -> Result<(), TreeServiceError> {
    let level = oracle.effective_level(page_id, user_id).await?;
    if level.satisfies(required) {
        Ok(())
    } else {
        tracing::debug!(
            page_id,
            user_id,
            level = %level,
            required = %required,
            "access denied"
        );
        Err(TreeServiceError::permission_denied(
            user_id,
            required,
            format!("page {}", page_id),
        ))
    }
}
