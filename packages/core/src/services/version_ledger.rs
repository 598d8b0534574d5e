//! Version Ledger - Append-Only Page Snapshots
//!
//! A snapshot captures a page's title/icon/cover and every one of its blocks,
//! archived ones included with their flag, as a flat array in sibling order. Version numbers start at 1 and
//! grow by one per page; the next number is computed and written inside the
//! same immediate transaction, so concurrent snapshots serialize.
//!
//! Entries are never updated. They disappear only when their page is
//! permanently deleted.

use crate::db::ledger_store;
use crate::db::node_store::{self, ArchiveFilter};
use crate::models::{BlockDescriptor, Page, PageVersion, PageVersionSummary, PermissionLevel};
use crate::services::context::ServiceContext;
use crate::services::error::TreeServiceError;
use crate::services::permission::require_level;
use chrono::Utc;
use libsql::Connection;

#[derive(Debug, Clone)]
pub struct VersionLedger {
    ctx: ServiceContext,
}

impl VersionLedger {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Record the current state of a page as its next version
    pub async fn snapshot(
        &self,
        actor_id: &str,
        page_id: &str,
        change_summary: Option<&str>,
    ) -> Result<PageVersion, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<PageVersion, TreeServiceError> = async {
            let page = node_store::get_page(&conn, page_id)
                .await?
                .ok_or_else(|| TreeServiceError::not_found("page", page_id))?;
            require_level(
                self.ctx.permissions.as_ref(),
                page_id,
                actor_id,
                PermissionLevel::Edit,
            )
            .await?;
            self.snapshot_in(&conn, &page, actor_id, change_summary).await
        }
        .await;
        self.ctx.finish(&conn, "snapshot page", result).await
    }

    /// Write a ledger entry for `page` on an open transaction
    pub(crate) async fn snapshot_in(
        &self,
        conn: &Connection,
        page: &Page,
        actor_id: &str,
        change_summary: Option<&str>,
    ) -> Result<PageVersion, TreeServiceError> {
        let blocks = node_store::list_blocks(conn, &page.id, ArchiveFilter::All).await?;
        let content_snapshot: Vec<BlockDescriptor> = blocks
            .into_iter()
            .map(|block| BlockDescriptor {
                id: block.id,
                block_type: block.block_type,
                content: block.content,
                order: block.order,
                parent_block_id: block.parent_id,
                is_archived: block.is_archived,
            })
            .collect();

        let version = PageVersion {
            id: self.ctx.ids.next_id(),
            page_id: page.id.clone(),
            version_number: ledger_store::next_version_number(conn, &page.id).await?,
            title: page.title.clone(),
            icon: page.icon.clone(),
            cover_image: page.cover_image.clone(),
            content_snapshot,
            created_by: actor_id.to_string(),
            change_summary: change_summary.map(str::to_string),
            created_at: Utc::now(),
        };
        ledger_store::insert_version(conn, &version).await?;

        tracing::info!(
            page_id = %page.id,
            version = version.version_number,
            blocks = version.content_snapshot.len(),
            "recorded page version"
        );

        Ok(version)
    }

    /// Newest first; `limit` defaults to and is clamped by configuration
    pub async fn list_versions(
        &self,
        actor_id: &str,
        page_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PageVersionSummary>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        self.require_readable(&conn, actor_id, page_id).await?;

        let limit = self.ctx.config.clamp_version_limit(limit);
        let versions = ledger_store::list_versions(&conn, page_id, limit).await?;
        Ok(versions.iter().map(PageVersionSummary::from).collect())
    }

    pub async fn get_version(
        &self,
        actor_id: &str,
        page_id: &str,
        version_number: i64,
    ) -> Result<PageVersion, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        self.require_readable(&conn, actor_id, page_id).await?;

        ledger_store::get_version(&conn, page_id, version_number)
            .await?
            .ok_or_else(|| {
                TreeServiceError::not_found("version", format!("{}@{}", page_id, version_number))
            })
    }

    pub async fn get_version_by_id(
        &self,
        actor_id: &str,
        version_id: &str,
    ) -> Result<PageVersion, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let version = ledger_store::get_version_by_id(&conn, version_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found("version", version_id))?;
        require_level(
            self.ctx.permissions.as_ref(),
            &version.page_id,
            actor_id,
            PermissionLevel::View,
        )
        .await?;
        Ok(version)
    }

    async fn require_readable(
        &self,
        conn: &Connection,
        actor_id: &str,
        page_id: &str,
    ) -> Result<(), TreeServiceError> {
        if node_store::get_page(conn, page_id).await?.is_none() {
            return Err(TreeServiceError::not_found("page", page_id));
        }
        require_level(
            self.ctx.permissions.as_ref(),
            page_id,
            actor_id,
            PermissionLevel::View,
        )
        .await
    }
}
