//! Restore Engine - Rebuild a Page from a Ledger Entry
//!
//! `restore` runs as one immediate transaction:
//!
//! 1. load the target entry (`NotFound` if absent);
//! 2. snapshot the current state as "before restoring to version N";
//! 3. overwrite title/icon/cover from the entry;
//! 4. delete every block of the page (comments on them cascade away);
//! 5. re-create the captured blocks under fresh ids with the two-pass remap
//!    of the subtree cloner.
//!
//! Any failure rolls all five steps back, including the checkpoint entry.

use crate::db::{ledger_store, node_store};
use crate::models::{Page, PermissionLevel};
use crate::services::context::ServiceContext;
use crate::services::error::TreeServiceError;
use crate::services::permission::require_level;
use crate::services::subtree_cloner::{materialize_blocks, BlockShell};
use crate::services::version_ledger::VersionLedger;
use libsql::Connection;

#[derive(Debug, Clone)]
pub struct RestoreEngine {
    ctx: ServiceContext,
    ledger: VersionLedger,
}

impl RestoreEngine {
    pub fn new(ctx: ServiceContext) -> Self {
        let ledger = VersionLedger::new(ctx.clone());
        Self { ctx, ledger }
    }

    /// Make version `version_number` the live state of `page_id`
    pub async fn restore(
        &self,
        actor_id: &str,
        page_id: &str,
        version_number: i64,
    ) -> Result<Page, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result = self
            .restore_in(&conn, actor_id, page_id, version_number)
            .await;
        self.ctx.finish(&conn, "restore page version", result).await
    }

    async fn restore_in(
        &self,
        conn: &Connection,
        actor_id: &str,
        page_id: &str,
        version_number: i64,
    ) -> Result<Page, TreeServiceError> {
        let mut page = node_store::get_page(conn, page_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found("page", page_id))?;

        require_level(
            self.ctx.permissions.as_ref(),
            page_id,
            actor_id,
            PermissionLevel::Edit,
        )
        .await?;

        let target = ledger_store::get_version(conn, page_id, version_number)
            .await?
            .ok_or_else(|| {
                TreeServiceError::not_found("version", format!("{}@{}", page_id, version_number))
            })?;

        let checkpoint = self
            .ledger
            .snapshot_in(
                conn,
                &page,
                actor_id,
                Some(&format!("before restoring to version {}", version_number)),
            )
            .await?;

        page.title = target.title.clone();
        page.icon = target.icon.clone();
        page.cover_image = target.cover_image.clone();
        node_store::update_page_metadata(conn, &page).await?;

        let removed = node_store::delete_blocks_of_page(conn, page_id).await?;

        let shells: Vec<BlockShell> = target.content_snapshot.iter().map(BlockShell::from).collect();
        let plan = materialize_blocks(conn, self.ctx.ids.as_ref(), page_id, &shells, None).await?;

        tracing::info!(
            page_id,
            restored_version = version_number,
            checkpoint_version = checkpoint.version_number,
            removed_blocks = removed,
            restored_blocks = plan.len(),
            "restored page"
        );

        node_store::get_page(conn, page_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found("page", page_id))
    }
}
