//! Page Service - Page and Block Lifecycle
//!
//! Creation, partial updates, archive/restore and permanent deletion for the
//! two reparentable node kinds, plus per-page access grants. Structural moves
//! and duplication live in `TreeMutator` and `SubtreeCloner`.
//!
//! # Archiving
//!
//! - Archiving a **page** flags that page only; its child pages stay live but
//!   drop out of `page_tree` until it is restored.
//! - Archiving a **block** flags its whole subtree, so the live block tree of
//!   a page is always closed under `parent_id`.
//!
//! Permanent deletion is only allowed from the trash (archived state) and
//! cascades through the foreign keys.

use crate::db::access_store;
use crate::db::node_store::{self, ArchiveFilter};
use crate::models::{
    Block, BlockUpdate, DeleteResult, NewBlock, NewPage, NodeKind, Page, PageGrant, PageTree,
    PageUpdate, PermissionLevel, TreeNode,
};
use crate::services::context::ServiceContext;
use crate::services::error::TreeServiceError;
use crate::services::permission::require_level;
use crate::services::version_ledger::VersionLedger;
use chrono::Utc;
use libsql::Connection;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PageService {
    ctx: ServiceContext,
    ledger: VersionLedger,
}

impl PageService {
    pub fn new(ctx: ServiceContext) -> Self {
        let ledger = VersionLedger::new(ctx.clone());
        Self { ctx, ledger }
    }

    //
    // PAGES
    //

    /// Create a page; the actor must be a workspace member who can author
    pub async fn create_page(
        &self,
        actor_id: &str,
        params: NewPage,
    ) -> Result<Page, TreeServiceError> {
        params.validate()?;

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Page, TreeServiceError> = async {
            if access_store::get_workspace(&conn, &params.workspace_id)
                .await?
                .is_none()
            {
                return Err(TreeServiceError::not_found("workspace", &params.workspace_id));
            }
            self.require_author(&conn, &params.workspace_id, actor_id)
                .await?;

            if let Some(parent_id) = params.parent_id.as_deref() {
                self.check_parent(&conn, NodeKind::Page, parent_id, &params.workspace_id)
                    .await?;
            }

            let now = Utc::now();
            let page = Page {
                id: self.ctx.ids.next_id(),
                workspace_id: params.workspace_id.clone(),
                parent_id: params.parent_id.clone(),
                title: params.title.clone(),
                icon: params.icon.clone(),
                cover_image: params.cover_image.clone(),
                order: params.order,
                is_archived: false,
                created_by: actor_id.to_string(),
                version: 1,
                created_at: now,
                updated_at: now,
            };
            node_store::insert_page(&conn, &page).await?;
            tracing::debug!(page_id = %page.id, workspace_id = %page.workspace_id, "created page");
            Ok(page)
        }
        .await;
        self.ctx.finish(&conn, "create page", result).await
    }

    pub async fn get_page(&self, actor_id: &str, page_id: &str) -> Result<Page, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let page = self.load_page(&conn, page_id).await?;
        self.require(page_id, actor_id, PermissionLevel::View).await?;
        Ok(page)
    }

    /// Pages of a workspace in sibling order; workspace members only
    pub async fn list_pages(
        &self,
        actor_id: &str,
        workspace_id: &str,
        include_archived: bool,
    ) -> Result<Vec<Page>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        self.require_member(&conn, workspace_id, actor_id).await?;
        let filter = if include_archived {
            ArchiveFilter::All
        } else {
            ArchiveFilter::LiveOnly
        };
        Ok(node_store::list_pages(&conn, workspace_id, filter).await?)
    }

    /// Archived pages of a workspace
    pub async fn list_trash(
        &self,
        actor_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<Page>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        self.require_member(&conn, workspace_id, actor_id).await?;
        Ok(node_store::list_pages(&conn, workspace_id, ArchiveFilter::ArchivedOnly).await?)
    }

    /// Nested tree of the live pages reachable from the workspace roots
    pub async fn page_tree(
        &self,
        actor_id: &str,
        workspace_id: &str,
    ) -> Result<Vec<PageTree>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        self.require_member(&conn, workspace_id, actor_id).await?;
        let pages = node_store::list_pages(&conn, workspace_id, ArchiveFilter::LiveOnly).await?;
        Ok(build_page_tree(pages))
    }

    /// Merge `update` into the page's metadata
    ///
    /// With a `change_summary`, and only if some field actually changed, the
    /// post-update state is also recorded as a new version.
    pub async fn update_page(
        &self,
        actor_id: &str,
        page_id: &str,
        update: PageUpdate,
        change_summary: Option<&str>,
    ) -> Result<Page, TreeServiceError> {
        update.validate()?;

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Page, TreeServiceError> = async {
            let mut page = self.load_page(&conn, page_id).await?;
            self.require(page_id, actor_id, PermissionLevel::Edit).await?;

            if !update.apply_to(&mut page) {
                return Ok(page);
            }
            node_store::update_page_metadata(&conn, &page).await?;
            let page = self.load_page(&conn, page_id).await?;

            if let Some(summary) = change_summary {
                self.ledger
                    .snapshot_in(&conn, &page, actor_id, Some(summary))
                    .await?;
            }
            Ok(page)
        }
        .await;
        self.ctx.finish(&conn, "update page", result).await
    }

    /// Move a page to the trash (that page only)
    pub async fn archive_page(
        &self,
        actor_id: &str,
        page_id: &str,
    ) -> Result<Page, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Page, TreeServiceError> = async {
            let page = self.load_page(&conn, page_id).await?;
            self.require(page_id, actor_id, PermissionLevel::Edit).await?;
            if page.is_archived {
                return Ok(page);
            }
            node_store::set_archived(&conn, NodeKind::Page, &[page.id.clone()], true).await?;
            tracing::info!(page_id, actor_id, "archived page");
            self.load_page(&conn, page_id).await
        }
        .await;
        self.ctx.finish(&conn, "archive page", result).await
    }

    /// Bring an archived page back
    pub async fn restore_page(
        &self,
        actor_id: &str,
        page_id: &str,
    ) -> Result<Page, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Page, TreeServiceError> = async {
            let page = self.load_page(&conn, page_id).await?;
            self.require(page_id, actor_id, PermissionLevel::Edit).await?;
            if !page.is_archived {
                return Err(TreeServiceError::invalid_operation(format!(
                    "page {} is not archived",
                    page_id
                )));
            }
            node_store::set_archived(&conn, NodeKind::Page, &[page.id.clone()], false).await?;
            tracing::info!(page_id, actor_id, "restored page from trash");
            self.load_page(&conn, page_id).await
        }
        .await;
        self.ctx.finish(&conn, "restore page", result).await
    }

    /// Delete an archived page for good, with everything beneath it
    pub async fn delete_page_permanently(
        &self,
        actor_id: &str,
        page_id: &str,
    ) -> Result<DeleteResult, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<DeleteResult, TreeServiceError> = async {
            let Some(page) = node_store::get_page(&conn, page_id).await? else {
                return Ok(DeleteResult::not_found());
            };
            self.require(page_id, actor_id, PermissionLevel::Edit).await?;
            if !page.is_archived {
                return Err(TreeServiceError::invalid_operation(format!(
                    "page {} must be archived before it can be deleted",
                    page_id
                )));
            }
            node_store::delete_node(&conn, NodeKind::Page, page_id).await?;
            tracing::info!(page_id, actor_id, "permanently deleted page");
            Ok(DeleteResult::existed())
        }
        .await;
        self.ctx.finish(&conn, "delete page", result).await
    }

    //
    // BLOCKS
    //

    pub async fn create_block(
        &self,
        actor_id: &str,
        params: NewBlock,
    ) -> Result<Block, TreeServiceError> {
        params.validate()?;

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Block, TreeServiceError> = async {
            self.load_page(&conn, &params.page_id).await?;
            self.require(&params.page_id, actor_id, PermissionLevel::Edit)
                .await?;

            if let Some(parent_id) = params.parent_id.as_deref() {
                self.check_parent(&conn, NodeKind::Block, parent_id, &params.page_id)
                    .await?;
            }

            let now = Utc::now();
            let block = Block {
                id: self.ctx.ids.next_id(),
                page_id: params.page_id.clone(),
                parent_id: params.parent_id.clone(),
                block_type: params.block_type.clone(),
                content: params.content.clone(),
                order: params.order,
                is_archived: false,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            node_store::insert_block(&conn, &block).await?;
            Ok(block)
        }
        .await;
        self.ctx.finish(&conn, "create block", result).await
    }

    pub async fn get_block(
        &self,
        actor_id: &str,
        block_id: &str,
    ) -> Result<Block, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let block = self.load_block(&conn, block_id).await?;
        self.require(&block.page_id, actor_id, PermissionLevel::View)
            .await?;
        Ok(block)
    }

    /// Live blocks of a page in sibling order
    pub async fn list_blocks(
        &self,
        actor_id: &str,
        page_id: &str,
    ) -> Result<Vec<Block>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        self.load_page(&conn, page_id).await?;
        self.require(page_id, actor_id, PermissionLevel::View).await?;
        Ok(node_store::list_blocks(&conn, page_id, ArchiveFilter::LiveOnly).await?)
    }

    pub async fn update_block(
        &self,
        actor_id: &str,
        block_id: &str,
        update: BlockUpdate,
    ) -> Result<Block, TreeServiceError> {
        update.validate()?;

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<Block, TreeServiceError> = async {
            let mut block = self.load_block(&conn, block_id).await?;
            self.require(&block.page_id, actor_id, PermissionLevel::Edit)
                .await?;
            if update.is_empty() {
                return Ok(block);
            }

            if let Some(block_type) = update.block_type {
                block.block_type = block_type;
            }
            if let Some(content) = update.content {
                block.content = content;
            }
            node_store::update_block_payload(&conn, &block).await?;
            self.load_block(&conn, block_id).await
        }
        .await;
        self.ctx.finish(&conn, "update block", result).await
    }

    /// Archive a block and its subtree; returns the number of blocks flagged
    pub async fn archive_block(
        &self,
        actor_id: &str,
        block_id: &str,
    ) -> Result<usize, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<usize, TreeServiceError> = async {
            let root = self.load_block_node(&conn, block_id).await?;
            self.require(&root.container_id, actor_id, PermissionLevel::Edit)
                .await?;

            let ids = self.block_subtree_ids(&conn, &root).await?;
            node_store::set_archived(&conn, NodeKind::Block, &ids, true).await?;
            tracing::info!(block_id, blocks = ids.len(), "archived block subtree");
            Ok(ids.len())
        }
        .await;
        self.ctx.finish(&conn, "archive block", result).await
    }

    /// Un-archive a block and its subtree
    ///
    /// Fails with `InvalidOperation` if the block is live or its parent is
    /// still archived.
    pub async fn restore_block(
        &self,
        actor_id: &str,
        block_id: &str,
    ) -> Result<usize, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<usize, TreeServiceError> = async {
            let root = self.load_block_node(&conn, block_id).await?;
            self.require(&root.container_id, actor_id, PermissionLevel::Edit)
                .await?;
            if !root.is_archived {
                return Err(TreeServiceError::invalid_operation(format!(
                    "block {} is not archived",
                    block_id
                )));
            }
            if let Some(parent_id) = root.parent_id.as_deref() {
                let parent_archived = node_store::get_tree_node(&conn, NodeKind::Block, parent_id)
                    .await?
                    .is_some_and(|parent| parent.is_archived);
                if parent_archived {
                    return Err(TreeServiceError::invalid_operation(format!(
                        "parent block {} is archived",
                        parent_id
                    )));
                }
            }

            let ids = self.block_subtree_ids(&conn, &root).await?;
            node_store::set_archived(&conn, NodeKind::Block, &ids, false).await?;
            Ok(ids.len())
        }
        .await;
        self.ctx.finish(&conn, "restore block", result).await
    }

    /// Permanently delete a block and its subtree
    pub async fn delete_block(
        &self,
        actor_id: &str,
        block_id: &str,
    ) -> Result<DeleteResult, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<DeleteResult, TreeServiceError> = async {
            let Some(node) = node_store::get_tree_node(&conn, NodeKind::Block, block_id).await?
            else {
                return Ok(DeleteResult::not_found());
            };
            self.require(&node.container_id, actor_id, PermissionLevel::Edit)
                .await?;
            node_store::delete_node(&conn, NodeKind::Block, block_id).await?;
            Ok(DeleteResult::existed())
        }
        .await;
        self.ctx.finish(&conn, "delete block", result).await
    }

    //
    // PAGE ACCESS
    //

    pub async fn effective_level(
        &self,
        page_id: &str,
        user_id: &str,
    ) -> Result<PermissionLevel, TreeServiceError> {
        self.ctx.permissions.effective_level(page_id, user_id).await
    }

    /// Page author or workspace administrator
    pub async fn can_manage_permissions(
        &self,
        actor_id: &str,
        page_id: &str,
    ) -> Result<bool, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let page = self.load_page(&conn, page_id).await?;
        self.manages(&conn, &page, actor_id).await
    }

    /// Set the explicit level of `user_id` on a page, replacing any earlier grant
    pub async fn grant_page_access(
        &self,
        actor_id: &str,
        page_id: &str,
        user_id: &str,
        level: PermissionLevel,
    ) -> Result<PageGrant, TreeServiceError> {
        if level == PermissionLevel::None {
            return Err(TreeServiceError::invalid_operation(
                "grant a level above none, or revoke access instead",
            ));
        }

        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<PageGrant, TreeServiceError> = async {
            let page = self.load_page(&conn, page_id).await?;
            self.require_manager(&conn, &page, actor_id).await?;

            let now = Utc::now();
            access_store::upsert_grant(
                &conn,
                &PageGrant {
                    id: self.ctx.ids.next_id(),
                    page_id: page_id.to_string(),
                    user_id: user_id.to_string(),
                    level,
                    granted_by: Some(actor_id.to_string()),
                    created_at: now,
                    updated_at: now,
                },
            )
            .await?;
            access_store::get_grant(&conn, page_id, user_id)
                .await?
                .ok_or_else(|| TreeServiceError::not_found("grant", format!("{}/{}", page_id, user_id)))
        }
        .await;
        self.ctx.finish(&conn, "grant page access", result).await
    }

    /// Returns whether a grant was removed
    pub async fn revoke_page_access(
        &self,
        actor_id: &str,
        page_id: &str,
        user_id: &str,
    ) -> Result<bool, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result: Result<bool, TreeServiceError> = async {
            let page = self.load_page(&conn, page_id).await?;
            self.require_manager(&conn, &page, actor_id).await?;
            Ok(access_store::delete_grant(&conn, page_id, user_id).await? > 0)
        }
        .await;
        self.ctx.finish(&conn, "revoke page access", result).await
    }

    pub async fn list_page_grants(
        &self,
        actor_id: &str,
        page_id: &str,
    ) -> Result<Vec<PageGrant>, TreeServiceError> {
        let conn = self.ctx.db.connect_with_timeout().await?;
        let page = self.load_page(&conn, page_id).await?;
        self.require_manager(&conn, &page, actor_id).await?;
        Ok(access_store::list_grants(&conn, page_id).await?)
    }

    //
    // HELPERS
    //

    async fn require(
        &self,
        page_id: &str,
        actor_id: &str,
        required: PermissionLevel,
    ) -> Result<(), TreeServiceError> {
        require_level(self.ctx.permissions.as_ref(), page_id, actor_id, required).await
    }

    async fn load_page(&self, conn: &Connection, page_id: &str) -> Result<Page, TreeServiceError> {
        node_store::get_page(conn, page_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found("page", page_id))
    }

    async fn load_block(&self, conn: &Connection, block_id: &str) -> Result<Block, TreeServiceError> {
        node_store::get_block(conn, block_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found("block", block_id))
    }

    async fn load_block_node(
        &self,
        conn: &Connection,
        block_id: &str,
    ) -> Result<TreeNode, TreeServiceError> {
        node_store::get_tree_node(conn, NodeKind::Block, block_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found("block", block_id))
    }

    async fn block_subtree_ids(
        &self,
        conn: &Connection,
        root: &TreeNode,
    ) -> Result<Vec<String>, TreeServiceError> {
        let nodes =
            node_store::list_tree_nodes(conn, NodeKind::Block, &root.container_id, ArchiveFilter::All)
                .await?;
        Ok(node_store::depth_first_subtree(root, &nodes)
            .into_iter()
            .map(|node| node.id)
            .collect())
    }

    /// A parent must exist (`NotFound`), share the container and be live
    /// (`InvalidOperation`)
    async fn check_parent(
        &self,
        conn: &Connection,
        kind: NodeKind,
        parent_id: &str,
        container_id: &str,
    ) -> Result<(), TreeServiceError> {
        let parent = node_store::get_tree_node(conn, kind, parent_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found(format!("parent {}", kind), parent_id))?;
        if parent.container_id != container_id {
            return Err(TreeServiceError::invalid_operation(format!(
                "parent {} belongs to another {}",
                parent_id,
                kind.container_label()
            )));
        }
        if parent.is_archived {
            return Err(TreeServiceError::invalid_operation(format!(
                "parent {} {} is archived",
                kind, parent_id
            )));
        }
        Ok(())
    }

    async fn require_member(
        &self,
        conn: &Connection,
        workspace_id: &str,
        actor_id: &str,
    ) -> Result<(), TreeServiceError> {
        if access_store::get_member(conn, workspace_id, actor_id)
            .await?
            .is_none()
        {
            return Err(TreeServiceError::permission_denied(
                actor_id,
                PermissionLevel::View,
                format!("workspace {}", workspace_id),
            ));
        }
        Ok(())
    }

    async fn require_author(
        &self,
        conn: &Connection,
        workspace_id: &str,
        actor_id: &str,
    ) -> Result<(), TreeServiceError> {
        let can_author = access_store::get_member(conn, workspace_id, actor_id)
            .await?
            .is_some_and(|member| member.role.can_author());
        if !can_author {
            return Err(TreeServiceError::permission_denied(
                actor_id,
                PermissionLevel::Edit,
                format!("workspace {}", workspace_id),
            ));
        }
        Ok(())
    }

    async fn manages(
        &self,
        conn: &Connection,
        page: &Page,
        actor_id: &str,
    ) -> Result<bool, TreeServiceError> {
        if page.created_by == actor_id {
            return Ok(true);
        }
        Ok(access_store::get_member(conn, &page.workspace_id, actor_id)
            .await?
            .is_some_and(|member| member.role.is_administrative()))
    }

    async fn require_manager(
        &self,
        conn: &Connection,
        page: &Page,
        actor_id: &str,
    ) -> Result<(), TreeServiceError> {
        if self.manages(conn, page, actor_id).await? {
            Ok(())
        } else {
            Err(TreeServiceError::permission_denied(
                actor_id,
                PermissionLevel::Edit,
                format!("permissions of page {}", page.id),
            ))
        }
    }
}

/// Nest live pages under their parents, starting from the workspace roots
///
/// `pages` must be in sibling order; children keep that order. Pages whose
/// parent is not in `pages` (archived) are left out with their subtrees.
fn build_page_tree(pages: Vec<Page>) -> Vec<PageTree> {
    let mut roots = Vec::new();
    let mut children: HashMap<String, Vec<Page>> = HashMap::new();
    for page in pages {
        match page.parent_id.clone() {
            Some(parent_id) => children.entry(parent_id).or_default().push(page),
            None => roots.push(page),
        }
    }

    fn attach(page: Page, children: &mut HashMap<String, Vec<Page>>) -> PageTree {
        let nested = children
            .remove(&page.id)
            .unwrap_or_default()
            .into_iter()
            .map(|child| attach(child, children))
            .collect();
        PageTree {
            page,
            children: nested,
        }
    }

    roots
        .into_iter()
        .map(|page| attach(page, &mut children))
        .collect()
}


#[cfg(test)]
#[path = "page_service_test.rs"]
mod page_service_test;
