//! Subtree Cloner - Two-Pass Duplication with Identity Remapping
//!
//! Duplicating a subtree never mutates the source. The copy is built in two
//! passes over the source nodes in depth-first pre-order:
//!
//! 1. **Shell pass**: insert every node under a fresh id with its payload and
//!    order copied and `parent_id` left unset, recording `old id -> new id`.
//! 2. **Link pass**: point each new node at the new id of its old parent, or
//!    at the chosen root target when the old parent lies outside the subtree.
//!
//! [`RemapPlan`] is the pure part of this (the id mapping and the resulting
//! parent pointers); restoring a ledger entry reuses it through
//! [`materialize_blocks`].
//!
//! Archived descendants are not copied. The copied root is always live.

use crate::db::access_store;
use crate::db::node_store::{self, ArchiveFilter};
use crate::models::{Block, BlockDescriptor, NodeKind, Page, PermissionLevel, TreeNode};
use crate::services::context::ServiceContext;
use crate::services::error::TreeServiceError;
use crate::services::ids::IdGenerator;
use crate::services::permission::require_level;
use chrono::Utc;
use libsql::Connection;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// One node of a remap plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemapEntry {
    pub old_id: String,
    pub new_id: String,
    pub new_parent_id: Option<String>,
}

/// The `old id -> new id` mapping of a duplication, with resolved parents
#[derive(Debug, Clone, Default)]
pub struct RemapPlan {
    entries: Vec<RemapEntry>,
    index: HashMap<String, usize>,
}

impl RemapPlan {
    /// Plan a copy of `nodes`, given as `(old id, old parent id)` pairs in
    /// insertion order
    ///
    /// A node whose old parent is not part of `nodes` (or who has none) is
    /// attached to `root_parent`. Repeated old ids keep their first entry.
    pub fn build<'a, I>(nodes: I, root_parent: Option<&str>, ids: &dyn IdGenerator) -> Self
    where
        I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
    {
        let mut plan = RemapPlan::default();
        let mut old_parents: Vec<Option<&'a str>> = Vec::new();

        // Pass one: fresh identities
        for (old_id, old_parent) in nodes {
            if plan.index.contains_key(old_id) {
                continue;
            }
            plan.index.insert(old_id.to_string(), plan.entries.len());
            plan.entries.push(RemapEntry {
                old_id: old_id.to_string(),
                new_id: ids.next_id(),
                new_parent_id: None,
            });
            old_parents.push(old_parent);
        }

        // Pass two: parents through the mapping
        for (position, old_parent) in old_parents.into_iter().enumerate() {
            let mapped = old_parent
                .and_then(|parent| plan.new_id(parent))
                .map(str::to_string);
            plan.entries[position].new_parent_id = mapped.or_else(|| root_parent.map(str::to_string));
        }

        plan
    }

    pub fn new_id(&self, old_id: &str) -> Option<&str> {
        self.index
            .get(old_id)
            .map(|&position| self.entries[position].new_id.as_str())
    }

    /// Entries in the order the nodes were given
    pub fn entries(&self) -> &[RemapEntry] {
        &self.entries
    }

    /// New id of the first node (the subtree root for a duplication)
    pub fn root_id(&self) -> Option<&str> {
        self.entries.first().map(|entry| entry.new_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Payload of a block about to be re-created under a new id
#[derive(Debug, Clone)]
pub(crate) struct BlockShell {
    pub old_id: String,
    pub old_parent_id: Option<String>,
    pub block_type: String,
    pub content: Value,
    pub order: i64,
    pub is_archived: bool,
}

impl From<&Block> for BlockShell {
    fn from(block: &Block) -> Self {
        Self {
            old_id: block.id.clone(),
            old_parent_id: block.parent_id.clone(),
            block_type: block.block_type.clone(),
            content: block.content.clone(),
            order: block.order,
            is_archived: block.is_archived,
        }
    }
}

impl From<&BlockDescriptor> for BlockShell {
    fn from(descriptor: &BlockDescriptor) -> Self {
        Self {
            old_id: descriptor.id.clone(),
            old_parent_id: descriptor.parent_block_id.clone(),
            block_type: descriptor.block_type.clone(),
            content: descriptor.content.clone(),
            order: descriptor.order,
            is_archived: descriptor.is_archived,
        }
    }
}

/// Insert `shells` into `page_id` under fresh ids, then link parents
///
/// Each copy keeps the archive flag of its shell.
pub(crate) async fn materialize_blocks(
    conn: &Connection,
    ids: &dyn IdGenerator,
    page_id: &str,
    shells: &[BlockShell],
    root_parent: Option<&str>,
) -> Result<RemapPlan, TreeServiceError> {
    let plan = RemapPlan::build(
        shells
            .iter()
            .map(|shell| (shell.old_id.as_str(), shell.old_parent_id.as_deref())),
        root_parent,
        ids,
    );

    let now = Utc::now();
    let mut inserted: HashSet<&str> = HashSet::new();
    for shell in shells {
        // Repeated old ids were collapsed by the plan
        if !inserted.insert(shell.old_id.as_str()) {
            continue;
        }
        let Some(new_id) = plan.new_id(&shell.old_id) else {
            continue;
        };
        let block = Block {
            id: new_id.to_string(),
            page_id: page_id.to_string(),
            parent_id: None,
            block_type: shell.block_type.clone(),
            content: shell.content.clone(),
            order: shell.order,
            is_archived: shell.is_archived,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        node_store::insert_block(conn, &block).await?;
    }

    for entry in plan.entries() {
        if let Some(parent_id) = entry.new_parent_id.as_deref() {
            node_store::link_parent(conn, NodeKind::Block, &entry.new_id, Some(parent_id)).await?;
        }
    }

    Ok(plan)
}

/// Where a duplicate goes
#[derive(Debug, Clone)]
pub struct DuplicateRequest {
    pub kind: NodeKind,
    pub root_id: String,
    /// Target workspace (pages) or page (blocks); `None` copies next to the source
    pub container_override: Option<String>,
    /// Pages only: also copy each page's block tree
    pub include_blocks: bool,
}

impl DuplicateRequest {
    pub fn new(kind: NodeKind, root_id: impl Into<String>) -> Self {
        Self {
            kind,
            root_id: root_id.into(),
            container_override: None,
            include_blocks: true,
        }
    }

    pub fn into_container(mut self, container_id: impl Into<String>) -> Self {
        self.container_override = Some(container_id.into());
        self
    }

    pub fn without_blocks(mut self) -> Self {
        self.include_blocks = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SubtreeCloner {
    ctx: ServiceContext,
}

impl SubtreeCloner {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Copy a page or block subtree; returns the id of the new root
    pub async fn duplicate(
        &self,
        actor_id: &str,
        request: DuplicateRequest,
    ) -> Result<String, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result = match request.kind {
            NodeKind::Page => self.duplicate_pages(&conn, actor_id, &request).await,
            NodeKind::Block => self.duplicate_blocks(&conn, actor_id, &request).await,
        };
        self.ctx.finish(&conn, "duplicate subtree", result).await
    }

    async fn load_root(
        &self,
        conn: &Connection,
        request: &DuplicateRequest,
    ) -> Result<TreeNode, TreeServiceError> {
        node_store::get_tree_node(conn, request.kind, &request.root_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found(request.kind.as_str(), &request.root_id))
    }

    async fn duplicate_blocks(
        &self,
        conn: &Connection,
        actor_id: &str,
        request: &DuplicateRequest,
    ) -> Result<String, TreeServiceError> {
        let root = self.load_root(conn, request).await?;
        let source_page = root.container_id.clone();

        let (target_page, root_parent) = match request.container_override.as_deref() {
            Some(page_id) => {
                if node_store::get_tree_node(conn, NodeKind::Page, page_id)
                    .await?
                    .is_none()
                {
                    return Err(TreeServiceError::not_found("page", page_id));
                }
                (page_id.to_string(), None)
            }
            None => (source_page.clone(), root.parent_id.clone()),
        };

        let permissions = self.ctx.permissions.as_ref();
        require_level(permissions, &source_page, actor_id, PermissionLevel::View).await?;
        require_level(permissions, &target_page, actor_id, PermissionLevel::Edit).await?;

        let live = node_store::list_tree_nodes(conn, NodeKind::Block, &source_page, ArchiveFilter::LiveOnly)
            .await?;
        let subtree = node_store::depth_first_subtree(&root, &live);

        let mut blocks: HashMap<String, Block> = node_store::list_blocks(conn, &source_page, ArchiveFilter::All)
            .await?
            .into_iter()
            .map(|block| (block.id.clone(), block))
            .collect();
        let shells: Vec<BlockShell> = subtree
            .iter()
            .filter_map(|node| blocks.remove(&node.id))
            .map(|block| BlockShell::from(&block))
            .collect();

        let plan = materialize_blocks(
            conn,
            self.ctx.ids.as_ref(),
            &target_page,
            &shells,
            root_parent.as_deref(),
        )
        .await?;

        let new_root = plan
            .root_id()
            .map(str::to_string)
            .ok_or_else(|| TreeServiceError::not_found("block", &request.root_id))?;

        tracing::info!(
            source = %request.root_id,
            copy = %new_root,
            page_id = %target_page,
            blocks = plan.len(),
            "duplicated block subtree"
        );

        Ok(new_root)
    }

    async fn duplicate_pages(
        &self,
        conn: &Connection,
        actor_id: &str,
        request: &DuplicateRequest,
    ) -> Result<String, TreeServiceError> {
        let root = self.load_root(conn, request).await?;
        let source_workspace = root.container_id.clone();

        require_level(
            self.ctx.permissions.as_ref(),
            &root.id,
            actor_id,
            PermissionLevel::View,
        )
        .await?;

        let (target_workspace, root_parent) = match request.container_override.as_deref() {
            Some(workspace_id) => (workspace_id.to_string(), None),
            None => (source_workspace.clone(), root.parent_id.clone()),
        };

        if access_store::get_workspace(conn, &target_workspace).await?.is_none() {
            return Err(TreeServiceError::not_found("workspace", &target_workspace));
        }
        let can_author = access_store::get_member(conn, &target_workspace, actor_id)
            .await?
            .is_some_and(|member| member.role.can_author());
        if !can_author {
            return Err(TreeServiceError::permission_denied(
                actor_id,
                PermissionLevel::Edit,
                format!("workspace {}", target_workspace),
            ));
        }

        let live = node_store::list_tree_nodes(conn, NodeKind::Page, &source_workspace, ArchiveFilter::LiveOnly)
            .await?;
        let subtree = node_store::depth_first_subtree(&root, &live);

        let plan = RemapPlan::build(
            subtree
                .iter()
                .map(|node| (node.id.as_str(), node.parent_id.as_deref())),
            root_parent.as_deref(),
            self.ctx.ids.as_ref(),
        );

        let now = Utc::now();
        let mut copied_blocks = 0;

        // Shell pass
        for entry in plan.entries() {
            let source: Page = node_store::get_page(conn, &entry.old_id)
                .await?
                .ok_or_else(|| TreeServiceError::not_found("page", &entry.old_id))?;
            let copy = Page {
                id: entry.new_id.clone(),
                workspace_id: target_workspace.clone(),
                parent_id: None,
                title: source.title.clone(),
                icon: source.icon.clone(),
                cover_image: source.cover_image.clone(),
                order: source.order,
                is_archived: false,
                created_by: actor_id.to_string(),
                version: 1,
                created_at: now,
                updated_at: now,
            };
            node_store::insert_page(conn, &copy).await?;

            if request.include_blocks {
                let blocks =
                    node_store::list_blocks(conn, &entry.old_id, ArchiveFilter::LiveOnly).await?;
                let shells: Vec<BlockShell> = blocks.iter().map(BlockShell::from).collect();
                let block_plan =
                    materialize_blocks(conn, self.ctx.ids.as_ref(), &copy.id, &shells, None)
                        .await?;
                copied_blocks += block_plan.len();
            }
        }

        // Link pass
        for entry in plan.entries() {
            if let Some(parent_id) = entry.new_parent_id.as_deref() {
                node_store::link_parent(conn, NodeKind::Page, &entry.new_id, Some(parent_id))
                    .await?;
            }
        }

        let new_root = plan
            .root_id()
            .map(str::to_string)
            .ok_or_else(|| TreeServiceError::not_found("page", &request.root_id))?;

        tracing::info!(
            source = %request.root_id,
            copy = %new_root,
            workspace_id = %target_workspace,
            pages = plan.len(),
            blocks = copied_blocks,
            "duplicated page subtree"
        );

        Ok(new_root)
    }
}


#[cfg(test)]
#[path = "subtree_cloner_test.rs"]
mod subtree_cloner_test;
