//! Tree Mutator - Cycle-Safe Move/Reparent
//!
//! `move_node` changes a page's or block's `(parent_id, order)` in one
//! statement. Children keep their parent pointers and travel with the moved
//! node.
//!
//! # Validation
//!
//! Inside one immediate transaction, in this order:
//!
//! 1. The node exists (`NotFound`) and the caller has `edit` on its page.
//! 2. `expected_version`, when given, matches the row (`VersionConflict`).
//! 3. The new parent is not the node itself (`InvalidOperation`).
//! 4. The new parent exists (`NotFound`) and lives in the same container
//!    (`InvalidOperation`). A live node cannot go under an archived parent
//!    (`InvalidOperation`).
//! 5. The node does not appear among the new parent's ancestors, which would
//!    detach the subtree into a cycle (`InvalidOperation`).

use crate::db::node_store;
use crate::models::{NodeKind, PermissionLevel, TreeNode};
use crate::services::context::ServiceContext;
use crate::services::error::TreeServiceError;
use crate::services::permission::require_level;
use libsql::Connection;
use std::collections::HashSet;

/// A move request
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub kind: NodeKind,
    pub node_id: String,
    pub new_parent_id: Option<String>,
    pub new_order: i64,
    /// Row version the caller last saw; `None` skips the check
    pub expected_version: Option<i64>,
}

impl MoveRequest {
    pub fn new(kind: NodeKind, node_id: impl Into<String>, new_order: i64) -> Self {
        Self {
            kind,
            node_id: node_id.into(),
            new_parent_id: None,
            new_order,
            expected_version: None,
        }
    }

    pub fn under(mut self, parent_id: impl Into<String>) -> Self {
        self.new_parent_id = Some(parent_id.into());
        self
    }

    pub fn expecting_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TreeMutator {
    ctx: ServiceContext,
}

impl TreeMutator {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Reparent and/or reorder a page or block
    ///
    /// Returns the node as stored after the move (with its bumped version).
    pub async fn move_node(
        &self,
        actor_id: &str,
        request: MoveRequest,
    ) -> Result<TreeNode, TreeServiceError> {
        let conn = self.ctx.db.begin_immediate().await?;
        let result = self.move_in(&conn, actor_id, &request).await;
        self.ctx.finish(&conn, "move node", result).await
    }

    async fn move_in(
        &self,
        conn: &Connection,
        actor_id: &str,
        request: &MoveRequest,
    ) -> Result<TreeNode, TreeServiceError> {
        let kind = request.kind;
        let node = node_store::get_tree_node(conn, kind, &request.node_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found(kind.as_str(), &request.node_id))?;

        require_level(
            self.ctx.permissions.as_ref(),
            node.governing_page_id(),
            actor_id,
            PermissionLevel::Edit,
        )
        .await?;

        if let Some(expected) = request.expected_version {
            if expected != node.version {
                return Err(TreeServiceError::version_conflict(
                    &node.id,
                    expected,
                    node.version,
                ));
            }
        }

        if let Some(parent_id) = request.new_parent_id.as_deref() {
            self.validate_new_parent(conn, &node, parent_id).await?;
        }

        let changed = node_store::update_placement(
            conn,
            kind,
            &node.id,
            request.new_parent_id.as_deref(),
            request.new_order,
            Some(node.version),
        )
        .await?;

        let moved = node_store::get_tree_node(conn, kind, &node.id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found(kind.as_str(), &node.id))?;

        if changed == 0 {
            return Err(TreeServiceError::version_conflict(
                &node.id,
                node.version,
                moved.version,
            ));
        }

        tracing::info!(
            kind = %kind,
            node_id = %node.id,
            from_parent = ?node.parent_id,
            to_parent = ?moved.parent_id,
            order = moved.order,
            "moved node"
        );

        Ok(moved)
    }

    async fn validate_new_parent(
        &self,
        conn: &Connection,
        node: &TreeNode,
        parent_id: &str,
    ) -> Result<(), TreeServiceError> {
        if parent_id == node.id {
            return Err(TreeServiceError::invalid_operation(format!(
                "{} {} cannot be its own parent",
                node.kind, node.id
            )));
        }

        let parent = node_store::get_tree_node(conn, node.kind, parent_id)
            .await?
            .ok_or_else(|| TreeServiceError::not_found(format!("parent {}", node.kind), parent_id))?;

        if parent.container_id != node.container_id {
            return Err(TreeServiceError::invalid_operation(format!(
                "parent {} belongs to another {}",
                parent_id,
                node.kind.container_label()
            )));
        }

        if parent.is_archived && !node.is_archived {
            return Err(TreeServiceError::invalid_operation(format!(
                "parent {} {} is archived",
                node.kind, parent_id
            )));
        }

        // Walk up from the candidate parent; meeting the moved node means the
        // candidate is one of its descendants.
        let mut visited: HashSet<String> = HashSet::new();
        let mut cursor = parent.parent_id;
        while let Some(ancestor_id) = cursor {
            if ancestor_id == node.id {
                return Err(TreeServiceError::invalid_operation(format!(
                    "cannot move {} {} under its own descendant {}",
                    node.kind, node.id, parent_id
                )));
            }
            if !visited.insert(ancestor_id.clone()) {
                tracing::warn!(
                    kind = %node.kind,
                    node_id = %ancestor_id,
                    "existing parent cycle found while validating move"
                );
                break;
            }
            cursor = node_store::get_tree_node(conn, node.kind, &ancestor_id)
                .await?
                .and_then(|ancestor| ancestor.parent_id);
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "tree_mutator_test.rs"]
mod tree_mutator_test;
