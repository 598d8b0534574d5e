//! Tree Move Tests
//!
//! Reparenting and reordering of pages and blocks: cycle rejection,
//! container boundaries and the optimistic version check.

#[cfg(test)]
mod move_tests {
    use crate::config::CoreConfig;
    use crate::models::{NewBlock, NewPage, NodeKind, WorkspaceRole};
    use crate::services::{MoveRequest, ServiceContext, TreeServiceError, TreeServices};
    use serde_json::json;
    use tempfile::TempDir;

    struct Fixture {
        services: TreeServices,
        workspace_id: String,
        page_id: String,
        _temp: TempDir,
    }

    async fn create_fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let config = CoreConfig::default().with_database_path(temp_dir.path().join("test.db"));
        let ctx = ServiceContext::open(config).await.unwrap();
        let services = TreeServices::new(ctx);

        let workspace = services
            .workspaces
            .create_workspace("Moves", "alice")
            .await
            .unwrap();
        let page = services
            .pages
            .create_page(
                "alice",
                NewPage {
                    workspace_id: workspace.id.clone(),
                    title: "Board".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        Fixture {
            services,
            workspace_id: workspace.id,
            page_id: page.id,
            _temp: temp_dir,
        }
    }

    async fn block(fx: &Fixture, page_id: &str, parent: Option<&str>, order: i64) -> String {
        fx.services
            .pages
            .create_block(
                "alice",
                NewBlock {
                    page_id: page_id.to_string(),
                    parent_id: parent.map(str::to_string),
                    block_type: "paragraph".to_string(),
                    content: json!({}),
                    order,
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_move_block_reparents_and_bumps_version() {
        let fx = create_fixture().await;
        let a = block(&fx, &fx.page_id, None, 0).await;
        let b = block(&fx, &fx.page_id, None, 1).await;

        let moved = fx
            .services
            .mutator
            .move_node("alice", MoveRequest::new(NodeKind::Block, &b, 3).under(&a))
            .await
            .unwrap();

        assert_eq!(moved.parent_id.as_deref(), Some(a.as_str()));
        assert_eq!(moved.order, 3);
        assert_eq!(moved.version, 2);

        // Back to the root
        let root = fx
            .services
            .mutator
            .move_node("alice", MoveRequest::new(NodeKind::Block, &b, 0))
            .await
            .unwrap();
        assert!(root.is_root());
        assert_eq!(root.version, 3);
    }

    #[tokio::test]
    async fn test_move_rejects_self_parent_and_descendant() {
        let fx = create_fixture().await;
        let a = block(&fx, &fx.page_id, None, 0).await;
        let b = block(&fx, &fx.page_id, Some(&a), 0).await;
        let c = block(&fx, &fx.page_id, Some(&b), 0).await;

        let own = fx
            .services
            .mutator
            .move_node("alice", MoveRequest::new(NodeKind::Block, &a, 0).under(&a))
            .await;
        assert!(own.unwrap_err().is_invalid_operation());

        // Grandchild, not just a direct child
        let cycle = fx
            .services
            .mutator
            .move_node("alice", MoveRequest::new(NodeKind::Block, &a, 0).under(&c))
            .await;
        assert!(cycle.unwrap_err().is_invalid_operation());

        // Nothing changed
        let blocks = fx
            .services
            .pages
            .list_blocks("alice", &fx.page_id)
            .await
            .unwrap();
        let a_now = blocks.iter().find(|blk| blk.id == a).unwrap();
        assert!(a_now.parent_id.is_none());
        assert_eq!(a_now.version, 1);
    }

    #[tokio::test]
    async fn test_move_block_across_pages_is_rejected() {
        let fx = create_fixture().await;
        let other = fx
            .services
            .pages
            .create_page(
                "alice",
                NewPage {
                    workspace_id: fx.workspace_id.clone(),
                    title: "Other".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let here = block(&fx, &fx.page_id, None, 0).await;
        let there = block(&fx, &other.id, None, 0).await;

        let result = fx
            .services
            .mutator
            .move_node("alice", MoveRequest::new(NodeKind::Block, &here, 0).under(&there))
            .await;
        assert!(result.unwrap_err().is_invalid_operation());

        let missing = fx
            .services
            .mutator
            .move_node("alice", MoveRequest::new(NodeKind::Block, &here, 0).under("ghost"))
            .await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_move_live_block_under_archived_parent_is_rejected() {
        let fx = create_fixture().await;
        let a = block(&fx, &fx.page_id, None, 0).await;
        let c = block(&fx, &fx.page_id, None, 1).await;
        fx.services.pages.archive_block("alice", &a).await.unwrap();

        let result = fx
            .services
            .mutator
            .move_node("alice", MoveRequest::new(NodeKind::Block, &c, 0).under(&a))
            .await;
        assert!(result.unwrap_err().is_invalid_operation());

        let c_now = fx.services.pages.get_block("alice", &c).await.unwrap();
        assert!(c_now.parent_id.is_none());
        assert_eq!(c_now.version, 1);

        // Once the parent is back the same move goes through
        fx.services.pages.restore_block("alice", &a).await.unwrap();
        let moved = fx
            .services
            .mutator
            .move_node("alice", MoveRequest::new(NodeKind::Block, &c, 0).under(&a))
            .await
            .unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some(a.as_str()));
    }

    #[tokio::test]
    async fn test_move_page_checks_expected_version() {
        let fx = create_fixture().await;
        let parent = fx
            .services
            .pages
            .create_page(
                "alice",
                NewPage {
                    workspace_id: fx.workspace_id.clone(),
                    title: "Parent".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let stale = fx
            .services
            .mutator
            .move_node(
                "alice",
                MoveRequest::new(NodeKind::Page, &fx.page_id, 0)
                    .under(&parent.id)
                    .expecting_version(7),
            )
            .await;
        assert!(matches!(
            stale,
            Err(TreeServiceError::VersionConflict {
                expected: 7,
                actual: 1,
                ..
            })
        ));

        let moved = fx
            .services
            .mutator
            .move_node(
                "alice",
                MoveRequest::new(NodeKind::Page, &fx.page_id, 0)
                    .under(&parent.id)
                    .expecting_version(1),
            )
            .await
            .unwrap();
        assert_eq!(moved.parent_id.as_deref(), Some(parent.id.as_str()));

        // Parent cannot now go under its child
        let cycle = fx
            .services
            .mutator
            .move_node(
                "alice",
                MoveRequest::new(NodeKind::Page, &parent.id, 0).under(&fx.page_id),
            )
            .await;
        assert!(cycle.unwrap_err().is_invalid_operation());
    }

    #[tokio::test]
    async fn test_move_requires_edit_level() {
        let fx = create_fixture().await;
        fx.services
            .workspaces
            .add_member("alice", &fx.workspace_id, "bob", WorkspaceRole::Editor)
            .await
            .unwrap();
        let a = block(&fx, &fx.page_id, None, 0).await;

        let result = fx
            .services
            .mutator
            .move_node("bob", MoveRequest::new(NodeKind::Block, &a, 5))
            .await;
        assert!(matches!(
            result,
            Err(TreeServiceError::PermissionDenied { .. })
        ));

        let missing = fx
            .services
            .mutator
            .move_node("alice", MoveRequest::new(NodeKind::Block, "ghost", 0))
            .await;
        assert!(missing.unwrap_err().is_not_found());
    }
}
