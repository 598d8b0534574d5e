//! Comment Service Tests
//!
//! Threads, depth cap, soft/hard deletion, reactions, mentions and
//! attachments.

#[cfg(test)]
mod comment_tests {
    use crate::config::CoreConfig;
    use crate::models::{
        CommentTarget, NewAttachment, NewBlock, NewComment, NewPage, PermissionLevel,
        WorkspaceRole,
    };
    use crate::services::{ServiceContext, TreeServiceError, TreeServices};
    use serde_json::json;
    use tempfile::TempDir;

    const BOB: &str = "6f1c2b3a-0000-4000-8000-000000000b0b";
    const STRANGER: &str = "9a9a9a9a-0000-4000-8000-00000000c0c0";

    struct Fixture {
        services: TreeServices,
        workspace_id: String,
        page_id: String,
        _temp: TempDir,
    }

    async fn create_fixture_with(config: CoreConfig) -> (Fixture, CoreConfig) {
        let temp_dir = TempDir::new().unwrap();
        let config = config.with_database_path(temp_dir.path().join("test.db"));
        let ctx = ServiceContext::open(config.clone()).await.unwrap();
        let services = TreeServices::new(ctx);

        let workspace = services
            .workspaces
            .create_workspace("Review", "alice")
            .await
            .unwrap();
        services
            .workspaces
            .add_member("alice", &workspace.id, BOB, WorkspaceRole::Editor)
            .await
            .unwrap();
        let page = services
            .pages
            .create_page(
                "alice",
                NewPage {
                    workspace_id: workspace.id.clone(),
                    title: "RFC".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        services
            .pages
            .grant_page_access("alice", &page.id, BOB, PermissionLevel::Comment)
            .await
            .unwrap();

        (
            Fixture {
                services,
                workspace_id: workspace.id,
                page_id: page.id,
                _temp: temp_dir,
            },
            config,
        )
    }

    async fn create_fixture() -> Fixture {
        create_fixture_with(CoreConfig::default()).await.0
    }

    #[tokio::test]
    async fn test_create_comment_and_replies() {
        let fx = create_fixture().await;
        let comments = &fx.services.comments;

        let root = comments
            .create_comment("alice", NewComment::on_page(&fx.page_id, "Looks good"))
            .await
            .unwrap();
        assert_eq!(root.thread_depth, 0);
        assert_eq!(root.target, CommentTarget::Page(fx.page_id.clone()));

        let reply = comments
            .create_comment(
                BOB,
                NewComment::on_page(&fx.page_id, "Agreed").reply_to(&root.id),
            )
            .await
            .unwrap();
        assert_eq!(reply.thread_depth, 1);
        assert_eq!(reply.parent_id.as_deref(), Some(root.id.as_str()));

        let thread = comments.thread(BOB, &root.id).await.unwrap();
        assert_eq!(thread.comment_count(), 2);
        assert_eq!(thread.replies[0].comment.id, reply.id);
        assert_eq!(comments.replies_count(BOB, &root.id).await.unwrap(), 1);

        let listing = comments
            .list_comments(BOB, &CommentTarget::Page(fx.page_id.clone()), 10, 0, false)
            .await
            .unwrap();
        assert_eq!(listing.total, 1);
        assert!(!listing.has_more);
        assert_eq!(listing.comments[0].id, root.id);
    }

    #[tokio::test]
    async fn test_comment_target_must_be_exactly_one() {
        let fx = create_fixture().await;

        let both = NewComment {
            page_id: Some(fx.page_id.clone()),
            block_id: Some("b".to_string()),
            parent_id: None,
            content: "hi".to_string(),
        };
        let result = fx.services.comments.create_comment("alice", both).await;
        assert!(result.unwrap_err().is_invalid_operation());

        let neither = NewComment {
            page_id: None,
            block_id: None,
            parent_id: None,
            content: "hi".to_string(),
        };
        let result = fx.services.comments.create_comment("alice", neither).await;
        assert!(result.unwrap_err().is_invalid_operation());
    }

    #[tokio::test]
    async fn test_reply_must_share_target_and_respect_depth_cap() {
        let mut config = CoreConfig::default();
        config.max_thread_depth = 2;
        let (fx, _config) = create_fixture_with(config).await;
        let comments = &fx.services.comments;

        let block = fx
            .services
            .pages
            .create_block(
                "alice",
                NewBlock {
                    page_id: fx.page_id.clone(),
                    parent_id: None,
                    block_type: "paragraph".to_string(),
                    content: json!({}),
                    order: 0,
                },
            )
            .await
            .unwrap();

        let mut parent = comments
            .create_comment("alice", NewComment::on_block(&block.id, "depth 0"))
            .await
            .unwrap();
        for depth in 1..=2 {
            parent = comments
                .create_comment(
                    "alice",
                    NewComment::on_block(&block.id, format!("depth {}", depth)).reply_to(&parent.id),
                )
                .await
                .unwrap();
            assert_eq!(parent.thread_depth, depth);
        }

        let too_deep = comments
            .create_comment(
                "alice",
                NewComment::on_block(&block.id, "depth 3").reply_to(&parent.id),
            )
            .await;
        assert!(too_deep.unwrap_err().is_invalid_operation());

        let wrong_target = comments
            .create_comment(
                "alice",
                NewComment::on_page(&fx.page_id, "elsewhere").reply_to(&parent.id),
            )
            .await;
        assert!(wrong_target.unwrap_err().is_invalid_operation());

        let missing_parent = comments
            .create_comment(
                "alice",
                NewComment::on_block(&block.id, "orphan").reply_to("ghost"),
            )
            .await;
        assert!(missing_parent.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_content_length_is_enforced() {
        let fx = create_fixture().await;

        let blank = fx
            .services
            .comments
            .create_comment("alice", NewComment::on_page(&fx.page_id, "   "))
            .await;
        assert!(blank.unwrap_err().is_invalid_operation());

        let long = fx
            .services
            .comments
            .create_comment("alice", NewComment::on_page(&fx.page_id, "x".repeat(10_001)))
            .await;
        assert!(long.unwrap_err().is_invalid_operation());
    }

    #[tokio::test]
    async fn test_viewer_without_comment_level_is_denied() {
        let fx = create_fixture().await;
        fx.services
            .workspaces
            .add_member("alice", &fx.workspace_id, "victor", WorkspaceRole::Viewer)
            .await
            .unwrap();
        fx.services
            .pages
            .grant_page_access("alice", &fx.page_id, "victor", PermissionLevel::View)
            .await
            .unwrap();

        let result = fx
            .services
            .comments
            .create_comment("victor", NewComment::on_page(&fx.page_id, "hello"))
            .await;
        assert!(matches!(
            result,
            Err(TreeServiceError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_mentions_keep_members_only_and_follow_edits() {
        let fx = create_fixture().await;
        let comments = &fx.services.comments;

        let content = format!(
            "@[Bob]({}) and @[Who]({}) and @[Bob]({}) again",
            BOB, STRANGER, BOB
        );
        let comment = comments
            .create_comment("alice", NewComment::on_page(&fx.page_id, content))
            .await
            .unwrap();

        let mentions = comments.mentions("alice", &comment.id).await.unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].mentioned_user_id, BOB);

        let edited = comments
            .edit_comment("alice", &comment.id, "no mentions any more")
            .await
            .unwrap();
        assert!(edited.edited_at.is_some());
        assert!(comments.mentions("alice", &comment.id).await.unwrap().is_empty());

        let not_author = comments.edit_comment(BOB, &comment.id, "hijack").await;
        assert!(matches!(
            not_author,
            Err(TreeServiceError::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_uppercase_mention_matches_member() {
        let fx = create_fixture().await;
        let comments = &fx.services.comments;

        let content = format!("ping @[Bob]({})", BOB.to_uppercase());
        let comment = comments
            .create_comment("alice", NewComment::on_page(&fx.page_id, content))
            .await
            .unwrap();

        let mentions = comments.mentions("alice", &comment.id).await.unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].mentioned_user_id, BOB);
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_replies() {
        let (fx, config) = create_fixture_with(CoreConfig::default()).await;
        let comments = &fx.services.comments;

        let root = comments
            .create_comment(BOB, NewComment::on_page(&fx.page_id, "first"))
            .await
            .unwrap();
        let reply = comments
            .create_comment("alice", NewComment::on_page(&fx.page_id, "second").reply_to(&root.id))
            .await
            .unwrap();

        let deleted = comments.soft_delete(BOB, &root.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.content, config.deleted_comment_placeholder);
        assert_eq!(deleted.deleted_by.as_deref(), Some(BOB));

        // Idempotent
        let again = comments.soft_delete(BOB, &root.id).await.unwrap();
        assert_eq!(again.deleted_at, deleted.deleted_at);

        assert!(comments.get_comment(BOB, &root.id, false).await.unwrap().is_none());
        assert!(comments.get_comment(BOB, &root.id, true).await.unwrap().is_some());
        assert!(comments.get_comment(BOB, &reply.id, false).await.unwrap().is_some());

        let edit = comments.edit_comment(BOB, &root.id, "undo").await;
        assert!(edit.unwrap_err().is_invalid_operation());
    }

    #[tokio::test]
    async fn test_hard_delete_is_admin_only_and_cascades() {
        let fx = create_fixture().await;
        let comments = &fx.services.comments;

        let root = comments
            .create_comment(BOB, NewComment::on_page(&fx.page_id, "root"))
            .await
            .unwrap();
        let reply = comments
            .create_comment(BOB, NewComment::on_page(&fx.page_id, "reply").reply_to(&root.id))
            .await
            .unwrap();
        comments.add_reaction(BOB, &reply.id, "heart").await.unwrap();

        let denied = comments.hard_delete(BOB, &root.id).await;
        assert!(matches!(
            denied,
            Err(TreeServiceError::PermissionDenied { .. })
        ));

        assert!(comments.hard_delete("alice", &root.id).await.unwrap().existed);
        assert!(comments.get_comment(BOB, &reply.id, true).await.unwrap().is_none());
        assert!(!comments.hard_delete("alice", &root.id).await.unwrap().existed);
    }

    #[tokio::test]
    async fn test_reactions_are_idempotent() {
        let fx = create_fixture().await;
        let comments = &fx.services.comments;
        let comment = comments
            .create_comment("alice", NewComment::on_page(&fx.page_id, "ship it"))
            .await
            .unwrap();

        let first = comments.add_reaction(BOB, &comment.id, "rocket").await.unwrap();
        let second = comments.add_reaction(BOB, &comment.id, "rocket").await.unwrap();
        assert_eq!(first.id, second.id);
        comments.add_reaction("alice", &comment.id, "rocket").await.unwrap();
        comments.add_reaction("alice", &comment.id, "eyes").await.unwrap();

        let summary = comments
            .reaction_summary(BOB, &comment.id)
            .await
            .unwrap();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].reaction_type, "rocket");
        assert_eq!(summary[0].count, 2);
        assert!(summary[0].viewer_has_reacted);
        assert!(!summary[1].viewer_has_reacted);

        let invalid = comments.add_reaction(BOB, &comment.id, "shrug").await;
        assert!(invalid.unwrap_err().is_invalid_operation());

        assert!(comments.remove_reaction(BOB, &comment.id, "rocket").await.unwrap());
        assert!(!comments.remove_reaction(BOB, &comment.id, "rocket").await.unwrap());
    }

    #[tokio::test]
    async fn test_attachments_by_author() {
        let fx = create_fixture().await;
        let comments = &fx.services.comments;
        let comment = comments
            .create_comment(BOB, NewComment::on_page(&fx.page_id, "see file"))
            .await
            .unwrap();

        let attachment = comments
            .add_attachment(
                BOB,
                &comment.id,
                NewAttachment {
                    file_name: "diagram.png".to_string(),
                    file_url: "https://files.example/diagram.png".to_string(),
                    file_size: Some(2048),
                    mime_type: Some("image/png".to_string()),
                    order_index: 0,
                },
            )
            .await
            .unwrap();
        assert_eq!(attachment.uploaded_by, BOB);

        let denied = comments
            .add_attachment(
                "alice",
                &comment.id,
                NewAttachment {
                    file_name: "other.txt".to_string(),
                    file_url: "https://files.example/other.txt".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(
            denied,
            Err(TreeServiceError::PermissionDenied { .. })
        ));

        let listed = comments.list_attachments(BOB, &comment.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, attachment.id);
        assert_eq!(listed[0].file_size, Some(2048));
    }

    #[tokio::test]
    async fn test_comment_reads_require_view() {
        let fx = create_fixture().await;
        fx.services
            .workspaces
            .add_member("alice", &fx.workspace_id, "carol", WorkspaceRole::Viewer)
            .await
            .unwrap();
        let comments = &fx.services.comments;
        let root = comments
            .create_comment(BOB, NewComment::on_page(&fx.page_id, "internal"))
            .await
            .unwrap();
        let target = CommentTarget::Page(fx.page_id.clone());

        let denied = |result: Result<(), TreeServiceError>| {
            assert!(matches!(result, Err(TreeServiceError::PermissionDenied { .. })));
        };
        denied(comments.get_comment("carol", &root.id, false).await.map(|_| ()));
        denied(comments.list_comments("carol", &target, 10, 0, false).await.map(|_| ()));
        denied(comments.thread("carol", &root.id).await.map(|_| ()));
        denied(comments.replies_count("carol", &root.id).await.map(|_| ()));
        denied(comments.mentions("carol", &root.id).await.map(|_| ()));
        denied(comments.reaction_summary("carol", &root.id).await.map(|_| ()));
        denied(comments.list_attachments("carol", &root.id).await.map(|_| ()));
        denied(comments.get_comment(STRANGER, &root.id, false).await.map(|_| ()));

        fx.services
            .pages
            .grant_page_access("alice", &fx.page_id, "carol", PermissionLevel::View)
            .await
            .unwrap();
        let listing = comments
            .list_comments("carol", &target, 10, 0, false)
            .await
            .unwrap();
        assert_eq!(listing.total, 1);
        assert!(comments
            .get_comment("carol", &root.id, false)
            .await
            .unwrap()
            .is_some());

        // Missing comments stay invisible rather than denied
        assert!(comments.get_comment("carol", "ghost", true).await.unwrap().is_none());
        assert!(comments.thread("carol", "ghost").await.unwrap_err().is_not_found());
    }
}
