//! Cross-service scenarios for the content tree
//!
//! Tests cover:
//! - Snapshot, edit, restore round trip on a two-block page
//! - Restore reversibility through the pre-restore checkpoint
//! - Archived blocks surviving a restore round trip
//! - All-or-nothing duplicate and restore when a write fails midway
//! - Duplicate isomorphism and independence
//! - Version numbering
//! - Move invariant and cycle rejection
//! - Comment depth cap, target exclusivity and reaction idempotence

use quire_core::models::{
    Block, BlockUpdate, NewBlock, NewComment, NewPage, NodeKind, PermissionLevel, WorkspaceRole,
};
use quire_core::db::{node_store, ArchiveFilter, DatabaseService};
use quire_core::services::{
    DuplicateRequest, IdGenerator, MoveRequest, ServiceContext, TreeServiceError, TreeServices,
    UuidGenerator,
};
use quire_core::CoreConfig;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Shape of a block tree with ids erased, children in sibling order
#[derive(Debug, PartialEq)]
struct Shape {
    block_type: String,
    content: Value,
    order: i64,
    children: Vec<Shape>,
}

fn shape_of(blocks: &[Block]) -> Vec<Shape> {
    fn build(parent: Option<&str>, blocks: &[Block]) -> Vec<Shape> {
        // list_blocks already returns sibling order
        blocks
            .iter()
            .filter(|b| b.parent_id.as_deref() == parent)
            .map(|b| Shape {
                block_type: b.block_type.clone(),
                content: b.content.clone(),
                order: b.order,
                children: build(Some(&b.id), blocks),
            })
            .collect()
    }
    build(None, blocks)
}

/// UUIDs, except for one planted id handed out after `skip` more calls
#[derive(Default)]
struct PlantedIds {
    plan: Mutex<Option<(usize, String)>>,
}

impl PlantedIds {
    fn plant(&self, skip: usize, id: &str) {
        *self.plan.lock().unwrap() = Some((skip, id.to_string()));
    }
}

impl IdGenerator for PlantedIds {
    fn next_id(&self) -> String {
        let mut plan = self.plan.lock().unwrap();
        match plan.take() {
            Some((0, id)) => id,
            Some((skip, id)) => {
                *plan = Some((skip - 1, id));
                UuidGenerator.next_id()
            }
            None => UuidGenerator.next_id(),
        }
    }
}

async fn setup() -> (TreeServices, String, String, TempDir) {
    setup_with_ids(Arc::new(UuidGenerator)).await
}

async fn setup_with_ids(ids: Arc<dyn IdGenerator>) -> (TreeServices, String, String, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = CoreConfig::default().with_database_path(temp_dir.path().join("scenarios.db"));
    let ctx = ServiceContext::open(config).await.unwrap().with_id_generator(ids);
    let services = TreeServices::new(ctx);

    let workspace = services
        .workspaces
        .create_workspace("Scenarios", "alice")
        .await
        .unwrap();
    let page = services
        .pages
        .create_page(
            "alice",
            NewPage {
                workspace_id: workspace.id.clone(),
                title: "P".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    (services, workspace.id, page.id, temp_dir)
}

async fn add_block(
    services: &TreeServices,
    page_id: &str,
    parent: Option<&str>,
    content: Value,
    order: i64,
) -> String {
    services
        .pages
        .create_block(
            "alice",
            NewBlock {
                page_id: page_id.to_string(),
                parent_id: parent.map(str::to_string),
                block_type: "paragraph".to_string(),
                content,
                order,
            },
        )
        .await
        .unwrap()
        .id
}

// =========================================================================
// Version Ledger & Restore
// =========================================================================

#[tokio::test]
async fn test_snapshot_edit_restore_round_trip() {
    let (services, _ws, page_id, _temp) = setup().await;
    let a = add_block(&services, &page_id, None, json!({ "text": "A" }), 0).await;
    let b = add_block(&services, &page_id, Some(&a), json!({ "text": "B" }), 1).await;

    let v1 = services.ledger.snapshot("alice", &page_id, None).await.unwrap();
    assert_eq!(v1.version_number, 1);
    assert_eq!(v1.content_snapshot.len(), 2);

    services
        .pages
        .update_block(
            "alice",
            &a,
            BlockUpdate::new().with_content(json!({ "text": "A edited" })),
        )
        .await
        .unwrap();
    let v2 = services
        .ledger
        .snapshot("alice", &page_id, Some("edit A"))
        .await
        .unwrap();
    assert_eq!(v2.version_number, 2);

    services.restore.restore("alice", &page_id, 1).await.unwrap();

    let blocks = services.pages.list_blocks("alice", &page_id).await.unwrap();
    assert_eq!(blocks.len(), 2);
    let new_a = blocks.iter().find(|blk| blk.parent_id.is_none()).unwrap();
    let new_b = blocks.iter().find(|blk| blk.parent_id.is_some()).unwrap();
    assert_eq!(new_a.content, json!({ "text": "A" }));
    assert_eq!(new_b.content, json!({ "text": "B" }));
    assert_eq!(new_b.parent_id.as_deref(), Some(new_a.id.as_str()));
    assert_eq!(new_b.order, 1);
    assert_ne!(new_a.id, a);
    assert_ne!(new_b.id, b);

    let checkpoint = services.ledger.get_version("alice", &page_id, 3).await.unwrap();
    assert_eq!(checkpoint.content_snapshot.len(), 2);
    assert!(checkpoint
        .content_snapshot
        .iter()
        .any(|d| d.content == json!({ "text": "A edited" })));
    assert_eq!(
        checkpoint.change_summary.as_deref(),
        Some("before restoring to version 1")
    );
}

#[tokio::test]
async fn test_restore_is_reversible_through_checkpoint() {
    let (services, _ws, page_id, _temp) = setup().await;
    let a = add_block(&services, &page_id, None, json!({ "text": "intro" }), 0).await;
    add_block(&services, &page_id, Some(&a), json!({ "text": "point" }), 0).await;
    services.ledger.snapshot("alice", &page_id, None).await.unwrap();

    // Diverge: new nested block, new root block, renamed title
    let c = add_block(&services, &page_id, Some(&a), json!({ "text": "extra" }), 1).await;
    add_block(&services, &page_id, Some(&c), json!({ "text": "deep" }), 0).await;
    add_block(&services, &page_id, None, json!({ "text": "outro" }), 1).await;
    services
        .pages
        .update_page(
            "alice",
            &page_id,
            quire_core::models::PageUpdate::new().with_title("Renamed"),
            None,
        )
        .await
        .unwrap();

    let before = shape_of(&services.pages.list_blocks("alice", &page_id).await.unwrap());

    let restored = services.restore.restore("alice", &page_id, 1).await.unwrap();
    assert_eq!(restored.title, "P");
    assert_ne!(
        shape_of(&services.pages.list_blocks("alice", &page_id).await.unwrap()),
        before
    );

    // The checkpoint written by that restore is the latest version
    let latest = services
        .ledger
        .list_versions("alice", &page_id, Some(1))
        .await
        .unwrap();
    assert_eq!(latest[0].version_number, 2);

    let reverted = services
        .restore
        .restore("alice", &page_id, latest[0].version_number)
        .await
        .unwrap();
    assert_eq!(reverted.title, "Renamed");
    assert_eq!(
        shape_of(&services.pages.list_blocks("alice", &page_id).await.unwrap()),
        before
    );
}

#[tokio::test]
async fn test_restore_keeps_archived_blocks() {
    let (services, _ws, page_id, temp) = setup().await;
    let keep = add_block(&services, &page_id, None, json!({ "text": "keep" }), 0).await;
    let trashed = add_block(&services, &page_id, Some(&keep), json!({ "text": "trashed" }), 0).await;
    services.pages.archive_block("alice", &trashed).await.unwrap();

    let v1 = services.ledger.snapshot("alice", &page_id, None).await.unwrap();
    assert_eq!(v1.content_snapshot.len(), 2);
    assert!(v1
        .content_snapshot
        .iter()
        .any(|d| d.id == trashed && d.is_archived));

    services.restore.restore("alice", &page_id, 1).await.unwrap();
    let checkpoint = services.ledger.get_version("alice", &page_id, 2).await.unwrap();
    assert_eq!(checkpoint.content_snapshot.len(), 2);

    services.restore.restore("alice", &page_id, 2).await.unwrap();

    let live = services.pages.list_blocks("alice", &page_id).await.unwrap();
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].content, json!({ "text": "keep" }));

    let db = DatabaseService::new(temp.path().join("scenarios.db")).await.unwrap();
    let conn = db.connect().unwrap();
    let archived = node_store::list_blocks(&conn, &page_id, ArchiveFilter::ArchivedOnly)
        .await
        .unwrap();
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].content, json!({ "text": "trashed" }));
    assert_eq!(archived[0].parent_id.as_deref(), Some(live[0].id.as_str()));

    // Still recoverable from the trash
    services.pages.restore_block("alice", &archived[0].id).await.unwrap();
    assert_eq!(services.pages.list_blocks("alice", &page_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_restore_rolls_back_everything() {
    let ids = Arc::new(PlantedIds::default());
    let (services, ws, page_id, _temp) = setup_with_ids(ids.clone()).await;
    let a = add_block(&services, &page_id, None, json!({ "text": "A" }), 0).await;
    add_block(&services, &page_id, Some(&a), json!({ "text": "B" }), 0).await;
    services.ledger.snapshot("alice", &page_id, None).await.unwrap();
    services
        .pages
        .update_block(
            "alice",
            &a,
            BlockUpdate::new().with_content(json!({ "text": "A edited" })),
        )
        .await
        .unwrap();

    let other = services
        .pages
        .create_page(
            "alice",
            NewPage {
                workspace_id: ws,
                title: "Elsewhere".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let taken = add_block(&services, &other.id, None, json!({ "text": "taken" }), 0).await;
    let before: Vec<Block> = services.pages.list_blocks("alice", &page_id).await.unwrap();

    // Ids drawn by restore: checkpoint entry, then one per restored block.
    // The second block collides with a block on another page.
    ids.plant(2, &taken);
    let result = services.restore.restore("alice", &page_id, 1).await;
    assert!(matches!(
        result,
        Err(TreeServiceError::Conflict(_) | TreeServiceError::TransactionFailed { .. })
    ));

    let after = services.pages.list_blocks("alice", &page_id).await.unwrap();
    let before_ids: Vec<&str> = before.iter().map(|b| b.id.as_str()).collect();
    let after_ids: Vec<&str> = after.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(after_ids, before_ids);
    assert_eq!(shape_of(&after), shape_of(&before));

    let versions = services
        .ledger
        .list_versions("alice", &page_id, None)
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);

    let other_blocks = services.pages.list_blocks("alice", &other.id).await.unwrap();
    assert_eq!(other_blocks.len(), 1);
    assert_eq!(other_blocks[0].content, json!({ "text": "taken" }));
}

#[tokio::test]
async fn test_version_numbers_are_sequential() {
    let (services, _ws, page_id, _temp) = setup().await;

    for expected in 1..=4 {
        let version = services.ledger.snapshot("alice", &page_id, None).await.unwrap();
        assert_eq!(version.version_number, expected);
    }

    let versions = services
        .ledger
        .list_versions("alice", &page_id, None)
        .await
        .unwrap();
    let numbers: Vec<i64> = versions.iter().map(|v| v.version_number).collect();
    assert_eq!(numbers, vec![4, 3, 2, 1]);

    let missing = services.restore.restore("alice", &page_id, 9).await;
    assert!(missing.unwrap_err().is_not_found());
    // A failed restore leaves no checkpoint behind
    assert_eq!(
        services
            .ledger
            .list_versions("alice", &page_id, None)
            .await
            .unwrap()
            .len(),
        4
    );
}

// =========================================================================
// Duplicate
// =========================================================================

#[tokio::test]
async fn test_duplicate_is_isomorphic_and_independent() {
    let (services, ws, page_id, _temp) = setup().await;
    let root = add_block(&services, &page_id, None, json!({ "text": "root" }), 0).await;
    let left = add_block(&services, &page_id, Some(&root), json!({ "text": "left" }), 0).await;
    add_block(&services, &page_id, Some(&root), json!({ "text": "right" }), 1).await;
    add_block(&services, &page_id, Some(&left), json!({ "text": "leaf" }), 0).await;

    let target = services
        .pages
        .create_page(
            "alice",
            NewPage {
                workspace_id: ws,
                title: "Copy target".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let copy_root = services
        .cloner
        .duplicate(
            "alice",
            DuplicateRequest::new(NodeKind::Block, &root).into_container(&target.id),
        )
        .await
        .unwrap();

    let source = services.pages.list_blocks("alice", &page_id).await.unwrap();
    let copy = services.pages.list_blocks("alice", &target.id).await.unwrap();
    assert_eq!(shape_of(&source), shape_of(&copy));

    let source_ids: HashSet<&str> = source.iter().map(|b| b.id.as_str()).collect();
    assert!(copy.iter().all(|b| !source_ids.contains(b.id.as_str())));

    services
        .pages
        .update_block(
            "alice",
            &copy_root,
            BlockUpdate::new().with_content(json!({ "text": "mutated copy" })),
        )
        .await
        .unwrap();
    let source_root = services.pages.get_block("alice", &root).await.unwrap();
    assert_eq!(source_root.content, json!({ "text": "root" }));
}

#[tokio::test]
async fn test_failed_duplicate_leaves_no_partial_copy() {
    let ids = Arc::new(PlantedIds::default());
    let (services, _ws, page_id, _temp) = setup_with_ids(ids.clone()).await;
    let root = add_block(&services, &page_id, None, json!({ "text": "root" }), 0).await;
    add_block(&services, &page_id, Some(&root), json!({ "text": "one" }), 0).await;
    add_block(&services, &page_id, Some(&root), json!({ "text": "two" }), 1).await;
    let before = services.pages.list_blocks("alice", &page_id).await.unwrap();

    // First copy gets a fresh id, the second reuses the source root's id
    ids.plant(1, &root);
    let result = services
        .cloner
        .duplicate("alice", DuplicateRequest::new(NodeKind::Block, &root))
        .await;
    assert!(matches!(
        result,
        Err(TreeServiceError::Conflict(_) | TreeServiceError::TransactionFailed { .. })
    ));

    let after = services.pages.list_blocks("alice", &page_id).await.unwrap();
    assert_eq!(after.len(), 3);
    assert_eq!(
        after.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
        before.iter().map(|b| b.id.as_str()).collect::<Vec<_>>()
    );
    assert_eq!(shape_of(&after), shape_of(&before));

    // With the planted id spent, the same request succeeds
    services
        .cloner
        .duplicate("alice", DuplicateRequest::new(NodeKind::Block, &root))
        .await
        .unwrap();
    assert_eq!(services.pages.list_blocks("alice", &page_id).await.unwrap().len(), 6);
}

// =========================================================================
// Move
// =========================================================================

#[tokio::test]
async fn test_move_succeeds_for_any_other_parent_in_container() {
    let (services, _ws, page_id, _temp) = setup().await;
    let mut ids = Vec::new();
    for i in 0..4 {
        ids.push(add_block(&services, &page_id, None, json!({ "n": i }), i).await);
    }

    let node = &ids[0];
    for candidate in &ids {
        let result = services
            .mutator
            .move_node(
                "alice",
                MoveRequest::new(NodeKind::Block, node, 0).under(candidate),
            )
            .await;
        if candidate == node {
            assert!(result.unwrap_err().is_invalid_operation());
        } else {
            assert_eq!(result.unwrap().parent_id.as_deref(), Some(candidate.as_str()));
        }
    }
}

#[tokio::test]
async fn test_move_never_creates_a_cycle() {
    let (services, _ws, page_id, _temp) = setup().await;
    // chain: c0 <- c1 <- c2 <- c3
    let mut chain = vec![add_block(&services, &page_id, None, json!({}), 0).await];
    for i in 1..4 {
        let parent = chain[i - 1].clone();
        chain.push(add_block(&services, &page_id, Some(&parent), json!({}), 0).await);
    }

    for descendant in &chain[1..] {
        let result = services
            .mutator
            .move_node(
                "alice",
                MoveRequest::new(NodeKind::Block, &chain[0], 0).under(descendant),
            )
            .await;
        assert!(result.unwrap_err().is_invalid_operation());
    }

    // Every node still reaches a root
    let blocks = services.pages.list_blocks("alice", &page_id).await.unwrap();
    let parents: BTreeMap<&str, Option<&str>> = blocks
        .iter()
        .map(|b| (b.id.as_str(), b.parent_id.as_deref()))
        .collect();
    for block in &blocks {
        let mut steps = 0;
        let mut cursor = parents[block.id.as_str()];
        while let Some(parent) = cursor {
            steps += 1;
            assert!(steps <= blocks.len());
            cursor = parents[parent];
        }
    }
}

// =========================================================================
// Comments
// =========================================================================

#[tokio::test]
async fn test_thread_depth_cap_at_five() {
    let (services, _ws, page_id, _temp) = setup().await;

    let mut parent = services
        .comments
        .create_comment("alice", NewComment::on_page(&page_id, "root"))
        .await
        .unwrap();
    for depth in 1..=5 {
        parent = services
            .comments
            .create_comment(
                "alice",
                NewComment::on_page(&page_id, format!("reply {}", depth)).reply_to(&parent.id),
            )
            .await
            .unwrap();
    }
    assert_eq!(parent.thread_depth, 5);

    let sixth = services
        .comments
        .create_comment(
            "alice",
            NewComment::on_page(&page_id, "reply 6").reply_to(&parent.id),
        )
        .await;
    assert!(sixth.unwrap_err().is_invalid_operation());
}

#[tokio::test]
async fn test_comment_target_exclusivity() {
    let (services, _ws, page_id, _temp) = setup().await;
    let block = add_block(&services, &page_id, None, json!({}), 0).await;

    let both = NewComment {
        page_id: Some(page_id.clone()),
        block_id: Some(block.clone()),
        parent_id: None,
        content: "both".to_string(),
    };
    assert!(services
        .comments
        .create_comment("alice", both)
        .await
        .unwrap_err()
        .is_invalid_operation());

    let neither = NewComment {
        page_id: None,
        block_id: None,
        parent_id: None,
        content: "neither".to_string(),
    };
    assert!(services
        .comments
        .create_comment("alice", neither)
        .await
        .unwrap_err()
        .is_invalid_operation());
}

#[tokio::test]
async fn test_reaction_added_twice_is_stored_once() {
    let (services, ws, page_id, _temp) = setup().await;
    services
        .workspaces
        .add_member("alice", &ws, "bob", WorkspaceRole::Editor)
        .await
        .unwrap();
    services
        .pages
        .grant_page_access("alice", &page_id, "bob", PermissionLevel::Comment)
        .await
        .unwrap();
    let comment = services
        .comments
        .create_comment("alice", NewComment::on_page(&page_id, "nice"))
        .await
        .unwrap();

    services
        .comments
        .add_reaction("bob", &comment.id, "thumbs_up")
        .await
        .unwrap();
    services
        .comments
        .add_reaction("bob", &comment.id, "thumbs_up")
        .await
        .unwrap();

    let summary = services
        .comments
        .reaction_summary("bob", &comment.id)
        .await
        .unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0].count, 1);
    assert!(summary[0].viewer_has_reacted);
}
