//! Tree Services
//!
//! This module contains the operations the API layer calls, each running in
//! one immediate transaction:
//!
//! - `TreeMutator` - cycle-safe move/reparent of pages and blocks
//! - `SubtreeCloner` - two-pass duplication with identity remapping
//! - `VersionLedger` - append-only page snapshots
//! - `RestoreEngine` - rebuild a page from a ledger entry
//! - `CommentService` - threaded comments, reactions, mentions, attachments
//! - `PageService` - page and block lifecycle, page access grants
//! - `WorkspaceService` - workspaces, membership and invitations
//! - `FavoriteService` - per-user page favorites
//!
//! Services are built from a `ServiceContext` (database, id generator,
//! permission oracle, configuration); `TreeServices` bundles all of them.

pub mod comment_service;
pub mod context;
pub mod error;
pub mod favorite_service;
pub mod ids;
pub mod page_service;
pub mod permission;
pub mod restore_engine;
pub mod subtree_cloner;
pub mod tree_mutator;
pub mod version_ledger;
pub mod workspace_service;

pub use comment_service::CommentService;
pub use context::{ServiceContext, TreeServices};
pub use error::TreeServiceError;
pub use favorite_service::FavoriteService;
pub use ids::{IdGenerator, SequentialIds, UuidGenerator};
pub use page_service::PageService;
pub use permission::{resolve_level, PermissionOracle, StorePermissionOracle};
pub use restore_engine::RestoreEngine;
pub use subtree_cloner::{DuplicateRequest, RemapEntry, RemapPlan, SubtreeCloner};
pub use tree_mutator::{MoveRequest, TreeMutator};
pub use version_ledger::VersionLedger;
pub use workspace_service::WorkspaceService;
