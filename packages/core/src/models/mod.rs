//! Data Models
//!
//! This module contains the core data structures of the tree engine:
//!
//! - `TreeNode` / `NodeKind` - kind-agnostic adjacency view shared by pages and blocks
//! - `Page`, `Block` - the two reparentable tree kinds
//! - `Comment` and its side tables (reactions, mentions, attachments)
//! - `PageVersion` - immutable ledger entries
//! - Workspace membership, page grants, favorites and invitations

mod access;
mod comment;
mod node;
mod page;
mod version;

pub use access::{
    normalize_email, Invitation, InvitationStatus, NewInvitation, PageFavorite, PageGrant,
    PermissionLevel, Workspace, WorkspaceMember, WorkspaceRole, MAX_EMAIL_LENGTH,
};
pub use comment::{
    validate_reaction_type, Attachment, Comment, CommentPage, CommentTarget, CommentThread,
    Mention, NewAttachment, NewComment, Reaction, ReactionSummary, ALLOWED_REACTIONS,
};
pub use node::{DeleteResult, NodeKind, TreeNode, ValidationError};
pub use page::{
    Block, BlockUpdate, NewBlock, NewPage, Page, PageTree, PageUpdate, MAX_BLOCK_TYPE_LENGTH,
    MAX_TITLE_LENGTH,
};
pub use version::{BlockDescriptor, PageVersion, PageVersionSummary};
