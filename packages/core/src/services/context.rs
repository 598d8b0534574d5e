//! Shared Service Dependencies
//!
//! All tree services are built from one [`ServiceContext`]: the database, the
//! id generator, the permission oracle and the configuration. Nothing is
//! process-global; two contexts over two databases never interact.

use crate::config::CoreConfig;
use crate::db::DatabaseService;
use crate::services::comment_service::CommentService;
use crate::services::error::TreeServiceError;
use crate::services::favorite_service::FavoriteService;
use crate::services::ids::{IdGenerator, UuidGenerator};
use crate::services::page_service::PageService;
use crate::services::permission::{PermissionOracle, StorePermissionOracle};
use crate::services::restore_engine::RestoreEngine;
use crate::services::subtree_cloner::SubtreeCloner;
use crate::services::tree_mutator::TreeMutator;
use crate::services::version_ledger::VersionLedger;
use crate::services::workspace_service::WorkspaceService;
use libsql::Connection;
use std::sync::Arc;

#[derive(Clone)]
pub struct ServiceContext {
    pub db: Arc<DatabaseService>,
    pub ids: Arc<dyn IdGenerator>,
    pub permissions: Arc<dyn PermissionOracle>,
    pub config: Arc<CoreConfig>,
}

impl ServiceContext {
    /// Context with UUID ids and store-backed permission resolution
    pub fn new(db: Arc<DatabaseService>, config: CoreConfig) -> Self {
        let permissions = Arc::new(StorePermissionOracle::new(db.clone()));
        Self {
            db,
            ids: Arc::new(UuidGenerator),
            permissions,
            config: Arc::new(config),
        }
    }

    /// Open the database described by `config` and build a context over it
    pub async fn open(config: CoreConfig) -> Result<Self, TreeServiceError> {
        let db = Arc::new(DatabaseService::with_config(&config).await?);
        Ok(Self::new(db, config))
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_permission_oracle(mut self, permissions: Arc<dyn PermissionOracle>) -> Self {
        self.permissions = permissions;
        self
    }

    /// Finish a transaction opened with `DatabaseService::begin_immediate`
    ///
    /// Commits on `Ok`, rolls back on `Err`. Store failures come back as
    /// `TransactionFailed`; domain errors pass through unchanged.
    pub(crate) async fn finish<T>(
        &self,
        conn: &Connection,
        operation: &str,
        result: Result<T, TreeServiceError>,
    ) -> Result<T, TreeServiceError> {
        match result {
            Ok(value) => {
                self.db.commit(conn).await.map_err(|e| {
                    TreeServiceError::transaction_failed(format!("{}: {}", operation, e))
                })?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.db.rollback(conn).await {
                    tracing::warn!("Rollback of '{}' failed: {}", operation, rollback_err);
                }
                Err(match err {
                    TreeServiceError::Database(db_err) => {
                        TreeServiceError::transaction_failed(format!("{}: {}", operation, db_err))
                    }
                    other => other,
                })
            }
        }
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("db_path", &self.db.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Every tree service over one shared context
#[derive(Debug, Clone)]
pub struct TreeServices {
    pub workspaces: WorkspaceService,
    pub pages: PageService,
    pub mutator: TreeMutator,
    pub cloner: SubtreeCloner,
    pub ledger: VersionLedger,
    pub restore: RestoreEngine,
    pub comments: CommentService,
    pub favorites: FavoriteService,
}

impl TreeServices {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            workspaces: WorkspaceService::new(ctx.clone()),
            pages: PageService::new(ctx.clone()),
            mutator: TreeMutator::new(ctx.clone()),
            cloner: SubtreeCloner::new(ctx.clone()),
            ledger: VersionLedger::new(ctx.clone()),
            restore: RestoreEngine::new(ctx.clone()),
            comments: CommentService::new(ctx.clone()),
            favorites: FavoriteService::new(ctx),
        }
    }
}
