//! Database Connection Management
//!
//! This module provides the core database connection, schema bootstrap and
//! transaction helpers using embedded libsql.
//!
//! # Architecture
//!
//! - **Path-agnostic**: Accepts any valid PathBuf
//! - **Idempotent bootstrap**: `CREATE TABLE IF NOT EXISTS`, no migrations
//! - **WAL mode**: Write-Ahead Logging for better concurrency
//! - **Foreign keys**: Enabled on every connection; hard deletes rely on
//!   `ON DELETE CASCADE`
//!
//! # Database Connection Patterns
//!
//! **ALWAYS use `connect_with_timeout()` in async functions.** It applies the
//! configured busy timeout and enables foreign keys, which SQLite tracks per
//! connection.
//!
//! Every logical tree operation runs inside one immediate transaction:
//!
//! ```no_run
//! # use quire_core::db::DatabaseService;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let db_service = DatabaseService::new(PathBuf::from("./data/quire.db")).await?;
//! let conn = db_service.begin_immediate().await?;
//! conn.execute("UPDATE pages SET position = 0 WHERE id = 'p1'", ()).await?;
//! db_service.commit(&conn).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::CoreConfig;
use crate::db::error::DatabaseError;
use libsql::{Builder, Connection, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Tables, in creation order (referenced tables first)
const TABLES: &[(&str, &str)] = &[
    (
        "workspaces",
        "CREATE TABLE IF NOT EXISTS workspaces (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "workspace_members",
        "CREATE TABLE IF NOT EXISTS workspace_members (
            workspace_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('owner', 'admin', 'editor', 'viewer')),
            joined_at TEXT NOT NULL,
            PRIMARY KEY (workspace_id, user_id),
            FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE
        )",
    ),
    (
        "pages",
        "CREATE TABLE IF NOT EXISTS pages (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            parent_id TEXT,
            title TEXT NOT NULL DEFAULT '',
            icon TEXT,
            cover_image TEXT,
            position INTEGER NOT NULL DEFAULT 0,
            is_archived INTEGER NOT NULL DEFAULT 0,
            created_by TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (parent_id IS NULL OR parent_id <> id),
            FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE,
            -- Parent deletion cascades to child pages
            FOREIGN KEY (parent_id) REFERENCES pages(id) ON DELETE CASCADE
        )",
    ),
    (
        "blocks",
        "CREATE TABLE IF NOT EXISTS blocks (
            id TEXT PRIMARY KEY,
            page_id TEXT NOT NULL,
            parent_id TEXT,
            block_type TEXT NOT NULL,
            content TEXT NOT NULL DEFAULT '{}',
            position INTEGER NOT NULL DEFAULT 0,
            is_archived INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            CHECK (parent_id IS NULL OR parent_id <> id),
            FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE,
            FOREIGN KEY (parent_id) REFERENCES blocks(id) ON DELETE CASCADE
        )",
    ),
    (
        "page_versions",
        "CREATE TABLE IF NOT EXISTS page_versions (
            id TEXT PRIMARY KEY,
            page_id TEXT NOT NULL,
            version_number INTEGER NOT NULL,
            title TEXT NOT NULL,
            icon TEXT,
            cover_image TEXT,
            content_snapshot TEXT NOT NULL,
            created_by TEXT NOT NULL,
            change_summary TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (page_id, version_number),
            FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
        )",
    ),
    (
        "page_permissions",
        "CREATE TABLE IF NOT EXISTS page_permissions (
            id TEXT PRIMARY KEY,
            page_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            level TEXT NOT NULL CHECK (level IN ('view', 'comment', 'edit')),
            granted_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (page_id, user_id),
            FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
        )",
    ),
    (
        "comments",
        "CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            page_id TEXT,
            block_id TEXT,
            parent_id TEXT,
            thread_depth INTEGER NOT NULL DEFAULT 0,
            content TEXT NOT NULL,
            author_id TEXT NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT,
            deleted_by TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            edited_at TEXT,
            -- Exactly one target
            CHECK ((page_id IS NULL) <> (block_id IS NULL)),
            FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE,
            FOREIGN KEY (block_id) REFERENCES blocks(id) ON DELETE CASCADE,
            -- Hard delete removes the whole reply subtree
            FOREIGN KEY (parent_id) REFERENCES comments(id) ON DELETE CASCADE
        )",
    ),
    (
        "comment_reactions",
        "CREATE TABLE IF NOT EXISTS comment_reactions (
            id TEXT PRIMARY KEY,
            comment_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            reaction_type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (comment_id, user_id, reaction_type),
            FOREIGN KEY (comment_id) REFERENCES comments(id) ON DELETE CASCADE
        )",
    ),
    (
        "comment_mentions",
        "CREATE TABLE IF NOT EXISTS comment_mentions (
            id TEXT PRIMARY KEY,
            comment_id TEXT NOT NULL,
            mentioned_user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (comment_id, mentioned_user_id),
            FOREIGN KEY (comment_id) REFERENCES comments(id) ON DELETE CASCADE
        )",
    ),
    (
        "comment_attachments",
        "CREATE TABLE IF NOT EXISTS comment_attachments (
            id TEXT PRIMARY KEY,
            comment_id TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_url TEXT NOT NULL,
            file_size INTEGER,
            mime_type TEXT,
            uploaded_by TEXT NOT NULL,
            order_index INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            FOREIGN KEY (comment_id) REFERENCES comments(id) ON DELETE CASCADE
        )",
    ),
    (
        "page_favorites",
        "CREATE TABLE IF NOT EXISTS page_favorites (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            page_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, page_id),
            FOREIGN KEY (page_id) REFERENCES pages(id) ON DELETE CASCADE
        )",
    ),
    (
        "workspace_invitations",
        "CREATE TABLE IF NOT EXISTS workspace_invitations (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            inviter_id TEXT NOT NULL,
            invitee_email TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('owner', 'admin', 'editor', 'viewer')),
            token TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'accepted', 'expired', 'revoked')),
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            accepted_at TEXT,
            FOREIGN KEY (workspace_id) REFERENCES workspaces(id) ON DELETE CASCADE
        )",
    ),
];

const INDEXES: &[(&str, &str)] = &[
    (
        "idx_members_user",
        "CREATE INDEX IF NOT EXISTS idx_members_user ON workspace_members(user_id)",
    ),
    (
        "idx_pages_workspace",
        "CREATE INDEX IF NOT EXISTS idx_pages_workspace ON pages(workspace_id, parent_id, position)",
    ),
    (
        "idx_pages_parent",
        "CREATE INDEX IF NOT EXISTS idx_pages_parent ON pages(parent_id)",
    ),
    (
        "idx_blocks_page",
        "CREATE INDEX IF NOT EXISTS idx_blocks_page ON blocks(page_id, parent_id, position)",
    ),
    (
        "idx_blocks_parent",
        "CREATE INDEX IF NOT EXISTS idx_blocks_parent ON blocks(parent_id)",
    ),
    (
        "idx_versions_page",
        "CREATE INDEX IF NOT EXISTS idx_versions_page ON page_versions(page_id, version_number)",
    ),
    (
        "idx_permissions_user",
        "CREATE INDEX IF NOT EXISTS idx_permissions_user ON page_permissions(user_id)",
    ),
    (
        "idx_comments_page",
        "CREATE INDEX IF NOT EXISTS idx_comments_page ON comments(page_id, created_at)",
    ),
    (
        "idx_comments_block",
        "CREATE INDEX IF NOT EXISTS idx_comments_block ON comments(block_id, created_at)",
    ),
    (
        "idx_comments_parent",
        "CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id)",
    ),
    (
        "idx_reactions_comment",
        "CREATE INDEX IF NOT EXISTS idx_reactions_comment ON comment_reactions(comment_id)",
    ),
    (
        "idx_mentions_comment",
        "CREATE INDEX IF NOT EXISTS idx_mentions_comment ON comment_mentions(comment_id)",
    ),
    (
        "idx_mentions_user",
        "CREATE INDEX IF NOT EXISTS idx_mentions_user ON comment_mentions(mentioned_user_id)",
    ),
    (
        "idx_attachments_comment",
        "CREATE INDEX IF NOT EXISTS idx_attachments_comment ON comment_attachments(comment_id, order_index)",
    ),
    (
        "idx_favorites_user",
        "CREATE INDEX IF NOT EXISTS idx_favorites_user ON page_favorites(user_id, created_at)",
    ),
    (
        "idx_invitations_workspace",
        "CREATE INDEX IF NOT EXISTS idx_invitations_workspace ON workspace_invitations(workspace_id, status)",
    ),
    (
        // One open invitation per address and workspace
        "idx_invitations_pending_email",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_invitations_pending_email
         ON workspace_invitations(workspace_id, invitee_email) WHERE status = 'pending'",
    ),
];

/// Database service for managing the libsql connection and schema
///
/// # Examples
///
/// ```no_run
/// use quire_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_path = PathBuf::from("/path/to/quire.db");
///     let db_service = DatabaseService::new(db_path).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database handle (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,

    busy_timeout_ms: u64,
}

impl DatabaseService {
    /// Open (or create) the database at `db_path` with default settings
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        Self::with_config(&CoreConfig::default().with_database_path(db_path)).await
    }

    /// Open (or create) the database described by `config`
    ///
    /// This will:
    /// 1. Ensure the parent directory exists (create if needed)
    /// 2. Open/create the database file
    /// 3. Enable WAL mode and foreign keys
    /// 4. Initialize the schema (CREATE TABLE IF NOT EXISTS)
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn with_config(config: &CoreConfig) -> Result<Self, DatabaseError> {
        let db_path = config.database_path.clone();
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
            busy_timeout_ms: config.busy_timeout_ms,
        };

        service.initialize_schema(is_new_database).await?;

        tracing::debug!(
            path = %service.db_path.display(),
            new = is_new_database,
            "database ready"
        );

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so we must use query() instead of execute().
    async fn execute_pragma(&self, conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    /// Create every table and index if missing
    ///
    /// Safe to call repeatedly. For a brand-new file the WAL is checkpointed
    /// afterwards so the schema is on disk before the first caller connects.
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        for (name, sql) in TABLES {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create {} table: {}",
                    name, e
                ))
            })?;
        }

        for (name, sql) in INDEXES {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    name, e
                ))
            })?;
        }

        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        Ok(())
    }

    /// Get a raw connection handle
    ///
    /// The handle has neither the busy timeout nor foreign keys applied; use
    /// `connect_with_timeout()` for anything that writes.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with busy timeout and foreign keys configured
    ///
    /// Concurrent writers wait up to the configured busy timeout instead of
    /// failing immediately with `SQLITE_BUSY`.
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", self.busy_timeout_ms),
        )
        .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Open a connection and start an immediate (write-locking) transaction
    ///
    /// The caller must finish it with [`commit`](Self::commit) or
    /// [`rollback`](Self::rollback).
    pub async fn begin_immediate(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        Ok(conn)
    }

    pub async fn commit(&self, conn: &Connection) -> Result<(), DatabaseError> {
        if let Err(e) = conn.execute("COMMIT", ()).await {
            let _rollback = conn.execute("ROLLBACK", ()).await;
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        Ok(())
    }

    pub async fn rollback(&self, conn: &Connection) -> Result<(), DatabaseError> {
        conn.execute("ROLLBACK", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to roll back transaction: {}", e))
        })?;
        Ok(())
    }
}
