//! Core Configuration
//!
//! Runtime settings for the tree engine. A `CoreConfig` is built once by the
//! embedding application (usually with [`CoreConfig::from_env`]) and passed
//! into `DatabaseService` and the services that need it.
//!
//! # Environment Variables
//!
//! - `QUIRE_DB_PATH`: Database file path (default: `./data/quire.db`)
//! - `QUIRE_BUSY_TIMEOUT_MS`: SQLite busy timeout in milliseconds (default: 5000)
//! - `QUIRE_MAX_THREAD_DEPTH`: Deepest allowed comment reply (default: 5)
//! - `QUIRE_VERSION_LIST_LIMIT`: Default page size for version listings (default: 50)
//! - `QUIRE_INVITATION_TTL_DAYS`: Lifetime of a workspace invitation (default: 7)
//!
//! Values that fail to parse fall back to their defaults.

use std::env;
use std::path::PathBuf;

/// Default comment reply depth cap
pub const DEFAULT_MAX_THREAD_DEPTH: i64 = 5;

/// Upper bound for a single version listing request
pub const MAX_VERSION_LIST_LIMIT: usize = 100;

/// Default invitation lifetime in days
pub const DEFAULT_INVITATION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Path to the libsql database file
    pub database_path: PathBuf,

    /// How long a connection waits on a locked database before failing
    pub busy_timeout_ms: u64,

    /// Deepest `thread_depth` a reply may have (root comments are depth 0)
    pub max_thread_depth: i64,

    /// Longest comment body accepted, in characters
    pub max_comment_length: usize,

    /// Text that replaces the body of a soft-deleted comment
    pub deleted_comment_placeholder: String,

    /// Default number of ledger entries returned by `list_versions`
    pub version_list_limit: usize,

    /// Days a workspace invitation stays acceptable unless overridden per invite
    pub invitation_ttl_days: i64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/quire.db"),
            busy_timeout_ms: 5000,
            max_thread_depth: DEFAULT_MAX_THREAD_DEPTH,
            max_comment_length: 10_000,
            deleted_comment_placeholder: "[deleted]".to_string(),
            version_list_limit: 50,
            invitation_ttl_days: DEFAULT_INVITATION_TTL_DAYS,
        }
    }
}

impl CoreConfig {
    /// Build a configuration from `QUIRE_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let database_path = env::var("QUIRE_DB_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.database_path);

        let busy_timeout_ms = env::var("QUIRE_BUSY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.busy_timeout_ms);

        let max_thread_depth = env::var("QUIRE_MAX_THREAD_DEPTH")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|d| *d >= 0)
            .unwrap_or(defaults.max_thread_depth);

        let version_list_limit = env::var("QUIRE_VERSION_LIST_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.version_list_limit);

        let invitation_ttl_days = env::var("QUIRE_INVITATION_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(defaults.invitation_ttl_days);

        Self {
            database_path,
            busy_timeout_ms,
            max_thread_depth,
            version_list_limit,
            invitation_ttl_days,
            ..defaults
        }
        .normalized()
    }

    /// Use a different database file, keeping every other setting
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Clamp a requested listing size into `1..=MAX_VERSION_LIST_LIMIT`
    pub fn clamp_version_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.version_list_limit)
            .clamp(1, MAX_VERSION_LIST_LIMIT)
    }

    fn normalized(mut self) -> Self {
        self.version_list_limit = self.version_list_limit.clamp(1, MAX_VERSION_LIST_LIMIT);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.max_thread_depth, 5);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.deleted_comment_placeholder, "[deleted]");
        assert_eq!(config.max_comment_length, 10_000);
        assert_eq!(config.invitation_ttl_days, 7);
    }

    #[test]
    fn test_clamp_version_limit() {
        let config = CoreConfig::default();
        assert_eq!(config.clamp_version_limit(None), 50);
        assert_eq!(config.clamp_version_limit(Some(0)), 1);
        assert_eq!(config.clamp_version_limit(Some(500)), 100);
        assert_eq!(config.clamp_version_limit(Some(7)), 7);
    }

    #[test]
    fn test_with_database_path() {
        let config = CoreConfig::default().with_database_path("/tmp/other.db");
        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.max_thread_depth, DEFAULT_MAX_THREAD_DEPTH);
    }
}
