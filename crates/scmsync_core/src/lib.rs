//! Core reconciliation pipeline for source-control ownership snapshots.
//! Parses exporter text, merges user identities, and mirrors the snapshot
//! into SQLite with a minimal diff.

pub mod config;
pub mod db;
pub mod identity;
pub mod loader;
pub mod logging;
pub mod model;
pub mod parser;
pub mod repo;
pub mod service;
pub mod transform;

pub use config::ImportConfig;
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use identity::{UserCache, UserRecord};
pub use loader::{
    EntityKind, FieldKey, FieldValue, LinkOutcome, LinkStats, LinkSync, Row, Schema, SyncEngine,
    SyncError, SyncStats,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use parser::{parse_blocks, parse_package_links, Block, FieldMapping, PackageLink, ParseError};
pub use repo::license_repo::{LicenseRepoError, LicenseRepository, SqliteLicenseRepository};
pub use repo::sqlite_store::SqliteStore;
pub use service::check::{check_scm, CheckReport};
pub use service::import_service::{ImportError, ImportReport, ImportResult, ScmService};
pub use transform::{transform, Snapshot};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
