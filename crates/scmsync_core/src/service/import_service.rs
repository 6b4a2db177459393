//! Snapshot import use-case service.
//!
//! # Responsibility
//! - Run parse, transform and sync for one snapshot inside one transaction.
//! - Gate imports behind the validation pass.
//! - Link build packages to trees without pruning existing links.
//!
//! # Invariants
//! - Grammar errors are raised before the transaction opens.
//! - Any failure after that rolls back every write of the run.
//! - Creates and updates run parent-to-child; deferred deletes run
//!   leaf-to-root after every relation is synced.
//! - Users are never deleted by an import.

use crate::config::ImportConfig;
use crate::db::{self, DbError};
use crate::loader::{
    EntityKind, FieldKey, LinkSync, PendingDelete, Row, Store, StoreError, SyncEngine, SyncError,
    SyncStats,
};
use crate::parser::{parse_blocks, PackageLink, ParseError};
use crate::repo::sqlite_store::SqliteStore;
use crate::service::check::{check_scm, CheckReport};
use crate::transform::{transform, Snapshot};
use log::{error, info, warn};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub type ImportResult<T> = Result<T, ImportError>;

/// Import failures. Every variant raised after parsing implies a rollback.
#[derive(Debug)]
pub enum ImportError {
    /// Grammar error in one input file.
    Parse {
        file: &'static str,
        error: ParseError,
    },
    /// `check` reported problems; nothing was written.
    Validation(CheckReport),
    Db(DbError),
    Store(StoreError),
    Sync(SyncError),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse { file, error } => write!(f, "{file}: {error}"),
            Self::Validation(report) => {
                write!(f, "snapshot failed validation with {} error(s)", report.errors)
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse { error, .. } => Some(error),
            Self::Validation(_) => None,
            Self::Db(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Sync(err) => Some(err),
        }
    }
}

impl From<DbError> for ImportError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<StoreError> for ImportError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SyncError> for ImportError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

/// What one import run changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub run_id: Uuid,
    pub entities: BTreeMap<EntityKind, SyncStats>,
    pub links: Vec<LinkSync>,
}

impl ImportReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            entities: BTreeMap::new(),
            links: Vec::new(),
        }
    }

    /// Counts for one entity type; zero when it was not synced.
    pub fn stats(&self, entity: EntityKind) -> SyncStats {
        self.entities.get(&entity).copied().unwrap_or_default()
    }

    pub fn links(&self, left: EntityKind, right: EntityKind) -> Option<&LinkSync> {
        self.links
            .iter()
            .find(|sync| sync.left == left && sync.right == right)
    }

    /// True when the run wrote nothing.
    pub fn is_noop(&self) -> bool {
        self.entities.values().all(SyncStats::is_noop)
            && self.links.iter().all(|sync| sync.stats.is_noop())
    }
}

/// Import orchestration over one SQLite connection.
pub struct ScmService<'conn> {
    conn: &'conn mut Connection,
    config: ImportConfig,
}

impl<'conn> ScmService<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self::with_config(conn, ImportConfig::default())
    }

    pub fn with_config(conn: &'conn mut Connection, config: ImportConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &ImportConfig {
        &self.config
    }

    /// Dry-run validation; never writes.
    pub fn check(&self, domain_text: &str, tree_text: &str) -> CheckReport {
        check_scm(domain_text, tree_text, &self.config)
    }

    /// Validates, then imports the snapshot.
    ///
    /// # Errors
    /// - `Validation` when `check` reports any problem.
    /// - Any error of `import_unchecked`.
    pub fn import(&mut self, domain_text: &str, tree_text: &str) -> ImportResult<ImportReport> {
        let report = self.check(domain_text, tree_text);
        if !report.is_ok() {
            warn!(
                "event=scm_import module=service status=skip reason=validation errors={}",
                report.errors
            );
            return Err(ImportError::Validation(report));
        }
        self.import_unchecked(domain_text, tree_text)
    }

    /// Imports the snapshot without running semantic validation.
    ///
    /// # Errors
    /// - `Parse` for grammar errors; raised before any write.
    /// - `Sync`/`Store`/`Db` for failures during the transaction, which is
    ///   then rolled back.
    pub fn import_unchecked(
        &mut self,
        domain_text: &str,
        tree_text: &str,
    ) -> ImportResult<ImportReport> {
        let run_id = Uuid::new_v4();
        let started_at = Instant::now();
        info!("event=scm_import module=service status=start run_id={run_id}");

        let config = &self.config;
        let domain_blocks = parse_blocks(domain_text, &config.domain_starter, &config.mapping)
            .map_err(|error| ImportError::Parse {
                file: "domains",
                error,
            })?;
        let tree_blocks = parse_blocks(tree_text, &config.tree_starter, &config.mapping)
            .map_err(|error| ImportError::Parse {
                file: "trees",
                error,
            })?;
        let snapshot = transform(&domain_blocks, &tree_blocks);

        let schema = &config.schema;
        let result = db::in_transaction(self.conn, |tx| -> ImportResult<ImportReport> {
            let store = SqliteStore::try_new(tx, schema)?;
            let engine = SyncEngine::new(&store, schema);
            load_snapshot(&engine, snapshot, run_id)
        });
        log_outcome("scm_import", run_id, started_at, &result);
        result
    }

    /// Links packages to trees from one build's package list.
    ///
    /// Packages and links absent from `links` are kept; unknown trees are
    /// reported as skipped.
    pub fn import_packages(&mut self, links: &[PackageLink]) -> ImportResult<ImportReport> {
        let run_id = Uuid::new_v4();
        let started_at = Instant::now();
        info!(
            "event=package_import module=service status=start run_id={run_id} links={}",
            links.len()
        );

        let packages: BTreeSet<&str> = links.iter().map(|link| link.package.as_str()).collect();
        let package_rows: Vec<Row> = packages
            .into_iter()
            .map(|name| Row::new(EntityKind::Package).with(FieldKey::column("name"), name))
            .collect();
        let pairs: Vec<(Row, Row)> = links
            .iter()
            .map(|link| {
                (
                    Row::new(EntityKind::GitTree)
                        .with(FieldKey::column("gitpath"), link.gitpath.as_str()),
                    Row::new(EntityKind::Package)
                        .with(FieldKey::column("name"), link.package.as_str()),
                )
            })
            .collect();

        let schema = &self.config.schema;
        let result = db::in_transaction(self.conn, |tx| -> ImportResult<ImportReport> {
            let store = SqliteStore::try_new(tx, schema)?;
            let engine = SyncEngine::new(&store, schema);
            let mut report = ImportReport::new(run_id);

            let synced = engine.sync_entity(package_rows, EntityKind::Package)?;
            report.entities.insert(EntityKind::Package, synced.stats);
            synced.pending.discard();

            report.links.push(engine.sync_links(
                pairs,
                EntityKind::GitTree,
                EntityKind::Package,
                false,
            )?);
            Ok(report)
        });
        log_outcome("package_import", run_id, started_at, &result);
        result
    }
}

fn log_outcome(
    event: &str,
    run_id: Uuid,
    started_at: Instant,
    result: &ImportResult<ImportReport>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(report) => info!(
            "event={event} module=service status=ok run_id={run_id} noop={} duration_ms={duration_ms}",
            report.is_noop()
        ),
        Err(err) => error!(
            "event={event} module=service status=error run_id={run_id} duration_ms={duration_ms} error={err}"
        ),
    }
}

/// Applies a snapshot through the engine in dependency order.
fn load_snapshot<S: Store + ?Sized>(
    engine: &SyncEngine<'_, S>,
    snapshot: Snapshot,
    run_id: Uuid,
) -> ImportResult<ImportReport> {
    let mut report = ImportReport::new(run_id);
    let mut pending: Vec<PendingDelete> = Vec::new();

    let role_rows = [
        EntityKind::DomainRole,
        EntityKind::SubDomainRole,
        EntityKind::GitTreeRole,
    ]
    .map(|entity| (entity, snapshot.role_rows(entity)));
    let role_pairs = [
        EntityKind::DomainRole,
        EntityKind::SubDomainRole,
        EntityKind::GitTreeRole,
    ]
    .map(|entity| (entity, snapshot.role_user_pairs(entity)));
    let Snapshot {
        domains,
        subdomains,
        gittrees,
        users,
        gittree_licenses,
        ..
    } = snapshot;

    let ordered = [
        (EntityKind::Domain, domains),
        (EntityKind::SubDomain, subdomains),
        (EntityKind::GitTree, gittrees),
    ]
    .into_iter()
    .chain(role_rows);
    for (entity, rows) in ordered {
        let synced = engine.sync_entity(rows, entity)?;
        report.entities.insert(entity, synced.stats);
        pending.push(synced.pending);
    }

    let synced = engine.sync_entity(users, EntityKind::User)?;
    report.entities.insert(EntityKind::User, synced.stats);
    synced.pending.discard();

    report.links.push(engine.sync_links(
        gittree_licenses,
        EntityKind::GitTree,
        EntityKind::License,
        true,
    )?);
    for (entity, pairs) in role_pairs {
        report
            .links
            .push(engine.sync_links(pairs, entity, EntityKind::User, true)?);
    }

    // Leaf-to-root so a renamed parent never cascades into kept children.
    for staged in pending.into_iter().rev() {
        let entity = staged.entity();
        let deleted = staged.apply(engine.store())?;
        if let Some(stats) = report.entities.get_mut(&entity) {
            stats.deleted = deleted;
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db_in_memory;

    #[test]
    fn report_noop_requires_every_part_to_be_idle() {
        let mut report = ImportReport::new(Uuid::nil());
        assert!(report.is_noop());
        report.entities.insert(
            EntityKind::Domain,
            SyncStats {
                created: 1,
                ..SyncStats::default()
            },
        );
        assert!(!report.is_noop());
        assert_eq!(report.stats(EntityKind::Domain).created, 1);
        assert_eq!(report.stats(EntityKind::GitTree), SyncStats::default());
    }

    #[test]
    fn import_rejects_invalid_snapshot_without_writing() {
        let mut conn = open_db_in_memory().unwrap();
        let mut service = ScmService::new(&mut conn);
        let err = service
            .import("D: System / Alarm\n", "")
            .unwrap_err();
        assert!(matches!(err, ImportError::Validation(ref report) if report.errors == 1));

        let domains: i64 = conn
            .query_row("SELECT COUNT(*) FROM domains", [], |row| row.get(0))
            .unwrap();
        assert_eq!(domains, 0);
    }

    #[test]
    fn parse_errors_name_the_file() {
        let mut conn = open_db_in_memory().unwrap();
        let mut service = ScmService::new(&mut conn);
        let err = service.import_unchecked("D: ok\n", "oops\n").unwrap_err();
        assert!(matches!(err, ImportError::Parse { file: "trees", .. }));
        assert!(err.to_string().starts_with("trees: "));
    }
}
