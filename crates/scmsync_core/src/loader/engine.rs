//! Generic minimal-diff synchronization engine.
//!
//! # Responsibility
//! - Compute create/update/delete operations for one entity type against
//!   persisted rows, keyed by the type's candidate key.
//! - Compute add/remove operations for one many-to-many relation.
//! - Shrink dotted reference fields to foreign-key values before writes.
//!
//! # Invariants
//! - Creates and updates are applied immediately; deletes are returned as a
//!   `PendingDelete` so the caller controls cascade order.
//! - An unresolvable foreign key aborts the entity sync.
//! - An unresolvable relation endpoint is skipped and reported, never
//!   fabricated.

use super::diff::diff_sorted;
use super::row::{describe_key, FieldKey, FieldValue, KeyTuple, Row};
use super::schema::{EntityKind, Schema, SchemaError};
use super::store::{Store, StoreError, StoreResult};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that abort a sync step.
#[derive(Debug)]
pub enum SyncError {
    Store(StoreError),
    Schema(SchemaError),
    /// A row lacks one of the fields the operation needs.
    MissingField { entity: EntityKind, field: FieldKey },
    /// Rows of one batch do not share the same field set.
    InconsistentFields { entity: EntityKind },
    /// Two candidate rows share a candidate key.
    DuplicateCandidateKey { entity: EntityKind, key: String },
    /// A reference group matched no persisted row of its target entity.
    UnresolvedReference {
        entity: EntityKind,
        target: EntityKind,
        key: String,
    },
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::MissingField { entity, field } => {
                write!(f, "{entity} row is missing field `{field}`")
            }
            Self::InconsistentFields { entity } => {
                write!(f, "{entity} rows in one batch must share the same fields")
            }
            Self::DuplicateCandidateKey { entity, key } => {
                write!(f, "duplicate {entity} candidate key: {key}")
            }
            Self::UnresolvedReference {
                entity,
                target,
                key,
            } => write!(
                f,
                "can not shrink {entity} reference to {target}: no {target} matches {key}"
            ),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SchemaError> for SyncError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

/// Operation counts for one entity type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SyncStats {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Deletes computed by `sync_entity` but not yet executed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "staged deletes are lost unless applied or explicitly discarded"]
pub struct PendingDelete {
    entity: EntityKind,
    pks: Vec<i64>,
}

impl PendingDelete {
    pub fn entity(&self) -> EntityKind {
        self.entity
    }

    pub fn pks(&self) -> &[i64] {
        &self.pks
    }

    pub fn len(&self) -> usize {
        self.pks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pks.is_empty()
    }

    /// Executes the staged deletes.
    pub fn apply<S: Store + ?Sized>(self, store: &S) -> StoreResult<usize> {
        if self.pks.is_empty() {
            return Ok(0);
        }
        let deleted = store.delete_rows(self.entity, &self.pks)?;
        info!(
            "event=deferred_delete module=loader status=ok entity={} deleted={}",
            self.entity, deleted
        );
        Ok(deleted)
    }

    /// Drops the staged deletes, keeping every persisted row.
    pub fn discard(self) -> usize {
        if !self.pks.is_empty() {
            debug!(
                "event=deferred_delete module=loader status=skip entity={} kept={}",
                self.entity,
                self.pks.len()
            );
        }
        self.pks.len()
    }
}

/// Outcome of `sync_entity`.
#[derive(Debug)]
pub struct EntitySync {
    pub stats: SyncStats,
    pub pending: PendingDelete,
}

/// Direction of an applied relation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkChange {
    Added,
    Removed,
}

/// Per-pair outcome of `sync_links`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkOutcome {
    Applied(LinkChange),
    SkippedUnresolved(String),
}

/// One relation pair touched by `sync_links`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRecord {
    pub left: String,
    pub right: String,
    pub outcome: LinkOutcome,
}

/// Operation counts for one relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStats {
    pub added: usize,
    pub removed: usize,
    /// Stale links left in place because removal was disabled.
    pub retained: usize,
    pub skipped: usize,
}

impl LinkStats {
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Outcome of `sync_links`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSync {
    pub left: EntityKind,
    pub right: EntityKind,
    pub stats: LinkStats,
    pub records: Vec<LinkRecord>,
}

impl LinkSync {
    /// Records skipped because an endpoint could not be resolved.
    pub fn skipped(&self) -> impl Iterator<Item = &LinkRecord> {
        self.records
            .iter()
            .filter(|record| matches!(record.outcome, LinkOutcome::SkippedUnresolved(_)))
    }
}

/// Diff/sync engine over a `Store`, configured by a `Schema`.
pub struct SyncEngine<'a, S: Store + ?Sized> {
    store: &'a S,
    schema: &'a Schema,
}

impl<'a, S: Store + ?Sized> SyncEngine<'a, S> {
    pub fn new(store: &'a S, schema: &'a Schema) -> Self {
        Self { store, schema }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// Makes persisted rows of `entity` match `candidates`.
    ///
    /// Creates and updates are written before returning; rows to delete are
    /// returned in `EntitySync::pending`.
    ///
    /// # Errors
    /// - `DuplicateCandidateKey` when two candidates share a key.
    /// - `UnresolvedReference` when a reference cannot be shrunk.
    /// - `Store` for persistence failures.
    pub fn sync_entity(&self, candidates: Vec<Row>, entity: EntityKind) -> SyncResult<EntitySync> {
        let spec = self.schema.entity(entity)?;
        let ckey = spec.candidate_key.clone();
        let columns: Vec<FieldKey> = match candidates.first() {
            Some(row) => row.keys().cloned().collect(),
            None => ckey.clone(),
        };
        for row in &candidates {
            if row.kind() != entity || !row.keys().eq(columns.iter()) {
                return Err(SyncError::InconsistentFields { entity });
            }
        }
        let update_fields: Vec<FieldKey> = columns
            .iter()
            .filter(|column| !ckey.contains(column))
            .cloned()
            .collect();

        let mut left = candidates
            .into_iter()
            .map(|row| Ok((key_of(&row, &ckey, entity)?, row)))
            .collect::<SyncResult<Vec<(KeyTuple, Row)>>>()?;
        left.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(pair) = left.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(SyncError::DuplicateCandidateKey {
                entity,
                key: describe_key(&pair[0].0),
            });
        }

        let mut right = self
            .store
            .fetch_rows(entity, &columns)?
            .into_iter()
            .map(|stored| Ok((key_of(&stored.row, &ckey, entity)?, stored)))
            .collect::<SyncResult<Vec<_>>>()?;
        right.sort_by(|a, b| a.0.cmp(&b.0));

        let diff = diff_sorted(
            left,
            right,
            |l, r| l.0.cmp(&r.0),
            |l, r| l.1.key_tuple(&update_fields) != r.1.row.key_tuple(&update_fields),
        );

        let stats = SyncStats {
            created: diff.left_only.len(),
            updated: diff.changed.len(),
            deleted: 0,
        };
        info!(
            "event=sync_entity module=loader status=ok entity={} created={} updated={} staged_deletes={}",
            entity,
            stats.created,
            stats.updated,
            diff.right_only.len()
        );

        let creates = diff.left_only.into_iter().map(|(_, row)| row).collect();
        for row in self.shrink(creates)? {
            self.store.insert_row(entity, &row)?;
        }

        let (pks, updates): (Vec<i64>, Vec<Row>) = diff
            .changed
            .into_iter()
            .map(|((_, candidate), (_, stored))| (stored.pk, candidate))
            .unzip();
        for (pk, row) in pks.into_iter().zip(self.shrink(updates)?) {
            self.store.update_row(entity, pk, &row)?;
        }

        Ok(EntitySync {
            stats,
            pending: PendingDelete {
                entity,
                pks: diff
                    .right_only
                    .into_iter()
                    .map(|(_, stored)| stored.pk)
                    .collect(),
            },
        })
    }

    /// Makes the `left`-`right` relation match `pairs`.
    ///
    /// Each pair carries the candidate-key fields of both endpoints. Stale
    /// links are removed only when `remove` is set. Pairs whose endpoint is
    /// not persisted are skipped with `LinkOutcome::SkippedUnresolved`.
    pub fn sync_links(
        &self,
        pairs: Vec<(Row, Row)>,
        left: EntityKind,
        right: EntityKind,
        remove: bool,
    ) -> SyncResult<LinkSync> {
        self.schema.relation(left, right)?;
        let left_key = self.schema.entity(left)?.candidate_key.clone();
        let right_key = self.schema.entity(right)?.candidate_key.clone();

        let mut wanted = pairs
            .iter()
            .map(|(l, r)| Ok((key_of(l, &left_key, left)?, key_of(r, &right_key, right)?)))
            .collect::<SyncResult<Vec<(KeyTuple, KeyTuple)>>>()?;
        wanted.sort();
        wanted.dedup();

        let mut existing = self
            .store
            .fetch_links(left, right, &left_key, &right_key)?
            .iter()
            .map(|(l, r)| Ok((key_of(l, &left_key, left)?, key_of(r, &right_key, right)?)))
            .collect::<SyncResult<Vec<(KeyTuple, KeyTuple)>>>()?;
        existing.sort();

        let diff = diff_sorted(wanted, existing, |l, r| l.cmp(r), |_, _| false);

        let left_index = self.pk_index(left, &left_key)?;
        let right_index = self.pk_index(right, &right_key)?;
        let resolve = |pair: &(KeyTuple, KeyTuple)| -> Result<(i64, i64), String> {
            let left_pk = left_index.get(&pair.0);
            let right_pk = right_index.get(&pair.1);
            match (left_pk, right_pk) {
                (Some(l), Some(r)) => Ok((*l, *r)),
                _ => {
                    let mut missing = Vec::new();
                    if left_pk.is_none() {
                        missing.push(format!("{left}({}) doesn't exist", describe_key(&pair.0)));
                    }
                    if right_pk.is_none() {
                        missing.push(format!("{right}({}) doesn't exist", describe_key(&pair.1)));
                    }
                    Err(missing.join("; "))
                }
            }
        };

        let mut stats = LinkStats::default();
        let mut records = Vec::new();
        let mut to_add: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
        let mut to_remove: BTreeMap<i64, Vec<i64>> = BTreeMap::new();

        let planned = diff
            .left_only
            .iter()
            .map(|pair| (pair, LinkChange::Added))
            .chain(diff.right_only.iter().map(|pair| (pair, LinkChange::Removed)));
        for (pair, change) in planned {
            if change == LinkChange::Removed && !remove {
                stats.retained += 1;
                continue;
            }
            let outcome = match resolve(pair) {
                Ok((left_pk, right_pk)) => {
                    let (target, counter) = match change {
                        LinkChange::Added => (&mut to_add, &mut stats.added),
                        LinkChange::Removed => (&mut to_remove, &mut stats.removed),
                    };
                    target.entry(left_pk).or_default().push(right_pk);
                    *counter += 1;
                    LinkOutcome::Applied(change)
                }
                Err(reason) => {
                    warn!(
                        "event=link_skipped module=loader status=skip left={left} right={right} reason={reason}"
                    );
                    stats.skipped += 1;
                    LinkOutcome::SkippedUnresolved(reason)
                }
            };
            records.push(LinkRecord {
                left: describe_key(&pair.0),
                right: describe_key(&pair.1),
                outcome,
            });
        }

        for (left_pk, right_pks) in &to_add {
            self.store.add_links(left, right, *left_pk, right_pks)?;
        }
        for (left_pk, right_pks) in &to_remove {
            self.store.remove_links(left, right, *left_pk, right_pks)?;
        }

        info!(
            "event=sync_links module=loader status=ok left={} right={} added={} removed={} retained={} skipped={}",
            left, right, stats.added, stats.removed, stats.retained, stats.skipped
        );

        Ok(LinkSync {
            left,
            right,
            stats,
            records,
        })
    }

    /// Collapses every reference group of `rows` into single-hop foreign keys.
    ///
    /// Groups are resolved deepest first, so a multi-hop path such as
    /// `subdomain__domain__name` becomes a foreign key that the next, shallower
    /// group uses as part of its own lookup key.
    pub fn shrink(&self, mut rows: Vec<Row>) -> SyncResult<Vec<Row>> {
        let Some(entity) = rows.first().map(Row::kind) else {
            return Ok(rows);
        };

        loop {
            let deepest = rows[0]
                .keys()
                .map(FieldKey::group)
                .filter(|group| !group.is_empty())
                .max_by_key(|group| group.len())
                .map(<[String]>::to_vec);
            match deepest {
                Some(group) => self.shrink_group(&mut rows, entity, &group)?,
                None => return Ok(rows),
            }
        }
    }

    fn shrink_group(&self, rows: &mut [Row], entity: EntityKind, group: &[String]) -> SyncResult<()> {
        let target = self.schema.resolve_path(entity, group)?;
        let (absolute, relative): (Vec<FieldKey>, Vec<FieldKey>) = rows[0]
            .keys()
            .filter_map(|key| key.relative_to(group).map(|rel| (key.clone(), rel)))
            .unzip();
        let index = self.pk_index(target, &relative)?;
        let foreign_key = FieldKey::ForeignKey {
            path: group.to_vec(),
        };

        for row in rows.iter_mut() {
            let key = key_of(row, &absolute, entity)?;
            let Some(pk) = index.get(&key).copied() else {
                error!(
                    "event=shrink module=loader status=error entity={entity} target={target} key={}",
                    describe_key(&key)
                );
                return Err(SyncError::UnresolvedReference {
                    entity,
                    target,
                    key: describe_key(&key),
                });
            };
            for field in &absolute {
                row.remove(field);
            }
            row.insert(foreign_key.clone(), FieldValue::Integer(pk));
        }

        debug!(
            "event=shrink module=loader status=ok entity={entity} target={target} rows={}",
            rows.len()
        );
        Ok(())
    }

    fn pk_index(&self, entity: EntityKind, keys: &[FieldKey]) -> SyncResult<HashMap<KeyTuple, i64>> {
        let mut index = HashMap::new();
        for stored in self.store.fetch_rows(entity, keys)? {
            index.insert(key_of(&stored.row, keys, entity)?, stored.pk);
        }
        Ok(index)
    }
}

fn key_of(row: &Row, keys: &[FieldKey], entity: EntityKind) -> SyncResult<KeyTuple> {
    keys.iter()
        .map(|key| {
            row.get(key).cloned().ok_or_else(|| SyncError::MissingField {
                entity,
                field: key.clone(),
            })
        })
        .collect()
}
