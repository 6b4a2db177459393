//! Narrow persistence contract used by the sync engine.
//!
//! # Invariants
//! - Rows passed to `insert_row`/`update_row` are fully shrunk: only
//!   `Column` fields and single-hop `ForeignKey` fields.
//! - `fetch_rows` returns rows expressed with exactly the requested fields.

use super::row::{FieldKey, Row, StoredRow};
use super::schema::{EntityKind, SchemaError};
use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence failures surfaced to the engine.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Schema(SchemaError),
    /// A write received a field that still needs shrinking.
    UnshrunkField { entity: EntityKind, field: FieldKey },
    /// Update or delete targeted a missing primary key.
    NotFound { entity: EntityKind, pk: i64 },
    /// Persisted value cannot be represented as a `FieldValue`.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Table declared by the schema is missing from the database.
    MissingTable(&'static str),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::UnshrunkField { entity, field } => {
                write!(f, "field `{field}` of `{entity}` must be shrunk before writing")
            }
            Self::NotFound { entity, pk } => write!(f, "{entity} not found: {pk}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingTable(table) => write!(f, "store requires table `{table}`"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Schema(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<SchemaError> for StoreError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

/// Persisted relational store as seen by the sync engine.
pub trait Store {
    /// Reads every row of `entity`, projecting `fields` (reference paths are
    /// resolved by the store).
    fn fetch_rows(&self, entity: EntityKind, fields: &[FieldKey]) -> StoreResult<Vec<StoredRow>>;
    /// Creates one row and returns its primary key.
    fn insert_row(&self, entity: EntityKind, row: &Row) -> StoreResult<i64>;
    /// Overwrites the given fields of one row.
    fn update_row(&self, entity: EntityKind, pk: i64, row: &Row) -> StoreResult<()>;
    /// Deletes rows by primary key; returns the number removed.
    fn delete_rows(&self, entity: EntityKind, pks: &[i64]) -> StoreResult<usize>;
    /// Reads every linked pair of a relation, projecting fields on each side.
    fn fetch_links(
        &self,
        left: EntityKind,
        right: EntityKind,
        left_fields: &[FieldKey],
        right_fields: &[FieldKey],
    ) -> StoreResult<Vec<(Row, Row)>>;
    /// Links `left_pk` to each of `right_pks`; existing links are kept.
    fn add_links(
        &self,
        left: EntityKind,
        right: EntityKind,
        left_pk: i64,
        right_pks: &[i64],
    ) -> StoreResult<()>;
    /// Unlinks `left_pk` from each of `right_pks`; returns links removed.
    fn remove_links(
        &self,
        left: EntityKind,
        right: EntityKind,
        left_pk: i64,
        right_pks: &[i64],
    ) -> StoreResult<usize>;
}
