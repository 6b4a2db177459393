//! Entity-agnostic loader that mirrors candidate rows into a `Store`.
//!
//! # Responsibility
//! - Hold the entity/relation registry (`schema`).
//! - Diff candidate rows against persisted rows and apply the minimal set of
//!   writes (`engine`).
//!
//! # Invariants
//! - The engine is the only component that writes to the store.
//! - Deletes are deferred to the caller.

pub mod diff;
pub mod engine;
pub mod row;
pub mod schema;
pub mod store;

pub use engine::{
    EntitySync, LinkChange, LinkOutcome, LinkRecord, LinkStats, LinkSync, PendingDelete,
    SyncEngine, SyncError, SyncResult, SyncStats,
};
pub use row::{FieldKey, FieldValue, Row, StoredRow};
pub use schema::{EntityKind, EntitySpec, RelationSpec, Schema, SchemaError};
pub use store::{Store, StoreError, StoreResult};
