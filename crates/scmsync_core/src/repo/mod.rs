//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Implement the loader `Store` contract over SQLite (`sqlite_store`).
//! - Maintain license reference data (`license_repo`).
//!
//! # Invariants
//! - SQL stays inside this layer; services and the loader see rows only.

pub mod license_repo;
pub mod sqlite_store;
