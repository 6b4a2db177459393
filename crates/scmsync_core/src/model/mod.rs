//! Domain model for ownership snapshots.
//!
//! # Responsibility
//! - Parse user references (`user`).
//! - Describe role assignments bound to their owning entity (`role`).

pub mod role;
pub mod user;
