//! Core use-case services.
//!
//! # Responsibility
//! - Validate snapshots (`check`).
//! - Orchestrate parse, transform and sync into one import (`import_service`).

pub mod check;
pub mod import_service;
