//! Canonical user identities merged from partial references.

pub mod user_cache;

pub use user_cache::{UserCache, UserRecord};
