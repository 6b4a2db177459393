//! Conversion of parsed blocks into candidate rows for the loader.

pub mod snapshot;

pub use snapshot::{split_domain_name, transform, Snapshot, NONAME};
