//! Line-oriented block grammar used by the upstream metadata exporter.
//!
//! # Responsibility
//! - Turn raw `KEY: VALUE` text into ordered, typed field multimaps.
//! - Translate single-letter field codes into field names.
//!
//! # Invariants
//! - Block order and intra-field value order follow the source text.
//! - Syntax errors abort the whole parse; no partial output is returned.

pub mod blocks;
pub mod fields;
pub mod packages;

pub use blocks::{parse_blocks, Block, ParseError};
pub use fields::FieldMapping;
pub use packages::{parse_package_links, PackageLink};
