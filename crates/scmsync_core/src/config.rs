//! Import configuration passed explicitly to services.

use crate::loader::Schema;
use crate::parser::fields::{DOMAIN_STARTER, TREE_STARTER};
use crate::parser::FieldMapping;

/// Grammar and registry settings for one import pipeline.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Key opening a block in the domain file.
    pub domain_starter: String,
    /// Key opening a block in the tree file.
    pub tree_starter: String,
    pub mapping: FieldMapping,
    pub schema: Schema,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            domain_starter: DOMAIN_STARTER.to_string(),
            tree_starter: TREE_STARTER.to_string(),
            mapping: FieldMapping::scm(),
            schema: Schema::ownership(),
        }
    }
}
