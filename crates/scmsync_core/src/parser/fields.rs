//! Field codes of the exporter's block grammar.

use std::collections::BTreeMap;

pub const DOMAIN: &str = "DOMAIN";
pub const PARENT: &str = "PARENT";
pub const TREE: &str = "TREE";
pub const LICENSES: &str = "LICENSES";
pub const ARCHITECT: &str = "ARCHITECT";
pub const MAINTAINER: &str = "MAINTAINER";
pub const DESCRIPTION: &str = "DESCRIPTION";
pub const REVIEWER: &str = "REVIEWER";
pub const INTEGRATOR: &str = "INTEGRATOR";
pub const BRANCH: &str = "BRANCH";
pub const COMMENTS: &str = "COMMENTS";
pub const SUBDOMAIN_LEADER: &str = "SUBDOMAIN_LEADER";

/// Starter key of the domain file.
pub const DOMAIN_STARTER: &str = "D";
/// Starter key of the git-tree file.
pub const TREE_STARTER: &str = "T";

/// Key code to field name translation.
///
/// Keys without an entry pass through as their literal text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping {
    entries: BTreeMap<String, String>,
}

impl FieldMapping {
    /// Empty mapping: every key is its own field name.
    pub fn identity() -> Self {
        Self::default()
    }

    /// The fixed single-letter codes used by the exporter.
    pub fn scm() -> Self {
        [
            ("A", ARCHITECT),
            ("B", BRANCH),
            ("C", COMMENTS),
            ("D", DOMAIN),
            ("I", INTEGRATOR),
            ("L", LICENSES),
            ("M", MAINTAINER),
            ("N", PARENT),
            ("O", DESCRIPTION),
            ("R", REVIEWER),
            ("T", TREE),
            ("SL", SUBDOMAIN_LEADER),
        ]
        .into_iter()
        .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, field: impl Into<String>) {
        self.entries.insert(key.into(), field.into());
    }

    /// Returns the mapped field name for `key`, or `key` itself.
    pub fn field_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.entries.get(key).map_or(key, String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut mapping = Self::default();
        for (key, field) in iter {
            mapping.insert(key, field);
        }
        mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scm_mapping_translates_codes() {
        let mapping = FieldMapping::scm();
        assert_eq!(mapping.field_name("D"), DOMAIN);
        assert_eq!(mapping.field_name("SL"), SUBDOMAIN_LEADER);
        assert_eq!(mapping.field_name("O"), DESCRIPTION);
    }

    #[test]
    fn unmapped_keys_pass_through() {
        let mapping = FieldMapping::scm();
        assert_eq!(mapping.field_name("DEVELOPER"), "DEVELOPER");
        assert_eq!(FieldMapping::identity().field_name("D"), "D");
    }
}
