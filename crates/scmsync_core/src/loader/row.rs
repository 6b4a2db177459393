//! Untyped entity rows keyed by structured field paths.
//!
//! # Invariants
//! - `FieldKey::Column` is a scalar column of the row's own entity.
//! - `FieldKey::Ref` names a column of an entity reached through `path`
//!   foreign-key hops; it must be shrunk before the row is written.
//! - `FieldKey::ForeignKey` is the primary key of the entity reached through
//!   `path`; only single-hop foreign keys may be written.

use super::schema::EntityKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Structured field identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FieldKey {
    Column(String),
    Ref { path: Vec<String>, column: String },
    ForeignKey { path: Vec<String> },
}

impl FieldKey {
    pub fn column(name: &str) -> Self {
        Self::Column(name.to_string())
    }

    pub fn reference(path: &[&str], column: &str) -> Self {
        Self::Ref {
            path: path.iter().map(|hop| hop.to_string()).collect(),
            column: column.to_string(),
        }
    }

    pub fn foreign_key(path: &[&str]) -> Self {
        Self::ForeignKey {
            path: path.iter().map(|hop| hop.to_string()).collect(),
        }
    }

    /// Hops that must be resolved before this field is local to its entity.
    ///
    /// A foreign key is already resolved for its last hop, so it belongs to
    /// the group of its parent path.
    pub fn group(&self) -> &[String] {
        match self {
            Self::Column(_) => &[],
            Self::Ref { path, .. } => path,
            Self::ForeignKey { path } => &path[..path.len().saturating_sub(1)],
        }
    }

    /// Re-expresses this field relative to the entity reached via `group`.
    ///
    /// Returns `None` when the field is not part of that group.
    pub fn relative_to(&self, group: &[String]) -> Option<FieldKey> {
        if self.group() != group {
            return None;
        }
        match self {
            Self::Column(_) => None,
            Self::Ref { column, .. } => Some(Self::Column(column.clone())),
            Self::ForeignKey { path } => path.last().map(|hop| Self::ForeignKey {
                path: vec![hop.clone()],
            }),
        }
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Column(name) => f.write_str(name),
            Self::Ref { path, column } => write!(f, "{}__{column}", path.join("__")),
            Self::ForeignKey { path } => write!(f, "{}__pk", path.join("__")),
        }
    }
}

/// Scalar field value.
///
/// Ordering is derived, so text compares byte-wise (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Key tuple of a row; compared lexicographically field by field.
pub type KeyTuple = Vec<FieldValue>;

/// Renders a key tuple for logs and skip reasons.
pub fn describe_key(key: &[FieldValue]) -> String {
    key.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

/// One candidate or persisted row of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    kind: EntityKind,
    fields: BTreeMap<FieldKey, FieldValue>,
}

impl Row {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: FieldKey, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key, value.into());
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn get(&self, key: &FieldKey) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn insert(&mut self, key: FieldKey, value: FieldValue) {
        self.fields.insert(key, value);
    }

    pub fn remove(&mut self, key: &FieldKey) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &FieldValue)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Values of `keys` in order; `None` when any key is absent.
    pub fn key_tuple(&self, keys: &[FieldKey]) -> Option<KeyTuple> {
        keys.iter().map(|key| self.fields.get(key).cloned()).collect()
    }
}

/// A row read back from the store together with its primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub pk: i64,
    pub row: Row,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_of_foreign_key_is_its_parent_path() {
        let key = FieldKey::foreign_key(&["subdomain", "domain"]);
        assert_eq!(key.group(), &["subdomain".to_string()]);
        assert_eq!(
            key.relative_to(&["subdomain".to_string()]),
            Some(FieldKey::foreign_key(&["domain"]))
        );
        assert!(FieldKey::foreign_key(&["domain"]).group().is_empty());
    }

    #[test]
    fn reference_becomes_column_relative_to_its_path() {
        let key = FieldKey::reference(&["subdomain", "domain"], "name");
        let group = vec!["subdomain".to_string(), "domain".to_string()];
        assert_eq!(key.relative_to(&group), Some(FieldKey::column("name")));
        assert_eq!(key.relative_to(&group[..1]), None);
        assert_eq!(key.to_string(), "subdomain__domain__name");
    }

    #[test]
    fn text_values_compare_case_sensitively() {
        let upper = FieldValue::from("Zeta");
        let lower = FieldValue::from("alpha");
        assert!(upper < lower);
    }

    #[test]
    fn key_tuple_requires_every_key() {
        let row = Row::new(EntityKind::Domain).with(FieldKey::column("name"), "System");
        assert_eq!(
            row.key_tuple(&[FieldKey::column("name")]),
            Some(vec![FieldValue::from("System")])
        );
        assert_eq!(row.key_tuple(&[FieldKey::column("missing")]), None);
    }
}
