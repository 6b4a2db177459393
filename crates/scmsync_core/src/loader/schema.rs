//! Entity and relation registry consumed by the sync engine and the store.
//!
//! # Responsibility
//! - Declare candidate keys, primary keys, tables and foreign-key hops per
//!   entity type.
//! - Declare join tables for many-to-many relations.
//!
//! # Invariants
//! - A `Schema` is built once and passed by reference; nothing registers
//!   entities at runtime.
//! - Every foreign-key hop names an entity declared in the same schema.

use super::row::FieldKey;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Entity types known to the ownership schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Domain,
    SubDomain,
    GitTree,
    License,
    Package,
    DomainRole,
    SubDomainRole,
    GitTreeRole,
}

impl EntityKind {
    /// Normalized lowercase name used in logs and foreign-key column names.
    pub fn name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Domain => "domain",
            Self::SubDomain => "subdomain",
            Self::GitTree => "gittree",
            Self::License => "license",
            Self::Package => "package",
            Self::DomainRole => "domainrole",
            Self::SubDomainRole => "subdomainrole",
            Self::GitTreeRole => "gittreerole",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// Registry lookup failures. These indicate a programming error in schema
/// construction or in the rows handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    UnknownEntity(EntityKind),
    UnknownRelation { left: EntityKind, right: EntityKind },
    UnknownHop { entity: EntityKind, hop: String },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEntity(kind) => write!(f, "entity `{kind}` is not registered"),
            Self::UnknownRelation { left, right } => {
                write!(f, "relation `{left}`-`{right}` is not registered")
            }
            Self::UnknownHop { entity, hop } => {
                write!(f, "entity `{entity}` has no reference `{hop}`")
            }
        }
    }
}

impl Error for SchemaError {}

/// Foreign-key hop from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Field name of the hop, e.g. `subdomain`.
    pub field: &'static str,
    pub target: EntityKind,
}

/// Declaration of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySpec {
    pub kind: EntityKind,
    pub table: &'static str,
    pub primary_key: &'static str,
    pub candidate_key: Vec<FieldKey>,
    pub references: Vec<Reference>,
}

impl EntitySpec {
    pub fn new(kind: EntityKind, table: &'static str, candidate_key: Vec<FieldKey>) -> Self {
        Self {
            kind,
            table,
            primary_key: "id",
            candidate_key,
            references: Vec::new(),
        }
    }

    pub fn primary_key(mut self, primary_key: &'static str) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn reference(mut self, field: &'static str, target: EntityKind) -> Self {
        self.references.push(Reference { field, target });
        self
    }

    pub fn target_of(&self, hop: &str) -> Option<EntityKind> {
        self.references
            .iter()
            .find(|reference| reference.field == hop)
            .map(|reference| reference.target)
    }
}

/// Declaration of one many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSpec {
    pub left: EntityKind,
    pub right: EntityKind,
    pub table: &'static str,
    pub left_column: &'static str,
    pub right_column: &'static str,
}

/// Complete registry handed to the engine and store.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: BTreeMap<EntityKind, EntitySpec>,
    relations: Vec<RelationSpec>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, spec: EntitySpec) -> Self {
        self.entities.insert(spec.kind, spec);
        self
    }

    pub fn with_relation(mut self, spec: RelationSpec) -> Self {
        self.relations
            .retain(|existing| !(existing.left == spec.left && existing.right == spec.right));
        self.relations.push(spec);
        self
    }

    pub fn entity(&self, kind: EntityKind) -> Result<&EntitySpec, SchemaError> {
        self.entities
            .get(&kind)
            .ok_or(SchemaError::UnknownEntity(kind))
    }

    pub fn relation(
        &self,
        left: EntityKind,
        right: EntityKind,
    ) -> Result<&RelationSpec, SchemaError> {
        self.relations
            .iter()
            .find(|spec| spec.left == left && spec.right == right)
            .ok_or(SchemaError::UnknownRelation { left, right })
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySpec> {
        self.entities.values()
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationSpec> {
        self.relations.iter()
    }

    /// Follows `path` hops from `from` and returns the entity reached.
    pub fn resolve_path(
        &self,
        from: EntityKind,
        path: &[String],
    ) -> Result<EntityKind, SchemaError> {
        path.iter().try_fold(from, |current, hop| {
            self.entity(current)?
                .target_of(hop)
                .ok_or_else(|| SchemaError::UnknownHop {
                    entity: current,
                    hop: hop.clone(),
                })
        })
    }

    /// Column holding the foreign key of `hop` on `entity`: `<hop>_<target pk>`.
    pub fn foreign_key_column(
        &self,
        entity: EntityKind,
        hop: &str,
    ) -> Result<String, SchemaError> {
        let target = self
            .entity(entity)?
            .target_of(hop)
            .ok_or_else(|| SchemaError::UnknownHop {
                entity,
                hop: hop.to_string(),
            })?;
        Ok(format!("{hop}_{}", self.entity(target)?.primary_key))
    }

    /// Registry of the ownership hierarchy stored by `db::migrations`.
    pub fn ownership() -> Self {
        use EntityKind::*;
        let col = FieldKey::column;
        let rf = FieldKey::reference;

        Self::new()
            .with_entity(EntitySpec::new(User, "users", vec![col("email")]))
            .with_entity(EntitySpec::new(Domain, "domains", vec![col("name")]))
            .with_entity(
                EntitySpec::new(
                    SubDomain,
                    "subdomains",
                    vec![col("name"), rf(&["domain"], "name")],
                )
                .reference("domain", Domain),
            )
            .with_entity(
                EntitySpec::new(GitTree, "gittrees", vec![col("gitpath")])
                    .reference("subdomain", SubDomain),
            )
            .with_entity(EntitySpec::new(License, "licenses", vec![col("shortname")]))
            .with_entity(EntitySpec::new(Package, "packages", vec![col("name")]))
            .with_entity(
                EntitySpec::new(
                    DomainRole,
                    "domain_roles",
                    vec![col("role"), rf(&["domain"], "name")],
                )
                .reference("domain", Domain),
            )
            .with_entity(
                EntitySpec::new(
                    SubDomainRole,
                    "subdomain_roles",
                    vec![
                        col("role"),
                        rf(&["subdomain"], "name"),
                        rf(&["subdomain", "domain"], "name"),
                    ],
                )
                .reference("subdomain", SubDomain),
            )
            .with_entity(
                EntitySpec::new(
                    GitTreeRole,
                    "gittree_roles",
                    vec![col("role"), rf(&["gittree"], "gitpath")],
                )
                .reference("gittree", GitTree),
            )
            .with_relation(RelationSpec {
                left: GitTree,
                right: License,
                table: "gittree_licenses",
                left_column: "gittree_id",
                right_column: "license_id",
            })
            .with_relation(RelationSpec {
                left: GitTree,
                right: Package,
                table: "gittree_packages",
                left_column: "gittree_id",
                right_column: "package_id",
            })
            .with_relation(RelationSpec {
                left: DomainRole,
                right: User,
                table: "domain_role_users",
                left_column: "role_id",
                right_column: "user_id",
            })
            .with_relation(RelationSpec {
                left: SubDomainRole,
                right: User,
                table: "subdomain_role_users",
                left_column: "role_id",
                right_column: "user_id",
            })
            .with_relation(RelationSpec {
                left: GitTreeRole,
                right: User,
                table: "gittree_role_users",
                left_column: "role_id",
                right_column: "user_id",
            })
    }
}
