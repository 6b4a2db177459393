//! Role assignments on domains, subdomains, and git trees.
//!
//! # Invariants
//! - At most one `Role` exists per `(role kind, owning entity)`.
//! - The owning entity is chosen once, when the role is built from a block.

use crate::loader::row::{FieldKey, Row};
use crate::loader::schema::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Fixed role enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleKind {
    Architect,
    Maintainer,
    Developer,
    Reviewer,
    Integrator,
}

impl RoleKind {
    pub const ALL: [RoleKind; 5] = [
        RoleKind::Architect,
        RoleKind::Maintainer,
        RoleKind::Developer,
        RoleKind::Reviewer,
        RoleKind::Integrator,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Architect => "ARCHITECT",
            Self::Maintainer => "MAINTAINER",
            Self::Developer => "DEVELOPER",
            Self::Reviewer => "REVIEWER",
            Self::Integrator => "INTEGRATOR",
        }
    }

    /// Maps a block field name to a role, if it names one.
    pub fn from_field(field: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == field)
    }
}

impl Display for RoleKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role bound to its owning entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Domain {
        role: RoleKind,
        domain: String,
    },
    SubDomain {
        role: RoleKind,
        domain: String,
        subdomain: String,
    },
    GitTree {
        role: RoleKind,
        gitpath: String,
    },
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Self::Domain { role, .. } | Self::SubDomain { role, .. } | Self::GitTree { role, .. } => {
                *role
            }
        }
    }

    /// Entity type that stores this role.
    pub fn entity(&self) -> EntityKind {
        match self {
            Self::Domain { .. } => EntityKind::DomainRole,
            Self::SubDomain { .. } => EntityKind::SubDomainRole,
            Self::GitTree { .. } => EntityKind::GitTreeRole,
        }
    }

    /// Derived display label.
    pub fn display_name(&self) -> String {
        match self {
            Self::Domain { role, domain } => format!("{role}: {domain}"),
            Self::SubDomain {
                role,
                domain,
                subdomain,
            } => format!("{role}: {domain}-{subdomain}"),
            Self::GitTree { role, gitpath } => format!("{role}: {gitpath}"),
        }
    }

    /// Candidate-key fields only; used on the role side of role/user pairs.
    pub fn key_row(&self) -> Row {
        let row = Row::new(self.entity()).with(FieldKey::column("role"), self.kind().as_str());
        match self {
            Self::Domain { domain, .. } => {
                row.with(FieldKey::reference(&["domain"], "name"), domain.as_str())
            }
            Self::SubDomain {
                domain, subdomain, ..
            } => row
                .with(FieldKey::reference(&["subdomain"], "name"), subdomain.as_str())
                .with(
                    FieldKey::reference(&["subdomain", "domain"], "name"),
                    domain.as_str(),
                ),
            Self::GitTree { gitpath, .. } => {
                row.with(FieldKey::reference(&["gittree"], "gitpath"), gitpath.as_str())
            }
        }
    }

    /// Full candidate row including the display label.
    pub fn candidate_row(&self) -> Row {
        self.key_row()
            .with(FieldKey::column("name"), self.display_name())
    }
}

/// One role and the emails of the users holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub role: Role,
    pub users: Vec<String>,
}

impl RoleAssignment {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            users: Vec::new(),
        }
    }

    /// Adds a user email once.
    pub fn add_user(&mut self, email: &str) {
        if !self.users.iter().any(|existing| existing == email) {
            self.users.push(email.to_string());
        }
    }
}
