//! Snapshot transform from parsed blocks to candidate rows.
//!
//! # Responsibility
//! - Derive domains, subdomains, trees, roles, users and license links from
//!   the domain and tree block lists.
//! - Express every parent as candidate-key reference fields
//!   (`subdomain__domain__name`), never as a persisted id.
//!
//! # Invariants
//! - The `Uncategorized` domain always exists, and every domain owns an
//!   `Uncategorized` subdomain.
//! - One `RoleAssignment` per `(role, owning entity)`; users are listed once.
//! - Only users with an email are emitted; role users that do not resolve
//!   to one are dropped.

use crate::identity::UserCache;
use crate::loader::{EntityKind, FieldKey, Row};
use crate::model::role::{Role, RoleAssignment, RoleKind};
use crate::parser::fields::{DOMAIN, LICENSES, PARENT, TREE};
use crate::parser::Block;
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

/// Fallback domain and subdomain name.
pub const NONAME: &str = "Uncategorized";

/// Splits `Domain / Sub` into trimmed parts; a missing or blank subdomain
/// falls back to `Uncategorized`.
pub fn split_domain_name(name: &str) -> (String, String) {
    match name.split_once('/') {
        Some((domain, subdomain)) if !subdomain.trim().is_empty() => {
            (domain.trim().to_string(), subdomain.trim().to_string())
        }
        Some((domain, _)) => (domain.trim().to_string(), NONAME.to_string()),
        None => (name.trim().to_string(), NONAME.to_string()),
    }
}

/// Candidate state described by one pair of input files.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub domains: Vec<Row>,
    pub subdomains: Vec<Row>,
    pub gittrees: Vec<Row>,
    pub users: Vec<Row>,
    pub roles: Vec<RoleAssignment>,
    pub gittree_licenses: Vec<(Row, Row)>,
}

impl Snapshot {
    /// Candidate rows of one role entity type.
    pub fn role_rows(&self, entity: EntityKind) -> Vec<Row> {
        self.roles
            .iter()
            .filter(|assignment| assignment.role.entity() == entity)
            .map(|assignment| assignment.role.candidate_row())
            .collect()
    }

    /// `(role, user)` pairs of one role entity type.
    pub fn role_user_pairs(&self, entity: EntityKind) -> Vec<(Row, Row)> {
        self.roles
            .iter()
            .filter(|assignment| assignment.role.entity() == entity)
            .flat_map(|assignment| {
                let role = assignment.role.key_row();
                assignment
                    .users
                    .iter()
                    .map(move |email| (role.clone(), user_key_row(email)))
            })
            .collect()
    }
}

fn user_key_row(email: &str) -> Row {
    Row::new(EntityKind::User).with(FieldKey::column("email"), email)
}

fn domain_row(name: &str) -> Row {
    Row::new(EntityKind::Domain).with(FieldKey::column("name"), name)
}

fn subdomain_row(domain: &str, subdomain: &str) -> Row {
    Row::new(EntityKind::SubDomain)
        .with(FieldKey::column("name"), subdomain)
        .with(FieldKey::reference(&["domain"], "name"), domain)
}

fn gittree_row(gitpath: &str, domain: &str, subdomain: &str) -> Row {
    Row::new(EntityKind::GitTree)
        .with(FieldKey::column("gitpath"), gitpath)
        .with(FieldKey::reference(&["subdomain"], "name"), subdomain)
        .with(FieldKey::reference(&["subdomain", "domain"], "name"), domain)
}

/// Role assignments keyed by role, kept in first-seen order.
#[derive(Default)]
struct RoleTable {
    index: BTreeMap<Role, usize>,
    assignments: Vec<RoleAssignment>,
}

impl RoleTable {
    fn collect(&mut self, block: &Block, cache: &UserCache, owner: impl Fn(RoleKind) -> Role) {
        for (field, values) in block.fields() {
            let Some(kind) = RoleKind::from_field(field) else {
                continue;
            };
            let role = owner(kind);
            let slot = match self.index.get(&role) {
                Some(slot) => *slot,
                None => {
                    self.index.insert(role.clone(), self.assignments.len());
                    self.assignments.push(RoleAssignment::new(role));
                    self.assignments.len() - 1
                }
            };
            for reference in values {
                match cache.get(reference).filter(|user| user.has_email()) {
                    Some(user) => self.assignments[slot].add_user(&user.email),
                    None => debug!(
                        "event=role_user_dropped module=transform status=skip role={kind} block_line={}",
                        block.line
                    ),
                }
            }
        }
    }
}

/// Builds the candidate snapshot from parsed domain and tree blocks.
///
/// Blocks lacking their name field are skipped; validation reports them.
pub fn transform(domain_blocks: &[Block], tree_blocks: &[Block]) -> Snapshot {
    let mut cache = UserCache::new();
    for block in domain_blocks.iter().chain(tree_blocks) {
        for (field, values) in block.fields() {
            if RoleKind::from_field(field).is_some() {
                values.iter().for_each(|reference| cache.update(reference));
            }
        }
    }

    let mut domains: Vec<String> = vec![NONAME.to_string()];
    let mut subdomains: Vec<(String, String)> = Vec::new();
    let mut roles = RoleTable::default();

    for block in domain_blocks {
        let Some(name) = block.first(DOMAIN) else {
            warn!(
                "event=transform module=transform status=skip reason=missing_domain line={}",
                block.line
            );
            continue;
        };

        if block.contains(PARENT) {
            let (domain, subdomain) = split_domain_name(name);
            push_unique(&mut subdomains, (domain.clone(), subdomain.clone()));
            roles.collect(block, &cache, |role| Role::SubDomain {
                role,
                domain: domain.clone(),
                subdomain: subdomain.clone(),
            });
        } else {
            let domain = name.trim().to_string();
            push_unique(&mut domains, domain.clone());
            roles.collect(block, &cache, |role| Role::Domain {
                role,
                domain: domain.clone(),
            });
        }
    }

    for domain in &domains {
        push_unique(&mut subdomains, (domain.clone(), NONAME.to_string()));
    }

    let mut gittrees = Vec::new();
    let mut gittree_licenses = Vec::new();
    for block in tree_blocks {
        let Some(gitpath) = block.first(TREE).map(str::trim) else {
            warn!(
                "event=transform module=transform status=skip reason=missing_tree line={}",
                block.line
            );
            continue;
        };
        let name = block
            .first(DOMAIN)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(NONAME);
        let (domain, subdomain) = split_domain_name(name);
        gittrees.push(gittree_row(gitpath, &domain, &subdomain));

        for license in block.get(LICENSES).unwrap_or_default() {
            let license = license.trim();
            if license.is_empty() {
                continue;
            }
            gittree_licenses.push((
                Row::new(EntityKind::GitTree).with(FieldKey::column("gitpath"), gitpath),
                Row::new(EntityKind::License).with(FieldKey::column("shortname"), license),
            ));
        }

        roles.collect(block, &cache, |role| Role::GitTree {
            role,
            gitpath: gitpath.to_string(),
        });
    }

    let users = cache
        .with_email()
        .map(|user| {
            Row::new(EntityKind::User)
                .with(FieldKey::column("email"), user.email.as_str())
                .with(FieldKey::column("username"), user.username())
                .with(FieldKey::column("first_name"), user.first_name.as_str())
                .with(FieldKey::column("last_name"), user.last_name.as_str())
        })
        .collect::<Vec<_>>();

    let snapshot = Snapshot {
        domains: domains.iter().map(|name| domain_row(name)).collect(),
        subdomains: subdomains
            .iter()
            .map(|(domain, subdomain)| subdomain_row(domain, subdomain))
            .collect(),
        gittrees,
        users,
        roles: roles.assignments,
        gittree_licenses,
    };
    info!(
        "event=transform module=transform status=ok domains={} subdomains={} gittrees={} users={} roles={}",
        snapshot.domains.len(),
        snapshot.subdomains.len(),
        snapshot.gittrees.len(),
        snapshot.users.len(),
        snapshot.roles.len()
    );
    snapshot
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// Distinct values of one field across rows, for assertions and reports.
pub fn column_values(rows: &[Row], field: &FieldKey) -> BTreeSet<String> {
    rows.iter()
        .filter_map(|row| row.get(field))
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_blocks, FieldMapping};

    fn blocks(text: &str, starter: &str) -> Vec<Block> {
        parse_blocks(text, starter, &FieldMapping::scm()).unwrap()
    }

    fn names(rows: &[Row], field: FieldKey) -> Vec<String> {
        let mut values: Vec<String> = rows
            .iter()
            .map(|row| row.get(&field).unwrap().to_string())
            .collect();
        values.sort();
        values
    }

    fn subdomain_pairs(snapshot: &Snapshot) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = snapshot
            .subdomains
            .iter()
            .map(|row| {
                (
                    row.get(&FieldKey::reference(&["domain"], "name"))
                        .unwrap()
                        .to_string(),
                    row.get(&FieldKey::column("name")).unwrap().to_string(),
                )
            })
            .collect();
        pairs.sort();
        pairs
    }

    #[test]
    fn split_domain_name_handles_every_shape() {
        assert_eq!(
            split_domain_name("System / Alarm"),
            ("System".to_string(), "Alarm".to_string())
        );
        assert_eq!(
            split_domain_name("System"),
            ("System".to_string(), NONAME.to_string())
        );
        assert_eq!(
            split_domain_name("System /"),
            ("System".to_string(), NONAME.to_string())
        );
        assert_eq!(
            split_domain_name("A/B/C"),
            ("A".to_string(), "B/C".to_string())
        );
    }

    #[test]
    fn domain_and_subdomain_scenario() {
        let domains = blocks("D: System\n\nD: System / Alarm\nN: System\n", "D");
        let snapshot = transform(&domains, &[]);

        assert_eq!(
            names(&snapshot.domains, FieldKey::column("name")),
            vec!["System", NONAME]
        );
        assert_eq!(
            subdomain_pairs(&snapshot),
            vec![
                ("System".to_string(), "Alarm".to_string()),
                ("System".to_string(), NONAME.to_string()),
                (NONAME.to_string(), NONAME.to_string()),
            ]
        );
        assert!(snapshot.gittrees.is_empty());
    }

    #[test]
    fn tree_without_domain_falls_back_to_uncategorized() {
        let trees = blocks("T: apps/home\nT: apps/clock\nD: Apps\n", "T");
        let snapshot = transform(&[], &trees);
        let home = &snapshot.gittrees[0];
        assert_eq!(
            home.get(&FieldKey::reference(&["subdomain"], "name"))
                .map(ToString::to_string),
            Some(NONAME.to_string())
        );
        assert_eq!(
            home.get(&FieldKey::reference(&["subdomain", "domain"], "name"))
                .map(ToString::to_string),
            Some(NONAME.to_string())
        );
        let clock = &snapshot.gittrees[1];
        assert_eq!(
            clock
                .get(&FieldKey::reference(&["subdomain", "domain"], "name"))
                .map(ToString::to_string),
            Some("Apps".to_string())
        );
    }

    #[test]
    fn roles_resolve_users_through_the_cache() {
        let domains = blocks(
            "D: System\nM: Alice <alice@i.com>\nR: Alice\nR: Nobody Known\nO: not a role\n",
            "D",
        );
        let snapshot = transform(&domains, &[]);

        let roles = snapshot.role_rows(EntityKind::DomainRole);
        assert_eq!(
            names(&roles, FieldKey::column("name")),
            vec!["MAINTAINER: System", "REVIEWER: System"]
        );

        let pairs = snapshot.role_user_pairs(EntityKind::DomainRole);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|(_, user)| user
            .get(&FieldKey::column("email"))
            .map(ToString::to_string)
            == Some("alice@i.com".to_string())));
        assert_eq!(snapshot.users.len(), 1);
    }

    #[test]
    fn subdomain_and_tree_roles_use_their_own_entities() {
        let domains = blocks(
            "D: System\nD: System / Alarm\nN: System\nI: bob@i.com\n",
            "D",
        );
        let trees = blocks(
            "T: system/alarm\nD: System / Alarm\nA: carol@i.com\nL: MIT\nL: GPL-2.0\n",
            "T",
        );
        let snapshot = transform(&domains, &trees);

        assert_eq!(
            names(
                &snapshot.role_rows(EntityKind::SubDomainRole),
                FieldKey::column("name")
            ),
            vec!["INTEGRATOR: System-Alarm"]
        );
        assert_eq!(
            names(
                &snapshot.role_rows(EntityKind::GitTreeRole),
                FieldKey::column("name")
            ),
            vec!["ARCHITECT: system/alarm"]
        );
        assert_eq!(snapshot.gittree_licenses.len(), 2);
        assert_eq!(
            column_values(&snapshot.users, &FieldKey::column("username")),
            ["bob@i.com", "carol@i.com"]
                .into_iter()
                .map(String::from)
                .collect()
        );
    }

    #[test]
    fn repeated_role_users_are_listed_once() {
        let domains = blocks(
            "D: System\nI: a@x.com\nI: A Person <a@x.com>\nI: b@x.com\n",
            "D",
        );
        let snapshot = transform(&domains, &[]);
        assert_eq!(snapshot.roles.len(), 1);
        assert_eq!(snapshot.roles[0].users, vec!["a@x.com", "b@x.com"]);
    }
}
