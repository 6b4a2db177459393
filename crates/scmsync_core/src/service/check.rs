//! Dry-run validation of domain and tree files.
//!
//! # Responsibility
//! - Report every grammar and semantic problem of one snapshot at once.
//! - Never touch persisted state.
//!
//! # Invariants
//! - Each message carries its file tag and 1-based block number.
//! - `errors` equals the number of messages.

use crate::config::ImportConfig;
use crate::model::role::RoleKind;
use crate::model::user::UserRef;
use crate::parser::fields::{DOMAIN, PARENT, TREE};
use crate::parser::{parse_blocks, Block, ParseError};
use crate::transform::{split_domain_name, NONAME};
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::time::Instant;

const DOMAINS_TAG: &str = "DOMAINS";
const TREE_TAG: &str = "TREE";

/// Outcome of `check_scm`; problems are data, not errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub errors: usize,
    pub messages: Vec<String>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }

    fn error(&mut self, tag: &str, block: usize, message: impl Display) {
        self.errors += 1;
        self.messages.push(format!("({tag}) block {block}: {message}"));
    }

    fn syntax(&mut self, tag: &str, err: &ParseError) {
        self.errors += 1;
        self.messages.push(format!("({tag}) syntax error: {err}"));
    }
}

impl Display for CheckReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for message in &self.messages {
            writeln!(f, "{message}")?;
        }
        write!(f, "{} error(s)", self.errors)
    }
}

/// Domains and subdomains declared by the domain file.
#[derive(Debug, Default)]
struct KnownDomains {
    domains: HashSet<String>,
    subdomains: HashSet<(String, String)>,
}

impl KnownDomains {
    fn contains(&self, domain: &str, subdomain: &str) -> bool {
        if subdomain == NONAME {
            return domain == NONAME || self.domains.contains(domain);
        }
        self.subdomains
            .contains(&(domain.to_string(), subdomain.to_string()))
    }
}

/// Validates both files and returns every problem found.
pub fn check_scm(domain_text: &str, tree_text: &str, config: &ImportConfig) -> CheckReport {
    let started_at = Instant::now();
    let mut report = CheckReport::default();

    let domains = parse_blocks(domain_text, &config.domain_starter, &config.mapping)
        .map_err(|err| report.syntax(DOMAINS_TAG, &err))
        .ok();
    let trees = parse_blocks(tree_text, &config.tree_starter, &config.mapping)
        .map_err(|err| report.syntax(TREE_TAG, &err))
        .ok();

    let known = domains
        .as_deref()
        .map(|blocks| check_domains(blocks, &mut report));
    if let Some(trees) = trees.as_deref() {
        check_trees(trees, known.as_ref(), &mut report);
    }

    if report.is_ok() {
        info!(
            "event=scm_check module=service status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        );
    } else {
        warn!(
            "event=scm_check module=service status=error errors={} duration_ms={}",
            report.errors,
            started_at.elapsed().as_millis()
        );
    }
    report
}

fn check_domains(blocks: &[Block], report: &mut CheckReport) -> KnownDomains {
    let mut known = KnownDomains::default();
    let mut seen: HashSet<(String, Option<String>)> = HashSet::new();

    for (index, block) in blocks.iter().enumerate() {
        let number = index + 1;
        check_users(block, DOMAINS_TAG, number, report);

        let values = block.get(DOMAIN).unwrap_or_default();
        let Some(name) = values.first().map(|name| name.trim()) else {
            report.error(DOMAINS_TAG, number, "lack of DOMAIN");
            continue;
        };
        if values.len() > 1 {
            report.error(
                DOMAINS_TAG,
                number,
                format!("DOMAIN is not unique: {}", values.join(", ")),
            );
        }
        let parent = block.first(PARENT).map(str::trim);

        if name.contains('/') {
            let (domain, subdomain) = split_domain_name(name);
            if !seen.insert((domain.clone(), Some(subdomain.clone()))) {
                report.error(DOMAINS_TAG, number, format!("duplicated name \"{name}\""));
            }
            match parent {
                None => report.error(
                    DOMAINS_TAG,
                    number,
                    format!("SUBDOMAIN \"{name}\" lacks PARENT"),
                ),
                Some(parent) => {
                    if parent != domain {
                        report.error(
                            DOMAINS_TAG,
                            number,
                            format!("DOMAIN \"{name}\" and PARENT \"{parent}\" do not match"),
                        );
                    }
                    if !known.domains.contains(&domain) {
                        report.error(
                            DOMAINS_TAG,
                            number,
                            format!("unknown parent domain \"{domain}\""),
                        );
                    }
                }
            }
            known.subdomains.insert((domain, subdomain));
        } else {
            if !seen.insert((name.to_string(), None)) {
                report.error(DOMAINS_TAG, number, format!("duplicated name \"{name}\""));
            }
            if let Some(parent) = parent {
                report.error(
                    DOMAINS_TAG,
                    number,
                    format!("PARENT \"{parent}\" given but \"{name}\" has no subdomain part"),
                );
            }
            known.domains.insert(name.to_string());
        }
    }
    known
}

fn check_trees(blocks: &[Block], known: Option<&KnownDomains>, report: &mut CheckReport) {
    let mut paths = HashSet::new();

    for (index, block) in blocks.iter().enumerate() {
        let number = index + 1;
        let path = block.first(TREE).map(str::trim).unwrap_or_default();
        let values = block.get(DOMAIN).unwrap_or_default();

        match values.first().map(|name| name.trim()).filter(|name| !name.is_empty()) {
            None => report.error(TREE_TAG, number, format!("lack of DOMAIN for \"{path}\"")),
            Some(name) => {
                if values.len() > 1 {
                    report.error(
                        TREE_TAG,
                        number,
                        format!("DOMAIN is not unique: {}", values.join(", ")),
                    );
                }
                let (domain, subdomain) = split_domain_name(name);
                if known.is_some_and(|known| !known.contains(&domain, &subdomain)) {
                    report.error(TREE_TAG, number, format!("unknown domain \"{name}\""));
                }
            }
        }

        if !paths.insert(path.to_string()) {
            report.error(TREE_TAG, number, format!("duplicate git path \"{path}\""));
        }
        check_users(block, TREE_TAG, number, report);
    }
}

fn check_users(block: &Block, tag: &str, number: usize, report: &mut CheckReport) {
    for (field, values) in block.fields() {
        if RoleKind::from_field(field).is_none() {
            continue;
        }
        for reference in values {
            if let Err(err) = UserRef::parse_validated(reference) {
                report.error(tag, number, err);
            }
        }
    }
}
