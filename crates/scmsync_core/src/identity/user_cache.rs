//! Merging cache for user references seen across one snapshot.
//!
//! # Responsibility
//! - Fold `Name <email>`, `Name`, and bare `email` references of the same
//!   person into one canonical `UserRecord`.
//! - Resolve any previously seen reference to its live, merged record.
//!
//! # Invariants
//! - Records are merged only on an exact email match, or when a reference
//!   carrying an email names a record that has no email yet.
//! - Two records with different emails are never merged.
//! - Name text matches exactly; similar names stay distinct.

use crate::model::user::UserRef;
use log::debug;
use serde::Serialize;
use std::collections::HashMap;

/// Canonical identity of one person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl UserRecord {
    /// Persisted username; the email is authoritative.
    pub fn username(&self) -> &str {
        &self.email
    }

    pub fn has_email(&self) -> bool {
        !self.email.is_empty()
    }

    fn absorb(&mut self, user: &UserRef) {
        if self.email.is_empty() {
            self.email = user.email.clone();
        }
        if !user.first_name.is_empty() {
            self.first_name = user.first_name.clone();
        }
        if !user.last_name.is_empty() {
            self.last_name = user.last_name.clone();
        }
    }
}

type NameKey = (String, String);

/// Union-find arena of user records keyed by email, name and raw reference.
#[derive(Debug, Default)]
pub struct UserCache {
    records: Vec<UserRecord>,
    parent: Vec<usize>,
    by_email: HashMap<String, usize>,
    by_name: HashMap<NameKey, usize>,
    aliases: HashMap<UserRef, usize>,
}

impl UserCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one reference, merging it into an existing record when the
    /// evidence allows. Blank references are ignored.
    pub fn update(&mut self, reference: &str) {
        let user = UserRef::parse(reference);
        if user.is_empty() {
            return;
        }

        let by_name = user
            .name_key()
            .and_then(|key| self.by_name.get(&key).copied())
            .map(|id| self.find(id));

        let id = if user.has_email() {
            let by_email = self.by_email.get(&user.email).map(|&id| self.find(id));
            let name_only = by_name.filter(|&id| !self.records[id].has_email());
            match (by_email, name_only) {
                (Some(target), Some(other)) if target != other => {
                    self.merge(other, target);
                    target
                }
                (Some(target), _) => target,
                (None, Some(other)) => other,
                (None, None) => self.push(),
            }
        } else {
            match by_name {
                Some(id) => id,
                None => self.push(),
            }
        };

        self.records[id].absorb(&user);
        if user.has_email() {
            self.by_email.insert(user.email.clone(), id);
        }
        if let Some(key) = user.name_key() {
            self.by_name.insert(key, id);
        }
        self.aliases.insert(user, id);
    }

    /// Returns the merged record a reference resolves to.
    pub fn get(&self, reference: &str) -> Option<&UserRecord> {
        let user = UserRef::parse(reference);
        let id = self.aliases.get(&user).copied().or_else(|| {
            if user.has_email() {
                self.by_email.get(&user.email).copied()
            } else {
                user.name_key()
                    .and_then(|key| self.by_name.get(&key).copied())
            }
        })?;
        Some(&self.records[self.find(id)])
    }

    /// Every canonical record once, in first-seen order.
    pub fn all(&self) -> impl Iterator<Item = &UserRecord> {
        self.records
            .iter()
            .enumerate()
            .filter(|(id, _)| self.parent[*id] == *id)
            .map(|(_, record)| record)
    }

    /// Canonical records that carry an email; only these can be persisted.
    pub fn with_email(&self) -> impl Iterator<Item = &UserRecord> {
        self.all().filter(|record| record.has_email())
    }

    pub fn len(&self) -> usize {
        self.all().count()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn push(&mut self) -> usize {
        let id = self.records.len();
        self.records.push(UserRecord::default());
        self.parent.push(id);
        id
    }

    fn find(&self, mut id: usize) -> usize {
        while self.parent[id] != id {
            id = self.parent[id];
        }
        id
    }

    /// Folds the root `from` into the root `into`.
    fn merge(&mut self, from: usize, into: usize) {
        let absorbed = std::mem::take(&mut self.records[from]);
        let target = &mut self.records[into];
        if target.first_name.is_empty() {
            target.first_name = absorbed.first_name;
        }
        if target.last_name.is_empty() {
            target.last_name = absorbed.last_name;
        }
        self.parent[from] = into;
        debug!("event=user_merge module=identity status=ok from={from} into={into}");
    }
}

#[cfg(test)]
mod tests {
    use super::{UserCache, UserRecord};

    fn record(email: &str, first: &str, last: &str) -> UserRecord {
        UserRecord {
            email: email.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }

    fn cache(references: &[&str]) -> UserCache {
        let mut cache = UserCache::new();
        for reference in references {
            cache.update(reference);
        }
        cache
    }

    #[test]
    fn merges_name_into_full_reference() {
        let cache = cache(&["David Bowie", "David Bowie <david.bowie@i.com>"]);
        let all: Vec<_> = cache.all().cloned().collect();
        assert_eq!(all, vec![record("david.bowie@i.com", "David", "Bowie")]);
    }

    #[test]
    fn merges_full_reference_and_bare_email() {
        let cache = cache(&["David Bowie <david.bowie@i.com>", "david.bowie@i.com"]);
        let all: Vec<_> = cache.all().cloned().collect();
        assert_eq!(all, vec![record("david.bowie@i.com", "David", "Bowie")]);
    }

    #[test]
    fn merges_all_three_forms() {
        let cache = cache(&[
            "David Bowie",
            "david.bowie@i.com",
            "David Bowie <david.bowie@i.com>",
        ]);
        let all: Vec<_> = cache.all().cloned().collect();
        assert_eq!(all, vec![record("david.bowie@i.com", "David", "Bowie")]);
    }

    #[test]
    fn name_and_bare_email_stay_apart() {
        let cache = cache(&["David Bowie", "david.bowie@i.com"]);
        assert_eq!(cache.len(), 2);
        let with_email: Vec<_> = cache.with_email().cloned().collect();
        assert_eq!(with_email, vec![record("david.bowie@i.com", "", "")]);
        assert_eq!(
            cache.get("David Bowie"),
            Some(&record("", "David", "Bowie"))
        );
    }

    #[test]
    fn different_names_are_not_merged() {
        let cache = cache(&["Eric Clapton", "Eric Johnson"]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.with_email().count(), 0);
    }

    #[test]
    fn different_emails_are_not_merged() {
        let cache = cache(&["joe@satriani.com", "steve@vai.com"]);
        let all: Vec<_> = cache.all().cloned().collect();
        assert_eq!(
            all,
            vec![
                record("joe@satriani.com", "", ""),
                record("steve@vai.com", "", "")
            ]
        );
    }

    #[test]
    fn same_email_under_different_names_collapses() {
        let cache = cache(&[
            "David Bowie",
            "David Robert Jones <david.bowie@i.com>",
            "David Bowie <david.bowie@i.com>",
            "David Robert Jones",
            "Bowie David <david.bowie@i.com>",
        ]);
        let all: Vec<_> = cache.with_email().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].email, "david.bowie@i.com");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_returns_live_merged_record() {
        let cache = cache(&["David Bowie", "David Bowie <david.bowie@i.com>"]);
        assert_eq!(
            cache.get("David Bowie"),
            Some(&record("david.bowie@i.com", "David", "Bowie"))
        );
        assert_eq!(
            cache.get("david.bowie@i.com").map(|user| user.email.as_str()),
            Some("david.bowie@i.com")
        );
    }

    #[test]
    fn get_by_full_reference_after_bare_email() {
        let cache = cache(&["david.bowie@i.com", "David Bowie <david.bowie@i.com>"]);
        assert_eq!(
            cache.get("David Bowie <david.bowie@i.com>"),
            Some(&record("david.bowie@i.com", "David", "Bowie"))
        );
    }

    #[test]
    fn users_without_email_are_not_persistable() {
        let cache = cache(&[
            "Brian May",
            "Roger Taylor",
            "Freddie Mercury <freddie@queen.com>",
        ]);
        let persisted: Vec<_> = cache.with_email().cloned().collect();
        assert_eq!(
            persisted,
            vec![record("freddie@queen.com", "Freddie", "Mercury")]
        );
        assert!(cache.get("Brian May").is_some_and(|user| !user.has_email()));
        assert!(cache.get("Unknown Person").is_none());
    }

    #[test]
    fn newest_name_text_wins() {
        let cache = cache(&[
            "David Bowie <david.bowie@i.com>",
            "Ziggy Stardust <david.bowie@i.com>",
        ]);
        assert_eq!(
            cache.get("david.bowie@i.com"),
            Some(&record("david.bowie@i.com", "Ziggy", "Stardust"))
        );
    }

    #[test]
    fn blank_reference_is_ignored() {
        let cache = cache(&["   ", ""]);
        assert!(cache.is_empty());
    }
}
