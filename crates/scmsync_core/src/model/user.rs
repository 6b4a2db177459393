//! User reference parsing.
//!
//! # Responsibility
//! - Split `Name <email>`, `Name`, and bare `email` references into parts.
//! - Validate email syntax for the check pass.
//!
//! # Invariants
//! - Parsing is total: every string yields a `UserRef` (possibly empty).
//! - Parts are trimmed; `last_name` keeps everything after the first word.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<name>.*?)<(?P<email>.*?)>|(?P<bare>.*@.*))").expect("valid regex")
});

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.+_-]+@[A-Za-z0-9._-]+\.[A-Za-z]{2,}$").expect("valid regex")
});

/// Parsed user reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserRef {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Present-but-malformed email in a user reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEmail {
    pub email: String,
    pub reference: String,
}

impl Display for InvalidEmail {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid email \"{}\" for user \"{}\"",
            self.email, self.reference
        )
    }
}

impl Error for InvalidEmail {}

impl UserRef {
    /// Parses one user reference.
    pub fn parse(reference: &str) -> Self {
        let (name, email) = match ADDRESS.captures(reference) {
            Some(caps) => match (caps.name("email"), caps.name("bare")) {
                (Some(email), _) => (
                    caps.name("name").map_or("", |m| m.as_str()),
                    email.as_str(),
                ),
                (None, Some(bare)) => ("", bare.as_str()),
                (None, None) => (reference, ""),
            },
            None => (reference, ""),
        };

        let name = name.trim();
        let (first_name, last_name) = match name.split_once(char::is_whitespace) {
            Some((first, rest)) => (first, rest.trim()),
            None => (name, ""),
        };

        Self {
            email: email.trim().to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        }
    }

    /// Parses and rejects a present-but-malformed email.
    pub fn parse_validated(reference: &str) -> Result<Self, InvalidEmail> {
        let user = Self::parse(reference);
        if !user.email.is_empty() && !EMAIL.is_match(&user.email) {
            return Err(InvalidEmail {
                email: user.email,
                reference: reference.trim().to_string(),
            });
        }
        Ok(user)
    }

    pub fn has_email(&self) -> bool {
        !self.email.is_empty()
    }

    pub fn has_name(&self) -> bool {
        !self.first_name.is_empty() || !self.last_name.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_email() && !self.has_name()
    }

    /// Exact name text used for name-only matching.
    pub fn name_key(&self) -> Option<(String, String)> {
        self.has_name()
            .then(|| (self.first_name.clone(), self.last_name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::UserRef;

    fn parts(reference: &str) -> (String, String, String) {
        let user = UserRef::parse(reference);
        (user.email, user.first_name, user.last_name)
    }

    fn owned(email: &str, first: &str, last: &str) -> (String, String, String) {
        (email.to_string(), first.to_string(), last.to_string())
    }

    #[test]
    fn full_reference() {
        assert_eq!(
            parts("John 5 <john5@music.com>"),
            owned("john5@music.com", "John", "5")
        );
    }

    #[test]
    fn bare_and_bracketed_email() {
        assert_eq!(parts("john5@music.com"), owned("john5@music.com", "", ""));
        assert_eq!(parts(" <john5@music.com>"), owned("john5@music.com", "", ""));
    }

    #[test]
    fn name_only() {
        assert_eq!(parts("John 5"), owned("", "John", "5"));
        assert_eq!(parts("John"), owned("", "John", ""));
        assert_eq!(
            parts("John William Lowery"),
            owned("", "John", "William Lowery")
        );
        assert_eq!(
            parts("John William Lowery <john5@music.com>"),
            owned("john5@music.com", "John", "William Lowery")
        );
    }

    #[test]
    fn validation_rejects_malformed_email_only() {
        assert!(UserRef::parse_validated("John 5 <john5.>").is_err());
        assert!(UserRef::parse_validated("John 5").is_ok());
        assert!(UserRef::parse_validated("Mike <mike@i.com>").is_ok());
        let err = UserRef::parse_validated("Bob <bob@>").unwrap_err();
        assert!(err.to_string().contains("bob@"));
    }
}
