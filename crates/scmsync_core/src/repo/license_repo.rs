//! License reference data repository.
//!
//! # Responsibility
//! - Register license short names that tree imports link against.
//! - List registered licenses.
//!
//! # Invariants
//! - Short names are trimmed, non-empty, and contain no whitespace.
//! - Imports never create licenses; only this repository does.

use crate::db::DbError;
use log::info;
use rusqlite::{params, Connection};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type LicenseRepoResult<T> = Result<T, LicenseRepoError>;

#[derive(Debug)]
pub enum LicenseRepoError {
    Db(DbError),
    /// Short name is empty or contains whitespace.
    InvalidShortname(String),
}

impl Display for LicenseRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidShortname(value) => write!(f, "invalid license short name: `{value}`"),
        }
    }
}

impl Error for LicenseRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidShortname(_) => None,
        }
    }
}

impl From<DbError> for LicenseRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for LicenseRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for license reference data.
pub trait LicenseRepository {
    /// Registers one license; returns `false` when it already existed.
    fn register_license(&self, shortname: &str) -> LicenseRepoResult<bool>;
    /// Lists short names in ascending order.
    fn list_licenses(&self) -> LicenseRepoResult<Vec<String>>;
}

/// SQLite-backed license repository.
pub struct SqliteLicenseRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLicenseRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl LicenseRepository for SqliteLicenseRepository<'_> {
    fn register_license(&self, shortname: &str) -> LicenseRepoResult<bool> {
        let shortname = normalize_shortname(shortname)?;
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO licenses (shortname) VALUES (?1);",
            params![shortname],
        )?;
        info!(
            "event=license_register module=repo status=ok shortname={shortname} created={}",
            inserted > 0
        );
        Ok(inserted > 0)
    }

    fn list_licenses(&self) -> LicenseRepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT shortname FROM licenses ORDER BY shortname ASC;")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut licenses = Vec::new();
        for shortname in rows {
            licenses.push(shortname?);
        }
        Ok(licenses)
    }
}

fn normalize_shortname(shortname: &str) -> LicenseRepoResult<&str> {
    let trimmed = shortname.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_whitespace) {
        return Err(LicenseRepoError::InvalidShortname(shortname.to_string()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_db_in_memory;

    #[test]
    fn register_is_idempotent_and_listing_is_sorted() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteLicenseRepository::new(&conn);
        assert!(repo.register_license("MIT").unwrap());
        assert!(repo.register_license(" Apache-2.0 ").unwrap());
        assert!(!repo.register_license("MIT").unwrap());
        assert_eq!(repo.list_licenses().unwrap(), vec!["Apache-2.0", "MIT"]);
    }

    #[test]
    fn rejects_blank_and_spaced_names() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteLicenseRepository::new(&conn);
        assert!(matches!(
            repo.register_license("  "),
            Err(LicenseRepoError::InvalidShortname(_))
        ));
        assert!(matches!(
            repo.register_license("GPL 2"),
            Err(LicenseRepoError::InvalidShortname(_))
        ));
    }
}
