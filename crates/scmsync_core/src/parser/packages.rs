//! Package-to-tree link lists produced by build tooling.

use super::blocks::ParseError;
use serde::{Deserialize, Serialize};

/// One package built from one git tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageLink {
    pub package: String,
    pub gitpath: String,
}

impl PackageLink {
    pub fn new(package: impl Into<String>, gitpath: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            gitpath: gitpath.into(),
        }
    }
}

/// Parses whitespace-separated `<package> <gitpath>` lines.
///
/// Blank lines and `#` comments are skipped.
pub fn parse_package_links(content: &str) -> Result<Vec<PackageLink>, ParseError> {
    let mut links = Vec::new();
    for (index, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(package), Some(gitpath), None) => links.push(PackageLink::new(package, gitpath)),
            _ => {
                return Err(ParseError::MalformedPackageLine {
                    line: index + 1,
                    text: trimmed.to_string(),
                })
            }
        }
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_skips_comments() {
        let links = parse_package_links("# build 42\n\nbash  core/bash\nvim\tapps/vim\n").unwrap();
        assert_eq!(
            links,
            vec![
                PackageLink::new("bash", "core/bash"),
                PackageLink::new("vim", "apps/vim")
            ]
        );
    }

    #[test]
    fn rejects_lines_without_exactly_two_fields() {
        let err = parse_package_links("bash core/bash\nlonely\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::MalformedPackageLine {
                line: 2,
                text: "lonely".to_string()
            }
        );
        assert!(parse_package_links("a b c").is_err());
    }
}
