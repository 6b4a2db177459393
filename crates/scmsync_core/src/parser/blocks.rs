//! Block parser for `KEY: VALUE` records.
//!
//! # Invariants
//! - A block opens on every line whose key equals the starter key.
//! - Any other key before the first starter line is a syntax error.
//! - Repeated keys accumulate values in source order.

use super::fields::FieldMapping;
use log::{error, info};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Syntax error in block text. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Non-blank line without a `:` separator.
    MissingColon { line: usize, text: String },
    /// Key seen before any starter line opened a block.
    UnexpectedKey {
        line: usize,
        key: String,
        starter: String,
    },
    /// Package list line that is not `<package> <gitpath>`.
    MalformedPackageLine { line: usize, text: String },
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingColon { line, text } => {
                write!(f, "can't find colon(:) at line {line}: {text}")
            }
            Self::UnexpectedKey { line, key, starter } => write!(
                f,
                "unexpected key `{key}` outside starter `{starter}` at line {line}"
            ),
            Self::MalformedPackageLine { line, text } => {
                write!(f, "expected `<package> <gitpath>` at line {line}: {text}")
            }
        }
    }
}

impl Error for ParseError {}

/// One record of the block grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    /// Mapped name of the starter key that opened this block.
    pub kind: String,
    /// 1-based line of the starter key.
    pub line: usize,
    fields: Vec<(String, Vec<String>)>,
}

impl Block {
    fn open(kind: &str, line: usize) -> Self {
        Self {
            kind: kind.to_string(),
            line,
            fields: Vec::new(),
        }
    }

    fn push(&mut self, field: &str, value: &str) {
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, values)) => values.push(value.to_string()),
            None => self
                .fields
                .push((field.to_string(), vec![value.to_string()])),
        }
    }

    /// All values of `field`, in source order.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, values)| values.as_slice())
    }

    /// First value of `field`.
    pub fn first(&self, field: &str) -> Option<&str> {
        self.get(field)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Fields in first-appearance order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

/// Parses `content` into blocks opened by `starter`.
///
/// Blank lines are skipped. Keys and values are trimmed and only the first `:`
/// separates them, so values may contain colons (`dapt/alsa:sde`).
///
/// # Errors
/// - `MissingColon` for a non-blank line without `:`.
/// - `UnexpectedKey` for a non-starter key before the first starter line.
pub fn parse_blocks(
    content: &str,
    starter: &str,
    mapping: &FieldMapping,
) -> Result<Vec<Block>, ParseError> {
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;

    for (index, raw) in content.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            let err = ParseError::MissingColon {
                line,
                text: trimmed.to_string(),
            };
            error!("event=scm_parse module=parser status=error starter={starter} error={err}");
            return Err(err);
        };
        let key = key.trim();
        let value = value.trim();
        let field = mapping.field_name(key);

        if key == starter {
            if let Some(block) = current.take() {
                blocks.push(block);
            }
            let mut block = Block::open(field, line);
            block.push(field, value);
            current = Some(block);
            continue;
        }

        match current.as_mut() {
            Some(block) => block.push(field, value),
            None => {
                let err = ParseError::UnexpectedKey {
                    line,
                    key: key.to_string(),
                    starter: starter.to_string(),
                };
                error!("event=scm_parse module=parser status=error starter={starter} error={err}");
                return Err(err);
            }
        }
    }

    if let Some(block) = current {
        blocks.push(block);
    }

    info!(
        "event=scm_parse module=parser status=ok starter={starter} blocks={}",
        blocks.len()
    );
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fields::{FieldMapping, DOMAIN, MAINTAINER, PARENT};

    #[test]
    fn empty_text_yields_no_blocks() {
        let blocks = parse_blocks("", "D", &FieldMapping::scm()).unwrap();
        assert!(blocks.is_empty());
        let blocks = parse_blocks("\n   \n", "D", &FieldMapping::scm()).unwrap();
        assert!(blocks.is_empty());
    }

    #[test]
    fn starter_line_opens_new_block_without_blank_separator() {
        let text = "D: System\nD: System / Alarm\nN: System\n";
        let blocks = parse_blocks(text, "D", &FieldMapping::scm()).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].first(DOMAIN), Some("System"));
        assert!(!blocks[0].contains(PARENT));
        assert_eq!(blocks[1].first(DOMAIN), Some("System / Alarm"));
        assert_eq!(blocks[1].first(PARENT), Some("System"));
        assert_eq!(blocks[1].line, 2);
    }

    #[test]
    fn repeated_keys_accumulate_in_order() {
        let text = "
            D: System
            M: Markus
            M: Mickey
        ";
        let blocks = parse_blocks(text, "D", &FieldMapping::scm()).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].get(MAINTAINER).unwrap(),
            &["Markus".to_string(), "Mickey".to_string()]
        );
        let names: Vec<&str> = blocks[0].fields().map(|(name, _)| name).collect();
        assert_eq!(names, vec![DOMAIN, MAINTAINER]);
    }

    #[test]
    fn block_kind_is_mapped_starter_name() {
        let blocks = parse_blocks("T: a/b\nD: Base", "T", &FieldMapping::scm()).unwrap();
        assert_eq!(blocks[0].kind, "TREE");
        let blocks = parse_blocks("T: a/b", "T", &FieldMapping::identity()).unwrap();
        assert_eq!(blocks[0].kind, "T");
    }

    #[test]
    fn value_keeps_text_after_first_colon() {
        let blocks = parse_blocks("T: dapt/alsa:sde", "T", &FieldMapping::scm()).unwrap();
        assert_eq!(blocks[0].first("TREE"), Some("dapt/alsa:sde"));
    }

    #[test]
    fn unicode_values_survive() {
        let blocks = parse_blocks("D: 安全", "D", &FieldMapping::scm()).unwrap();
        assert_eq!(blocks[0].first(DOMAIN), Some("安全"));
    }

    #[test]
    fn key_before_starter_is_rejected() {
        let err = parse_blocks("M: Mike\nD: System", "D", &FieldMapping::scm()).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnexpectedKey {
                line: 1,
                key: "M".to_string(),
                starter: "D".to_string(),
            }
        );
    }

    #[test]
    fn line_without_colon_is_rejected() {
        let err = parse_blocks("T: a/b\nadaptation/face-engine", "T", &FieldMapping::scm())
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingColon { line: 2, .. }));
        assert!(err.to_string().contains("colon"));
    }
}
