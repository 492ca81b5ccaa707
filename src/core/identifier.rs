//! Inventory number parsing
//!
//! Catalogue spreadsheets carry the inventory number as free text, e.g.
//! `"1/1997/1063 0"` or `"Inv. 1 / 1997 / 1063 2 (Depot)"`. The number is made
//! of four numeric fields: group, year, sequence and series. Image files are
//! named after the first three (`1-1997-1063-000.jpg`), so the series is
//! captured but never part of the matching key.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Pattern for `<group> / <year> / <sequence> <series>`
pub const DEFAULT_ID_PATTERN: &str = r"(?i)(\d+)\s*/\s*(\d{4})\s*/\s*(\d{3,4})\s+(\d+)";

static DEFAULT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_ID_PATTERN).expect("default identifier pattern is valid"));

/// Structured inventory number extracted from a spreadsheet cell
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedKey {
    pub group: String,
    pub year: String,
    pub sequence: String,
    /// Captured for completeness; not part of the prefix
    pub series: String,
}

impl ParsedKey {
    /// Canonical filename prefix, `"{group}-{year}-{sequence}-"`
    pub fn prefix(&self) -> String {
        format!("{}-{}-{}-", self.group, self.year, self.sequence)
    }

    /// Deduplication key: year plus lowercased prefix
    pub fn lookup_key(&self) -> (String, String) {
        (self.year.clone(), self.prefix().to_lowercase())
    }
}

impl fmt::Display for ParsedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} {}",
            self.group, self.year, self.sequence, self.series
        )
    }
}

/// Compiled identifier pattern
///
/// The first four capture groups are read as group, year, sequence and
/// series, in that order.
#[derive(Debug, Clone)]
pub struct IdentifierPattern {
    regex: Regex,
}

impl IdentifierPattern {
    /// Compile a custom pattern
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(pattern).map_err(|e| PatternError::Invalid {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        // captures_len counts the implicit whole-match group
        let groups = regex.captures_len().saturating_sub(1);
        if groups < 4 {
            return Err(PatternError::TooFewGroups {
                pattern: pattern.to_string(),
                groups,
            });
        }

        Ok(Self { regex })
    }

    /// The pattern source
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Search `raw` for an inventory number
    ///
    /// The match may sit anywhere in the text. Blank input and text without
    /// the pattern both yield `None`.
    pub fn parse(&self, raw: &str) -> Option<ParsedKey> {
        if raw.trim().is_empty() {
            return None;
        }

        let caps = self.regex.captures(raw)?;
        let field = |i: usize| caps.get(i).map(|m| m.as_str().to_string());

        Some(ParsedKey {
            group: field(1)?,
            year: field(2)?,
            sequence: field(3)?,
            series: field(4)?,
        })
    }
}

impl Default for IdentifierPattern {
    fn default() -> Self {
        Self {
            regex: DEFAULT_REGEX.clone(),
        }
    }
}

/// Parse with the default pattern
pub fn parse(raw: &str) -> Option<ParsedKey> {
    IdentifierPattern::default().parse(raw)
}

/// Errors raised when compiling a configured identifier pattern
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("invalid identifier pattern '{pattern}': {message}")]
    Invalid { pattern: String, message: String },

    #[error(
        "identifier pattern '{pattern}' has {groups} capture group(s); \
         group, year, sequence and series are required"
    )]
    TooFewGroups { pattern: String, groups: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compact_identifier() {
        let key = parse("1/1997/1063 0").unwrap();
        assert_eq!(key.group, "1");
        assert_eq!(key.year, "1997");
        assert_eq!(key.sequence, "1063");
        assert_eq!(key.series, "0");
        assert_eq!(key.prefix(), "1-1997-1063-");
    }

    #[test]
    fn test_parse_spaced_identifier() {
        let key = parse("1 / 1997 / 1063 0").unwrap();
        assert_eq!(key.prefix(), "1-1997-1063-");
    }

    #[test]
    fn test_parse_embedded_in_text() {
        let key = parse("Inv.-Nr. 12/2003/077 4 (Depot B)").unwrap();
        assert_eq!(key.prefix(), "12-2003-077-");
        assert_eq!(key.series, "4");
    }

    #[test]
    fn test_parse_series_ignored_in_prefix() {
        let a = parse("1/1997/1063 0").unwrap();
        let b = parse("1/1997/1063 2").unwrap();
        assert_ne!(a, b);
        assert_eq!(a.prefix(), b.prefix());
        assert_eq!(a.lookup_key(), b.lookup_key());
    }

    #[test]
    fn test_parse_no_pattern() {
        assert!(parse("no number here").is_none());
        assert!(parse("1/97/1063 0").is_none());
        assert!(parse("1/1997/10 0").is_none());
        // series separated by mandatory whitespace
        assert!(parse("1/1997/1063").is_none());
    }

    #[test]
    fn test_parse_blank() {
        assert!(parse("").is_none());
        assert!(parse("   ").is_none());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = "3/2001/050 0";
        assert_eq!(parse(raw), parse(raw));
    }

    #[test]
    fn test_custom_pattern() {
        let pattern = IdentifierPattern::new(r"(\d+)-(\d{4})-(\d{3,4})\.(\d+)").unwrap();
        let key = pattern.parse("ID 7-1988-0042.1").unwrap();
        assert_eq!(key.prefix(), "7-1988-0042-");
        assert!(pattern.parse("1/1997/1063 0").is_none());
    }

    #[test]
    fn test_custom_pattern_too_few_groups() {
        let err = IdentifierPattern::new(r"(\d+)/(\d{4})").unwrap_err();
        assert!(matches!(err, PatternError::TooFewGroups { groups: 2, .. }));
    }

    #[test]
    fn test_custom_pattern_invalid() {
        let err = IdentifierPattern::new(r"(\d+").unwrap_err();
        assert!(matches!(err, PatternError::Invalid { .. }));
    }

    #[test]
    fn test_display() {
        let key = parse("1 / 1997 / 1063 0").unwrap();
        assert_eq!(key.to_string(), "1/1997/1063 0");
    }
}
