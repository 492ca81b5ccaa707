//! Linking catalogue rows to image groups
//!
//! Every distinct inventory number found in the spreadsheets becomes either a
//! [`LinkedGroup`] (one or more image files share its prefix) or a [`Miss`].
//! Series variants of the same object collapse into one group, and the first
//! identifier seen for a group is kept as its representative.

use log::debug;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use crate::core::identifier::IdentifierPattern;
use crate::core::resolver::DirectoryResolver;

/// One identifier cell from a catalogue spreadsheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// Cell content; `None` for empty cells. Whitespace-only cells are
    /// present and end up as a pattern miss.
    pub raw: Option<String>,
    /// Basename of the spreadsheet the row came from
    pub source_file: String,
}

impl SourceRow {
    pub fn new(raw: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            raw: Some(raw.into()),
            source_file: source_file.into(),
        }
    }

    fn trimmed(&self) -> Option<&str> {
        self.raw.as_deref().map(str::trim)
    }
}

/// An inventory number resolved to at least one image file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedGroup {
    /// First identifier (in input order) that produced this prefix
    pub representative_id: String,
    pub year: String,
    pub prefix: String,
    /// Basenames, sorted
    pub matched_files: Vec<String>,
    /// Spreadsheets containing any identifier with this prefix
    pub source_rows: BTreeSet<String>,
}

impl LinkedGroup {
    pub fn image_count(&self) -> usize {
        self.matched_files.len()
    }
}

/// Why an identifier could not be linked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    PatternNotFound,
    NoFiles,
}

/// An identifier that did not parse or matched no files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Miss {
    pub raw_id: String,
    pub year: Option<String>,
    pub prefix: Option<String>,
    pub kind: MissReason,
}

impl Miss {
    fn pattern_not_found(raw_id: &str) -> Self {
        Self {
            raw_id: raw_id.to_string(),
            year: None,
            prefix: None,
            kind: MissReason::PatternNotFound,
        }
    }

    fn no_files(raw_id: &str, year: &str, prefix: &str) -> Self {
        Self {
            raw_id: raw_id.to_string(),
            year: Some(year.to_string()),
            prefix: Some(prefix.to_string()),
            kind: MissReason::NoFiles,
        }
    }

    /// Human-readable reason for the miss report
    pub fn reason(&self) -> String {
        match self.kind {
            MissReason::PatternNotFound => {
                "pattern not found: no identifier in the form 'g/yyyy/sss s'".to_string()
            }
            MissReason::NoFiles => format!(
                "no files in {}/ with prefix '{}'",
                self.year.as_deref().unwrap_or_default(),
                self.prefix.as_deref().unwrap_or_default()
            ),
        }
    }
}

impl fmt::Display for Miss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.raw_id, self.reason())
    }
}

/// Outcome of one linking run
#[derive(Debug, Default)]
pub struct LinkReport {
    pub linked: Vec<LinkedGroup>,
    pub misses: Vec<Miss>,
    /// Input rows, including blank cells
    pub rows: usize,
    /// Distinct trimmed identifiers
    pub distinct_ids: usize,
}

impl LinkReport {
    pub fn image_count(&self) -> usize {
        self.linked.iter().map(LinkedGroup::image_count).sum()
    }
}

/// Link spreadsheet rows to image groups
///
/// Identifiers are trimmed and deduplicated in first-seen order; absent
/// cells are skipped and blank ones become pattern misses. Each
/// distinct `(year, prefix)` is resolved once; later identifiers with the
/// same prefix only contribute provenance. Output follows first-encounter
/// order.
pub fn aggregate(
    rows: &[SourceRow],
    pattern: &IdentifierPattern,
    resolver: &mut DirectoryResolver,
) -> LinkReport {
    let mut report = LinkReport {
        rows: rows.len(),
        ..Default::default()
    };

    // Provenance pre-pass over every row, duplicates included
    let mut sources: HashMap<(String, String), BTreeSet<String>> = HashMap::new();
    for row in rows {
        if let Some(key) = row.trimmed().and_then(|raw| pattern.parse(raw)) {
            sources
                .entry(key.lookup_key())
                .or_default()
                .insert(row.source_file.clone());
        }
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    let mut seen_keys: HashSet<(String, String)> = HashSet::new();

    for raw in rows.iter().filter_map(SourceRow::trimmed) {
        if !seen_ids.insert(raw) {
            continue;
        }
        report.distinct_ids += 1;

        let Some(key) = pattern.parse(raw) else {
            debug!("no identifier pattern in '{}'", raw);
            report.misses.push(Miss::pattern_not_found(raw));
            continue;
        };

        let lookup = key.lookup_key();
        if !seen_keys.insert(lookup.clone()) {
            debug!("'{}' shares prefix {} with an earlier identifier", raw, key.prefix());
            continue;
        }

        let prefix = key.prefix();
        let matches = resolver.resolve(&key.year, &prefix);
        if matches.is_empty() {
            report.misses.push(Miss::no_files(raw, &key.year, &prefix));
            continue;
        }

        let matched_files = matches
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();

        report.linked.push(LinkedGroup {
            representative_id: raw.to_string(),
            year: key.year.clone(),
            prefix,
            matched_files,
            source_rows: sources.remove(&lookup).unwrap_or_default(),
        });
    }

    report
}
