//! Catalogue spreadsheet loading
//!
//! The catalogue workbooks are consumed as CSV exports. Each configured
//! source names a file, a data-row range and the column holding the
//! inventory number. Missing files and columns are reported and skipped so
//! one bad export does not stop a run.

use csv::{ByteRecord, ReaderBuilder, StringRecord};
use log::warn;
use regex::Regex;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::core::config::SourceSpec;
use crate::core::links::SourceRow;

/// Number of metadata columns (`t1`..`t14`)
pub const METADATA_COLUMNS: usize = 14;

/// Column carrying the inventory number
pub const ID_COLUMN: &str = "t1";

static PARENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\([^)]*\)").expect("parenthesis pattern is valid"));

/// Remove parenthesised segments and surrounding whitespace
///
/// `"Holz (Eiche)"` becomes `"Holz"`.
pub fn strip_parens(value: &str) -> String {
    PARENS.replace_all(value.trim(), "").trim().to_string()
}

/// Lowercased metadata column names in display order
pub fn metadata_columns() -> impl Iterator<Item = String> {
    (1..=METADATA_COLUMNS).map(|i| format!("t{}", i))
}

/// Build a map from lowercased header name to column index
pub fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase(), i))
        .collect()
}

/// Locate the export for a source, falling back to a `.csv` sibling
///
/// Returns `None` (after logging what the directory does contain) when
/// neither exists.
pub fn locate_source(sheet_dir: &Path, spec: &SourceSpec) -> Option<PathBuf> {
    let path = if spec.file.is_absolute() {
        spec.file.clone()
    } else {
        sheet_dir.join(&spec.file)
    };

    if path.is_file() {
        return Some(path);
    }

    let is_csv = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if !is_csv {
        let alt = path.with_extension("csv");
        if alt.is_file() {
            return Some(alt);
        }
    }

    warn!("spreadsheet missing: {}", path.display());
    let available = list_spreadsheets(sheet_dir);
    if !available.is_empty() {
        warn!("found in {}: {}", sheet_dir.display(), available.join(", "));
    }
    None
}

fn list_spreadsheets(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| {
            let lower = name.to_lowercase();
            lower.ends_with(".csv") || lower.ends_with(".xls") || lower.ends_with(".xlsx")
        })
        .collect();
    names.sort();
    names.truncate(10);
    names
}

/// Open a CSV export and visit the records inside the source's row range
///
/// The visitor receives the header map and each untrimmed record. Fields
/// that are not valid UTF-8 are decoded lossily; unreadable records are
/// logged and skipped. A file lacking the `required` column is skipped
/// entirely.
fn visit_rows<F>(path: &Path, spec: &SourceSpec, required: Option<&str>, mut visit: F)
where
    F: FnMut(&HashMap<String, usize>, &StringRecord),
{
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!("{} not readable ({})", path.display(), e);
            return;
        }
    };

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(BufReader::new(file));

    let headers = match rdr.byte_headers() {
        Ok(h) => decode_lossy(h),
        Err(e) => {
            warn!("{} has no readable header ({})", path.display(), e);
            return;
        }
    };
    let header_map = build_header_map(&headers);

    if let Some(column) = required {
        if !header_map.contains_key(column) {
            warn!("{} has no column '{}'; skipped", file_label(path), column);
            return;
        }
    }

    let stop = spec.stop.unwrap_or(usize::MAX);
    for (idx, result) in rdr.byte_records().enumerate() {
        if idx >= stop {
            break;
        }
        if idx < spec.start {
            continue;
        }
        match result {
            Ok(record) => visit(&header_map, &decode_lossy(&record)),
            // +2 for the header and 1-based numbering
            Err(e) => warn!("{} row {}: {}", path.display(), idx + 2, e),
        }
    }
}

/// Decode a record, replacing invalid UTF-8 (e.g. Windows-1252 umlauts)
fn decode_lossy(record: &ByteRecord) -> StringRecord {
    record
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Load the identifier cell of every row in range across all sources
pub fn load_rows(sheet_dir: &Path, specs: &[SourceSpec]) -> Vec<SourceRow> {
    let mut rows = Vec::new();

    for spec in specs {
        let Some(path) = locate_source(sheet_dir, spec) else {
            continue;
        };
        let source_file = file_label(&path);
        let id_column = spec.id_column.trim().to_lowercase();

        visit_rows(&path, spec, Some(&id_column), |headers, record| {
            let raw = headers
                .get(&id_column)
                .and_then(|&idx| record.get(idx))
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            rows.push(SourceRow {
                raw,
                source_file: source_file.clone(),
            });
        });
    }

    rows
}

/// Cleaned `t1`..`t14` values of one spreadsheet row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    values: HashMap<String, String>,
}

impl MetadataRecord {
    /// A record carrying only the inventory number
    pub fn from_id(id: &str) -> Self {
        let mut values = HashMap::new();
        values.insert(ID_COLUMN.to_string(), id.to_string());
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Metadata rows of all sources, in load order
#[derive(Debug, Default)]
pub struct MetadataTable {
    records: Vec<MetadataRecord>,
}

impl MetadataTable {
    /// Load the `t` columns of every row in range across all sources
    ///
    /// Headers are matched case-insensitively; values have parenthesised
    /// segments removed.
    pub fn load(sheet_dir: &Path, specs: &[SourceSpec]) -> Self {
        let wanted: Vec<String> = metadata_columns().collect();
        let mut records = Vec::new();

        for spec in specs {
            let Some(path) = locate_source(sheet_dir, spec) else {
                continue;
            };

            visit_rows(&path, spec, None, |headers, record| {
                let mut meta = MetadataRecord::default();
                for column in &wanted {
                    if let Some(value) = headers.get(column).and_then(|&i| record.get(i)) {
                        meta.insert(column.clone(), strip_parens(value));
                    }
                }
                if !meta.is_empty() {
                    records.push(meta);
                }
            });
        }

        Self { records }
    }

    pub fn from_records(records: Vec<MetadataRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Metadata for an inventory number
    ///
    /// Compares against the trimmed `t1` value; without a hit the record
    /// holds only the id itself.
    pub fn lookup(&self, obj_id: &str) -> MetadataRecord {
        let wanted = strip_parens(obj_id);
        self.records
            .iter()
            .find(|r| r.get(ID_COLUMN).is_some_and(|v| v.trim() == wanted))
            .cloned()
            .unwrap_or_else(|| MetadataRecord::from_id(obj_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn spec(file: &str) -> SourceSpec {
        SourceSpec {
            file: PathBuf::from(file),
            start: 0,
            stop: None,
            id_column: ID_COLUMN.to_string(),
        }
    }

    #[test]
    fn test_strip_parens() {
        assert_eq!(strip_parens("Holz (Eiche)"), "Holz");
        assert_eq!(strip_parens(" a (b) c (d) "), "a c");
        assert_eq!(strip_parens("(only)"), "");
        assert_eq!(strip_parens("plain"), "plain");
    }

    #[test]
    fn test_load_rows_case_insensitive_header() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("Liste_AK.csv"),
            "T1,T2\n1/1997/1063 0,AEG\n,Siemens\n3/2001/050 0,Bosch\n",
        )
        .unwrap();

        let rows = load_rows(dir.path(), &[spec("Liste_AK.csv")]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].raw.as_deref(), Some("1/1997/1063 0"));
        assert_eq!(rows[0].source_file, "Liste_AK.csv");
        assert_eq!(rows[1].raw, None);
        assert_eq!(rows[2].raw.as_deref(), Some("3/2001/050 0"));
    }

    #[test]
    fn test_load_rows_keeps_blank_identifier_cells() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("list.csv"), "t1,t2
   ,AEG
,Bosch
").unwrap();

        let rows = load_rows(dir.path(), &[spec("list.csv")]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].raw.as_deref(), Some("   "));
        assert_eq!(rows[1].raw, None);
    }

    #[test]
    fn test_load_rows_survives_non_utf8_cells() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("export.csv"),
            b"t1,t3\n1/1997/1063 0,Geh\xE4use\n3/2001/050 0,Holz\n",
        )
        .unwrap();

        let rows = load_rows(dir.path(), &[spec("export.csv")]);
        let raws: Vec<_> = rows.iter().filter_map(|r| r.raw.as_deref()).collect();
        assert_eq!(raws, vec!["1/1997/1063 0", "3/2001/050 0"]);

        let table = MetadataTable::load(dir.path(), &[spec("export.csv")]);
        assert_eq!(table.lookup("1/1997/1063 0").get("t3"), Some("Geh\u{FFFD}use"));
    }

    #[test]
    fn test_load_rows_honours_range() {
        let dir = tempdir().unwrap();
        let mut content = String::from("t1\n");
        for i in 0..10 {
            content.push_str(&format!("1/1997/{:04} 0\n", i));
        }
        fs::write(dir.path().join("list.csv"), content).unwrap();

        let mut ranged = spec("list.csv");
        ranged.start = 3;
        ranged.stop = Some(6);

        let rows = load_rows(dir.path(), &[ranged]);
        let raws: Vec<_> = rows.iter().filter_map(|r| r.raw.as_deref()).collect();
        assert_eq!(raws, vec!["1/1997/0003 0", "1/1997/0004 0", "1/1997/0005 0"]);
    }

    #[test]
    fn test_load_rows_falls_back_to_csv_export() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Liste_AEG.csv"), "t1\n1/1997/1063 0\n").unwrap();

        let rows = load_rows(dir.path(), &[spec("Liste_AEG.xls")]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_file, "Liste_AEG.csv");
    }

    #[test]
    fn test_load_rows_skips_missing_file_and_column() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("other.csv"), "name\nfoo\n").unwrap();

        let rows = load_rows(dir.path(), &[spec("missing.csv"), spec("other.csv")]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_metadata_table_lookup() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("list.csv"),
            "t1,T3,t5,name\n1/1997/1063 0,Holz (Eiche),12 x 4 cm,ignored\n",
        )
        .unwrap();

        let table = MetadataTable::load(dir.path(), &[spec("list.csv")]);
        assert_eq!(table.len(), 1);

        let meta = table.lookup(" 1/1997/1063 0");
        assert_eq!(meta.get("t3"), Some("Holz"));
        assert_eq!(meta.get("t5"), Some("12 x 4 cm"));
        assert_eq!(meta.get("name"), None);
    }

    #[test]
    fn test_metadata_table_lookup_miss() {
        let table = MetadataTable::default();
        let meta = table.lookup("9/1990/999 0");
        assert_eq!(meta.get("t1"), Some("9/1990/999 0"));
        assert_eq!(meta.get("t2"), None);
    }
}
