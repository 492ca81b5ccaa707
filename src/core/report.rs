//! CSV reports: linked groups, misses and generated descriptions

use chrono::Local;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::links::{LinkedGroup, Miss};

/// Errors raised while reading or writing report files
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("cannot read {path:?}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("CSV error in {path:?}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}

/// One row of `linked.csv`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedRow {
    pub obj_id_raw: String,
    pub year: String,
    pub base_prefix: String,
    /// JSON array of basenames
    pub images: String,
    pub image_count: usize,
    #[serde(rename = "_source_files")]
    pub source_files: String,
}

impl LinkedRow {
    /// Image basenames listed in the row
    pub fn image_names(&self) -> Vec<String> {
        parse_images_field(&self.images)
    }
}

impl From<&LinkedGroup> for LinkedRow {
    fn from(group: &LinkedGroup) -> Self {
        Self {
            obj_id_raw: group.representative_id.clone(),
            year: group.year.clone(),
            base_prefix: group.prefix.clone(),
            images: serde_json::to_string(&group.matched_files).unwrap_or_default(),
            image_count: group.image_count(),
            source_files: group
                .source_rows
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// One row of the miss side report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissRow {
    pub obj_id_raw: String,
    pub year: Option<String>,
    pub base_prefix: Option<String>,
    pub reason: String,
}

impl From<&Miss> for MissRow {
    fn from(miss: &Miss) -> Self {
        Self {
            obj_id_raw: miss.raw_id.clone(),
            year: miss.year.clone(),
            base_prefix: miss.prefix.clone(),
            reason: miss.reason(),
        }
    }
}

/// One generated description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionRow {
    pub objekt_id: String,
    pub description: String,
}

/// Split an `images` cell into basenames
///
/// Accepts a JSON array or a comma-separated list; quotes and brackets
/// around items are dropped.
pub fn parse_images_field(field: &str) -> Vec<String> {
    let s = field.trim();
    if s.is_empty() {
        return Vec::new();
    }

    if s.starts_with('[') && s.ends_with(']') {
        if let Ok(names) = serde_json::from_str::<Vec<String>>(s) {
            return names
                .into_iter()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect();
        }
    }

    s.split(',')
        .map(|part| {
            part.trim()
                .trim_matches(|c| matches!(c, '\'' | '"' | '[' | ']'))
                .trim()
                .to_string()
        })
        .filter(|p| !p.is_empty())
        .collect()
}

fn write_rows<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let file = File::create(path).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let csv_err = |source| ReportError::Csv {
        path: path.to_path_buf(),
        source,
    };

    // Headers are written by hand so an empty table still gets them
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
    wtr.write_record(headers).map_err(csv_err)?;
    for row in rows {
        wtr.serialize(row).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>, ReportError> {
    let file = File::open(path).map_err(|source| ReportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    rdr.deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(|source| ReportError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

const LINKED_HEADERS: &[&str] = &[
    "obj_id_raw",
    "year",
    "base_prefix",
    "images",
    "image_count",
    "_source_files",
];
const MISS_HEADERS: &[&str] = &["obj_id_raw", "year", "base_prefix", "reason"];
const DESCRIPTION_HEADERS: &[&str] = &["objekt_id", "description"];

/// Write linked groups to `linked.csv`
pub fn write_linked(path: &Path, groups: &[LinkedGroup]) -> Result<(), ReportError> {
    let rows: Vec<LinkedRow> = groups.iter().map(LinkedRow::from).collect();
    write_rows(path, LINKED_HEADERS, &rows)
}

/// Read `linked.csv` back
pub fn read_linked(path: &Path) -> Result<Vec<LinkedRow>, ReportError> {
    read_rows(path)
}

/// Write the miss side report
pub fn write_misses(path: &Path, misses: &[Miss]) -> Result<(), ReportError> {
    let rows: Vec<MissRow> = misses.iter().map(MissRow::from).collect();
    write_rows(path, MISS_HEADERS, &rows)
}

/// Write description results
///
/// When the target is locked (permission denied), a timestamped sibling is
/// written instead. Returns the path actually written.
pub fn write_descriptions(path: &Path, rows: &[DescriptionRow]) -> Result<PathBuf, ReportError> {
    match write_rows(path, DESCRIPTION_HEADERS, rows) {
        Ok(()) => Ok(path.to_path_buf()),
        Err(ReportError::Write { source, .. })
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            let alt = timestamped_sibling(path, &Local::now().format("%Y%m%d_%H%M%S").to_string());
            log::warn!(
                "{} is locked; writing {} instead",
                path.display(),
                alt.display()
            );
            write_rows(&alt, DESCRIPTION_HEADERS, rows)?;
            Ok(alt)
        }
        Err(e) => Err(e),
    }
}

fn timestamped_sibling(path: &Path, stamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, stamp),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::links::MissReason;
    use std::collections::BTreeSet;
    use tempfile::tempdir;

    fn group() -> LinkedGroup {
        LinkedGroup {
            representative_id: "1 / 1997 / 1063 0".to_string(),
            year: "1997".to_string(),
            prefix: "1-1997-1063-".to_string(),
            matched_files: vec![
                "1-1997-1063-000.jpg".to_string(),
                "1-1997-1063-001.jpg".to_string(),
            ],
            source_rows: BTreeSet::from(["b.csv".to_string(), "a.csv".to_string()]),
        }
    }

    #[test]
    fn test_linked_row_fields() {
        let row = LinkedRow::from(&group());
        assert_eq!(row.images, r#"["1-1997-1063-000.jpg","1-1997-1063-001.jpg"]"#);
        assert_eq!(row.image_count, 2);
        assert_eq!(row.source_files, "a.csv, b.csv");
    }

    #[test]
    fn test_write_and_read_linked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linked.csv");
        write_linked(&path, &[group()]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(
            content.starts_with("obj_id_raw,year,base_prefix,images,image_count,_source_files")
        );

        let rows = read_linked(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].obj_id_raw, "1 / 1997 / 1063 0");
        assert_eq!(
            rows[0].image_names(),
            vec!["1-1997-1063-000.jpg", "1-1997-1063-001.jpg"]
        );
    }

    #[test]
    fn test_write_linked_empty_keeps_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("linked.csv");
        write_linked(&path, &[]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), LINKED_HEADERS.join(","));
        assert!(read_linked(&path).unwrap().is_empty());
    }

    #[test]
    fn test_write_misses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("linked_misses.csv");
        let misses = vec![
            Miss {
                raw_id: "no number here".to_string(),
                year: None,
                prefix: None,
                kind: MissReason::PatternNotFound,
            },
            Miss {
                raw_id: "3/2001/050 0".to_string(),
                year: Some("2001".to_string()),
                prefix: Some("3-2001-050-".to_string()),
                kind: MissReason::NoFiles,
            },
        ];
        write_misses(&path, &misses).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "obj_id_raw,year,base_prefix,reason");
        assert!(lines[1].starts_with("no number here,,,"));
        assert_eq!(
            lines[2],
            "3/2001/050 0,2001,3-2001-050-,no files in 2001/ with prefix '3-2001-050-'"
        );
    }

    #[test]
    fn test_parse_images_field() {
        assert_eq!(parse_images_field(r#"["a.jpg", "b.jpg"]"#), vec!["a.jpg", "b.jpg"]);
        assert_eq!(parse_images_field("['a.jpg', 'b.jpg']"), vec!["a.jpg", "b.jpg"]);
        assert_eq!(parse_images_field("a.jpg, b.jpg"), vec!["a.jpg", "b.jpg"]);
        assert!(parse_images_field("").is_empty());
        assert!(parse_images_field("[]").is_empty());
    }

    #[test]
    fn test_write_descriptions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("catalog_results.csv");
        let rows = vec![DescriptionRow {
            objekt_id: "1/1997/1063 0".to_string(),
            description: "Telefonapparat, Bakelit, \"W48\"".to_string(),
        }];

        let written = write_descriptions(&path, &rows).unwrap();
        assert_eq!(written, path);

        let mut rdr = csv::Reader::from_path(&path).unwrap();
        let back: Vec<DescriptionRow> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_timestamped_sibling() {
        let alt = timestamped_sibling(Path::new("out/catalog_results.csv"), "20240101_120000");
        assert_eq!(alt, PathBuf::from("out/catalog_results_20240101_120000.csv"));
    }
}
