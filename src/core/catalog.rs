//! Description runs over `linked.csv`

use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::LazyLock;
use std::time::Duration;

use crate::core::describe::{build_prompt, Describer};
use crate::core::report::{DescriptionRow, LinkedRow};
use crate::core::sheets::MetadataTable;

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("year pattern is valid"));

/// First standalone four-digit number in `value`, or `""`
pub fn normalize_year(value: &str) -> String {
    YEAR.captures(value)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

/// Locate an image listed in `linked.csv`
///
/// Tries, in order: the name as a path, `<root>/<year>/<name>`,
/// `<root>/<name>`, and finally any file of that name below `root`.
pub fn find_image(root: &Path, year: &str, name: &str) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.is_absolute() || name.contains(MAIN_SEPARATOR) || name.contains('/') {
        if as_path.is_file() {
            return Some(as_path.to_path_buf());
        }
    }

    let year = normalize_year(year);
    if !year.is_empty() {
        let candidate = root.join(&year).join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    let candidate = root.join(name);
    if candidate.is_file() {
        return Some(candidate);
    }

    let file_name = as_path.file_name()?;
    walkdir::WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .find(|e| e.file_name() == file_name)
        .map(|e| e.into_path())
}

/// Everything needed to describe one object
#[derive(Debug, Clone)]
pub struct PreparedObject {
    pub obj_id: String,
    pub images: Vec<PathBuf>,
    pub prompt: String,
}

/// Generates descriptions for linked objects
pub struct CatalogGenerator<'a, D> {
    image_root: PathBuf,
    metadata: &'a MetadataTable,
    labels: &'a BTreeMap<String, String>,
    describer: D,
}

impl<'a, D: Describer> CatalogGenerator<'a, D> {
    pub fn new(
        image_root: impl Into<PathBuf>,
        metadata: &'a MetadataTable,
        labels: &'a BTreeMap<String, String>,
        describer: D,
    ) -> Self {
        Self {
            image_root: image_root.into(),
            metadata,
            labels,
            describer,
        }
    }

    /// Resolve images and build the prompt for one linked row
    pub fn prepare(&self, row: &LinkedRow) -> PreparedObject {
        let images = row
            .image_names()
            .iter()
            .filter_map(|name| {
                let found = find_image(&self.image_root, &row.year, name);
                if found.is_none() {
                    log::warn!("{}: image {} not found", row.obj_id_raw, name);
                }
                found
            })
            .collect();

        let meta = self.metadata.lookup(&row.obj_id_raw);
        PreparedObject {
            obj_id: row.obj_id_raw.clone(),
            images,
            prompt: build_prompt(&meta, self.labels),
        }
    }

    /// Describe one prepared object; failures become `ERROR: ...` text
    pub fn describe(&self, object: &PreparedObject) -> DescriptionRow {
        let description = match self.describer.describe(&object.prompt, &object.images) {
            Ok(text) => text,
            Err(e) => format!("ERROR: {}", e),
        };
        DescriptionRow {
            objekt_id: object.obj_id.clone(),
            description,
        }
    }

    /// Describe the first `limit` rows, pausing between objects
    ///
    /// `on_object` is called before each request and `on_done` after it.
    pub fn run<B, F>(
        &self,
        rows: &[LinkedRow],
        limit: usize,
        pause: Duration,
        mut on_object: B,
        mut on_done: F,
    ) -> Vec<DescriptionRow>
    where
        B: FnMut(&PreparedObject),
        F: FnMut(&PreparedObject, &DescriptionRow),
    {
        let mut results = Vec::new();

        for (i, row) in rows.iter().take(limit).enumerate() {
            if i > 0 && !pause.is_zero() {
                std::thread::sleep(pause);
            }

            let object = self.prepare(row);
            on_object(&object);
            let result = self.describe(&object);
            on_done(&object, &result);
            results.push(result);
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::describe::DescribeError;
    use crate::core::sheets::MetadataRecord;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::tempdir;

    struct FakeDescriber {
        calls: RefCell<Vec<(String, usize)>>,
        fail_on: Option<String>,
    }

    impl FakeDescriber {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail_on: None,
            }
        }
    }

    impl Describer for &FakeDescriber {
        fn describe(&self, prompt: &str, images: &[PathBuf]) -> Result<String, DescribeError> {
            self.calls.borrow_mut().push((prompt.to_string(), images.len()));
            match &self.fail_on {
                Some(marker) if prompt.contains(marker.as_str()) => {
                    Err(DescribeError::RetriesExhausted(6))
                }
                _ => Ok(format!("{} Bild(er)", images.len())),
            }
        }
    }

    fn linked_row(id: &str, year: &str, images: &str) -> LinkedRow {
        LinkedRow {
            obj_id_raw: id.to_string(),
            year: year.to_string(),
            base_prefix: String::new(),
            images: images.to_string(),
            image_count: 0,
            source_files: String::new(),
        }
    }

    #[test]
    fn test_normalize_year() {
        assert_eq!(normalize_year("1997"), "1997");
        assert_eq!(normalize_year("1997.0"), "1997");
        assert_eq!(normalize_year("ca. 1950er"), "");
        assert_eq!(normalize_year(""), "");
    }

    #[test]
    fn test_find_image_lookup_order() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("1997")).unwrap();
        fs::create_dir_all(root.join("misc/deep")).unwrap();
        fs::write(root.join("1997/a.jpg"), b"x").unwrap();
        fs::write(root.join("b.jpg"), b"x").unwrap();
        fs::write(root.join("misc/deep/c.jpg"), b"x").unwrap();

        assert_eq!(find_image(root, "1997", "a.jpg"), Some(root.join("1997/a.jpg")));
        assert_eq!(find_image(root, "1997", "b.jpg"), Some(root.join("b.jpg")));
        assert_eq!(
            find_image(root, "", "c.jpg"),
            Some(root.join("misc/deep/c.jpg"))
        );
        assert_eq!(find_image(root, "1997", "nope.jpg"), None);

        let absolute = root.join("1997/a.jpg");
        assert_eq!(
            find_image(Path::new("/elsewhere"), "", &absolute.to_string_lossy()),
            Some(absolute)
        );
    }

    #[test]
    fn test_run_describes_up_to_limit() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("1997")).unwrap();
        fs::write(root.join("1997/1-1997-1063-000.jpg"), b"x").unwrap();
        fs::write(root.join("1997/1-1997-1063-001.jpg"), b"x").unwrap();

        let mut meta = MetadataRecord::from_id("1/1997/1063 0");
        meta.insert("t7", "Telefon");
        let table = MetadataTable::from_records(vec![meta]);
        let labels = BTreeMap::new();
        let fake = FakeDescriber::new();

        let generator = CatalogGenerator::new(root, &table, &labels, &fake);
        let rows = vec![
            linked_row(
                "1/1997/1063 0",
                "1997",
                r#"["1-1997-1063-000.jpg","1-1997-1063-001.jpg"]"#,
            ),
            linked_row("2/1998/0001 0", "1998", "[]"),
            linked_row("3/1999/0002 0", "1999", "[]"),
        ];

        let mut started = 0;
        let mut done = Vec::new();
        let results = generator.run(
            &rows,
            2,
            Duration::ZERO,
            |_| started += 1,
            |obj, res| done.push((obj.obj_id.clone(), res.description.clone())),
        );

        assert_eq!(started, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].objekt_id, "1/1997/1063 0");
        assert_eq!(results[0].description, "2 Bild(er)");
        assert_eq!(results[1].description, "0 Bild(er)");
        assert_eq!(done.len(), 2);

        let calls = fake.calls.borrow();
        assert!(calls[0].0.contains("- T7 [T7]: Telefon"));
        assert!(calls[1].0.contains("- T1 [T1]: 2/1998/0001 0"));
    }

    #[test]
    fn test_run_records_errors_and_continues() {
        let dir = tempdir().unwrap();
        let table = MetadataTable::default();
        let labels = BTreeMap::new();
        let fake = FakeDescriber {
            calls: RefCell::new(Vec::new()),
            fail_on: Some("1/1997/1063 0".to_string()),
        };

        let generator = CatalogGenerator::new(dir.path(), &table, &labels, &fake);
        let rows = vec![
            linked_row("1/1997/1063 0", "1997", "[]"),
            linked_row("2/1998/0001 0", "1998", "[]"),
        ];

        let results = generator.run(&rows, 10, Duration::ZERO, |_| {}, |_, _| {});
        assert_eq!(results.len(), 2);
        assert!(results[0].description.starts_with("ERROR: giving up after 6 attempts"));
        assert_eq!(results[1].description, "0 Bild(er)");
    }
}
