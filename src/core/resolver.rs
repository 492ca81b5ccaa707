//! Year-partitioned image directory lookup
//!
//! Images live in `<root>/<year>/`, one flat directory per capture year.
//! A parsed inventory number is resolved by listing that single directory
//! and keeping files whose name starts with the number's prefix.

use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Image extensions accepted by default (lowercase, without dot)
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "bmp"];

/// Errors that prevent any directory listing
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("image root not found: {0}")]
    RootNotFound(PathBuf),

    #[error("image root is not a directory: {0}")]
    RootNotDirectory(PathBuf),
}

/// A file directly inside a year directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub file_name: String,
    pub year: String,
}

/// Resolves inventory prefixes to image files under one root
#[derive(Debug)]
pub struct DirectoryResolver {
    root: PathBuf,
    extensions: Vec<String>,
    /// Qualifying files per year, listed on first use
    listings: HashMap<String, Vec<FileRecord>>,
}

impl DirectoryResolver {
    /// Create a resolver with the default extension set
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ResolveError> {
        Self::with_extensions(root, DEFAULT_EXTENSIONS.iter().copied())
    }

    /// Create a resolver accepting the given extensions
    ///
    /// Extensions are compared case-insensitively; a leading dot is optional.
    pub fn with_extensions<I, S>(
        root: impl Into<PathBuf>,
        extensions: I,
    ) -> Result<Self, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let root = root.into();
        if !root.exists() {
            return Err(ResolveError::RootNotFound(root));
        }
        if !root.is_dir() {
            return Err(ResolveError::RootNotDirectory(root));
        }

        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Ok(Self {
            root,
            extensions,
            listings: HashMap::new(),
        })
    }

    /// The image root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files in `<root>/<year>/` whose name starts with `prefix`
    ///
    /// The comparison is case-insensitive and the scan is not recursive.
    /// A missing year directory yields an empty list. Results are sorted by
    /// full path.
    pub fn resolve(&mut self, year: &str, prefix: &str) -> Vec<PathBuf> {
        let prefix = prefix.to_lowercase();
        let matches: Vec<PathBuf> = self
            .year_listing(year)
            .iter()
            .filter(|f| f.file_name.to_lowercase().starts_with(&prefix))
            .map(|f| f.path.clone())
            .collect();

        debug!("{}/ prefix '{}': {} file(s)", year, prefix, matches.len());
        matches
    }

    fn year_listing(&mut self, year: &str) -> &[FileRecord] {
        let root = &self.root;
        let extensions = &self.extensions;
        self.listings
            .entry(year.to_string())
            .or_insert_with(|| list_year_dir(&root.join(year), year, extensions))
    }

    fn is_allowed(extensions: &[String], path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|e| extensions.iter().any(|allowed| *allowed == e))
    }
}

/// List qualifying regular files directly inside `dir`, sorted by path
fn list_year_dir(dir: &Path, year: &str, extensions: &[String]) -> Vec<FileRecord> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => {
            debug!("no year directory {}", dir.display());
            return Vec::new();
        }
    };

    let mut files: Vec<FileRecord> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| DirectoryResolver::is_allowed(extensions, p))
        .filter_map(|path| {
            let file_name = path.file_name()?.to_string_lossy().into_owned();
            Some(FileRecord {
                path,
                file_name,
                year: year.to_string(),
            })
        })
        .collect();

    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}
