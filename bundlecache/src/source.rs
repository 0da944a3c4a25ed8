//! Source catalog filesystem abstraction.
//!
//! [`Cache::build`](crate::cache::Cache::build) and
//! [`Cache::check_integrity`](crate::cache::Cache::check_integrity) only
//! need one capability from the catalog source: a deterministic, ordered
//! enumeration of `(path, content)` pairs. [`SourceFs`] captures that seam;
//! [`DirSource`] walks a real directory and [`MemSource`] serves tests and
//! embedders.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One file of the source catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Slash-separated path relative to the source root.
    pub path: String,

    /// Raw file content.
    pub data: Vec<u8>,
}

/// Ordered enumeration of the source catalog's files.
pub trait SourceFs {
    /// Return every file as a `(path, content)` pair, sorted by path.
    fn entries(&self) -> io::Result<Vec<SourceEntry>>;
}

/// A source catalog rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceFs for DirSource {
    fn entries(&self) -> io::Result<Vec<SourceEntry>> {
        let mut entries = Vec::new();
        collect_files(&self.root, &self.root, &mut entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<SourceEntry>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .map_err(|err| io::Error::other(format!("relativize {}: {err}", path.display())))?;
            out.push(SourceEntry {
                path: relative.to_string_lossy().into_owned(),
                data: fs::read(&path)?,
            });
        }
    }
    Ok(())
}

/// An in-memory source catalog.
#[derive(Debug, Clone, Default)]
pub struct MemSource {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.files.insert(path.into(), data.into());
    }

    /// Remove a file, returning whether it was present.
    pub fn remove(&mut self, path: &str) -> bool {
        self.files.remove(path).is_some()
    }
}

impl SourceFs for MemSource {
    fn entries(&self) -> io::Result<Vec<SourceEntry>> {
        Ok(self
            .files
            .iter()
            .map(|(path, data)| SourceEntry {
                path: path.clone(),
                data: data.clone(),
            })
            .collect())
    }
}
