//! Flavour identification for mounted live images.
use std::fmt;
use std::fs;
use std::io::{BufRead as _, BufReader};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ImageError;

/// Name of the version descriptor shipped on every image.
pub const VERSION_FILE: &str = "grml-version";

/// Build variant of a live image, e.g. `grml-small`.
///
/// Used verbatim as a directory name and boot label component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Flavour(String);

impl Flavour {
    /// Parse the leading `[A-Za-z0-9_-]+` token of a descriptor line.
    #[must_use]
    pub fn from_version_line(line: &str) -> Option<Self> {
        let end = line
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(line.len());
        let token = line.get(..end)?;
        (!token.is_empty()).then(|| Self(token.to_string()))
    }

    /// Flavour name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Flavour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Find the first file called `name` below `root`.
///
/// Directories are walked in sorted order so the result is stable across
/// runs.
#[must_use]
pub fn search_file(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .map(walkdir::DirEntry::into_path)
}

/// Identify the flavour of the image mounted at `root`.
///
/// # Errors
///
/// Returns [`ImageError::MissingVersionFile`] if no descriptor exists,
/// [`ImageError::MalformedVersionFile`] if its first line does not start with
/// a flavour token, or [`ImageError::Io`] if it cannot be read.
pub fn identify_flavour(root: &Path) -> Result<Flavour, ImageError> {
    let path = search_file(root, VERSION_FILE).ok_or_else(|| ImageError::MissingVersionFile {
        file: VERSION_FILE.to_string(),
        root: root.to_path_buf(),
    })?;
    let line = first_line(&path).map_err(|source| ImageError::Io {
        path: path.clone(),
        source,
    })?;
    Flavour::from_version_line(&line).ok_or(ImageError::MalformedVersionFile { path, line })
}

/// First line of `path` without its terminator. Bytes that are not UTF-8
/// (release codenames are not always ASCII) are replaced.
fn first_line(path: &Path) -> std::io::Result<String> {
    let mut raw = Vec::new();
    BufReader::new(fs::File::open(path)?).read_until(b'\n', &mut raw)?;
    let line = String::from_utf8_lossy(&raw);
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}
