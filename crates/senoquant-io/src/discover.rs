//! Input discovery.

use std::path::{Path, PathBuf};

use crate::IoError;

/// Extensions treated as one family: asking for either matches both.
const TIFF_FAMILY: [&str; 2] = ["tif", "tiff"];

/// Whether `path` carries the requested `extension` (case-insensitive,
/// leading dot optional).
#[must_use]
pub fn has_extension(path: &Path, extension: &str) -> bool {
    let wanted = extension.trim_start_matches('.').to_ascii_lowercase();
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    ext == wanted || (TIFF_FAMILY.contains(&wanted.as_str()) && TIFF_FAMILY.contains(&ext.as_str()))
}

/// Recursively collect files under `dir` with the given extension,
/// sorted by path.
///
/// # Errors
///
/// Returns [`IoError::ReadDir`] if any directory cannot be listed.
pub fn discover_images(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, IoError> {
    let mut files = Vec::new();
    collect(dir, extension, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect(dir: &Path, extension: &str, files: &mut Vec<PathBuf>) -> Result<(), IoError> {
    let read_err = |source| IoError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let path = entry.map_err(read_err)?.path();
        if path.is_dir() {
            collect(&path, extension, files)?;
        } else if path.is_file() && has_extension(&path, extension) {
            files.push(path);
        }
    }
    Ok(())
}
