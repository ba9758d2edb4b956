// src/system/fs_ops.rs

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Removes a directory tree. A missing directory is not an error.
///
/// Returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            log::debug!("Removed '{}'", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// A copy step that failed, with the path it failed on.
#[derive(Error, Debug)]
#[error("Copying '{}' failed: {source}", path.display())]
pub struct CopyError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl CopyError {
    fn at(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Recursively copies the contents of `from` into `to`, creating directories as needed.
/// Existing files in `to` are overwritten.
///
/// Returns the number of files copied.
pub fn copy_dir_all(from: &Path, to: &Path) -> Result<u64, CopyError> {
    let mut copied = 0;
    for entry in WalkDir::new(from).follow_links(true) {
        let entry = entry.map_err(|e| CopyError {
            path: e.path().unwrap_or(from).to_path_buf(),
            source: e.into(),
        })?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| CopyError {
                path: entry.path().to_path_buf(),
                source: io::Error::other(e),
            })?;
        let destination = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination).map_err(CopyError::at(&destination))?;
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent).map_err(CopyError::at(parent))?;
            }
            fs::copy(entry.path(), &destination).map_err(CopyError::at(&destination))?;
            copied += 1;
        }
    }
    log::debug!(
        "Copied {} file(s) from '{}' to '{}'",
        copied,
        from.display(),
        to.display()
    );
    Ok(copied)
}
