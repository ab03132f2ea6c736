use glob::Pattern;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::AppConfig;
use crate::error::Error;

/// Entries a walk leaves out, together with everything below them.
#[derive(Debug, Clone, Default)]
pub struct WalkFilter {
    /// Glob patterns matched against the full path of files and folders.
    pub ignore_patterns: Vec<String>,
    /// Folders below the root whose name ends with this are skipped. Used to
    /// keep edit backups out of a study.
    pub skip_folder_suffix: Option<String>,
}

impl WalkFilter {
    pub fn from_config(config: &AppConfig) -> Self {
        let suffix = config.edit.backup_suffix.trim();
        Self {
            ignore_patterns: config.ingest.ignore_patterns.clone(),
            skip_folder_suffix: (!suffix.is_empty()).then(|| suffix.to_string()),
        }
    }

    pub fn with_ignore_patterns(patterns: &[&str]) -> Self {
        Self {
            ignore_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }
}

fn is_skipped_folder(entry: &DirEntry, suffix: Option<&str>) -> bool {
    match suffix {
        Some(suffix) if entry.depth() > 0 && entry.file_type().is_dir() => entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.ends_with(suffix)),
        _ => false,
    }
}

/// Recursive listing of every file under `root`, in discovery order (entries
/// sorted by name within each directory). The root itself must be readable;
/// unreadable subdirectories are logged and skipped.
pub fn list_files(root: &Path, filter: &WalkFilter) -> Result<Vec<PathBuf>, Error> {
    fs::read_dir(root).map_err(|source| Error::Folder {
        path: root.to_path_buf(),
        source,
    })?;

    let ignore_patterns: Vec<Pattern> = filter
        .ignore_patterns
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if is_skipped_folder(entry, filter.skip_folder_suffix.as_deref()) {
                debug!("Skipping backup folder {}", entry.path().display());
                return false;
            }
            !ignore_patterns
                .iter()
                .any(|pattern| pattern.matches_path(entry.path()))
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if err.depth() == 0 {
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "walk error"));
                    return Err(Error::Folder {
                        path: root.to_path_buf(),
                        source,
                    });
                }
                warn!("Skipping unreadable entry: {}", err);
                continue;
            }
        };

        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
