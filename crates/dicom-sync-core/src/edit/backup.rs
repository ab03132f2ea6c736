use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::record::{Record, RecordHandle};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupSummary {
    pub folder: PathBuf,
    pub copied: usize,
    pub already_present: usize,
}

/// Sibling of the ingested study folder holding pre-edit copies:
/// `/data/STUDY` with suffix `_backup` -> `/data/STUDY_backup`.
pub fn backup_folder_for(study_folder: &Path, suffix: &str) -> Result<PathBuf, Error> {
    let invalid = || Error::InvalidStudyFolder {
        path: study_folder.to_path_buf(),
    };
    // `.` or `study/..` carry no name of their own.
    let study_folder = match study_folder.file_name() {
        Some(_) => study_folder.to_path_buf(),
        None => study_folder.canonicalize().map_err(|_| invalid())?,
    };
    let study_name = study_folder.file_name().ok_or_else(invalid)?;
    let parent = study_folder.parent().ok_or_else(invalid)?;

    let mut name = study_name.to_os_string();
    name.push(suffix);
    Ok(parent.join(name))
}

/// Copy every record's current file into `folder` under its file name, unless a
/// file of that name is already there. An existing backup is never overwritten.
pub fn back_up_records<H: RecordHandle>(
    records: &[Record<H>],
    folder: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<BackupSummary, Error> {
    fs::create_dir_all(folder).map_err(|source| Error::Backup {
        path: folder.to_path_buf(),
        source,
    })?;

    let total = records.len();
    let mut summary = BackupSummary {
        folder: folder.to_path_buf(),
        ..Default::default()
    };
    let mut copied_now: HashSet<PathBuf> = HashSet::new();

    for (index, record) in records.iter().enumerate() {
        let source_path = record.path();
        let file_name = source_path.file_name().ok_or_else(|| Error::InvalidStudyFolder {
            path: source_path.to_path_buf(),
        })?;
        let dest = folder.join(file_name);

        if dest.exists() {
            if copied_now.contains(&dest) {
                warn!(
                    "{} has no backup of its own: {} was already taken by another file in this pass",
                    source_path.display(),
                    dest.display()
                );
            } else {
                trace!("Backup of {} already present", dest.display());
            }
            summary.already_present += 1;
        } else {
            fs::copy(source_path, &dest).map_err(|source| Error::Backup {
                path: source_path.to_path_buf(),
                source,
            })?;
            summary.copied += 1;
            copied_now.insert(dest);
        }
        reporter.on_backup_progress(index + 1, total);
    }

    debug!(
        "Backup in {}: {} copied, {} already present",
        folder.display(),
        summary.copied,
        summary.already_present
    );
    Ok(summary)
}
