//! Backup-then-mutate edits over the files behind a set of records.
//!
//! A transaction moves `Idle -> BackingUp -> Mutating -> Committed`, leaving
//! through `Failed` when a backup copy fails (nothing is mutated) or through
//! `PartiallyFailed` when some records could not be saved. A transaction runs
//! once; a retry needs a fresh one.

pub mod backup;

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

pub use backup::{backup_folder_for, back_up_records, BackupSummary};

use crate::config::EditConfig;
use crate::dates;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::record::{Field, PatientSummary, Record, RecordHandle};

pub const ANONYMOUS_NAME: &str = "ANONYMOUS";
pub const ANONYMOUS_PLACEHOLDER: &str = "ANON123";
pub const ANONYMIZED_DESCRIPTION: &str = "ANONYMIZED_STUDY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    Idle,
    BackingUp,
    Mutating,
    Committed,
    Failed,
    PartiallyFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Update,
    Anonymize,
}

/// Values to write, with dates in display form (`dd/MM/yyyy`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRequest {
    pub values: PatientSummary,
    pub mode: EditMode,
}

impl EditRequest {
    pub fn update(values: PatientSummary) -> Self {
        Self {
            values,
            mode: EditMode::Update,
        }
    }

    /// Only `id` and `accession_number` of `values` are used; blank ones are
    /// replaced by [`ANONYMOUS_PLACEHOLDER`].
    pub fn anonymize(values: PatientSummary) -> Self {
        Self {
            values,
            mode: EditMode::Anonymize,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct EditReport {
    pub phase: EditPhase,
    pub backup: BackupSummary,
    pub requested: usize,
    pub committed: usize,
    pub failures: Vec<SaveFailure>,
}

impl EditReport {
    pub fn is_complete(&self) -> bool {
        self.phase == EditPhase::Committed
    }
}

pub struct EditTransaction {
    phase: EditPhase,
    backup_suffix: String,
}

impl EditTransaction {
    pub fn new(config: &EditConfig) -> Self {
        Self {
            phase: EditPhase::Idle,
            backup_suffix: config.backup_suffix.clone(),
        }
    }

    pub fn phase(&self) -> EditPhase {
        self.phase
    }

    /// Back up every record next to `study_folder` (the folder the records
    /// were ingested from), then apply `request` to each one and save it over
    /// its source file. A failed save is recorded and the remaining records
    /// are still processed.
    pub fn execute<H: RecordHandle>(
        &mut self,
        study_folder: &Path,
        records: &mut [Record<H>],
        request: &EditRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<EditReport, Error> {
        if self.phase != EditPhase::Idle {
            return Err(Error::TransactionReused(self.phase));
        }
        if records.is_empty() {
            return Err(Error::NoRecords);
        }

        let start = Instant::now();
        self.phase = EditPhase::BackingUp;
        let backup = match backup_folder_for(study_folder, &self.backup_suffix)
            .and_then(|folder| back_up_records(records, &folder, reporter))
        {
            Ok(summary) => summary,
            Err(e) => {
                error!("Backup failed, no record was modified: {}", e);
                self.phase = EditPhase::Failed;
                return Err(e);
            }
        };

        self.phase = EditPhase::Mutating;
        let birth_date = dates::to_dicom_date(&request.values.birth_date);
        let study_date = dates::to_dicom_date(&request.values.study_date);

        let total = records.len();
        let mut committed = 0;
        let mut failures = Vec::new();

        for (index, record) in records.iter_mut().enumerate() {
            match request.mode {
                EditMode::Update => apply_update(record, &request.values, &birth_date, &study_date),
                EditMode::Anonymize => apply_anonymization(record, &request.values),
            }

            match record.save() {
                Ok(()) => committed += 1,
                Err(e) => {
                    warn!("Could not save {}: {}", record.path().display(), e);
                    failures.push(SaveFailure {
                        path: record.path().to_path_buf(),
                        reason: e.to_string(),
                    });
                }
            }
            reporter.on_update_progress(index + 1, total);
        }

        self.phase = if failures.is_empty() {
            EditPhase::Committed
        } else {
            EditPhase::PartiallyFailed
        };
        reporter.on_edit_complete(committed, total);
        info!(
            "Edit finished ({:?}): {}/{} records saved in {:.2}s",
            self.phase,
            committed,
            total,
            start.elapsed().as_secs_f64()
        );

        Ok(EditReport {
            phase: self.phase,
            backup,
            requested: total,
            committed,
            failures,
        })
    }
}

fn apply_update<H: RecordHandle>(
    record: &mut Record<H>,
    values: &PatientSummary,
    birth_date: &str,
    study_date: &str,
) {
    record.set_field(Field::PatientName, &values.name);
    record.set_field(Field::PatientId, &values.id);
    record.set_field(Field::AccessionNumber, &values.accession_number);
    record.set_field(Field::PatientBirthDate, birth_date);
    record.set_field(Field::StudyDate, study_date);
    record.set_field(Field::StudyDescription, &values.study_description);
}

fn or_placeholder(value: &str) -> &str {
    if value.trim().is_empty() {
        ANONYMOUS_PLACEHOLDER
    } else {
        value
    }
}

fn apply_anonymization<H: RecordHandle>(record: &mut Record<H>, values: &PatientSummary) {
    record.set_field(Field::PatientName, ANONYMOUS_NAME);
    record.set_field(Field::PatientId, or_placeholder(&values.id));
    record.set_field(Field::AccessionNumber, or_placeholder(&values.accession_number));
    for field in Field::IDENTIFYING {
        record.remove_field(field);
    }
    record.set_field(Field::StudyDescription, ANONYMIZED_DESCRIPTION);
}
