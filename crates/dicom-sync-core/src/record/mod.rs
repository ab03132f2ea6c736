//! Loaded records and the seam to the record I/O library.
//!
//! A [`Record`] exists only for an entry that parsed successfully. It owns its
//! underlying handle exclusively; field writes go through the record so the
//! cached key fields and the handle never disagree.

mod dicom;
mod store;

pub use dicom::{DicomFileIo, DicomHandle};
pub use store::{ItemSummary, RecordStore};

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::dates;

/// Grouping key used for records without a series instance UID.
pub const UNKNOWN_SERIES: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    PatientName,
    PatientId,
    AccessionNumber,
    StudyDescription,
    PatientBirthDate,
    StudyDate,
    SeriesInstanceUid,
    SeriesDescription,
    SopInstanceUid,
    PatientSex,
    PatientAddress,
    PatientTelephoneNumbers,
    InstitutionName,
    ReferringPhysicianName,
    InstitutionalDepartmentName,
    OperatorsName,
}

impl Field {
    /// Fields extracted into every record at load time.
    pub const KEY_FIELDS: [Field; 9] = [
        Field::PatientName,
        Field::PatientId,
        Field::AccessionNumber,
        Field::StudyDescription,
        Field::PatientBirthDate,
        Field::StudyDate,
        Field::SeriesInstanceUid,
        Field::SeriesDescription,
        Field::SopInstanceUid,
    ];

    /// Directly identifying fields that anonymization removes outright.
    pub const IDENTIFYING: [Field; 8] = [
        Field::PatientBirthDate,
        Field::PatientSex,
        Field::PatientAddress,
        Field::PatientTelephoneNumbers,
        Field::InstitutionName,
        Field::ReferringPhysicianName,
        Field::InstitutionalDepartmentName,
        Field::OperatorsName,
    ];

    pub fn keyword(self) -> &'static str {
        match self {
            Field::PatientName => "PatientName",
            Field::PatientId => "PatientID",
            Field::AccessionNumber => "AccessionNumber",
            Field::StudyDescription => "StudyDescription",
            Field::PatientBirthDate => "PatientBirthDate",
            Field::StudyDate => "StudyDate",
            Field::SeriesInstanceUid => "SeriesInstanceUID",
            Field::SeriesDescription => "SeriesDescription",
            Field::SopInstanceUid => "SOPInstanceUID",
            Field::PatientSex => "PatientSex",
            Field::PatientAddress => "PatientAddress",
            Field::PatientTelephoneNumbers => "PatientTelephoneNumbers",
            Field::InstitutionName => "InstitutionName",
            Field::ReferringPhysicianName => "ReferringPhysicianName",
            Field::InstitutionalDepartmentName => "InstitutionalDepartmentName",
            Field::OperatorsName => "OperatorsName",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Field> {
        Self::KEY_FIELDS
            .iter()
            .chain(Self::IDENTIFYING.iter())
            .copied()
            .find(|field| field.keyword() == keyword)
    }

    pub fn is_key_field(self) -> bool {
        Self::KEY_FIELDS.contains(&self)
    }
}

#[derive(Error, Debug)]
pub enum RecordIoError {
    #[error("{}: not a structured record: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("{}: save failed: {reason}", path.display())]
    Save { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The underlying record object produced by the record I/O library.
pub trait RecordHandle: Send + Sync + 'static {
    fn get(&self, field: Field) -> Option<String>;
    fn set(&mut self, field: Field, value: &str);
    fn remove(&mut self, field: Field);
    fn save(&self, path: &Path) -> Result<(), RecordIoError>;
}

/// Entry point of the record I/O library.
pub trait RecordIo: Send + Sync {
    type Handle: RecordHandle;

    fn parse(&self, path: &Path) -> Result<Self::Handle, RecordIoError>;
}

#[derive(Debug)]
pub struct Record<H> {
    path: PathBuf,
    fields: BTreeMap<Field, String>,
    handle: H,
}

impl<H: RecordHandle> Record<H> {
    pub fn new(path: PathBuf, handle: H) -> Self {
        let fields = Field::KEY_FIELDS
            .iter()
            .filter_map(|field| handle.get(*field).map(|value| (*field, value)))
            .collect();
        Self {
            path,
            fields,
            handle,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn field(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    /// Series instance UID, or [`UNKNOWN_SERIES`] when absent or blank.
    pub fn series_uid(&self) -> &str {
        match self.field(Field::SeriesInstanceUid) {
            Some(uid) if !uid.trim().is_empty() => uid,
            _ => UNKNOWN_SERIES,
        }
    }

    pub fn set_field(&mut self, field: Field, value: &str) {
        self.handle.set(field, value);
        if field.is_key_field() {
            self.fields.insert(field, value.to_string());
        }
    }

    pub fn remove_field(&mut self, field: Field) {
        self.handle.remove(field);
        self.fields.remove(&field);
    }

    /// Writes the handle back over the record's source path.
    pub fn save(&self) -> Result<(), RecordIoError> {
        self.handle.save(&self.path)
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

/// Patient-level values of a record, dates in display form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientSummary {
    pub name: String,
    pub id: String,
    pub accession_number: String,
    pub study_description: String,
    pub birth_date: String,
    pub study_date: String,
}

impl PatientSummary {
    pub fn from_record<H: RecordHandle>(record: &Record<H>) -> Self {
        let value = |field| record.field(field).unwrap_or_default().to_string();
        Self {
            name: value(Field::PatientName),
            id: value(Field::PatientId),
            accession_number: value(Field::AccessionNumber),
            study_description: value(Field::StudyDescription),
            birth_date: dates::format_dicom_date(&value(Field::PatientBirthDate)),
            study_date: dates::format_dicom_date(&value(Field::StudyDate)),
        }
    }
}
