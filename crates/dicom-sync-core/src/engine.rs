use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::analysis::series::{self, SeriesGroup};
use crate::config::AppConfig;
use crate::edit::{EditReport, EditRequest, EditTransaction};
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::record::{PatientSummary, RecordIo, RecordStore};
use crate::scanner::{self, ExcludedEntry, WalkFilter};
use crate::transfer::{self, Endpoint, TransferOptions, TransferReport, Transport};

/// Owns the record store of one working session.
///
/// `edit` needs `&mut self` and `transfer` borrows the store, so one session
/// can never run both at once, and a new `load` cannot happen while either
/// still holds the records.
pub struct StudySession<R: RecordIo> {
    io: R,
    config: AppConfig,
    folder: Option<PathBuf>,
    store: RecordStore<R::Handle>,
}

#[derive(Debug, Clone)]
pub struct LoadSummary {
    pub attempted: usize,
    pub loaded: usize,
    pub excluded: Vec<ExcludedEntry>,
    pub duration: Duration,
}

impl<R: RecordIo> StudySession<R> {
    pub fn new(io: R, config: AppConfig) -> Self {
        Self {
            io,
            config,
            folder: None,
            store: RecordStore::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn records(&self) -> &RecordStore<R::Handle> {
        &self.store
    }

    /// Ingest `folder` and replace the current store with the result. The
    /// current store is kept if the folder cannot be read.
    pub fn load(
        &mut self,
        folder: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<LoadSummary, Error> {
        let report = scanner::ingest_folder(
            &self.io,
            folder,
            &WalkFilter::from_config(&self.config),
            reporter,
        )?;

        debug!(
            "Replacing {} records with {} from {}",
            self.store.len(),
            report.records.len(),
            folder.display()
        );
        self.store = report.records;
        self.folder = Some(folder.to_path_buf());

        Ok(LoadSummary {
            attempted: report.attempted,
            loaded: self.store.len(),
            excluded: report.excluded,
            duration: report.duration,
        })
    }

    pub fn series(&self) -> Vec<SeriesGroup> {
        series::group_into_series(self.store.as_slice())
    }

    /// Patient values of the first record, the prefill for an edit.
    pub fn patient(&self) -> Option<PatientSummary> {
        self.store.first().map(PatientSummary::from_record)
    }

    pub fn edit(
        &mut self,
        request: &EditRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<EditReport, Error> {
        let folder = self.folder.as_deref().ok_or(Error::NoRecords)?;
        let mut transaction = EditTransaction::new(&self.config.edit);
        transaction.execute(folder, self.store.as_mut_slice(), request, reporter)
    }

    /// Send every loaded record to `endpoint`.
    pub async fn transfer<T>(
        &self,
        transport: &T,
        endpoint: &Endpoint,
        cancel: &CancellationToken,
        reporter: &dyn ProgressReporter,
    ) -> Result<TransferReport, Error>
    where
        T: Transport<Handle = R::Handle>,
    {
        let options = TransferOptions::from(&self.config.remote);
        transfer::run_transfer(
            transport,
            self.store.as_slice(),
            endpoint,
            &options,
            cancel,
            reporter,
        )
        .await
    }
}
