//! Folder ingestion: list every file under a folder and keep the ones the
//! record I/O library can parse.

pub mod walk;

pub use walk::WalkFilter;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::record::{Record, RecordIo, RecordStore};

/// An entry that was attempted but is not a structured record.
#[derive(Debug, Clone)]
pub struct ExcludedEntry {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct IngestReport<H> {
    pub records: RecordStore<H>,
    pub attempted: usize,
    pub excluded: Vec<ExcludedEntry>,
    pub duration: Duration,
}

/// Parse every file under `folder`. Unparsable files are excluded and listed
/// in the report; only an unreadable `folder` fails the call.
pub fn ingest_folder<R: RecordIo>(
    io: &R,
    folder: &Path,
    filter: &WalkFilter,
    reporter: &dyn ProgressReporter,
) -> Result<IngestReport<R::Handle>, Error> {
    let start = Instant::now();
    info!("Loading records from {}", folder.display());

    let files = walk::list_files(folder, filter)?;
    let total = files.len();
    reporter.on_ingest_start(total);

    let mut records = RecordStore::new();
    let mut excluded = Vec::new();

    for (index, path) in files.into_iter().enumerate() {
        match io.parse(&path) {
            Ok(handle) => records.push(Record::new(path, handle)),
            Err(e) => {
                debug!("Excluding {}: {}", path.display(), e);
                excluded.push(ExcludedEntry {
                    path,
                    reason: e.to_string(),
                });
            }
        }
        reporter.on_ingest_progress(index + 1, total);
    }

    let duration = start.elapsed();
    info!(
        "Loaded {} records from {} entries ({} excluded) in {:.2}s",
        records.len(),
        total,
        excluded.len(),
        duration.as_secs_f64()
    );
    reporter.on_ingest_complete(records.len(), excluded.len(), duration.as_secs_f64());

    Ok(IngestReport {
        records,
        attempted: total,
        excluded,
        duration,
    })
}
