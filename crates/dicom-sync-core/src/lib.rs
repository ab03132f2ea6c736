pub mod analysis;
pub mod config;
pub mod dates;
pub mod edit;
pub mod engine;
pub mod error;
pub mod progress;
pub mod record;
pub mod scanner;
pub mod transfer;

pub use config::AppConfig;
pub use engine::{LoadSummary, StudySession};
pub use error::Error;
pub use progress::{ProgressReporter, SilentReporter};
pub use record::{DicomFileIo, Field, PatientSummary, Record, RecordStore};
