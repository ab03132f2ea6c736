use std::path::PathBuf;
use thiserror::Error;

use crate::edit::EditPhase;
use crate::transfer::TransportError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Cannot read folder {}: {source}", path.display())]
    Folder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Backup of {} failed: {source}", path.display())]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot derive a backup folder from {}", path.display())]
    InvalidStudyFolder { path: PathBuf },

    #[error("No records to process")]
    NoRecords,

    #[error("Edit transaction already left the idle state (now {0:?})")]
    TransactionReused(EditPhase),

    #[error("Remote {host}:{port} is unreachable: {reason}")]
    Unreachable {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Could not open a session with {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: TransportError,
    },

    #[error("Transfer session failed: {0}")]
    Session(#[source] TransportError),
}
