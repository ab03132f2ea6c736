//! Transfer of records to a remote node.
//!
//! Submission runs in input order and stops at the first cancellation check
//! that fires. Statuses come back through a channel in arrival order and are
//! aggregated by a single consumer, which owns the counters and the outcome
//! log; late statuses for items submitted before cancellation still count.

pub mod association;
pub mod probe;
pub mod status;
mod transport;

pub use association::{DicomSession, DicomTransport};
pub use probe::{check_reachable, verify_connection, ConnectionCheck};
pub use status::{classify, StatusCategory, StatusCode};
pub use transport::{Endpoint, StatusSink, Transport, TransportError, TransportSession};

use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::RemoteConfig;
use crate::error::Error;
use crate::progress::ProgressReporter;
use crate::record::{Field, Record, RecordHandle};
use transport::SessionEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferCounters {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl TransferCounters {
    pub fn settled(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub index: usize,
    pub path: PathBuf,
    pub sop_instance_uid: Option<String>,
    pub status: StatusCode,
    pub success: bool,
    /// Set for every non-success status.
    pub cause: Option<StatusCategory>,
    pub received_at: DateTime<Local>,
}

impl TransferOutcome {
    fn new<H: RecordHandle>(index: usize, record: &Record<H>, status: StatusCode) -> Self {
        let success = status.is_success();
        Self {
            index,
            path: record.path().to_path_buf(),
            sop_instance_uid: record.field(Field::SopInstanceUid).map(str::to_string),
            status,
            success,
            cause: (!success).then(|| status.classify()),
            received_at: Local::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TransferReport {
    pub state: TransferState,
    pub counters: TransferCounters,
    /// Outcomes in arrival order.
    pub outcomes: Vec<TransferOutcome>,
}

impl TransferReport {
    pub fn failures(&self) -> impl Iterator<Item = &TransferOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Run the TCP reachability check before connecting.
    pub precheck: bool,
    pub probe_timeout: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            precheck: true,
            probe_timeout: Duration::from_secs(3),
        }
    }
}

impl From<&RemoteConfig> for TransferOptions {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            precheck: config.precheck,
            probe_timeout: config.probe_timeout(),
        }
    }
}

/// Send `records` to `endpoint` through `transport`.
///
/// Fails without producing outcomes when the remote cannot be reached or no
/// session can be opened, and with [`Error::Session`] when the session breaks
/// mid-transfer. Otherwise returns the aggregate, marked `Cancelled` when
/// `cancel` fired.
pub async fn run_transfer<T: Transport>(
    transport: &T,
    records: &[Record<T::Handle>],
    endpoint: &Endpoint,
    options: &TransferOptions,
    cancel: &CancellationToken,
    reporter: &dyn ProgressReporter,
) -> Result<TransferReport, Error> {
    if options.precheck {
        check_reachable(endpoint, options.probe_timeout).await?;
    }

    let mut session = transport
        .connect(endpoint)
        .await
        .map_err(|source| Error::Connect {
            host: endpoint.host.clone(),
            port: endpoint.port,
            source,
        })?;
    info!(
        "Sending {} records to {} at {}:{}",
        records.len(),
        endpoint.remote_ae,
        endpoint.host,
        endpoint.port
    );
    reporter.on_transfer_start(records.len());

    let (tx, mut rx) = mpsc::unbounded_channel();

    let produce = async move {
        for (index, record) in records.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("Cancellation requested, stopped after {} submissions", index);
                break;
            }
            let _ = tx.send(SessionEvent::Submitted { index });
            session
                .submit(record, StatusSink::new(index, tx.clone()))
                .await?;
        }
        drop(tx);
        // The session (and any sink it still holds) is dropped when this block
        // finishes, which closes the channel for the consumer.
        session.run(cancel.clone()).await
    };

    let consume = async {
        let mut counters = TransferCounters::default();
        let mut outcomes = Vec::new();

        while let Some(event) = rx.recv().await {
            let (index, status) = match event {
                SessionEvent::Submitted { .. } => {
                    counters.submitted += 1;
                    continue;
                }
                SessionEvent::Status { index, status } => (index, status),
            };
            let Some(record) = records.get(index) else {
                warn!("Status {} for unknown item {}", status, index);
                continue;
            };

            let outcome = TransferOutcome::new(index, record, status);
            match &outcome.cause {
                None => {
                    counters.succeeded += 1;
                    debug!("Stored {}", record.path().display());
                }
                Some(cause) => {
                    counters.failed += 1;
                    warn!("{} rejected with {}: {}", record.path().display(), status, cause);
                }
            }
            reporter.on_transfer_outcome(&outcome, &counters);
            outcomes.push(outcome);
        }

        (counters, outcomes)
    };

    let (session_result, (counters, outcomes)) = tokio::join!(produce, consume);

    if let Err(e) = session_result {
        error!(
            "Transfer aborted after {} of {} statuses: {}",
            counters.settled(),
            counters.submitted,
            e
        );
        return Err(Error::Session(e));
    }

    let state = if cancel.is_cancelled() {
        TransferState::Cancelled
    } else {
        TransferState::Completed
    };
    reporter.on_transfer_complete(&counters, state == TransferState::Cancelled);
    info!(
        "Transfer {:?}: {} succeeded, {} failed, {} submitted",
        state, counters.succeeded, counters.failed, counters.submitted
    );

    Ok(TransferReport {
        state,
        counters,
        outcomes,
    })
}
