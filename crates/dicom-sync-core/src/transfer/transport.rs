use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::status::StatusCode;
use crate::record::{Record, RecordHandle};

/// Remote node parameters, passed to the transport unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub local_ae: String,
    pub remote_ae: String,
    pub association_timeout: Duration,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Association rejected: {0}")]
    Rejected(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// Message from the producer side of a transfer to its single consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionEvent {
    Submitted { index: usize },
    Status { index: usize, status: StatusCode },
}

/// One-shot handle through which the transport reports the status of a
/// submitted item. It may be moved to and delivered from any task; the
/// transport must deliver it or drop it once the item is settled.
#[derive(Debug)]
pub struct StatusSink {
    index: usize,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl StatusSink {
    pub(crate) fn new(index: usize, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { index, tx }
    }

    /// Position of the item in the submitted sequence.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn deliver(self, status: StatusCode) {
        // The consumer only goes away once the pipeline call has returned.
        let _ = self.tx.send(SessionEvent::Status {
            index: self.index,
            status,
        });
    }
}

/// Client side of the transfer protocol.
#[async_trait]
pub trait Transport: Send + Sync {
    type Handle: RecordHandle;
    type Session: TransportSession<Handle = Self::Handle>;

    async fn connect(&self, endpoint: &Endpoint) -> Result<Self::Session, TransportError>;
}

#[async_trait]
pub trait TransportSession: Send {
    type Handle: RecordHandle;

    /// Protocol-level verification (echo) over an open session.
    async fn probe(&mut self) -> Result<bool, TransportError>;

    /// Queue one record. Its status is reported through `sink`, now or later.
    async fn submit(
        &mut self,
        record: &Record<Self::Handle>,
        sink: StatusSink,
    ) -> Result<(), TransportError>;

    /// Drive queued work to completion, or tear it down once `cancel` fires.
    async fn run(&mut self, cancel: CancellationToken) -> Result<(), TransportError>;
}
