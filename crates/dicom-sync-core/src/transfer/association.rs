//! [`Transport`] over a DICOM upper-layer association: C-ECHO to check the
//! remote and one C-STORE per record.
//!
//! The association client is blocking, so each session owns a worker thread
//! that holds the association and serves PDU exchanges sent over a channel.

use async_trait::async_trait;
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_encoding::TransferSyntaxIndex;
use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::entries::IMPLICIT_VR_LITTLE_ENDIAN;
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;
use dicom_ul::association::client::ClientAssociationOptions;
use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu, PresentationContextResultReason};
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::status::StatusCode;
use super::transport::{Endpoint, StatusSink, Transport, TransportError, TransportSession};
use crate::record::{DicomHandle, Record};

pub const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";
const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

const AFFECTED_SOP_CLASS_UID: Tag = Tag(0x0000, 0x0002);
const COMMAND_FIELD: Tag = Tag(0x0000, 0x0100);
const MESSAGE_ID: Tag = Tag(0x0000, 0x0110);
const PRIORITY: Tag = Tag(0x0000, 0x0700);
const COMMAND_DATA_SET_TYPE: Tag = Tag(0x0000, 0x0800);
const STATUS: Tag = Tag(0x0000, 0x0900);
const AFFECTED_SOP_INSTANCE_UID: Tag = Tag(0x0000, 0x1000);

const C_STORE_RQ: u16 = 0x0001;
const C_ECHO_RQ: u16 = 0x0030;
const DATA_SET_PRESENT: u16 = 0x0000;
const NO_DATA_SET: u16 = 0x0101;
const MEDIUM_PRIORITY: u16 = 0x0000;

/// Data bytes per P-DATA fragment, under the 16 KiB maximum PDU length most
/// peers announce.
const MAX_FRAGMENT: usize = 16_000;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProposedContext {
    abstract_syntax: String,
    transfer_syntaxes: Vec<String>,
}

/// Client for sending loaded DICOM files. Verification is always proposed;
/// storage contexts come from the records the transport is built for.
#[derive(Debug, Clone)]
pub struct DicomTransport {
    contexts: Vec<ProposedContext>,
}

impl Default for DicomTransport {
    fn default() -> Self {
        Self {
            contexts: vec![ProposedContext {
                abstract_syntax: VERIFICATION_SOP_CLASS.to_string(),
                transfer_syntaxes: vec![IMPLICIT_VR_LE.to_string()],
            }],
        }
    }
}

impl DicomTransport {
    /// Proposes one context per SOP class found in `records`, offering each
    /// file's own transfer syntax and, for uncompressed files, both native
    /// little endian syntaxes.
    pub fn for_records(records: &[Record<DicomHandle>]) -> Self {
        let mut by_class: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for record in records {
            let meta = record.handle().object().meta();
            let syntaxes = by_class
                .entry(meta.media_storage_sop_class_uid().to_string())
                .or_default();
            let file_ts = meta.transfer_syntax();
            let mut offer = vec![file_ts.to_string()];
            if is_native(file_ts) {
                offer.push(EXPLICIT_VR_LE.to_string());
                offer.push(IMPLICIT_VR_LE.to_string());
            }
            for ts in offer {
                if !syntaxes.contains(&ts) {
                    syntaxes.push(ts);
                }
            }
        }

        let mut transport = Self::default();
        transport
            .contexts
            .extend(by_class.into_iter().map(|(abstract_syntax, transfer_syntaxes)| {
                ProposedContext {
                    abstract_syntax,
                    transfer_syntaxes,
                }
            }));
        transport
    }

    pub fn proposed_classes(&self) -> impl Iterator<Item = &str> {
        self.contexts.iter().map(|c| c.abstract_syntax.as_str())
    }
}

fn is_native(transfer_syntax: &str) -> bool {
    matches!(transfer_syntax, IMPLICIT_VR_LE | EXPLICIT_VR_LE)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AcceptedContext {
    id: u8,
    abstract_syntax: String,
    transfer_syntax: String,
}

struct AssociationSetup {
    host: String,
    port: u16,
    local_ae: String,
    remote_ae: String,
    timeout: Duration,
    contexts: Vec<ProposedContext>,
}

enum Request {
    Exchange {
        pdus: Vec<Pdu>,
        reply: oneshot::Sender<Result<Pdu, String>>,
    },
    Close {
        abort: bool,
        reply: oneshot::Sender<Result<(), String>>,
    },
}

fn trim_uid(uid: &str) -> String {
    uid.trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

/// Worker loop: establish, report the accepted contexts, then serve requests
/// until the session closes or goes away.
fn serve(
    setup: AssociationSetup,
    mut inbox: mpsc::UnboundedReceiver<Request>,
    ready: oneshot::Sender<Result<Vec<AcceptedContext>, String>>,
) {
    let mut options = ClientAssociationOptions::new()
        .calling_ae_title(setup.local_ae.as_str())
        .called_ae_title(setup.remote_ae.as_str())
        .read_timeout(setup.timeout)
        .write_timeout(setup.timeout);
    for context in &setup.contexts {
        options = options.with_presentation_context(
            context.abstract_syntax.as_str(),
            context.transfer_syntaxes.iter().map(String::as_str).collect(),
        );
    }

    let mut association = match options.establish((setup.host.as_str(), setup.port)) {
        Ok(association) => association,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };

    let accepted: Vec<AcceptedContext> = association
        .presentation_contexts()
        .iter()
        .filter(|pc| pc.reason == PresentationContextResultReason::Acceptance)
        .map(|pc| AcceptedContext {
            id: pc.id,
            abstract_syntax: trim_uid(&pc.abstract_syntax),
            transfer_syntax: trim_uid(&pc.transfer_syntax),
        })
        .collect();
    if ready.send(Ok(accepted)).is_err() {
        let _ = association.abort();
        return;
    }

    let close = loop {
        match inbox.blocking_recv() {
            Some(Request::Exchange { pdus, reply }) => {
                let result = pdus
                    .iter()
                    .try_for_each(|pdu| association.send(pdu))
                    .and_then(|()| association.receive())
                    .map_err(|e| e.to_string());
                let _ = reply.send(result);
            }
            Some(Request::Close { abort, reply }) => break Some((abort, reply)),
            None => break None,
        }
    };

    match close {
        Some((abort, reply)) => {
            let result = if abort {
                association.abort()
            } else {
                association.release()
            };
            let _ = reply.send(result.map_err(|e| e.to_string()));
        }
        None => {
            let _ = association.abort();
        }
    }
}

fn worker_gone() -> TransportError {
    TransportError::Other("association worker stopped".to_string())
}

fn encode_error(e: impl std::fmt::Display) -> TransportError {
    TransportError::Other(format!("cannot encode command: {}", e))
}

#[async_trait]
impl Transport for DicomTransport {
    type Handle = DicomHandle;
    type Session = DicomSession;

    async fn connect(&self, endpoint: &Endpoint) -> Result<DicomSession, TransportError> {
        let setup = AssociationSetup {
            host: endpoint.host.clone(),
            port: endpoint.port,
            local_ae: endpoint.local_ae.clone(),
            remote_ae: endpoint.remote_ae.clone(),
            timeout: endpoint.association_timeout,
            contexts: self.contexts.clone(),
        };
        let (requests, inbox) = mpsc::unbounded_channel();
        let (ready, established) = oneshot::channel();
        thread::Builder::new()
            .name("dicom-association".to_string())
            .spawn(move || serve(setup, inbox, ready))?;

        let contexts = established
            .await
            .map_err(|_| worker_gone())?
            .map_err(TransportError::Rejected)?;
        info!(
            "Association {} -> {} at {}:{} established, {} presentation contexts accepted",
            endpoint.local_ae,
            endpoint.remote_ae,
            endpoint.host,
            endpoint.port,
            contexts.len()
        );

        Ok(DicomSession {
            requests,
            contexts,
            last_message_id: 0,
            closed: false,
        })
    }
}

/// One open association.
pub struct DicomSession {
    requests: mpsc::UnboundedSender<Request>,
    contexts: Vec<AcceptedContext>,
    last_message_id: u16,
    closed: bool,
}

impl DicomSession {
    fn next_message_id(&mut self) -> u16 {
        self.last_message_id = self.last_message_id.wrapping_add(1).max(1);
        self.last_message_id
    }

    /// Context to send a `sop_class` object stored as `file_ts`: the file's
    /// own syntax first, then any native syntax when the file is native.
    fn context_for(&self, sop_class: &str, file_ts: &str) -> Option<&AcceptedContext> {
        let candidates = self
            .contexts
            .iter()
            .filter(|pc| pc.abstract_syntax == sop_class);
        let mut fallback = None;
        for pc in candidates {
            if pc.transfer_syntax == file_ts {
                return Some(pc);
            }
            if fallback.is_none() && is_native(file_ts) && is_native(&pc.transfer_syntax) {
                fallback = Some(pc);
            }
        }
        fallback
    }

    async fn exchange(&mut self, pdus: Vec<Pdu>) -> Result<Pdu, TransportError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Exchange { pdus, reply })
            .map_err(|_| worker_gone())?;
        response
            .await
            .map_err(|_| worker_gone())?
            .map_err(TransportError::Other)
    }

    async fn close(&mut self, abort: bool) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let (reply, done) = oneshot::channel();
        self.requests
            .send(Request::Close { abort, reply })
            .map_err(|_| worker_gone())?;
        done.await
            .map_err(|_| worker_gone())?
            .map_err(TransportError::Other)
    }
}

fn command_pdu(context_id: u8, command: &InMemDicomObject) -> Result<Pdu, TransportError> {
    let mut data = Vec::new();
    command
        .write_dataset_with_ts(&mut data, &IMPLICIT_VR_LITTLE_ENDIAN.erased())
        .map_err(encode_error)?;
    Ok(Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id: context_id,
            value_type: PDataValueType::Command,
            is_last: true,
            data,
        }],
    })
}

fn data_set_pdus(context_id: u8, bytes: &[u8]) -> Vec<Pdu> {
    let fragment = |data: &[u8], is_last: bool| Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id: context_id,
            value_type: PDataValueType::Data,
            is_last,
            data: data.to_vec(),
        }],
    };
    if bytes.is_empty() {
        return vec![fragment(bytes, true)];
    }
    let count = (bytes.len() + MAX_FRAGMENT - 1) / MAX_FRAGMENT;
    bytes
        .chunks(MAX_FRAGMENT)
        .enumerate()
        .map(|(i, chunk)| fragment(chunk, i + 1 == count))
        .collect()
}

fn echo_command(message_id: u16) -> InMemDicomObject {
    InMemDicomObject::command_from_element_iter([
        DataElement::new(
            AFFECTED_SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from(VERIFICATION_SOP_CLASS),
        ),
        DataElement::new(COMMAND_FIELD, VR::US, PrimitiveValue::from(C_ECHO_RQ)),
        DataElement::new(MESSAGE_ID, VR::US, PrimitiveValue::from(message_id)),
        DataElement::new(COMMAND_DATA_SET_TYPE, VR::US, PrimitiveValue::from(NO_DATA_SET)),
    ])
}

fn store_command(message_id: u16, sop_class: &str, sop_instance: &str) -> InMemDicomObject {
    InMemDicomObject::command_from_element_iter([
        DataElement::new(AFFECTED_SOP_CLASS_UID, VR::UI, PrimitiveValue::from(sop_class)),
        DataElement::new(COMMAND_FIELD, VR::US, PrimitiveValue::from(C_STORE_RQ)),
        DataElement::new(MESSAGE_ID, VR::US, PrimitiveValue::from(message_id)),
        DataElement::new(PRIORITY, VR::US, PrimitiveValue::from(MEDIUM_PRIORITY)),
        DataElement::new(COMMAND_DATA_SET_TYPE, VR::US, PrimitiveValue::from(DATA_SET_PRESENT)),
        DataElement::new(
            AFFECTED_SOP_INSTANCE_UID,
            VR::UI,
            PrimitiveValue::from(sop_instance),
        ),
    ])
}

/// Status of the response command carried by `pdu`.
fn response_status(pdu: Pdu) -> Result<StatusCode, TransportError> {
    let data = match pdu {
        Pdu::PData { data } => data,
        Pdu::AbortRQ { .. } => {
            return Err(TransportError::Rejected(
                "association aborted by the remote".to_string(),
            ))
        }
        other => {
            return Err(TransportError::Other(format!(
                "unexpected PDU in response: {:?}",
                other
            )))
        }
    };
    let command = data
        .into_iter()
        .find(|pdv| pdv.value_type == PDataValueType::Command)
        .ok_or_else(|| TransportError::Other("response carries no command".to_string()))?;
    let object = InMemDicomObject::read_dataset_with_ts(
        command.data.as_slice(),
        &IMPLICIT_VR_LITTLE_ENDIAN.erased(),
    )
    .map_err(|e| TransportError::Other(format!("unreadable response command: {}", e)))?;
    let status = object
        .element(STATUS)
        .map_err(|e| TransportError::Other(format!("response without status: {}", e)))?
        .to_int::<u16>()
        .map_err(|e| TransportError::Other(format!("malformed status: {}", e)))?;
    Ok(StatusCode(status))
}

#[async_trait]
impl TransportSession for DicomSession {
    type Handle = DicomHandle;

    async fn probe(&mut self) -> Result<bool, TransportError> {
        let Some(context) = self
            .contexts
            .iter()
            .find(|pc| pc.abstract_syntax == VERIFICATION_SOP_CLASS)
        else {
            warn!("Remote did not accept the verification SOP class");
            return Ok(false);
        };
        let context_id = context.id;
        let message_id = self.next_message_id();
        let request = command_pdu(context_id, &echo_command(message_id))?;
        let status = response_status(self.exchange(vec![request]).await?)?;
        debug!("C-ECHO status {}", status);
        Ok(status.is_success())
    }

    async fn submit(
        &mut self,
        record: &Record<DicomHandle>,
        sink: StatusSink,
    ) -> Result<(), TransportError> {
        let object = record.handle().object();
        let meta = object.meta();
        let sop_class = meta.media_storage_sop_class_uid().to_string();
        let sop_instance = meta.media_storage_sop_instance_uid().to_string();

        let Some(context) = self.context_for(&sop_class, meta.transfer_syntax()) else {
            warn!(
                "No accepted presentation context for {} ({})",
                record.path().display(),
                sop_class
            );
            sink.deliver(StatusCode::SOP_CLASS_NOT_SUPPORTED);
            return Ok(());
        };
        let context_id = context.id;
        let encoded = match TransferSyntaxRegistry.get(&context.transfer_syntax) {
            Some(ts) => {
                let mut bytes = Vec::new();
                object
                    .write_dataset_with_ts(&mut bytes, ts)
                    .map(|()| bytes)
                    .map_err(|e| e.to_string())
            }
            None => Err(format!("unknown transfer syntax {}", context.transfer_syntax)),
        };
        let bytes = match encoded {
            Ok(bytes) => bytes,
            Err(reason) => {
                warn!("Cannot encode {}: {}", record.path().display(), reason);
                sink.deliver(StatusCode::CANNOT_UNDERSTAND);
                return Ok(());
            }
        };

        let message_id = self.next_message_id();
        let mut pdus = vec![command_pdu(
            context_id,
            &store_command(message_id, &sop_class, &sop_instance),
        )?];
        pdus.extend(data_set_pdus(context_id, &bytes));
        let status = response_status(self.exchange(pdus).await?)?;
        debug!("C-STORE {} -> {}", record.path().display(), status);
        sink.deliver(status);
        Ok(())
    }

    /// Each C-STORE waits for its response inside `submit`, so nothing is in
    /// flight here; the association is released, or aborted after `cancel`.
    async fn run(&mut self, cancel: CancellationToken) -> Result<(), TransportError> {
        self.close(cancel.is_cancelled()).await
    }
}
