#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dicom_sync_core::progress::ProgressReporter;
use dicom_sync_core::record::{Field, RecordHandle, RecordIo, RecordIoError};
use dicom_sync_core::transfer::{
    Endpoint, StatusCode, StatusSink, Transport, TransportError, TransportSession,
    TransferCounters, TransferOutcome,
};
use tokio_util::sync::CancellationToken;

pub const MAGIC: &str = "TEXTREC";

/// Line-oriented stand-in for the record library: a `TEXTREC` header line
/// followed by `Keyword=value` lines.
#[derive(Default)]
pub struct TextIo {
    fail_saves_for: HashSet<String>,
}

impl TextIo {
    pub fn failing_saves(names: &[&str]) -> Self {
        Self {
            fail_saves_for: names.iter().map(|n| n.to_string()).collect(),
        }
    }
}

#[derive(Debug)]
pub struct TextHandle {
    values: BTreeMap<Field, String>,
    fail_save: bool,
}

impl RecordIo for TextIo {
    type Handle = TextHandle;

    fn parse(&self, path: &Path) -> Result<TextHandle, RecordIoError> {
        let content = fs::read_to_string(path)?;
        let mut lines = content.lines();
        if lines.next() != Some(MAGIC) {
            return Err(RecordIoError::Parse {
                path: path.to_path_buf(),
                reason: "missing header".to_string(),
            });
        }

        let mut values = BTreeMap::new();
        for line in lines {
            if let Some((key, value)) = line.split_once('=') {
                if let Some(field) = Field::from_keyword(key) {
                    values.insert(field, value.to_string());
                }
            }
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(TextHandle {
            values,
            fail_save: self.fail_saves_for.contains(&name),
        })
    }
}

impl RecordHandle for TextHandle {
    fn get(&self, field: Field) -> Option<String> {
        self.values.get(&field).cloned()
    }

    fn set(&mut self, field: Field, value: &str) {
        self.values.insert(field, value.to_string());
    }

    fn remove(&mut self, field: Field) {
        self.values.remove(&field);
    }

    fn save(&self, path: &Path) -> Result<(), RecordIoError> {
        if self.fail_save {
            return Err(RecordIoError::Save {
                path: path.to_path_buf(),
                reason: "device is read-only".to_string(),
            });
        }
        fs::write(path, render(&self.values))?;
        Ok(())
    }
}

fn render(values: &BTreeMap<Field, String>) -> String {
    let mut out = format!("{}\n", MAGIC);
    for (field, value) in values {
        out.push_str(&format!("{}={}\n", field.keyword(), value));
    }
    out
}

pub fn write_record(path: &Path, fields: &[(Field, &str)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let values: BTreeMap<Field, String> = fields
        .iter()
        .map(|(f, v)| (*f, v.to_string()))
        .collect();
    fs::write(path, render(&values)).unwrap();
}

pub fn read_field(path: &Path, field: Field) -> Option<String> {
    let content = fs::read_to_string(path).unwrap();
    let prefix = format!("{}=", field.keyword());
    content
        .lines()
        .find_map(|line| line.strip_prefix(&prefix).map(str::to_string))
}

/// Study folder with `count` records: `img1.rec`..`imgN.rec`, all in series
/// `S1`, patient `DOE^JANE`.
pub fn create_study(root: &Path, count: usize) -> PathBuf {
    let study = root.join("STUDY_01");
    for i in 1..=count {
        let sop = format!("1.2.840.{}", i);
        write_record(
            &study.join(format!("img{}.rec", i)),
            &[
                (Field::PatientName, "DOE^JANE"),
                (Field::PatientId, "P-001"),
                (Field::AccessionNumber, "ACC-9"),
                (Field::StudyDescription, "CHEST"),
                (Field::PatientBirthDate, "19800215"),
                (Field::StudyDate, "20240110"),
                (Field::SeriesInstanceUid, "S1"),
                (Field::SeriesDescription, "AXIAL"),
                (Field::SopInstanceUid, &sop),
                (Field::PatientSex, "F"),
                (Field::InstitutionName, "GENERAL HOSPITAL"),
            ],
        );
    }
    study
}

/// Records every progress call it receives.
#[derive(Default)]
pub struct RecordingReporter {
    pub ingest: Mutex<Vec<(usize, usize)>>,
    pub backup: Mutex<Vec<(usize, usize)>>,
    pub update: Mutex<Vec<(usize, usize)>>,
    pub outcomes: Mutex<Vec<(usize, TransferCounters)>>,
}

impl ProgressReporter for RecordingReporter {
    fn on_ingest_progress(&self, attempted: usize, total: usize) {
        self.ingest.lock().unwrap().push((attempted, total));
    }

    fn on_backup_progress(&self, done: usize, total: usize) {
        self.backup.lock().unwrap().push((done, total));
    }

    fn on_update_progress(&self, done: usize, total: usize) {
        self.update.lock().unwrap().push((done, total));
    }

    fn on_transfer_outcome(&self, outcome: &TransferOutcome, counters: &TransferCounters) {
        self.outcomes.lock().unwrap().push((outcome.index, *counters));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Status delivered inside `submit`.
    Immediate,
    /// Statuses delivered during `run`, last submitted first.
    Reversed,
    /// Each status delivered from its own spawned task.
    Spawned,
}

/// Scripted transport. Item `i` gets `statuses[i]` (success when absent).
#[derive(Clone)]
pub struct ScriptedTransport {
    pub statuses: Vec<StatusCode>,
    pub delivery: Delivery,
    pub refuse_connect: bool,
    pub fail_run: bool,
    pub echo: bool,
    /// Fires the token once this many items have been submitted.
    pub cancel_after: Option<(usize, CancellationToken)>,
    pub submitted: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedTransport {
    pub fn new(statuses: Vec<StatusCode>, delivery: Delivery) -> Self {
        Self {
            statuses,
            delivery,
            refuse_connect: false,
            fail_run: false,
            echo: true,
            cancel_after: None,
            submitted: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct ScriptedSession {
    script: ScriptedTransport,
    pending: Vec<(StatusSink, StatusCode)>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Handle = TextHandle;
    type Session = ScriptedSession;

    async fn connect(&self, _endpoint: &Endpoint) -> Result<ScriptedSession, TransportError> {
        if self.refuse_connect {
            return Err(TransportError::Rejected("called AE title not recognized".to_string()));
        }
        Ok(ScriptedSession {
            script: self.clone(),
            pending: Vec::new(),
        })
    }
}

#[async_trait]
impl TransportSession for ScriptedSession {
    type Handle = TextHandle;

    async fn probe(&mut self) -> Result<bool, TransportError> {
        Ok(self.script.echo)
    }

    async fn submit(
        &mut self,
        _record: &dicom_sync_core::Record<TextHandle>,
        sink: StatusSink,
    ) -> Result<(), TransportError> {
        let index = sink.index();
        let status = self
            .script
            .statuses
            .get(index)
            .copied()
            .unwrap_or(StatusCode::SUCCESS);

        let count = {
            let mut submitted = self.script.submitted.lock().unwrap();
            submitted.push(index);
            submitted.len()
        };

        match self.script.delivery {
            Delivery::Immediate => sink.deliver(status),
            Delivery::Reversed => self.pending.push((sink, status)),
            Delivery::Spawned => {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    sink.deliver(status);
                });
            }
        }

        if let Some((after, token)) = &self.script.cancel_after {
            if count >= *after {
                token.cancel();
            }
        }
        Ok(())
    }

    async fn run(&mut self, _cancel: CancellationToken) -> Result<(), TransportError> {
        if self.script.fail_run {
            return Err(TransportError::Other("connection reset by peer".to_string()));
        }
        while let Some((sink, status)) = self.pending.pop() {
            sink.deliver(status);
        }
        Ok(())
    }
}

pub fn local_endpoint(port: u16) -> Endpoint {
    Endpoint {
        host: "127.0.0.1".to_string(),
        port,
        local_ae: "DICOMSYNC".to_string(),
        remote_ae: "TEST-SCP".to_string(),
        association_timeout: std::time::Duration::from_secs(5),
    }
}
