mod common;

use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use common::{create_study, local_endpoint, Delivery, RecordingReporter, ScriptedTransport, TextIo};
use dicom_sync_core::record::RecordStore;
use dicom_sync_core::scanner::{ingest_folder, WalkFilter};
use dicom_sync_core::transfer::{
    run_transfer, verify_connection, StatusCategory, StatusCode, TransferOptions, TransferState,
};
use dicom_sync_core::{Error, SilentReporter};

fn no_precheck() -> TransferOptions {
    TransferOptions {
        precheck: false,
        ..Default::default()
    }
}

fn load(count: usize) -> (tempfile::TempDir, RecordStore<common::TextHandle>) {
    let tmp = tempdir().unwrap();
    let study = create_study(tmp.path(), count);
    let store = ingest_folder(&TextIo::default(), &study, &WalkFilter::default(), &SilentReporter)
        .unwrap()
        .records;
    (tmp, store)
}

fn third_fails() -> Vec<StatusCode> {
    vec![
        StatusCode::SUCCESS,
        StatusCode::SUCCESS,
        StatusCode(0xC001),
        StatusCode::SUCCESS,
        StatusCode::SUCCESS,
    ]
}

#[tokio::test]
async fn test_one_rejected_item_out_of_five() {
    let (_tmp, store) = load(5);
    let transport = ScriptedTransport::new(third_fails(), Delivery::Immediate);
    let reporter = RecordingReporter::default();

    let report = run_transfer(
        &transport,
        store.as_slice(),
        &local_endpoint(104),
        &no_precheck(),
        &CancellationToken::new(),
        &reporter,
    )
    .await
    .unwrap();

    assert_eq!(report.state, TransferState::Completed);
    assert_eq!(report.counters.submitted, 5);
    assert_eq!(report.counters.succeeded, 4);
    assert_eq!(report.counters.failed, 1);
    assert_eq!(report.outcomes.len(), 5);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 2);
    assert_eq!(failures[0].status, StatusCode(0xC001));
    assert_eq!(
        failures[0].cause,
        Some(StatusCategory::UnsupportedSyntaxOrResources)
    );
    assert_eq!(failures[0].sop_instance_uid.as_deref(), Some("1.2.840.3"));

    let calls = reporter.outcomes.lock().unwrap().clone();
    assert_eq!(calls.len(), 5);
    let last = calls.last().unwrap().1;
    assert_eq!((last.succeeded, last.failed), (4, 1));
}

#[tokio::test]
async fn test_outcomes_are_logged_in_arrival_order() {
    let (_tmp, store) = load(5);
    let transport = ScriptedTransport::new(third_fails(), Delivery::Reversed);

    let report = run_transfer(
        &transport,
        store.as_slice(),
        &local_endpoint(104),
        &no_precheck(),
        &CancellationToken::new(),
        &SilentReporter,
    )
    .await
    .unwrap();

    let order: Vec<usize> = report.outcomes.iter().map(|o| o.index).collect();
    assert_eq!(order, vec![4, 3, 2, 1, 0]);
    assert_eq!(*transport.submitted.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert_eq!((report.counters.succeeded, report.counters.failed), (4, 1));
}

#[tokio::test]
async fn test_statuses_delivered_from_other_tasks_are_aggregated() {
    let (_tmp, store) = load(5);
    let transport = ScriptedTransport::new(third_fails(), Delivery::Spawned);

    let report = run_transfer(
        &transport,
        store.as_slice(),
        &local_endpoint(104),
        &no_precheck(),
        &CancellationToken::new(),
        &SilentReporter,
    )
    .await
    .unwrap();

    assert_eq!(report.counters.settled(), 5);
    assert_eq!((report.counters.succeeded, report.counters.failed), (4, 1));
}

#[tokio::test]
async fn test_cancellation_stops_submission_but_keeps_in_flight_outcomes() {
    let (_tmp, store) = load(5);
    let cancel = CancellationToken::new();
    let mut transport = ScriptedTransport::new(Vec::new(), Delivery::Reversed);
    transport.cancel_after = Some((2, cancel.clone()));

    let report = run_transfer(
        &transport,
        store.as_slice(),
        &local_endpoint(104),
        &no_precheck(),
        &cancel,
        &SilentReporter,
    )
    .await
    .unwrap();

    assert_eq!(report.state, TransferState::Cancelled);
    assert_eq!(*transport.submitted.lock().unwrap(), vec![0, 1]);
    assert_eq!(report.counters.submitted, 2);
    // Both statuses arrive after cancellation and still count.
    assert_eq!(report.counters.succeeded, 2);
    assert_eq!(report.outcomes.len(), 2);
}

#[tokio::test]
async fn test_cancelled_before_start_submits_nothing() {
    let (_tmp, store) = load(3);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let transport = ScriptedTransport::new(Vec::new(), Delivery::Immediate);

    let report = run_transfer(
        &transport,
        store.as_slice(),
        &local_endpoint(104),
        &no_precheck(),
        &cancel,
        &SilentReporter,
    )
    .await
    .unwrap();

    assert_eq!(report.state, TransferState::Cancelled);
    assert_eq!(report.counters, Default::default());
    assert!(transport.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_refused_session_is_a_connectivity_error() {
    let (_tmp, store) = load(2);
    let mut transport = ScriptedTransport::new(Vec::new(), Delivery::Immediate);
    transport.refuse_connect = true;

    let result = run_transfer(
        &transport,
        store.as_slice(),
        &local_endpoint(104),
        &no_precheck(),
        &CancellationToken::new(),
        &SilentReporter,
    )
    .await;

    assert!(matches!(result, Err(Error::Connect { .. })));
    assert!(transport.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_session_failure_is_critical() {
    let (_tmp, store) = load(2);
    let mut transport = ScriptedTransport::new(Vec::new(), Delivery::Reversed);
    transport.fail_run = true;

    let result = run_transfer(
        &transport,
        store.as_slice(),
        &local_endpoint(104),
        &no_precheck(),
        &CancellationToken::new(),
        &SilentReporter,
    )
    .await;

    assert!(matches!(result, Err(Error::Session(_))));
}

#[tokio::test]
async fn test_precheck_reports_unreachable_remote() {
    let (_tmp, store) = load(1);
    // Bind then release a port so nothing is listening on it.
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let transport = ScriptedTransport::new(Vec::new(), Delivery::Immediate);

    let result = run_transfer(
        &transport,
        store.as_slice(),
        &local_endpoint(port),
        &TransferOptions::default(),
        &CancellationToken::new(),
        &SilentReporter,
    )
    .await;

    assert!(matches!(result, Err(Error::Unreachable { .. })));
    assert!(transport.submitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_precheck_passes_for_listening_remote() {
    let (_tmp, store) = load(2);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let transport = ScriptedTransport::new(Vec::new(), Delivery::Immediate);

    let report = run_transfer(
        &transport,
        store.as_slice(),
        &local_endpoint(port),
        &TransferOptions::default(),
        &CancellationToken::new(),
        &SilentReporter,
    )
    .await
    .unwrap();

    assert_eq!(report.counters.succeeded, 2);
}

#[tokio::test]
async fn test_verify_connection_levels() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let timeout = std::time::Duration::from_secs(3);

    let mut transport = ScriptedTransport::new(Vec::new(), Delivery::Immediate);
    let check = verify_connection(&transport, &local_endpoint(port), timeout).await;
    assert!(check.reachable);
    assert!(check.echo_ok);

    transport.echo = false;
    let check = verify_connection(&transport, &local_endpoint(port), timeout).await;
    assert!(check.reachable);
    assert!(!check.echo_ok);

    drop(listener);
    let check = verify_connection(&transport, &local_endpoint(port), timeout).await;
    assert!(!check.reachable);
}
