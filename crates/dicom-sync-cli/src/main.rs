mod commands;
mod logging;
mod progress;

use std::path::Path;
use std::process;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{AnonymizeArgs, Cli, Commands, EditArgs, RemoteArgs, SendArgs};
use dicom_sync_core::edit::EditRequest;
use dicom_sync_core::transfer::{self, DicomTransport, Endpoint, TransferReport, TransferState};
use dicom_sync_core::{AppConfig, DicomFileIo, PatientSummary, StudySession};
use dotenv::dotenv;
use progress::CliReporter;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

type Session = StudySession<DicomFileIo>;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match dicom_sync_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Load { folder }) => run_load(&config, &folder),
        Some(Commands::Series { folder }) => run_series(&config, &folder),
        Some(Commands::Edit(edit)) => run_edit(&config, edit),
        Some(Commands::Anonymize(anon)) => run_anonymize(&config, anon),
        Some(Commands::Send(send)) => run_send(&config, send).await,
        Some(Commands::Echo(remote)) => run_echo(&config, remote).await,
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

fn open_study(config: &AppConfig, folder: &Path, reporter: &CliReporter) -> Result<Session> {
    let mut session = StudySession::new(DicomFileIo, config.clone());
    let summary = session
        .load(folder, reporter)
        .with_context(|| format!("cannot load {}", folder.display()))?;

    for entry in &summary.excluded {
        warn!("Skipped {}: {}", entry.path.display(), entry.reason);
    }
    if summary.loaded == 0 {
        warn!("No records found in {}", folder.display());
    }
    Ok(session)
}

fn print_patient(patient: &PatientSummary) {
    println!("{}", "Patient".bold());
    println!("  Name:        {}", patient.name.cyan());
    println!("  ID:          {}", patient.id.cyan());
    println!("  Accession:   {}", patient.accession_number.cyan());
    println!("  Description: {}", patient.study_description.cyan());
    println!("  Birth date:  {}", patient.birth_date.cyan());
    println!("  Study date:  {}", patient.study_date.cyan());
}

fn print_series(session: &Session) {
    let groups = session.series();
    println!("{} ({})", "Series".bold(), groups.len());
    for group in &groups {
        println!(
            "  {}  {}  {} images",
            group.series_uid.yellow(),
            group.description.as_deref().unwrap_or("-"),
            format!("{}", group.image_count()).green(),
        );
    }
}

fn run_load(config: &AppConfig, folder: &Path) -> Result<()> {
    let reporter = CliReporter::new();
    let session = open_study(config, folder, &reporter)?;

    println!();
    if let Some(patient) = session.patient() {
        print_patient(&patient);
    }
    let items = session.records().items();
    println!("{} ({})", "Images".bold(), items.len());
    for item in &items {
        println!("  {}  {}", item.file_name, item.series_uid.dimmed());
    }
    print_series(&session);

    Ok(())
}

fn run_series(config: &AppConfig, folder: &Path) -> Result<()> {
    let reporter = CliReporter::new();
    let session = open_study(config, folder, &reporter)?;
    println!();
    print_series(&session);
    Ok(())
}

fn run_edit(config: &AppConfig, args: EditArgs) -> Result<()> {
    let reporter = CliReporter::new();
    let mut session = open_study(config, &args.folder, &reporter)?;

    let Some(mut values) = session.patient() else {
        bail!("nothing to edit in {}", args.folder.display());
    };
    if let Some(name) = args.name {
        values.name = name;
    }
    if let Some(id) = args.id {
        values.id = id;
    }
    if let Some(accession) = args.accession {
        values.accession_number = accession;
    }
    if let Some(description) = args.description {
        values.study_description = description;
    }
    if let Some(birth_date) = args.birth_date {
        values.birth_date = birth_date;
    }
    if let Some(study_date) = args.study_date {
        values.study_date = study_date;
    }

    let report = session.edit(&EditRequest::update(values), &reporter)?;
    print_edit_outcome(&report);
    Ok(())
}

fn run_anonymize(config: &AppConfig, args: AnonymizeArgs) -> Result<()> {
    let reporter = CliReporter::new();
    let mut session = open_study(config, &args.folder, &reporter)?;

    let values = PatientSummary {
        id: args.id,
        accession_number: args.accession,
        ..PatientSummary::default()
    };
    let report = session.edit(&EditRequest::anonymize(values), &reporter)?;
    print_edit_outcome(&report);
    Ok(())
}

fn print_edit_outcome(report: &dicom_sync_core::edit::EditReport) {
    info!(
        "Backup in {} ({} copied, {} already present)",
        report.backup.folder.display(),
        format!("{}", report.backup.copied).green(),
        report.backup.already_present,
    );
    if report.is_complete() {
        info!(
            "{} of {} files updated",
            format!("{}", report.committed).green(),
            report.requested
        );
    } else {
        for failure in &report.failures {
            error!("{}: {}", failure.path.display(), failure.reason);
        }
        warn!(
            "{} of {} files updated, {} failed",
            report.committed,
            report.requested,
            format!("{}", report.failures.len()).red(),
        );
    }
}

fn endpoint_for(config: &AppConfig, args: RemoteArgs) -> Endpoint {
    let mut endpoint = config.remote.endpoint();
    if let Some(host) = args.host {
        endpoint.host = host;
    }
    if let Some(port) = args.port {
        endpoint.port = port;
    }
    if let Some(local_ae) = args.local_ae {
        endpoint.local_ae = local_ae;
    }
    if let Some(remote_ae) = args.remote_ae {
        endpoint.remote_ae = remote_ae;
    }
    endpoint
}

async fn run_send(config: &AppConfig, args: SendArgs) -> Result<()> {
    let reporter = CliReporter::new();
    let session = open_study(config, &args.folder, &reporter)?;
    if session.records().is_empty() {
        bail!("nothing to send from {}", args.folder.display());
    }

    let endpoint = endpoint_for(config, args.remote);
    let transport = DicomTransport::for_records(session.records().as_slice());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for images already in flight");
            on_interrupt.cancel();
        }
    });

    let report = session
        .transfer(&transport, &endpoint, &cancel, &reporter)
        .await?;
    print_transfer_report(&report);

    if report.counters.failed > 0 {
        bail!("{} images were not stored", report.counters.failed);
    }
    Ok(())
}

fn print_transfer_report(report: &TransferReport) {
    println!();
    println!("{} ({})", "Outcomes".bold(), report.outcomes.len());
    for outcome in &report.outcomes {
        let file = outcome
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let status = match &outcome.cause {
            None => format!("{}", outcome.status).green(),
            Some(cause) => format!("{} {}", outcome.status, cause).red(),
        };
        println!(
            "  {}  {}  {}  {}",
            outcome.received_at.format("%H:%M:%S").to_string().dimmed(),
            file,
            outcome.sop_instance_uid.as_deref().unwrap_or("-").dimmed(),
            status
        );
    }

    let state = match report.state {
        TransferState::Completed => "completed".green(),
        TransferState::Cancelled => "cancelled".yellow(),
    };
    info!(
        "Transfer {}: {} stored, {} failed, {} submitted",
        state,
        format!("{}", report.counters.succeeded).green(),
        format!("{}", report.counters.failed).red(),
        report.counters.submitted
    );
}

async fn run_echo(config: &AppConfig, args: RemoteArgs) -> Result<()> {
    let endpoint = endpoint_for(config, args);
    let check = transfer::verify_connection(
        &DicomTransport::default(),
        &endpoint,
        config.remote.probe_timeout(),
    )
    .await;

    if check.echo_ok {
        info!(
            "{} {}:{} answered C-ECHO: {}",
            "OK".green(),
            endpoint.host,
            endpoint.port,
            check.message
        );
        Ok(())
    } else if check.reachable {
        bail!("{}:{} is reachable but {}", endpoint.host, endpoint.port, check.message)
    } else {
        bail!("{}", check.message)
    }
}
