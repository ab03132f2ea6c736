use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dicom-sync")]
#[command(about = "Load, edit and check imaging studies before sending them to a PACS", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load a study folder and print the patient, image and series summary
    Load { folder: PathBuf },
    /// List the series of a study folder
    Series { folder: PathBuf },
    /// Back up a study folder, then overwrite patient fields in every file
    Edit(EditArgs),
    /// Back up a study folder, then anonymize every file
    Anonymize(AnonymizeArgs),
    /// Send every file of a study folder to the remote node (Ctrl-C stops)
    Send(SendArgs),
    /// Check that the remote node is reachable and answers a C-ECHO
    Echo(RemoteArgs),
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub folder: PathBuf,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub accession: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Birth date as dd/mm/yyyy
    #[arg(long)]
    pub birth_date: Option<String>,
    /// Study date as dd/mm/yyyy
    #[arg(long)]
    pub study_date: Option<String>,
}

#[derive(Debug, Args)]
pub struct AnonymizeArgs {
    pub folder: PathBuf,
    /// Patient ID to keep; a placeholder is used when omitted
    #[arg(long, default_value = "")]
    pub id: String,
    /// Accession number to keep; a placeholder is used when omitted
    #[arg(long, default_value = "")]
    pub accession: String,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    pub folder: PathBuf,
    #[command(flatten)]
    pub remote: RemoteArgs,
}

/// Overrides for the `[remote]` configuration section.
#[derive(Debug, Args)]
pub struct RemoteArgs {
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    /// Calling AE title
    #[arg(long)]
    pub local_ae: Option<String>,
    /// Called AE title
    #[arg(long)]
    pub remote_ae: Option<String>,
}
