use std::path::PathBuf;

use clap::Parser;
use qpeek_middleware::QueueKind;
use qpeek_snapshot::ExportFormat;

#[derive(Parser, Debug)]
#[command(name = "qpeek")]
#[command(about = "Non-destructive queue snapshot inspector")]
pub struct Args {
    /// Settings file mapping environments to connection strings
    #[arg(short, long, env = "QPEEK_SETTINGS", default_value = "appsettings.json")]
    pub settings: PathBuf,

    /// Environment to connect to (defaults to the first one configured)
    #[arg(short, long, env = "QPEEK_ENV")]
    pub env: Option<String>,

    /// List configured environments and exit
    #[arg(long)]
    pub list_envs: bool,

    /// Queue to peek
    #[arg(short, long, required_unless_present = "list_envs")]
    pub queue: Option<String>,

    /// Peek the queue's dead-letter sub-queue instead
    #[arg(long)]
    pub dead_letter: bool,

    /// Lowest sequence number to include (requires --max-seq)
    #[arg(long)]
    pub min_seq: Option<u64>,

    /// Highest sequence number to include (requires --min-seq)
    #[arg(long)]
    pub max_seq: Option<u64>,

    /// Show message bodies without truncation
    #[arg(long)]
    pub full_message: bool,

    /// Override the configured message truncation width
    #[arg(long)]
    pub width: Option<usize>,

    /// SQL to run against the snapshot as table `azq`; repeat to chain
    #[arg(long = "query", value_name = "SQL")]
    pub queries: Vec<String>,

    /// Write the final table to this file
    #[arg(long, value_name = "PATH")]
    pub export: Option<PathBuf>,

    /// Export format (csv or parquet); inferred from the extension if omitted
    #[arg(long)]
    pub format: Option<ExportFormat>,
}

impl Args {
    pub fn queue_kind(&self) -> QueueKind {
        if self.dead_letter {
            QueueKind::DeadLetter
        } else {
            QueueKind::Active
        }
    }

    pub fn export_format(&self) -> Option<ExportFormat> {
        let path = self.export.as_deref()?;
        Some(self.format.unwrap_or_else(|| ExportFormat::from_path(path)))
    }
}
