//! qpeek: queue snapshot inspector
//!
//! Peeks a queue (or its dead-letter sub-queue) without consuming anything,
//! prints the snapshot as a grid, optionally narrows it with SQL against
//! the `azq` table, and exports the final table to CSV or Parquet.

mod cli;

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Args;
use qpeek_metadata::Settings;
use qpeek_snapshot::{LoadRequest, PeekWindow, Session};

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr so stdout carries only the grid
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Snapshot errors carry their cause for the log only
            match e.downcast_ref::<qpeek_snapshot::Error>() {
                Some(err) => eprintln!("{}", err.user_message()),
                None => eprintln!("{:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings = Settings::load(&args.settings)
        .with_context(|| format!("failed to load settings from {}", args.settings.display()))?;

    if args.list_envs {
        for env in settings.environments() {
            println!("{}", env);
        }
        return Ok(());
    }

    let environment = match &args.env {
        Some(env) => env.clone(),
        None => settings
            .default_environment()
            .context("no environments configured")?
            .to_string(),
    };
    let window = PeekWindow::from_bounds(args.min_seq, args.max_seq)?;

    let mut session = Session::new(settings)?;
    {
        let display = session.display_options_mut();
        display.full_message = args.full_message;
        if let Some(width) = args.width {
            display.truncate_width = width;
        }
    }

    let request = LoadRequest::new(
        environment,
        args.queue.clone().unwrap_or_default(),
        args.queue_kind(),
        window,
    );
    let rows = session.load(&request).await?.num_rows();
    info!(rows, "Loaded {} messages", rows);
    print_table(&session)?;

    for sql in &args.queries {
        match session.run_query(sql) {
            Ok(_) => print_table(&session)?,
            Err(e) => {
                error!(query = %sql, "Query failed");
                return Err(e.into());
            }
        }
    }

    if let (Some(path), Some(format)) = (args.export.as_deref(), args.export_format()) {
        let summary = session.export(path, format)?;
        println!(
            "Exported {} rows to {} ({} bytes)",
            summary.rows,
            summary.path.display(),
            summary.bytes
        );
    }
    Ok(())
}

fn print_table(session: &Session) -> anyhow::Result<()> {
    match session.render()? {
        Some(grid) => println!("{}", grid),
        None => println!("Queue is empty."),
    }
    Ok(())
}
