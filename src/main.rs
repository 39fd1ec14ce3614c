//! stockfetch command-line front-end.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use stockfetch::{
    Config, DownloadOutcome, Event, FtpClient, ReconciliationEngine, RunReporter, RunSummary,
};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stockfetch", version, about = "Reconcile stock-archive drops from FTP")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "STOCKFETCH_CONFIG", default_value = "stockfetch.toml")]
    config: PathBuf,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// One headless pass
    Run {
        /// Do not send the run report
        #[arg(long)]
        no_notify: bool,
    },
    /// One pass with progress streamed to the terminal; Ctrl+C stops new downloads
    Watch {
        /// Do not send the run report
        #[arg(long)]
        no_notify: bool,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "stockfetch=debug"
    } else {
        "stockfetch=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (config, warnings) = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    for warning in &warnings {
        tracing::warn!(config = %cli.config.display(), "{warning}");
    }

    match cli.command {
        Command::CheckConfig => {
            println!(
                "{}: ok ({} categories, {} warnings)",
                cli.config.display(),
                config.categories.known.len(),
                warnings.len()
            );
            Ok(())
        }
        Command::Run { no_notify } => {
            let engine = build_engine(config, no_notify)?;
            let summary = stockfetch::run_until_signal(&engine).await?;
            print_totals(&summary);
            Ok(())
        }
        Command::Watch { no_notify } => {
            let engine = build_engine(config, no_notify)?;
            let summary = watch(engine).await?;
            print_totals(&summary);
            Ok(())
        }
    }
}

fn build_engine(config: Config, no_notify: bool) -> anyhow::Result<ReconciliationEngine> {
    let client = Arc::new(FtpClient::from_config(&config.transfer));
    let reporter = if no_notify {
        None
    } else {
        RunReporter::from_config(&config.notification)
    };
    let engine = ReconciliationEngine::new(config, client)?;
    Ok(match reporter {
        Some(reporter) => engine.with_reporter(reporter),
        None => engine,
    })
}

/// Run on a background task and print events until it finishes
async fn watch(engine: ReconciliationEngine) -> anyhow::Result<RunSummary> {
    let engine = Arc::new(engine);
    let mut events = engine.subscribe();
    let runner = Arc::clone(&engine);
    let mut handle = tokio::spawn(async move { stockfetch::run_until_signal(&runner).await });

    let summary = loop {
        tokio::select! {
            joined = &mut handle => break joined.context("engine task failed")??,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => eprintln!("... {missed} events not shown"),
                Err(RecvError::Closed) => {}
            },
        }
    };
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    Ok(summary)
}

fn print_event(event: &Event) {
    match event {
        Event::PhaseChanged { phase } => println!("== {phase}"),
        Event::Listed { entries } => println!("listed {entries} entries"),
        Event::LedgerLoaded { entries } => println!("ledger holds {entries} names"),
        Event::EntryFinished {
            name,
            category,
            outcome,
        } => {
            let category = category.as_ref().map(|c| c.as_str()).unwrap_or("-");
            match outcome {
                DownloadOutcome::Failed(reason) => println!("FAIL {name} [{category}]: {reason}"),
                other => println!("{:<27} {name} [{category}]", other.label()),
            }
        }
        Event::ExtractionFailed { name, error } => println!("extraction failed for {name}: {error}"),
        Event::NotificationSent { channel } => println!("report sent via {channel}"),
        Event::NotificationFailed { channel, error } => {
            println!("report via {channel} failed: {error}")
        }
        Event::RunFinished { .. } => {}
    }
}

fn print_totals(summary: &RunSummary) {
    let stats = &summary.statistics;
    println!(
        "{} downloaded, {} skipped, {} failed{}",
        stats.downloaded,
        stats.skipped,
        stats.failed,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
}
