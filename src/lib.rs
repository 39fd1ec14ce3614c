//! # stockfetch
//!
//! Idempotent reconciliation of a remote FTP drop directory into per-provider local
//! folders.
//!
//! Stock agencies drop archives named `<provider>_<id>.<ext>` into one remote
//! directory. Each run lists that directory once, sorts every entry into a provider
//! category by its name prefix, downloads what the category's ledger has not seen yet,
//! records each success in the ledger, optionally unpacks `.zip` archives, and sends a
//! run report.
//!
//! ## Design
//!
//! - **Idempotent** - the per-category ledger is the only record of what was fetched;
//!   re-running never downloads an entry twice
//! - **Bounded** - downloads run on a fixed-width pool, one transfer session per task
//! - **Event-driven** - front-ends subscribe to [`Event`]s instead of polling
//! - **Fault-isolated** - a failing or panicking entry never takes its siblings down
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockfetch::{Config, FtpClient, ReconciliationEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let client = Arc::new(FtpClient::from_config(&config.transfer));
//!     let engine = ReconciliationEngine::new(config, client)?;
//!
//!     let mut events = engine.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let summary = engine.run().await?;
//!     println!("{} downloaded", summary.statistics.downloaded);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Filename classification into provider categories
pub mod classifier;
/// Configuration types
pub mod config;
/// Reconciliation engine and download tasks
pub mod engine;
/// Error types
pub mod error;
/// Archive extraction
pub mod extraction;
/// Per-category download ledger
pub mod ledger;
/// Run report delivery
pub mod reporter;
/// Retry logic with exponential backoff
pub mod retry;
/// Remote transfer capability
pub mod transfer;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use classifier::{Classifier, Rejection};
pub use config::Config;
pub use engine::{ReconciliationEngine, RunSummary};
pub use error::{
    Error, ExtractionError, LedgerError, NotificationError, Result, TransferError,
};
pub use ledger::Ledger;
pub use reporter::{Notifier, RunReporter};
#[cfg(any(test, feature = "test-utils"))]
pub use transfer::MemoryTransferClient;
pub use transfer::{FtpClient, TransferClient, TransferSession};
pub use types::{Category, DownloadOutcome, Event, RemoteEntry, RunPhase, RunStatistics};

/// Run the engine once, cancelling it on a termination signal.
///
/// A signal stops new downloads from starting; downloads already running finish and
/// the run completes normally with the remaining entries reported as cancelled.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use stockfetch::{Config, FtpClient, ReconciliationEngine, run_until_signal};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let client = Arc::new(FtpClient::from_config(&config.transfer));
///     let engine = ReconciliationEngine::new(config, client)?;
///
///     let summary = run_until_signal(&engine).await?;
///     println!("cancelled: {}", summary.cancelled);
///     Ok(())
/// }
/// ```
pub async fn run_until_signal(engine: &ReconciliationEngine) -> Result<RunSummary> {
    let run = engine.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        _ = wait_for_signal() => {
            tracing::info!("stop requested, waiting for running downloads");
            engine.cancel();
        }
    }
    run.await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "no SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("received SIGTERM");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "no SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("received SIGINT");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "no signal handlers, falling back to ctrl_c");
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
            // never resolve, the run ends on its own
            std::future::pending::<()>().await;
        }
    }
}
