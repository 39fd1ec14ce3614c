//! Reconciliation engine
//!
//! One run lists the remote directory once, dispatches a download task per entry onto a
//! bounded pool and collects every outcome exactly once in a single collector, which
//! owns the statistics and the run log. Listing and ledger-load failures abort the run
//! before anything is dispatched; everything after that is reported per entry.
//!
//! Submodules:
//! - [`download_task`] - per-entry lifecycle (probe, classify, fetch, record, extract)
//! - [`run_log`] - append-only run log written by the collector

mod download_task;
mod run_log;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::{Error, Result, TransferError};
use crate::ledger::Ledger;
use crate::reporter::{RunReporter, format_summary};
use crate::retry::with_retry;
use crate::transfer::TransferClient;
use crate::types::{DownloadOutcome, Event, RemoteEntry, RunPhase, RunStatistics};
use download_task::{DownloadTaskContext, TaskResult, run_download_task};
use futures::stream::{self, StreamExt};
use run_log::RunLog;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of a completed run
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Aggregated counters
    pub statistics: RunStatistics,
    /// Every entry with its outcome, in completion order
    pub outcomes: Vec<(String, DownloadOutcome)>,
    /// Whether cancellation was requested before the run finished
    pub cancelled: bool,
    /// Run-log file the summary was appended to
    pub run_log: PathBuf,
}

/// Drives reconciliation runs against one remote endpoint
pub struct ReconciliationEngine {
    config: Arc<Config>,
    client: Arc<dyn TransferClient>,
    classifier: Arc<Classifier>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
    reporter: Option<RunReporter>,
}

impl ReconciliationEngine {
    /// Engine for `config`, fetching through `client`.
    ///
    /// Fails when the classifier cannot be built from the `[categories]` section.
    pub fn new(config: Config, client: Arc<dyn TransferClient>) -> Result<Self> {
        let classifier = Classifier::from_config(&config.categories)?;
        // Buffer generously; a slow subscriber lags instead of stalling the run
        let (event_tx, _rx) = broadcast::channel(1000);
        Ok(Self {
            config: Arc::new(config),
            client,
            classifier: Arc::new(classifier),
            event_tx,
            cancel_token: CancellationToken::new(),
            reporter: None,
        })
    }

    /// Send the run log through `reporter` after each run
    pub fn with_reporter(mut self, reporter: RunReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops new tasks from starting when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Request cancellation. In-flight tasks finish; queued ones report `Cancelled`.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Shared configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    fn emit(&self, event: Event) {
        // no subscribers is fine
        self.event_tx.send(event).ok();
    }

    fn enter(&self, phase: RunPhase) {
        debug!(%phase, "run phase");
        self.emit(Event::PhaseChanged { phase });
    }

    /// Run one reconciliation pass.
    ///
    /// Returns an error only for run-level failures: the remote directory cannot be
    /// listed, a ledger cannot be read or the run log cannot be opened. Per-entry
    /// failures are part of the returned [`RunSummary`].
    pub async fn run(&self) -> Result<RunSummary> {
        self.enter(RunPhase::Listing);
        let entries = match self.list_remote().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(endpoint = %self.client.endpoint(), error = %e, "listing failed, nothing dispatched");
                return Err(e.into());
            }
        };
        info!(entries = entries.len(), "remote directory listed");
        self.emit(Event::Listed {
            entries: entries.len(),
        });

        let ledger = Ledger::load_for(&self.config, self.classifier.categories()).await?;
        self.emit(Event::LedgerLoaded {
            entries: ledger.len(),
        });

        let mut run_log = RunLog::open(self.config.run_log_path(), entries.len())
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "cannot open run log {}: {e}",
                        self.config.run_log_path().display()
                    ),
                ))
            })?;

        let ctx = Arc::new(DownloadTaskContext {
            config: Arc::clone(&self.config),
            client: Arc::clone(&self.client),
            classifier: Arc::clone(&self.classifier),
            ledger: Arc::new(ledger),
            event_tx: self.event_tx.clone(),
            cancel_token: self.cancel_token.clone(),
        });
        let width = self.config.download.concurrency.max(1);

        self.enter(RunPhase::Dispatching);
        // Tasks are spawned lazily as pool slots free up, in listing order
        let mut results = stream::iter(entries)
            .map(|entry| dispatch(Arc::clone(&ctx), entry))
            .buffer_unordered(width);

        self.enter(RunPhase::Collecting);
        let mut statistics = RunStatistics::default();
        let mut outcomes = Vec::new();
        let mut cancel_seen = false;

        while let Some(result) = results.next().await {
            if !cancel_seen && self.cancel_token.is_cancelled() {
                cancel_seen = true;
                info!("cancellation requested, no further tasks will start");
                self.enter(RunPhase::Cancelled);
            }
            self.collect(result, &mut statistics, &mut outcomes, &mut run_log)
                .await;
        }
        let cancelled = cancel_seen || self.cancel_token.is_cancelled();

        self.enter(RunPhase::Reporting);
        let summary = format_summary(&statistics);
        info!(
            downloaded = statistics.downloaded,
            skipped = statistics.skipped,
            failed = statistics.failed,
            cancelled,
            "run finished"
        );
        if let Err(e) = run_log.finish(&summary).await {
            warn!(path = %run_log.path().display(), error = %e, "cannot write run summary");
        }
        if let Some(reporter) = &self.reporter {
            reporter.send(run_log.path(), &summary, &self.event_tx).await;
        }

        self.enter(RunPhase::Done);
        self.emit(Event::RunFinished {
            statistics,
            cancelled,
        });

        Ok(RunSummary {
            statistics,
            outcomes,
            cancelled,
            run_log: run_log.path().to_path_buf(),
        })
    }

    /// Connect, enumerate and disconnect
    async fn list_remote(&self) -> std::result::Result<Vec<RemoteEntry>, TransferError> {
        let client = &self.client;
        let mut session = with_retry(&self.config.retry, || client.connect()).await?;
        let listed = session.list_entries().await;
        if let Err(e) = session.disconnect().await {
            debug!(error = %e, "disconnect after listing failed");
        }
        listed
    }

    async fn collect(
        &self,
        result: TaskResult,
        statistics: &mut RunStatistics,
        outcomes: &mut Vec<(String, DownloadOutcome)>,
        run_log: &mut RunLog,
    ) {
        let TaskResult {
            name,
            category,
            outcome,
        } = result;

        match &outcome {
            DownloadOutcome::Failed(reason) => {
                warn!(entry = %name, reason = %reason, "entry failed")
            }
            other => debug!(entry = %name, outcome = %other, "entry finished"),
        }

        statistics.record(&outcome);
        if let Err(e) = run_log.record(&name, category.as_ref(), &outcome).await {
            warn!(entry = %name, error = %e, "cannot write run log line");
        }
        self.emit(Event::EntryFinished {
            name: name.clone(),
            category,
            outcome: outcome.clone(),
        });
        outcomes.push((name, outcome));
    }
}

/// Start one entry's task on the runtime once a pool slot is free.
///
/// A panicking task is reported as `Failed` with its panic message.
async fn dispatch(ctx: Arc<DownloadTaskContext>, entry: RemoteEntry) -> TaskResult {
    if ctx.cancel_token.is_cancelled() {
        return TaskResult::cancelled(entry.name);
    }
    let name = entry.name.clone();
    match tokio::spawn(run_download_task(ctx, entry)).await {
        Ok(result) => result,
        Err(e) => {
            let reason = join_failure(e);
            error!(entry = %name, reason = %reason, "download task died");
            TaskResult {
                name,
                category: None,
                outcome: DownloadOutcome::Failed(reason),
            }
        }
    }
}

fn join_failure(e: tokio::task::JoinError) -> String {
    if !e.is_panic() {
        return format!("task aborted: {e}");
    }
    let payload = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    format!("task panicked: {message}")
}
