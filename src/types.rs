//! Core types for stockfetch

use serde::{Deserialize, Serialize};
use std::fmt;

/// One name reported by the remote listing
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Entry name, case-sensitive; this is the entry's identity
    pub name: String,
    /// Known to be a directory from listing metadata. Listings without type
    /// information report `false` and leave the decision to the directory probe.
    pub is_directory: bool,
}

impl RemoteEntry {
    /// A plain file entry
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
        }
    }

    /// An entry the listing already marked as a directory
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
        }
    }
}

/// A configured classification bucket, stored lower-case
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    /// Create a category from a configured name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    /// Canonical lower-case name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Disposition of one remote entry after its download task finished
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// Fetched and recorded in the ledger
    Downloaded,
    /// Entry is a directory
    SkippedDirectory,
    /// Name has no prefix token, or the token is not a known category
    SkippedUnrecognizedPrefix,
    /// Name carries a numbered-duplicate suffix like ` (1).zip`
    SkippedDuplicateSuffix,
    /// Name is already in the category ledger
    SkippedAlreadyDownloaded,
    /// The run was cancelled before the task did any I/O
    Cancelled,
    /// Transfer or local write failed
    Failed(String),
}

impl DownloadOutcome {
    /// Stable short label used in logs and the run log
    pub fn label(&self) -> &'static str {
        match self {
            DownloadOutcome::Downloaded => "downloaded",
            DownloadOutcome::SkippedDirectory => "skipped_directory",
            DownloadOutcome::SkippedUnrecognizedPrefix => "skipped_unrecognized_prefix",
            DownloadOutcome::SkippedDuplicateSuffix => "skipped_duplicate_suffix",
            DownloadOutcome::SkippedAlreadyDownloaded => "skipped_already_downloaded",
            DownloadOutcome::Cancelled => "cancelled",
            DownloadOutcome::Failed(_) => "failed",
        }
    }

    /// Counted under `skipped` in [`RunStatistics`]
    pub fn is_skipped(&self) -> bool {
        !matches!(
            self,
            DownloadOutcome::Downloaded | DownloadOutcome::Failed(_)
        )
    }
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Per-run counters, aggregated by the engine's single collector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Entries fetched and recorded
    pub downloaded: u64,
    /// Entries skipped for any reason (sum of the breakdown below)
    pub skipped: u64,
    /// Entries whose task failed
    pub failed: u64,
    /// Directories
    pub skipped_directory: u64,
    /// Unknown or unrecognized prefixes
    pub skipped_unrecognized_prefix: u64,
    /// Numbered duplicates
    pub skipped_duplicate_suffix: u64,
    /// Already in the ledger
    pub skipped_already_downloaded: u64,
    /// Not started because the run was cancelled
    pub cancelled: u64,
}

impl RunStatistics {
    /// Account for one outcome
    pub fn record(&mut self, outcome: &DownloadOutcome) {
        match outcome {
            DownloadOutcome::Downloaded => self.downloaded += 1,
            DownloadOutcome::Failed(_) => self.failed += 1,
            DownloadOutcome::SkippedDirectory => self.skipped_directory += 1,
            DownloadOutcome::SkippedUnrecognizedPrefix => self.skipped_unrecognized_prefix += 1,
            DownloadOutcome::SkippedDuplicateSuffix => self.skipped_duplicate_suffix += 1,
            DownloadOutcome::SkippedAlreadyDownloaded => self.skipped_already_downloaded += 1,
            DownloadOutcome::Cancelled => self.cancelled += 1,
        }
        if outcome.is_skipped() {
            self.skipped += 1;
        }
    }

    /// Number of outcomes recorded
    pub fn total(&self) -> u64 {
        self.downloaded + self.skipped + self.failed
    }
}

/// Lifecycle of one reconciliation run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Not started
    Idle,
    /// Connecting and enumerating the remote directory
    Listing,
    /// Submitting download tasks to the worker pool
    Dispatching,
    /// Waiting for task outcomes
    Collecting,
    /// Writing the summary and sending the report
    Reporting,
    /// Finished
    Done,
    /// Stop requested; no further tasks start
    Cancelled,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Idle => "idle",
            RunPhase::Listing => "listing",
            RunPhase::Dispatching => "dispatching",
            RunPhase::Collecting => "collecting",
            RunPhase::Reporting => "reporting",
            RunPhase::Done => "done",
            RunPhase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Event emitted by the engine
///
/// Events are broadcast to every subscriber; front-ends render them, tests assert on
/// them. Nothing in the engine depends on an event being received.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run moved to a new phase
    PhaseChanged {
        /// The phase just entered
        phase: RunPhase,
    },

    /// Remote listing succeeded
    Listed {
        /// Number of entries returned
        entries: usize,
    },

    /// Ledgers loaded
    LedgerLoaded {
        /// Total names across all category ledgers
        entries: usize,
    },

    /// A download task produced its outcome
    EntryFinished {
        /// Remote entry name
        name: String,
        /// Category, when classification got that far
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<Category>,
        /// The outcome
        outcome: DownloadOutcome,
    },

    /// Unpacking a downloaded archive failed; the download itself stays recorded
    ExtractionFailed {
        /// Remote entry name
        name: String,
        /// Error message
        error: String,
    },

    /// Report delivered
    NotificationSent {
        /// Channel that accepted the report
        channel: String,
    },

    /// A report channel failed
    NotificationFailed {
        /// Channel that failed
        channel: String,
        /// Error message
        error: String,
    },

    /// Run completed (also after cancellation)
    RunFinished {
        /// Final counters
        statistics: RunStatistics,
        /// Whether a stop was requested during the run
        cancelled: bool,
    },
}
