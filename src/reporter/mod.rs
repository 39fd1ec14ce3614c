//! Run reporting
//!
//! After every run the summary is appended to the run log and the run-log file is sent
//! to the operator: the primary channel first, the fallback only when the primary could
//! not be reached. Reporting is best effort and never fails a run.

mod mail;
mod telegram;

pub use mail::MailNotifier;
pub use telegram::TelegramNotifier;

use crate::config::NotificationConfig;
use crate::error::NotificationError;
use crate::types::{Event, RunStatistics};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// A channel that delivers a file to the operator
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the file at `path` with a short text
    async fn send_document(&self, path: &Path, caption: &str) -> Result<(), NotificationError>;

    /// Channel name for logs and events
    fn channel(&self) -> &'static str;
}

/// Primary channel plus optional fallback
#[derive(Clone)]
pub struct RunReporter {
    primary: Option<Arc<dyn Notifier>>,
    fallback: Option<Arc<dyn Notifier>>,
}

impl RunReporter {
    /// Reporter from explicit channels
    pub fn new(primary: Option<Arc<dyn Notifier>>, fallback: Option<Arc<dyn Notifier>>) -> Self {
        Self { primary, fallback }
    }

    /// Reporter for the `[notification]` section; `None` when no channel is configured
    pub fn from_config(config: &NotificationConfig) -> Option<Self> {
        let primary = config
            .primary
            .as_ref()
            .map(|c| Arc::new(TelegramNotifier::from_config(c)) as Arc<dyn Notifier>);
        let fallback = config
            .fallback
            .as_ref()
            .map(|c| Arc::new(MailNotifier::from_config(c)) as Arc<dyn Notifier>);
        if primary.is_none() && fallback.is_none() {
            return None;
        }
        Some(Self::new(primary, fallback))
    }

    /// Send the run log. Returns the channel that delivered it, if any.
    pub async fn send(
        &self,
        path: &Path,
        summary: &str,
        event_tx: &broadcast::Sender<Event>,
    ) -> Option<&'static str> {
        let try_fallback = match &self.primary {
            Some(primary) => match deliver(primary.as_ref(), path, summary, event_tx).await {
                Ok(()) => return Some(primary.channel()),
                Err(e) => e.is_transport(),
            },
            None => true,
        };

        match &self.fallback {
            Some(fallback) if try_fallback => {
                deliver(fallback.as_ref(), path, summary, event_tx)
                    .await
                    .ok()
                    .map(|()| fallback.channel())
            }
            _ => None,
        }
    }
}

async fn deliver(
    notifier: &dyn Notifier,
    path: &Path,
    summary: &str,
    event_tx: &broadcast::Sender<Event>,
) -> Result<(), NotificationError> {
    let channel = notifier.channel();
    match notifier.send_document(path, summary).await {
        Ok(()) => {
            info!(channel, "run report sent");
            event_tx
                .send(Event::NotificationSent {
                    channel: channel.to_string(),
                })
                .ok();
            Ok(())
        }
        Err(e) => {
            warn!(channel, error = %e, "run report not sent");
            event_tx
                .send(Event::NotificationFailed {
                    channel: channel.to_string(),
                    error: e.to_string(),
                })
                .ok();
            Err(e)
        }
    }
}

/// Human-readable run summary, first line usable as a subject
pub fn format_summary(stats: &RunStatistics) -> String {
    format!(
        "stockfetch run finished: {} downloaded, {} skipped, {} failed\n\
         downloaded: {}\n\
         skipped: {}\n\
         \x20 directory: {}\n\
         \x20 unrecognized prefix: {}\n\
         \x20 duplicate suffix: {}\n\
         \x20 already downloaded: {}\n\
         \x20 cancelled: {}\n\
         failed: {}\n\
         total: {}\n",
        stats.downloaded,
        stats.skipped,
        stats.failed,
        stats.downloaded,
        stats.skipped,
        stats.skipped_directory,
        stats.skipped_unrecognized_prefix,
        stats.skipped_duplicate_suffix,
        stats.skipped_already_downloaded,
        stats.cancelled,
        stats.failed,
        stats.total(),
    )
}
