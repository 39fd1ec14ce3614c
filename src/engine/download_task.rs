//! One entry, one outcome.
//!
//! A download task owns its own transfer session from connect to disconnect and turns
//! every entry-level failure into [`DownloadOutcome::Failed`]; nothing it does can fail
//! the run.

use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::TransferError;
use crate::extraction;
use crate::ledger::Ledger;
use crate::retry::{Backoff, IsRetryable, with_retry};
use crate::transfer::{Sink, TransferClient, TransferSession};
use crate::types::{Category, DownloadOutcome, Event, RemoteEntry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Suffix of the file a fetch streams into before it is renamed
const PART_SUFFIX: &str = ".part";

/// Everything a task shares with its siblings
pub(crate) struct DownloadTaskContext {
    pub(crate) config: Arc<Config>,
    pub(crate) client: Arc<dyn TransferClient>,
    pub(crate) classifier: Arc<Classifier>,
    pub(crate) ledger: Arc<Ledger>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) cancel_token: CancellationToken,
}

/// What a task reports back to the collector
#[derive(Debug)]
pub(crate) struct TaskResult {
    pub(crate) name: String,
    pub(crate) category: Option<Category>,
    pub(crate) outcome: DownloadOutcome,
}

impl TaskResult {
    fn new(name: &str, category: Option<Category>, outcome: DownloadOutcome) -> Self {
        Self {
            name: name.to_string(),
            category,
            outcome,
        }
    }

    pub(crate) fn cancelled(name: String) -> Self {
        Self {
            name,
            category: None,
            outcome: DownloadOutcome::Cancelled,
        }
    }
}

/// Process one remote entry
pub(crate) async fn run_download_task(ctx: Arc<DownloadTaskContext>, entry: RemoteEntry) -> TaskResult {
    let name = entry.name.as_str();

    if ctx.cancel_token.is_cancelled() {
        debug!(entry = %name, "run cancelled, not starting");
        return TaskResult::new(name, None, DownloadOutcome::Cancelled);
    }
    if entry.is_directory {
        debug!(entry = %name, "listed as directory, skipping");
        return TaskResult::new(name, None, DownloadOutcome::SkippedDirectory);
    }

    let mut session = match connect(&ctx).await {
        Ok(session) => session,
        Err(e) => {
            return TaskResult::new(name, None, DownloadOutcome::Failed(e.to_string()));
        }
    };

    let result = process_entry(&ctx, &mut session, name).await;

    if let Err(e) = session.disconnect().await {
        debug!(entry = %name, error = %e, "disconnect failed");
    }
    result
}

async fn process_entry(
    ctx: &DownloadTaskContext,
    session: &mut Box<dyn TransferSession>,
    name: &str,
) -> TaskResult {
    match session.is_directory(name).await {
        Ok(true) => {
            debug!(entry = %name, "probed as directory, skipping");
            return TaskResult::new(name, None, DownloadOutcome::SkippedDirectory);
        }
        Ok(false) => {}
        Err(e) => {
            return TaskResult::new(
                name,
                None,
                DownloadOutcome::Failed(format!("directory probe failed: {e}")),
            );
        }
    }

    let category = match ctx.classifier.classify(name) {
        Ok(category) => category,
        Err(rejection) => {
            info!(entry = %name, reason = %rejection, "skipping entry");
            return TaskResult::new(name, None, rejection.outcome());
        }
    };

    if ctx.ledger.contains(&category, name) {
        debug!(entry = %name, category = %category, "already in ledger");
        return TaskResult::new(
            name,
            Some(category),
            DownloadOutcome::SkippedAlreadyDownloaded,
        );
    }

    let outcome = download(ctx, session, name, &category).await;
    TaskResult::new(name, Some(category), outcome)
}

async fn download(
    ctx: &DownloadTaskContext,
    session: &mut Box<dyn TransferSession>,
    name: &str,
    category: &Category,
) -> DownloadOutcome {
    if !is_safe_name(name) {
        return DownloadOutcome::Failed(format!("refusing unsafe entry name {name:?}"));
    }
    let Some(dest_dir) = ctx.config.destination(category) else {
        return DownloadOutcome::Failed(format!("no destination configured for {category}"));
    };
    if let Err(e) = tokio::fs::create_dir_all(dest_dir).await {
        return DownloadOutcome::Failed(format!(
            "cannot create destination {}: {e}",
            dest_dir.display()
        ));
    }

    let target = dest_dir.join(name);
    let part = part_path(&target);
    let partial = PartialFile::new(&part);

    let bytes = match fetch_with_retry(ctx, session, name, &part).await {
        Ok(bytes) => bytes,
        Err(e) => {
            partial.remove().await;
            return DownloadOutcome::Failed(e.to_string());
        }
    };
    if let Err(e) = tokio::fs::rename(&part, &target).await {
        partial.remove().await;
        return DownloadOutcome::Failed(format!("cannot move download into place: {e}"));
    }
    partial.disarm();
    info!(entry = %name, category = %category, bytes, "downloaded");

    if let Err(e) = ctx.ledger.append(category, name).await {
        return DownloadOutcome::Failed(format!("downloaded but not recorded: {e}"));
    }

    if ctx.config.is_auto_extract(category)
        && extraction::is_zip(name)
        && let Err(e) = extraction::extract_and_remove(&target, dest_dir).await
    {
        warn!(entry = %name, error = %e, "extraction failed, download kept");
        ctx.event_tx
            .send(Event::ExtractionFailed {
                name: name.to_string(),
                error: e.to_string(),
            })
            .ok();
    }

    DownloadOutcome::Downloaded
}

async fn connect(ctx: &DownloadTaskContext) -> Result<Box<dyn TransferSession>, TransferError> {
    let client = &ctx.client;
    with_retry(&ctx.config.retry, || client.connect()).await
}

/// Fetch `name` into `part`, reconnecting and starting over on transient failures
async fn fetch_with_retry(
    ctx: &DownloadTaskContext,
    session: &mut Box<dyn TransferSession>,
    name: &str,
    part: &Path,
) -> Result<u64, TransferError> {
    let mut backoff = Backoff::new(&ctx.config.retry);
    loop {
        let sink = open_part(part).await?;
        let error = match session.fetch(name, sink).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_retryable() => e,
            Err(e) => return Err(e),
        };
        let Some(delay) = backoff.next_delay() else {
            return Err(error);
        };
        warn!(
            entry = %name,
            error = %error,
            attempt = backoff.attempts(),
            delay_ms = delay.as_millis(),
            "fetch failed, retrying on a new session"
        );
        tokio::time::sleep(delay).await;
        // the old session is dropped here, which closes its connection
        *session = connect(ctx).await?;
    }
}

async fn open_part(part: &Path) -> Result<Sink, TransferError> {
    let file = tokio::fs::File::create(part).await?.into_std().await;
    Ok(Box::new(std::io::BufWriter::new(file)))
}

/// A `.part` file that is removed unless the download was moved into place.
///
/// Dropping it while still armed (the task panicked or was torn down mid-fetch)
/// removes the file synchronously.
struct PartialFile<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> PartialFile<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }

    async fn remove(mut self) {
        self.armed = false;
        match tokio::fs::remove_file(self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot remove partial download")
            }
        }
    }
}

impl Drop for PartialFile<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(self.path);
        }
    }
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// A name that stays inside the destination directory when joined to it
fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}
