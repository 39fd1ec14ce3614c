//! Append-only run log
//!
//! One header line per run, one line per outcome and the summary block. The file is the
//! document sent by the reporter.

use crate::types::{Category, DownloadOutcome};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

pub(crate) struct RunLog {
    path: PathBuf,
    file: File,
}

impl RunLog {
    /// Open (or create) the log and write the run header
    pub(crate) async fn open(path: &Path, entries: usize) -> std::io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let mut log = Self {
            path: path.to_path_buf(),
            file,
        };
        log.write(&format!(
            "=== run started {} ({entries} entries) ===\n",
            timestamp()
        ))
        .await?;
        Ok(log)
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) async fn record(
        &mut self,
        name: &str,
        category: Option<&Category>,
        outcome: &DownloadOutcome,
    ) -> std::io::Result<()> {
        let line = format_line(&timestamp(), name, category, outcome);
        self.write(&line).await
    }

    /// Write the summary block and make sure everything reached the disk
    pub(crate) async fn finish(&mut self, summary: &str) -> std::io::Result<()> {
        let mut block = summary.trim_end().to_string();
        block.push_str("\n\n");
        self.write(&block).await?;
        self.file.sync_data().await
    }

    async fn write(&mut self, text: &str) -> std::io::Result<()> {
        self.file.write_all(text.as_bytes()).await?;
        self.file.flush().await
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_line(
    timestamp: &str,
    name: &str,
    category: Option<&Category>,
    outcome: &DownloadOutcome,
) -> String {
    let mut line = format!("{timestamp} {:<27} {name}", outcome.label());
    if let Some(category) = category {
        line.push_str(&format!(" [{category}]"));
    }
    if let DownloadOutcome::Failed(reason) = outcome {
        line.push_str(&format!(": {reason}"));
    }
    line.push('\n');
    line
}
