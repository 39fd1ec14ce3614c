//! Per-category download ledger
//!
//! Each category owns one newline-delimited text file listing the entry names already
//! downloaded. The ledger is read once at the start of a run into an in-memory
//! snapshot that every download task queries concurrently; successful downloads are
//! appended to the file and never rewrite it.
//!
//! The ledger, not the destination directory, decides whether an entry is fetched:
//! files deleted from disk after download are not fetched again.

use crate::config::Config;
use crate::error::LedgerError;
use crate::types::Category;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

struct CategoryLedger {
    path: PathBuf,
    seen: HashSet<String>,
    /// Serializes appends to this category's file
    append_lock: Mutex<()>,
}

/// Snapshot of all category ledgers plus their append handles
pub struct Ledger {
    categories: HashMap<Category, CategoryLedger>,
}

impl Ledger {
    /// Load every category ledger.
    ///
    /// A missing file is an empty ledger. Any other read failure aborts the load so a
    /// run never proceeds with a partial view of what was already downloaded.
    pub async fn load<I>(files: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = (Category, PathBuf)>,
    {
        let mut categories = HashMap::new();
        for (category, path) in files {
            let seen = read_names(&path).await?;
            debug!(
                category = %category,
                path = %path.display(),
                entries = seen.len(),
                "loaded ledger"
            );
            categories.insert(
                category,
                CategoryLedger {
                    path,
                    seen,
                    append_lock: Mutex::new(()),
                },
            );
        }

        let ledger = Self { categories };
        info!(
            categories = ledger.categories.len(),
            entries = ledger.len(),
            "ledger loaded"
        );
        Ok(ledger)
    }

    /// Load the ledgers of the given categories using the configured paths
    pub async fn load_for<'a, I>(config: &Config, categories: I) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = &'a Category>,
    {
        let mut files = Vec::new();
        for category in categories {
            let path = config
                .ledger_path(category)
                .ok_or_else(|| LedgerError::UnknownCategory(category.to_string()))?;
            files.push((category.clone(), path.to_path_buf()));
        }
        Self::load(files).await
    }

    /// Whether `name` was recorded for `category` when the run started
    pub fn contains(&self, category: &Category, name: &str) -> bool {
        self.categories
            .get(category)
            .is_some_and(|l| l.seen.contains(name))
    }

    /// Append `name` to the category's ledger file.
    ///
    /// Appends to one file are serialized; appends to different categories proceed in
    /// parallel. The in-memory snapshot is not updated.
    pub async fn append(&self, category: &Category, name: &str) -> Result<(), LedgerError> {
        if name.contains(['\n', '\r']) {
            return Err(LedgerError::InvalidName(name.to_string()));
        }
        let ledger = self
            .categories
            .get(category)
            .ok_or_else(|| LedgerError::UnknownCategory(category.to_string()))?;

        let _guard = ledger.append_lock.lock().await;
        append_line(&ledger.path, name)
            .await
            .map_err(|source| LedgerError::Write {
                path: ledger.path.clone(),
                source,
            })
    }

    /// Ledger file of a category
    pub fn path(&self, category: &Category) -> Option<&Path> {
        self.categories.get(category).map(|l| l.path.as_path())
    }

    /// Total names across all categories
    pub fn len(&self) -> usize {
        self.categories.values().map(|l| l.seen.len()).sum()
    }

    /// Whether no category has any recorded name
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn read_names(path: &Path) -> Result<HashSet<String>, LedgerError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "ledger file not found, starting empty");
            Ok(HashSet::new())
        }
        Err(source) => Err(LedgerError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn append_line(path: &Path, name: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    // One write call per line keeps concurrent appenders from interleaving
    file.write_all(format!("{name}\n").as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await
}
