//! Post-download archive unpacking
//!
//! Categories listed under `categories.auto_extract` have their `.zip` downloads unpacked
//! into the destination directory, after which the archive is deleted. Extraction runs
//! on the blocking pool.

mod zip;

pub use zip::ZipExtractor;

use crate::error::ExtractionError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Whether `name` is a ZIP archive by extension (case-insensitive)
pub fn is_zip(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// Unpack `archive` into `dest` and delete the archive.
///
/// The archive is kept when unpacking fails, so a failed extraction can be retried by
/// hand.
pub async fn extract_and_remove(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let archive_path = archive.to_path_buf();
    let dest_path = dest.to_path_buf();
    let files = tokio::task::spawn_blocking(move || ZipExtractor::extract(&archive_path, &dest_path))
        .await
        .map_err(|e| ExtractionError::Failed {
            archive: archive.to_path_buf(),
            reason: format!("extraction task failed: {e}"),
        })??;

    tokio::fs::remove_file(archive)
        .await
        .map_err(|e| ExtractionError::RemoveArchive {
            archive: archive.to_path_buf(),
            reason: e.to_string(),
        })?;

    info!(
        archive = %archive.display(),
        files = files.len(),
        "archive unpacked and removed"
    );
    Ok(files)
}
