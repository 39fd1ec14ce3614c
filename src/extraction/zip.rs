use crate::error::ExtractionError;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Unpacks ZIP archives in place
pub struct ZipExtractor;

impl ZipExtractor {
    /// Extract every member of `archive_path` below `dest_path`.
    ///
    /// Members whose names would escape `dest_path` are skipped. Returns the files
    /// written, directories excluded.
    pub fn extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
        let failed = |reason: String| ExtractionError::Failed {
            archive: archive_path.to_path_buf(),
            reason,
        };

        debug!(archive = %archive_path.display(), dest = %dest_path.display(), "extracting zip");

        std::fs::create_dir_all(dest_path)
            .map_err(|e| failed(format!("failed to create destination: {e}")))?;
        let file =
            File::open(archive_path).map_err(|e| failed(format!("failed to open archive: {e}")))?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| failed(format!("failed to read archive: {e}")))?;

        let mut extracted = Vec::new();
        for index in 0..archive.len() {
            let mut member = archive
                .by_index(index)
                .map_err(|e| failed(format!("failed to read member {index}: {e}")))?;

            let Some(relative) = member.enclosed_name().map(Path::to_path_buf) else {
                warn!(archive = %archive_path.display(), member = member.name(), "skipping member with unsafe path");
                continue;
            };
            let target = dest_path.join(relative);

            if member.is_dir() {
                std::fs::create_dir_all(&target)
                    .map_err(|e| failed(format!("failed to create {}: {e}", target.display())))?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| failed(format!("failed to create {}: {e}", parent.display())))?;
            }
            let mut out = File::create(&target)
                .map_err(|e| failed(format!("failed to create {}: {e}", target.display())))?;
            std::io::copy(&mut member, &mut out)
                .map_err(|e| failed(format!("failed to write {}: {e}", target.display())))?;
            extracted.push(target);
        }

        debug!(
            archive = %archive_path.display(),
            files = extracted.len(),
            "zip extracted"
        );
        Ok(extracted)
    }
}
