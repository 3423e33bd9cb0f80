//! Input file discovery

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ImportError, Result};

/// Extension of trade files, compared case-insensitively
pub const TRADE_FILE_EXTENSION: &str = "csv";

/// List the trade files directly inside `dir`, sorted by path.
///
/// Subdirectories and files with other extensions are skipped. Failing to
/// read the directory is fatal for the run.
pub async fn discover_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ImportError::io(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ImportError::io(dir, e))?
    {
        let path = entry.path();
        // follows symlinks, so a link to a regular file counts
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);

        if is_file && has_trade_extension(&path) {
            files.push(path);
        } else {
            debug!(path = %path.display(), "Skipping non-trade entry");
        }
    }

    files.sort();
    info!(dir = %dir.display(), files = files.len(), "Discovered trade files");
    Ok(files)
}

fn has_trade_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TRADE_FILE_EXTENSION))
}
