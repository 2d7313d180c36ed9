//! Output directory housekeeping.
//!
//! The CLI and the HTTP server both drop rendered images into one directory.
//! Nothing else ever deletes them, so [`cleanup_old_files`] runs before each
//! server request and removes anything past its age limit. Failures there are
//! logged and skipped: a file we cannot delete must not fail a request.

use crate::config::ImageFormat;
use crate::error::LexiGraphError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// A fresh image file name: `graph_<unix-millis>_<seq>.<ext>`.
///
/// The sequence number keeps two names minted in the same millisecond apart.
pub fn unique_filename(format: ImageFormat) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed) % 10_000;
    format!("graph_{millis}_{seq:04}.{}", format.extension())
}

/// True for a bare file name safe to join onto the output directory.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'_' | b'-' | b'.'))
}

/// Delete regular files in `dir` last modified more than `max_age` ago.
///
/// A missing directory counts as clean. Returns the number of files removed.
pub fn cleanup_old_files(dir: &Path, max_age: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!("Cannot list {}: {}", dir.display(), e);
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let modified = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta.modified(),
            Ok(_) => continue,
            Err(e) => {
                warn!("Cannot stat {}: {}", path.display(), e);
                continue;
            }
        };
        let age = match modified.map(|m| now.duration_since(m)) {
            Ok(Ok(age)) => age,
            // mtime in the future, or unsupported
            _ => continue,
        };
        if age <= max_age {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed {} ({}s old)", path.display(), age.as_secs());
                removed += 1;
            }
            Err(e) => warn!("Cannot remove {}: {}", path.display(), e),
        }
    }

    if removed > 0 {
        info!("Cleaned up {} old file(s) in {}", removed, dir.display());
    }
    removed
}

/// File size in megabytes.
pub fn file_size_mb(path: &Path) -> std::io::Result<f64> {
    Ok(std::fs::metadata(path)?.len() as f64 / (1024.0 * 1024.0))
}

/// Write `bytes` to `path` via a temp file and rename, creating parent
/// directories as needed. Readers never see a partial file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LexiGraphError> {
    let fail = |e: std::io::Error| LexiGraphError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let tmp_path = tmp_path_for(path);
    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
