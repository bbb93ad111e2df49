//! File system and logging helpers.
//!
//! - Atomic whole-file replacement for the snapshot and the published document
//! - Early writability check for output locations
//! - String truncation for log previews

use crate::error::PersistenceError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary) with
/// an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistenceError + '_ {
    move |source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Ensure the directory that will hold `file` exists and is writable.
///
/// Creates the directory if needed, then creates and removes a probe file.
#[instrument(level = "debug", skip_all, fields(file = %file.display()))]
pub async fn ensure_writable_parent(file: &Path) -> Result<(), PersistenceError> {
    let dir = parent_dir(file);
    fs::create_dir_all(dir).await.map_err(io_error(dir))?;

    let probe = dir.join("..__probe_write__");
    fs::File::create(&probe).await.map_err(io_error(&probe))?;
    let _ = fs::remove_file(&probe).await;
    debug!(dir = %dir.display(), "Output directory is writable");
    Ok(())
}

/// Temporary sibling of `path` used while writing.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    parent_dir(path).join(format!(".{name}.{}.tmp", std::process::id()))
}

/// Replace `path` with `contents` in one step.
///
/// The data is written and synced to a temporary file in the same directory,
/// then renamed over `path`, so readers see either the old or the new file.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), bytes = contents.len()))]
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir).await.map_err(io_error(dir))?;

    let tmp = temp_path(path);
    let result = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(source) = result {
        let _ = fs::remove_file(&tmp).await;
        return Err(PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    info!(path = %path.display(), "Wrote file");
    Ok(())
}
