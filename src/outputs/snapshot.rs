//! Change detection against the last persisted raw scrape.
//!
//! The snapshot file holds the previous run's [`RawScrape`]. A new scrape is
//! written only when it differs structurally from that snapshot, which makes
//! repeated runs over an unchanged site idempotent: nothing is rewritten and
//! the caller skips normalization and publication.
//!
//! A missing, unreadable or corrupt snapshot counts as "no prior snapshot".
//!
//! When a changed scrape cannot be published, the caller puts the previous
//! snapshot back with [`backup`] and [`restore`] so the next run sees the
//! change again instead of reporting it as unchanged.

use crate::error::PersistenceError;
use crate::models::RawScrape;
use crate::utils::{truncate_for_log, write_atomic};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Read the previous snapshot, if there is a usable one.
pub async fn load_snapshot(path: &Path) -> Option<RawScrape> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No previous snapshot");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read previous snapshot; treating as absent");
            return None;
        }
    };

    match serde_json::from_str(&text) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                preview = %truncate_for_log(&text, 200),
                "Previous snapshot is corrupt; treating as absent"
            );
            None
        }
    }
}

/// Persist `scrape` to `path` unless it equals the snapshot already there.
///
/// Returns `true` when the scrape changed and was written, `false` when it was
/// identical and the file was left untouched.
///
/// # Errors
///
/// [`PersistenceError`] when the new snapshot cannot be serialized or written.
#[instrument(level = "info", skip_all, fields(path = %path.display(), days = scrape.len(), rows = scrape.row_count()))]
pub async fn commit_if_changed(scrape: &RawScrape, path: &Path) -> Result<bool, PersistenceError> {
    if load_snapshot(path).await.as_ref() == Some(scrape) {
        info!("Scrape unchanged since last snapshot");
        return Ok(false);
    }

    let json = serde_json::to_string(scrape).map_err(|source| PersistenceError::Serialize {
        what: "raw scrape",
        source,
    })?;
    debug!(json = %truncate_for_log(&json, 500), "New snapshot");
    write_atomic(path, json.as_bytes()).await?;
    info!("Scrape changed; snapshot updated");
    Ok(true)
}

/// Bytes of the snapshot currently at `path`, `None` if there is none.
pub async fn backup(path: &Path) -> Option<Vec<u8>> {
    match fs::read(path).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot back up previous snapshot");
            None
        }
    }
}

/// Put `previous` back at `path`, or remove the snapshot if there was none.
#[instrument(level = "info", skip_all, fields(path = %path.display(), had_previous = previous.is_some()))]
pub async fn restore(path: &Path, previous: Option<&[u8]>) -> Result<(), PersistenceError> {
    match previous {
        Some(bytes) => write_atomic(path, bytes).await?,
        None => match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        },
    }
    info!("Snapshot rolled back");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawRow;

    fn scrape(info: &str) -> RawScrape {
        let mut s = RawScrape::new();
        s.insert(
            "Montag_02.09.2024",
            vec![["MSS12", "1", "Mül", "M", "204", "", info].into_iter().collect::<RawRow>()],
        );
        s.insert("Dienstag_03.09.2024", vec![]);
        s
    }

    #[tokio::test]
    async fn test_first_commit_writes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("json").join("scraped.json");

        assert!(commit_if_changed(&scrape("entfällt"), &path).await.unwrap());
        assert_eq!(load_snapshot(&path).await, Some(scrape("entfällt")));
    }

    #[tokio::test]
    async fn test_identical_scrape_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraped.json");

        assert!(commit_if_changed(&scrape("entfällt"), &path).await.unwrap());
        let before = std::fs::read(&path).unwrap();
        let modified = std::fs::metadata(&path).unwrap().modified().unwrap();

        assert!(!commit_if_changed(&scrape("entfällt"), &path).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), modified);
    }

    #[tokio::test]
    async fn test_single_cell_change_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraped.json");

        commit_if_changed(&scrape("entfällt"), &path).await.unwrap();
        assert!(commit_if_changed(&scrape("Raumänderung"), &path).await.unwrap());

        let stored: RawScrape = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(stored, scrape("Raumänderung"));
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_counts_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraped.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(load_snapshot(&path).await.is_none());
        assert!(commit_if_changed(&scrape("entfällt"), &path).await.unwrap());
        assert_eq!(load_snapshot(&path).await, Some(scrape("entfällt")));
    }

    #[tokio::test]
    async fn test_unwritable_location_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let res = commit_if_changed(&scrape("entfällt"), &blocker.join("scraped.json")).await;
        assert!(matches!(res, Err(PersistenceError::Io { .. })));
    }

    #[tokio::test]
    async fn test_restore_puts_previous_snapshot_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraped.json");

        commit_if_changed(&scrape("entfällt"), &path).await.unwrap();
        let previous = backup(&path).await;
        assert!(commit_if_changed(&scrape("Raumänderung"), &path).await.unwrap());

        restore(&path, previous.as_deref()).await.unwrap();
        assert_eq!(load_snapshot(&path).await, Some(scrape("entfällt")));
        assert!(commit_if_changed(&scrape("Raumänderung"), &path).await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_without_previous_removes_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scraped.json");

        assert!(backup(&path).await.is_none());
        commit_if_changed(&scrape("entfällt"), &path).await.unwrap();

        restore(&path, None).await.unwrap();
        assert!(!path.exists());
        restore(&path, None).await.unwrap();
    }
}
