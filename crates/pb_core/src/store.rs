//! Small-file persistence primitives shared by the season layer.
//!
//! Every JSON state file (standings, bracket, progress flags, career index)
//! is written through [`atomic_write`]: serialize to a sibling temp file,
//! fsync, then rename over the target. Draft assets additionally go through
//! [`FileLock`], an exclusive-create `.lock` companion with bounded retry.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

fn io_err(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io { path: path.to_path_buf(), source }
}

/// Write `contents` to `path` via temp-file + rename.
pub fn atomic_write(path: &Path, contents: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(path, e))?;
    }
    let tmp = path.with_extension(format!(
        "{}.tmp.{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("json"),
        std::process::id()
    ));
    {
        let mut fh = File::create(&tmp).map_err(|e| io_err(&tmp, e))?;
        fh.write_all(contents.as_bytes()).map_err(|e| io_err(&tmp, e))?;
        fh.flush().map_err(|e| io_err(&tmp, e))?;
        // fsync is best-effort on platforms that reject it for text files
        let _ = fh.sync_all();
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        io_err(path, e)
    })
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let payload = serde_json::to_string_pretty(value)?;
    atomic_write(path, &payload)
}

/// Atomic write with bounded retry and back-off for concurrent writers.
pub fn atomic_write_json_retry<T: Serialize>(
    path: &Path,
    value: &T,
    retries: u32,
    delay: Duration,
) -> Result<(), StoreError> {
    let attempts = retries.max(1);
    let mut last: Option<StoreError> = None;
    for attempt in 0..attempts {
        match atomic_write_json(path, value) {
            Ok(()) => return Ok(()),
            Err(err) => {
                tracing::debug!(?path, attempt, %err, "atomic write failed, retrying");
                last = Some(err);
                if attempt + 1 < attempts {
                    thread::sleep(delay * (attempt + 1));
                }
            }
        }
    }
    Err(last.unwrap_or(StoreError::RetriesExhausted {
        path: path.to_path_buf(),
        attempts,
    }))
}

/// Read a JSON document, returning `None` when the file is missing or
/// unreadable. Loaders tolerate corrupt state with empty-default recovery.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let text = fs::read_to_string(path).ok()?;
    if text.trim().is_empty() {
        return None;
    }
    match serde_json::from_str(&text) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(?path, %err, "ignoring unreadable JSON document");
            None
        }
    }
}

/// Exclusive lock via `O_CREAT|O_EXCL` on a sibling `.lock` path.
///
/// Released on drop by removing the lock file. Acquisition retries with
/// linear back-off up to a bounded attempt count.
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    pub fn acquire(target: &Path, retries: u32, delay: Duration) -> Result<Self, StoreError> {
        let lock_path = target.with_extension(format!(
            "{}.lock",
            target.extension().and_then(|e| e.to_str()).unwrap_or("dat")
        ));
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_err(&lock_path, e))?;
        }
        let attempts = retries.max(1);
        for attempt in 0..attempts {
            match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
                Ok(mut fh) => {
                    let _ = write!(fh, "{}", std::process::id());
                    return Ok(Self { lock_path });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if attempt + 1 < attempts {
                        thread::sleep(delay * (attempt + 1));
                    }
                }
                Err(err) => return Err(io_err(&lock_path, err)),
            }
        }
        Err(StoreError::Locked { path: lock_path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn atomic_write_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut doc = BTreeMap::new();
        doc.insert("wins".to_string(), 12u32);
        atomic_write_json(&path, &doc).unwrap();
        let loaded: BTreeMap<String, u32> = read_json(&path).unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn read_json_recovers_from_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();
        let loaded: Option<BTreeMap<String, u32>> = read_json(&path);
        assert!(loaded.is_none());
    }

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("draft_pool_2025.csv");
        let lock = FileLock::acquire(&target, 1, Duration::from_millis(1)).unwrap();
        assert!(FileLock::acquire(&target, 1, Duration::from_millis(1)).is_err());
        drop(lock);
        assert!(FileLock::acquire(&target, 1, Duration::from_millis(1)).is_ok());
    }
}
