//! Exclusive, advisory, cross-process lock over a store's directory,
//! backed by a sentinel file `<store>/.store.lock`.
//!
//! Built on a single `try_lock_exclusive` over `fs2::FileExt`,
//! generalized into a retrying acquire with bounded exponential
//! backoff and cancellation via `tokio_util::sync::CancellationToken`.

use dcb_core::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

const LOCK_FILE_NAME: &str = ".store.lock";

pub fn lock_file_path(store_dir: &Path) -> PathBuf {
    store_dir.join(LOCK_FILE_NAME)
}

/// A held lock on a store's sentinel file. Released on drop
/// (best-effort; no retry loop on release).
pub struct StoreLock {
    _file: File,
    path: PathBuf,
}

impl StoreLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the lock, retrying with exponential backoff (10ms →
    /// 500ms cap) until `timeout` elapses or `cancel` trips. Honors
    /// cancellation immediately, including before the first attempt.
    #[tracing::instrument(skip(cancel), fields(path = %lock_file_path(store_dir).display()))]
    pub async fn acquire(
        store_dir: &Path,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        std::fs::create_dir_all(store_dir).map_err(|e| Error::io(store_dir, e))?;
        let path = lock_file_path(store_dir);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    tracing::debug!("acquired store lock");
                    return Ok(Self { _file: file, path });
                }
                Err(_) => {
                    let elapsed = started.elapsed();
                    if elapsed >= timeout {
                        return Err(Error::Timeout {
                            path,
                            elapsed_ms: elapsed.as_millis() as u64,
                        });
                    }
                    tracing::debug!(backoff_ms = backoff.as_millis() as u64, "lock contended, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    }
}
