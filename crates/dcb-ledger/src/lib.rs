//! The ledger: a single JSON document recording the highest position
//! assigned in a store.
//!
//! Follows the atomic-write idiom used throughout this codebase:
//! serialize, write to a uniquely-named temp file in the same
//! directory, optionally `sync_all`, then `rename`. See DESIGN.md for
//! why this ledger is a plain JSON document rather than a database.

use dcb_core::error::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LEDGER_FILE_NAME: &str = ".ledger";

pub fn ledger_file_path(store_dir: &Path) -> PathBuf {
    store_dir.join(LEDGER_FILE_NAME)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(rename = "lastSequencePosition")]
    last_sequence_position: u64,
    #[serde(rename = "eventCount")]
    event_count: u64,
}

/// Read the ledger's recorded highest position. Returns 0 when the
/// file is absent, empty, or malformed — corruption is deliberately
/// treated as "start from zero": positions are never
/// re-used because the event-file manager discovers existing files
/// before assigning new ones.
pub fn last_position(store_dir: &Path) -> u64 {
    read_document(store_dir).last_sequence_position
}

/// Number of events recorded in the ledger's bookkeeping counter.
/// Subject to the same corruption-tolerant read as `last_position`.
pub fn event_count(store_dir: &Path) -> u64 {
    read_document(store_dir).event_count
}

fn read_document(store_dir: &Path) -> LedgerDocument {
    let path = ledger_file_path(store_dir);
    let Ok(contents) = fs::read_to_string(&path) else {
        return LedgerDocument::default();
    };
    if contents.trim().is_empty() {
        return LedgerDocument::default();
    }
    match serde_json::from_str(&contents) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ledger file malformed, treating as zero");
            LedgerDocument::default()
        }
    }
}

/// `last_position + 1`.
pub fn next_position(store_dir: &Path) -> u64 {
    last_position(store_dir) + 1
}

/// Atomically record `position` as the new highest assigned position,
/// and bump the event counter by `events_appended`. Writes via a
/// uniquely-named temp file and rename; flushes to disk only when
/// `durable` is set.
pub fn update_position(
    store_dir: &Path,
    position: u64,
    events_appended: u64,
    durable: bool,
) -> Result<()> {
    let doc = LedgerDocument {
        last_sequence_position: position,
        event_count: event_count(store_dir) + events_appended,
    };
    let path = ledger_file_path(store_dir);
    fs::create_dir_all(store_dir).map_err(|e| Error::io(store_dir, e))?;

    let tmp_path = store_dir.join(format!(".ledger.tmp.{}", uuid::Uuid::new_v4()));
    let json = serde_json::to_string(&doc).map_err(|e| Error::Serialization(e.to_string()))?;

    let mut file = File::create(&tmp_path).map_err(|e| Error::io(&tmp_path, e))?;
    file.write_all(json.as_bytes())
        .map_err(|e| Error::io(&tmp_path, e))?;
    if durable {
        file.sync_all().map_err(|e| Error::io(&tmp_path, e))?;
    }
    drop(file);

    fs::rename(&tmp_path, &path).map_err(|e| Error::io(&path, e))?;
    tracing::debug!(position, "ledger updated");
    Ok(())
}

/// A finer-grained, single-process exclusive lock over the ledger file
/// itself, used during read-modify-write. Strictly finer-grained than
/// the store-wide cross-process lock (`dcb-lock`) and optional: the
/// engine relies on that lock for serialization and does not nest this
/// one inside it.
pub struct LedgerFileLock {
    _file: File,
}

pub fn acquire_lock(store_dir: &Path) -> Result<LedgerFileLock> {
    fs::create_dir_all(store_dir).map_err(|e| Error::io(store_dir, e))?;
    let path = ledger_file_path(store_dir);
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .map_err(|e| Error::io(&path, e))?;
    file.lock_exclusive().map_err(|e| Error::io(&path, e))?;
    Ok(LedgerFileLock { _file: file })
}
