//! Single index file: a sorted, duplicate-free array of positions
//! serialized as `{"Positions": [...]}`. Malformed content
//! is treated as an empty set on read and self-heals on the next
//! write — never fatal, and never surfaced to the engine's callers.

use dcb_core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PositionsDocument {
    #[serde(rename = "Positions")]
    positions: Vec<u64>,
}

/// Read the positions recorded in `path`. Absent or malformed files
/// read as an empty set.
pub async fn get_positions(path: &Path) -> Vec<u64> {
    let Ok(bytes) = tokio::fs::read(path).await else {
        return Vec::new();
    };
    match serde_json::from_slice::<PositionsDocument>(&bytes) {
        Ok(doc) => doc.positions,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "index file malformed, treating as empty set");
            Vec::new()
        }
    }
}

pub async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Insert `position` if absent, re-serialize sorted and duplicate-free,
/// write atomically via temp file + rename. Caller is responsible for
/// holding the per-file mutex across this read-modify-write.
pub async fn add_position(path: &Path, position: u64) -> Result<()> {
    let mut positions = get_positions(path).await;
    if let Err(insert_at) = positions.binary_search(&position) {
        positions.insert(insert_at, position);
    } else {
        return Ok(());
    }
    write_positions(path, &positions).await
}

/// Remove `position` if present, re-serialize sorted and
/// duplicate-free, write atomically. A no-op if `position` was never
/// recorded, including when `path` doesn't exist at all. Caller is
/// responsible for holding the per-file mutex across this
/// read-modify-write.
pub async fn remove_position(path: &Path, position: u64) -> Result<()> {
    let mut positions = get_positions(path).await;
    match positions.binary_search(&position) {
        Ok(idx) => {
            positions.remove(idx);
        }
        Err(_) => return Ok(()),
    }
    write_positions(path, &positions).await
}

async fn write_positions(path: &Path, positions: &[u64]) -> Result<()> {
    let parent = path
        .parent()
        .expect("index file path always has a parent directory");
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| Error::io(parent, e))?;

    let doc = PositionsDocument {
        positions: positions.to_vec(),
    };
    let json = serde_json::to_vec(&doc).map_err(|e| Error::Serialization(e.to_string()))?;

    let tmp_path = parent.join(format!(".tmp.{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&tmp_path, &json)
        .await
        .map_err(|e| Error::io(&tmp_path, e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::io(path, e))?;
    Ok(())
}
