//! Maps positions to on-disk event files and performs atomic writes and
//! ordered batch reads.
//!
//! File name is the decimal position, zero-padded to 10 digits, with a
//! `.json` suffix, under `<store>/events/`. Writes go through the
//! usual temp-file-plus-rename idiom with an optional fsync; reads are
//! async via `tokio::fs` so `read_many` can fan out concurrently while
//! preserving the caller's requested order.

use dcb_core::error::{Error, Result};
use dcb_core::event::SequencedEvent;
use tokio_util::sync::CancellationToken;
use std::path::{Path, PathBuf};

const WIDTH: usize = 10;

/// The file name for `position` under `events_dir`. Fails with
/// `Error::InvalidArgument` for `position == 0`.
pub fn file_path(events_dir: &Path, position: u64) -> Result<PathBuf> {
    if position == 0 {
        return Err(Error::InvalidArgument {
            reason: "position must be >= 1".to_string(),
        });
    }
    Ok(events_dir.join(format!("{position:0>width$}.json", width = WIDTH)))
}

pub async fn exists(events_dir: &Path, position: u64) -> Result<bool> {
    let path = file_path(events_dir, position)?;
    Ok(tokio::fs::try_exists(&path)
        .await
        .map_err(|e| Error::io(&path, e))?)
}

/// Write `event` to its position file. Creates `events_dir` if absent.
/// Atomic via temp file + rename; `durable` controls whether the temp
/// file is fsynced before the rename. Overwriting an existing file is
/// permitted — callers in the append path never collide because
/// positions are assigned once, and `add_tags` maintenance (spec
/// §4.5) relies on this to rewrite an event's tags in place.
#[tracing::instrument(skip(event), fields(position = event.position))]
pub async fn write(events_dir: &Path, event: &SequencedEvent, durable: bool) -> Result<()> {
    tokio::fs::create_dir_all(events_dir)
        .await
        .map_err(|e| Error::io(events_dir, e))?;
    let final_path = file_path(events_dir, event.position)?;
    let tmp_path = events_dir.join(format!(".tmp.{}", uuid::Uuid::new_v4()));

    let json = serde_json::to_vec(event).map_err(|e| Error::Serialization(e.to_string()))?;

    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| Error::io(&tmp_path, e))?;
    use tokio::io::AsyncWriteExt;
    file.write_all(&json)
        .await
        .map_err(|e| Error::io(&tmp_path, e))?;
    if durable {
        file.sync_all().await.map_err(|e| Error::io(&tmp_path, e))?;
    }
    drop(file);

    tokio::fs::rename(&tmp_path, &final_path)
        .await
        .map_err(|e| Error::io(&final_path, e))?;
    Ok(())
}

/// Mark an event file read-only, used by the `write_protect_event_files` config flag.
pub async fn write_protect(events_dir: &Path, position: u64) -> Result<()> {
    let path = file_path(events_dir, position)?;
    let mut perms = tokio::fs::metadata(&path)
        .await
        .map_err(|e| Error::io(&path, e))?
        .permissions();
    perms.set_readonly(true);
    tokio::fs::set_permissions(&path, perms)
        .await
        .map_err(|e| Error::io(&path, e))
}

/// Read the event at `position`. Fails with `Error::EventNotFound` if
/// the file is absent.
pub async fn read(events_dir: &Path, position: u64) -> Result<SequencedEvent> {
    let path = file_path(events_dir, position)?;
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::EventNotFound { position })
        }
        Err(e) => return Err(Error::io(&path, e)),
    };
    serde_json::from_slice(&bytes).map_err(|e| Error::Serialization(e.to_string()))
}

/// Read events at `positions`, in that exact order. Missing positions
/// fail the whole call. Reads are issued concurrently; cancellation is
/// checked between completed reads.
pub async fn read_many(
    events_dir: &Path,
    positions: &[u64],
    cancel: &CancellationToken,
) -> Result<Vec<SequencedEvent>> {
    use futures::stream::{FuturesOrdered, StreamExt};

    let mut futs: FuturesOrdered<_> = positions
        .iter()
        .map(|&position| read(events_dir, position))
        .collect();

    let mut out = Vec::with_capacity(positions.len());
    while let Some(result) = futs.next().await {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        out.push(result?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcb_core::event::{DomainEvent, Metadata, Payload};

    fn sample(position: u64) -> SequencedEvent {
        let event = DomainEvent::new(
            "Created",
            Payload::new("test.v1", serde_json::json!({"id": position})),
            vec![],
        )
        .unwrap();
        SequencedEvent::new(position, event, Metadata::default())
    }

    #[test]
    fn file_path_zero_pads_to_ten_digits() {
        let dir = Path::new("/store/events");
        assert_eq!(
            file_path(dir, 42).unwrap(),
            Path::new("/store/events/0000000042.json")
        );
    }

    #[test]
    fn file_path_rejects_zero_position() {
        assert!(file_path(Path::new("/x"), 0).is_err());
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let event = sample(1);
        write(tmp.path(), &event, false).await.unwrap();
        let back = read(tmp.path(), 1).await.unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn read_missing_position_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read(tmp.path(), 7).await.unwrap_err();
        assert!(matches!(err, Error::EventNotFound { position: 7 }));
    }

    #[tokio::test]
    async fn read_many_preserves_requested_order() {
        let tmp = tempfile::tempdir().unwrap();
        for p in [1, 2, 3] {
            write(tmp.path(), &sample(p), false).await.unwrap();
        }
        let cancel = CancellationToken::new();
        let events = read_many(tmp.path(), &[3, 1, 2], &cancel).await.unwrap();
        let positions: Vec<u64> = events.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn read_many_fails_whole_call_on_missing_position() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), &sample(1), false).await.unwrap();
        let cancel = CancellationToken::new();
        let err = read_many(tmp.path(), &[1, 2], &cancel).await.unwrap_err();
        assert!(matches!(err, Error::EventNotFound { position: 2 }));
    }

    #[tokio::test]
    async fn exists_reflects_written_files() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!exists(tmp.path(), 1).await.unwrap());
        write(tmp.path(), &sample(1), false).await.unwrap();
        assert!(exists(tmp.path(), 1).await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_is_permitted_for_maintenance() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), &sample(1), false).await.unwrap();
        let mut modified = sample(1);
        modified.event.tags = vec![dcb_core::tag::Tag::new("k", "v").unwrap()];
        write(tmp.path(), &modified, false).await.unwrap();
        let back = read(tmp.path(), 1).await.unwrap();
        assert_eq!(back.event.tags.len(), 1);
    }
}
