//! Fan-out over the by-event-type and by-tag indices: recording a
//! freshly appended event, and resolving query-time position sets.
//!
//! Read-modify-write on a single index file is protected by an
//! in-process mutex keyed on `(store, file)` so a single instance
//! never loses an update racing on the same file; cross-process safety
//! is inherited from the store-wide lock the engine already holds
//! while appending (`dcb-lock`).

mod file_index;
mod paths;

use dcb_core::error::Result;
use dcb_core::event::SequencedEvent;
use dcb_core::Tag;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

pub use paths::{event_type_index_dir, event_type_index_file, tag_index_dir, tag_index_file};

/// Owns the per-file mutex table for one store. The engine owns one
/// instance per configured store.
#[derive(Default)]
pub struct IndexManager {
    file_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut table = self.file_locks.lock().await;
        table
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn add_position_locked(&self, path: &Path, position: u64) -> Result<()> {
        let file_lock = self.lock_for(path).await;
        let _guard = file_lock.lock().await;
        file_index::add_position(path, position).await
    }

    async fn remove_position_locked(&self, path: &Path, position: u64) -> Result<()> {
        let file_lock = self.lock_for(path).await;
        let _guard = file_lock.lock().await;
        file_index::remove_position(path, position).await
    }

    /// Append `event`'s position to its event-type file and to each of
    /// its tag files. Order between the two families is unspecified.
    #[tracing::instrument(skip(self, event), fields(position = event.position))]
    pub async fn record(&self, store_dir: &Path, event: &SequencedEvent) -> Result<()> {
        let type_path = paths::event_type_index_file(store_dir, &event.event.event_type);
        self.add_position_locked(&type_path, event.position).await?;

        for tag in &event.event.tags {
            let tag_path = paths::tag_index_file(store_dir, tag);
            self.add_position_locked(&tag_path, event.position).await?;
        }
        Ok(())
    }

    /// Undo `record`: remove `event`'s position from its event-type
    /// file and each of its tag files. Safe to call even when some or
    /// all of those entries were never recorded — removing an absent
    /// position is a no-op, so a caller unwinding a partially-recorded
    /// batch doesn't need to know exactly how far `record` got.
    #[tracing::instrument(skip(self, event), fields(position = event.position))]
    pub async fn remove(&self, store_dir: &Path, event: &SequencedEvent) -> Result<()> {
        let type_path = paths::event_type_index_file(store_dir, &event.event.event_type);
        self.remove_position_locked(&type_path, event.position).await?;

        for tag in &event.event.tags {
            let tag_path = paths::tag_index_file(store_dir, tag);
            self.remove_position_locked(&tag_path, event.position).await?;
        }
        Ok(())
    }

    pub async fn positions_for_type(&self, store_dir: &Path, event_type: &str) -> Vec<u64> {
        let path = paths::event_type_index_file(store_dir, event_type);
        file_index::get_positions(&path).await
    }

    /// Sorted, duplicate-free union over `types`.
    pub async fn positions_for_types(&self, store_dir: &Path, types: &[String]) -> Vec<u64> {
        let mut set = BTreeSet::new();
        for t in types {
            set.extend(self.positions_for_type(store_dir, t).await);
        }
        set.into_iter().collect()
    }

    pub async fn positions_for_tag(&self, store_dir: &Path, tag: &Tag) -> Vec<u64> {
        let path = paths::tag_index_file(store_dir, tag);
        file_index::get_positions(&path).await
    }

    /// Sorted, duplicate-free union over `tags`. Note this is a
    /// *union*: the AND semantics within a `QueryItem` is computed by
    /// the engine, intersecting per-tag results.
    pub async fn positions_for_tags(&self, store_dir: &Path, tags: &[Tag]) -> Vec<u64> {
        let mut set = BTreeSet::new();
        for t in tags {
            set.extend(self.positions_for_tag(store_dir, t).await);
        }
        set.into_iter().collect()
    }

    /// Record `position` under `tag`'s by-tag index directly, without
    /// touching the event-type index. Used by maintenance operations
    /// that add a tag to an already-persisted event (the `add_tags`
    /// operation).
    pub async fn add_tag_position(&self, store_dir: &Path, tag: &Tag, position: u64) -> Result<()> {
        let path = paths::tag_index_file(store_dir, tag);
        self.add_position_locked(&path, position).await
    }

    pub async fn type_index_exists(&self, store_dir: &Path, event_type: &str) -> bool {
        file_index::exists(&paths::event_type_index_file(store_dir, event_type)).await
    }

    pub async fn tag_index_exists(&self, store_dir: &Path, tag: &Tag) -> bool {
        file_index::exists(&paths::tag_index_file(store_dir, tag)).await
    }
}
