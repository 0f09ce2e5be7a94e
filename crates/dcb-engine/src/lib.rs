//! The event store engine: composes the cross-process lock, ledger,
//! event-file manager and index manager into `append`/`read` plus the
//! administrative `delete_store`/`add_tags` operations.
//!
//! This is the layer every other crate in the workspace exists to
//! support: a single type owning one configuration and one instance of
//! each helper, with no ambient global state.

mod resolve;

use dcb_core::config::EngineConfig;
use dcb_core::error::{Error, Result};
use dcb_core::event::{DomainEvent, Metadata, NewEvent, SequencedEvent};
use dcb_core::payload::PayloadRegistry;
use dcb_core::query::{AppendCondition, Query, ReadOption};
use dcb_core::tag::Tag;
use dcb_index::IndexManager;
use std::path::PathBuf;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

/// Result of `add_tags`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddTagsReport {
    pub events_processed: u64,
    pub tags_added: u64,
}

/// Owns one store's configuration and its instance of each helper
/// component.
pub struct Engine {
    config: EngineConfig,
    index: IndexManager,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            index: IndexManager::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn store_dir(&self) -> PathBuf {
        self.config.store_dir()
    }

    fn events_dir(&self) -> PathBuf {
        self.store_dir().join("events")
    }

    /// Append a non-empty batch of events under an optional
    /// concurrency condition.
    #[tracing::instrument(skip(self, events, condition), fields(batch_len = events.len()))]
    pub async fn append(
        &self,
        events: Vec<NewEvent>,
        condition: Option<AppendCondition>,
        cancel: &CancellationToken,
    ) -> Result<Vec<u64>> {
        if events.is_empty() {
            return Err(Error::InvalidArgument {
                reason: "append requires a non-empty event batch".to_string(),
            });
        }

        let store_dir = self.store_dir();
        let _lock = dcb_lock::StoreLock::acquire(
            &store_dir,
            self.config.cross_process_lock_timeout,
            cancel,
        )
        .await?;

        let last_position = self.last_position().await?;

        // Step 1: validate the append condition against current state.
        if let Some(condition) = &condition {
            self.validate_condition(condition, last_position).await?;
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // Step 2: assign positions.
        let first_position = last_position + 1;
        let now = OffsetDateTime::now_utc();
        let durable = self.config.flush_events_immediately;

        let mut sequenced = Vec::with_capacity(events.len());
        for (offset, new_event) in events.into_iter().enumerate() {
            let position = first_position + offset as u64;
            let NewEvent { event, mut metadata } = new_event;
            // Step 3: stamp metadata timestamp if unset.
            metadata.stamp_if_unset(now);
            sequenced.push(SequencedEvent::new(position, event, metadata));
        }

        // Steps 4-5: write event files, then update indices. Any
        // failure triggers a best-effort rollback without touching the
        // ledger.
        if let Err(err) = self.write_and_index(&sequenced).await {
            self.rollback(&sequenced).await;
            return Err(err);
        }

        // Step 6: update the ledger; this is the commit point.
        let positions: Vec<u64> = sequenced.iter().map(|e| e.position).collect();
        let last = *positions.last().expect("batch is non-empty");
        let events_appended = positions.len() as u64;
        let store_dir_for_ledger = store_dir.clone();
        tokio::task::spawn_blocking(move || {
            dcb_ledger::update_position(&store_dir_for_ledger, last, events_appended, durable)
        })
        .await
        .expect("ledger update task panicked")?;

        // Step 7: lock released on drop of `_lock`.
        Ok(positions)
    }

    async fn write_and_index(&self, sequenced: &[SequencedEvent]) -> Result<()> {
        let events_dir = self.events_dir();
        let durable = self.config.flush_events_immediately;
        for event in sequenced {
            dcb_eventlog::write(&events_dir, event, durable).await?;
            if self.config.write_protect_event_files {
                dcb_eventlog::write_protect(&events_dir, event.position).await?;
            }
        }
        let store_dir = self.store_dir();
        for event in sequenced {
            self.index.record(&store_dir, event).await?;
        }
        Ok(())
    }

    /// Best-effort cleanup of files and index entries written for a
    /// batch that failed before the ledger advanced. Errors are
    /// logged, not propagated: the ledger is still unchanged, so any
    /// surviving leftovers are simply ignored by future reads.
    ///
    /// `IndexManager::remove` is called for every event in the batch
    /// regardless of how far `write_and_index` actually got — removing
    /// a position that was never recorded is a no-op, so this doesn't
    /// need to track the exact failure point.
    async fn rollback(&self, sequenced: &[SequencedEvent]) {
        let events_dir = self.events_dir();
        let store_dir = self.store_dir();
        for event in sequenced {
            if let Err(e) = self.index.remove(&store_dir, event).await {
                tracing::warn!(position = event.position, error = %e, "rollback failed to remove index entries");
            }
            if let Ok(path) = dcb_eventlog::file_path(&events_dir, event.position) {
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!(path = %path.display(), error = %e, "rollback failed to remove event file");
                    }
                }
            }
        }
    }

    async fn validate_condition(&self, condition: &AppendCondition, last_position: u64) -> Result<()> {
        let store_dir = self.store_dir();
        let mut matching = resolve::matching_positions(
            &self.index,
            &store_dir,
            &condition.fail_if_events_match,
            last_position,
        )
        .await;

        if let Some(after) = condition.after_sequence_position {
            matching.retain(|p| *p > after);
        }

        if !matching.is_empty() {
            return Err(Error::AppendConditionFailed {
                matched: matching.len(),
            });
        }
        Ok(())
    }

    async fn last_position(&self) -> Result<u64> {
        let store_dir = self.store_dir();
        let path_for_panic = store_dir.clone();
        tokio::task::spawn_blocking(move || dcb_ledger::last_position(&store_dir))
            .await
            .map_err(|_| Error::io(path_for_panic, std::io::Error::other("ledger read task panicked")))
    }

    /// Resolve `query`/`options`/`from_position` into the matching
    /// events. Does not take the cross-process lock.
    #[tracing::instrument(skip(self, query))]
    pub async fn read(
        &self,
        query: &Query,
        options: &[ReadOption],
        from_position: Option<u64>,
        cancel: &CancellationToken,
    ) -> Result<Vec<SequencedEvent>> {
        let store_dir = self.store_dir();
        let last_position = self.last_position().await?;

        let mut positions =
            resolve::matching_positions(&self.index, &store_dir, query, last_position).await;

        if let Some(from) = from_position {
            positions.retain(|p| *p > from);
        }

        let events_dir = self.events_dir();
        let mut events = dcb_eventlog::read_many(&events_dir, &positions, cancel).await?;

        if options.contains(&ReadOption::Descending) {
            events.reverse();
        }

        Ok(events)
    }

    /// Like [`Engine::read`], but checks each returned event's payload
    /// discriminator against `registry`, surfacing
    /// `Error::Serialization` for the first one the registry doesn't
    /// recognize. An empty registry validates everything, matching
    /// `PayloadRegistry::check`.
    #[tracing::instrument(skip(self, query, registry))]
    pub async fn read_validated(
        &self,
        query: &Query,
        options: &[ReadOption],
        from_position: Option<u64>,
        registry: &PayloadRegistry,
        cancel: &CancellationToken,
    ) -> Result<Vec<SequencedEvent>> {
        let events = self.read(query, options, from_position, cancel).await?;
        for event in &events {
            registry.check(&event.event.payload.type_tag)?;
        }
        Ok(events)
    }

    /// Remove the store's directory tree and reset ledger/indices.
    /// Gracefully succeeds if the directory is already absent.
    /// Clears read-only attributes before deleting. A maintenance
    /// operation: takes the same cross-process lock `append` does, so
    /// it can't race an in-flight append writing under the same store.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_store(&self, cancel: &CancellationToken) -> Result<()> {
        let store_dir = self.store_dir();
        let _lock = dcb_lock::StoreLock::acquire(
            &store_dir,
            self.config.cross_process_lock_timeout,
            cancel,
        )
        .await?;

        match tokio::fs::try_exists(&store_dir).await {
            Ok(false) => return Ok(()),
            Err(e) => return Err(Error::io(&store_dir, e)),
            Ok(true) => {}
        }

        clear_read_only(&store_dir).await?;
        tokio::fs::remove_dir_all(&store_dir)
            .await
            .map_err(|e| Error::io(&store_dir, e))?;
        tracing::info!(store = %store_dir.display(), "store deleted");
        Ok(())
    }

    /// For every existing event of `event_type`, invoke `factory` to
    /// produce candidate tags; append those whose key is not already
    /// present, record the updated event and its by-tag index entries.
    /// A maintenance operation: takes the same cross-process lock
    /// `append` does, so two processes tagging the same store can't
    /// race on the same event file.
    #[tracing::instrument(skip(self, factory, cancel))]
    pub async fn add_tags<F>(
        &self,
        event_type: &str,
        mut factory: F,
        cancel: &CancellationToken,
    ) -> Result<AddTagsReport>
    where
        F: FnMut(&SequencedEvent) -> Vec<Tag>,
    {
        let store_dir = self.store_dir();
        let _lock = dcb_lock::StoreLock::acquire(
            &store_dir,
            self.config.cross_process_lock_timeout,
            cancel,
        )
        .await?;

        let positions = self.index.positions_for_type(&store_dir, event_type).await;
        let events_dir = self.events_dir();
        let durable = self.config.flush_events_immediately;

        let mut events_processed = 0u64;
        let mut tags_added = 0u64;

        for position in positions {
            let mut event = dcb_eventlog::read(&events_dir, position).await?;
            let existing_keys: std::collections::HashSet<String> =
                event.event.tags.iter().map(|t| t.key.clone()).collect();

            let candidates = factory(&event);
            let mut added_this_event = Vec::new();
            for tag in candidates {
                if !existing_keys.contains(&tag.key) {
                    added_this_event.push(tag);
                }
            }

            events_processed += 1;
            if added_this_event.is_empty() {
                continue;
            }

            event.event.tags.extend(added_this_event.iter().cloned());
            dcb_eventlog::write(&events_dir, &event, durable).await?;
            for tag in &added_this_event {
                self.index.add_tag_position(&store_dir, tag, position).await?;
                tags_added += 1;
            }
        }

        Ok(AddTagsReport {
            events_processed,
            tags_added,
        })
    }
}

async fn clear_read_only(dir: &std::path::Path) -> Result<()> {
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::io(&current, e)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(&current, e))? {
            let path = entry.path();
            let metadata = entry.metadata().await.map_err(|e| Error::io(&path, e))?;
            if metadata.is_dir() {
                stack.push(path);
                continue;
            }
            let mut perms = metadata.permissions();
            if perms.readonly() {
                perms.set_readonly(false);
                tokio::fs::set_permissions(&path, perms)
                    .await
                    .map_err(|e| Error::io(&path, e))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcb_core::event::Payload;

    fn engine(root: &std::path::Path) -> Engine {
        let config = EngineConfig::builder()
            .root_path(root)
            .store_name("orders")
            .flush_events_immediately(false)
            .build()
            .unwrap();
        Engine::new(config)
    }

    fn new_event(event_type: &str, tags: Vec<Tag>) -> NewEvent {
        let domain =
            DomainEvent::new(event_type, Payload::new("test.v1", serde_json::json!({})), tags)
                .unwrap();
        NewEvent::new(domain)
    }

    #[tokio::test]
    async fn append_assigns_sequential_positions_and_read_all_returns_them() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let cancel = CancellationToken::new();

        let positions = engine
            .append(
                vec![new_event("Created", vec![]), new_event("Updated", vec![])],
                None,
                &cancel,
            )
            .await
            .unwrap();
        assert_eq!(positions, vec![1, 2]);

        let events = engine.read(&Query::all(), &[], None, &cancel).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].position, 1);
        assert_eq!(events[1].position, 2);
    }

    #[tokio::test]
    async fn append_condition_failure_leaves_ledger_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let cancel = CancellationToken::new();

        engine
            .append(vec![new_event("Created", vec![])], None, &cancel)
            .await
            .unwrap();

        let condition = AppendCondition::new(Query::from_event_types(["Created"]));
        let err = engine
            .append(vec![new_event("Created", vec![])], Some(condition), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AppendConditionFailed { matched: 1 }));

        assert_eq!(dcb_ledger::last_position(&engine.store_dir()), 1);
    }

    #[tokio::test]
    async fn append_condition_bounded_by_after_position_permits_append() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let cancel = CancellationToken::new();

        engine
            .append(vec![new_event("Created", vec![])], None, &cancel)
            .await
            .unwrap();

        let condition = AppendCondition::new(Query::from_event_types(["Created"])).after(1);
        let positions = engine
            .append(vec![new_event("Created", vec![])], Some(condition), &cancel)
            .await
            .unwrap();
        assert_eq!(positions, vec![2]);
    }

    #[tokio::test]
    async fn read_by_tag_and_type_filters_correctly() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let cancel = CancellationToken::new();
        let tag = Tag::new("entity", "a").unwrap();

        engine
            .append(
                vec![
                    new_event("Created", vec![tag.clone()]),
                    new_event("Created", vec![]),
                    new_event("Deleted", vec![tag.clone()]),
                ],
                None,
                &cancel,
            )
            .await
            .unwrap();

        let query = Query::from_tags([tag]);
        let events = engine.read(&query, &[], None, &cancel).await.unwrap();
        let positions: Vec<u64> = events.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 3]);
    }

    #[tokio::test]
    async fn read_descending_reverses_final_array() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let cancel = CancellationToken::new();

        engine
            .append(
                vec![new_event("Created", vec![]), new_event("Created", vec![])],
                None,
                &cancel,
            )
            .await
            .unwrap();

        let events = engine
            .read(&Query::all(), &[ReadOption::Descending], None, &cancel)
            .await
            .unwrap();
        assert_eq!(events[0].position, 2);
        assert_eq!(events[1].position, 1);
    }

    #[tokio::test]
    async fn read_from_position_excludes_earlier_events() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let cancel = CancellationToken::new();

        engine
            .append(
                vec![new_event("Created", vec![]), new_event("Created", vec![])],
                None,
                &cancel,
            )
            .await
            .unwrap();

        let events = engine
            .read(&Query::all(), &[], Some(1), &cancel)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].position, 2);
    }

    #[tokio::test]
    async fn delete_store_clears_read_only_and_succeeds_when_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let engine_with_protection = Engine::new(
            EngineConfig::builder()
                .root_path(tmp.path())
                .store_name("orders")
                .flush_events_immediately(false)
                .write_protect_event_files(true)
                .build()
                .unwrap(),
        );
        let cancel = CancellationToken::new();
        engine_with_protection
            .append(vec![new_event("Created", vec![])], None, &cancel)
            .await
            .unwrap();

        engine_with_protection.delete_store(&cancel).await.unwrap();
        assert!(!engine_with_protection.store_dir().exists());

        // second delete on an absent directory is graceful
        engine_with_protection.delete_store(&cancel).await.unwrap();
    }

    #[tokio::test]
    async fn add_tags_appends_only_missing_keys_and_reports_counts() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let cancel = CancellationToken::new();

        let existing = Tag::new("entity", "a").unwrap();
        engine
            .append(vec![new_event("Created", vec![existing.clone()])], None, &cancel)
            .await
            .unwrap();
        engine
            .append(vec![new_event("Deleted", vec![])], None, &cancel)
            .await
            .unwrap();

        let new_tag = Tag::new("region", "us").unwrap();
        let duplicate_key_tag = Tag::new("entity", "ignored").unwrap();
        let report = engine
            .add_tags(
                "Created",
                |_event| vec![new_tag.clone(), duplicate_key_tag.clone()],
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(report.events_processed, 1);
        assert_eq!(report.tags_added, 1);

        let query = Query::from_tags([new_tag]);
        let events = engine.read(&query, &[], None, &cancel).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.tags.len(), 2);
    }

    #[tokio::test]
    async fn append_failure_after_partial_indexing_leaves_no_stale_index_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let cancel = CancellationToken::new();
        let tag = Tag::new("entity", "a").unwrap();

        let sequenced = vec![SequencedEvent::new(
            1,
            DomainEvent::new("Created", Payload::new("test.v1", serde_json::json!({})), vec![tag.clone()])
                .unwrap(),
            Metadata::default(),
        )];
        engine.write_and_index(&sequenced).await.unwrap();
        engine.rollback(&sequenced).await;

        assert_eq!(engine.index.positions_for_type(&engine.store_dir(), "Created").await, Vec::<u64>::new());
        assert_eq!(engine.index.positions_for_tag(&engine.store_dir(), &tag).await, Vec::<u64>::new());
        assert!(!engine.events_dir().join("0000000001.json").exists());
    }

    #[tokio::test]
    async fn read_validated_rejects_unknown_payload_discriminator() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path());
        let cancel = CancellationToken::new();

        engine
            .append(vec![new_event("Created", vec![])], None, &cancel)
            .await
            .unwrap();

        let mut registry = dcb_core::payload::PayloadRegistry::new();
        registry.register("known.v1");

        let err = engine
            .read_validated(&Query::all(), &[], None, &registry, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));

        registry.register("test.v1");
        let events = engine
            .read_validated(&Query::all(), &[], None, &registry, &cancel)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
    }
}
