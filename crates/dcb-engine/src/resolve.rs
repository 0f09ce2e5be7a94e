//! Translates a [`Query`] into a sorted set of matching positions by
//! consulting the index manager2.

use dcb_core::query::{Query, QueryItem};
use dcb_core::Tag;
use dcb_index::IndexManager;
use std::path::Path;

/// The matching-position set for `query` against `store_dir`.
/// `Query::all()` short-circuits to `[1, last_position]` without
/// touching the indices at all.
pub async fn matching_positions(
    index: &IndexManager,
    store_dir: &Path,
    query: &Query,
    last_position: u64,
) -> Vec<u64> {
    if query.is_all() {
        return (1..=last_position).collect();
    }

    let mut union = std::collections::BTreeSet::new();
    for item in query.items() {
        union.extend(item_positions(index, store_dir, item).await);
    }
    // Any index entry above the ledger's recorded maximum belongs to a
    // batch that never committed (a crash, or a failed append's
    // leftover index writes predating rollback). The ledger is the
    // commit point, so such entries are never surfaced.
    union.retain(|p| *p <= last_position);
    union.into_iter().collect()
}

/// `R_i` for a single `QueryItem`: types union, tags intersection,
/// the two groups ANDed; an item with neither criterion contributes
/// nothing, in deliberate contrast to `Query::all()`.
async fn item_positions(index: &IndexManager, store_dir: &Path, item: &QueryItem) -> Vec<u64> {
    let types: Vec<String> = item.event_types.iter().cloned().collect();
    let tags: Vec<Tag> = item.tags.iter().cloned().collect();

    let type_positions = if types.is_empty() {
        None
    } else {
        Some(index.positions_for_types(store_dir, &types).await)
    };

    let tag_positions = if tags.is_empty() {
        None
    } else {
        Some(intersect_tags(index, store_dir, &tags).await)
    };

    match (type_positions, tag_positions) {
        (Some(t), Some(g)) => intersect_sorted(&t, &g),
        (Some(t), None) => t,
        (None, Some(g)) => g,
        (None, None) => Vec::new(),
    }
}

/// Intersection of each tag's individual position set (not the
/// manager's `positions_for_tags`, which is a union).
async fn intersect_tags(index: &IndexManager, store_dir: &Path, tags: &[Tag]) -> Vec<u64> {
    let mut iter = tags.iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };
    let mut acc = index.positions_for_tag(store_dir, first).await;
    for tag in iter {
        let next = index.positions_for_tag(store_dir, tag).await;
        acc = intersect_sorted(&acc, &next);
        if acc.is_empty() {
            break;
        }
    }
    acc
}

fn intersect_sorted(a: &[u64], b: &[u64]) -> Vec<u64> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_sorted_finds_common_elements() {
        assert_eq!(intersect_sorted(&[1, 2, 3, 5], &[2, 3, 4]), vec![2, 3]);
        assert_eq!(intersect_sorted(&[], &[1, 2]), Vec::<u64>::new());
    }

    #[tokio::test]
    async fn query_all_returns_full_range_without_touching_indices() {
        let tmp = tempfile::tempdir().unwrap();
        let index = IndexManager::new();
        let positions = matching_positions(&index, tmp.path(), &Query::all(), 5).await;
        assert_eq!(positions, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn item_with_types_and_tags_intersects_the_two_groups() {
        use dcb_core::event::{DomainEvent, Metadata, Payload, SequencedEvent};

        let tmp = tempfile::tempdir().unwrap();
        let index = IndexManager::new();
        let tag = Tag::new("env", "prod").unwrap();

        let make = |position: u64, event_type: &str, tags: Vec<Tag>| {
            let domain =
                DomainEvent::new(event_type, Payload::new("t", serde_json::json!({})), tags)
                    .unwrap();
            SequencedEvent::new(position, domain, Metadata::default())
        };

        index.record(tmp.path(), &make(1, "Created", vec![tag.clone()])).await.unwrap();
        index.record(tmp.path(), &make(2, "Created", vec![])).await.unwrap();
        index.record(tmp.path(), &make(3, "Deleted", vec![tag.clone()])).await.unwrap();

        let item = QueryItem {
            event_types: ["Created".to_string()].into_iter().collect(),
            tags: [tag].into_iter().collect(),
        };
        let query = Query::from_items(vec![item]);
        let positions = matching_positions(&index, tmp.path(), &query, 3).await;
        assert_eq!(positions, vec![1]);
    }
}
