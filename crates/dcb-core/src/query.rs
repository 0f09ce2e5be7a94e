use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A conjunctive filter: `{ event_types; tags }`. Within an item, event
/// types compose by OR and tags compose by AND; the two groups compose
/// by AND. An empty item matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryItem {
    #[serde(default)]
    pub event_types: BTreeSet<String>,
    #[serde(default)]
    pub tags: BTreeSet<Tag>,
}

impl QueryItem {
    pub fn matching_everything() -> Self {
        Self::default()
    }

    pub fn with_event_types(types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            event_types: types.into_iter().map(Into::into).collect(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_tags(tags: impl IntoIterator<Item = Tag>) -> Self {
        Self {
            event_types: BTreeSet::new(),
            tags: tags.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.event_types.is_empty() && self.tags.is_empty()
    }

    /// Whether a single event matches this item's logical semantics:
    /// type OR within the item, tag AND within the item, groups ANDed.
    pub fn matches(&self, event_type: &str, tags: &[Tag]) -> bool {
        let type_ok = self.event_types.is_empty() || self.event_types.contains(event_type);
        let tags_ok = self.tags.iter().all(|want| tags.contains(want));
        type_ok && tags_ok
    }
}

/// Disjunction of [`QueryItem`]s. `Query::all()` is the
/// distinguished query matching every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    items: Vec<QueryItem>,
    all: bool,
}

impl Query {
    /// The distinguished query matching every event in the store.
    pub fn all() -> Self {
        Self {
            items: Vec::new(),
            all: true,
        }
    }

    /// A query matching nothing: the item set is empty, and it is not
    /// the distinguished `all()` query.
    pub fn matching_nothing() -> Self {
        Self {
            items: Vec::new(),
            all: false,
        }
    }

    pub fn from_items(items: Vec<QueryItem>) -> Self {
        Self { items, all: false }
    }

    pub fn from_event_types(types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::from_items(vec![QueryItem::with_event_types(types)])
    }

    pub fn from_tags(tags: impl IntoIterator<Item = Tag>) -> Self {
        Self::from_items(vec![QueryItem::with_tags(tags)])
    }

    pub fn is_all(&self) -> bool {
        self.all
    }

    pub fn items(&self) -> &[QueryItem] {
        &self.items
    }
}

/// `{ Descending }`: the only recognized read option; absence implies
/// ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadOption {
    Descending,
}

/// `{ fail_if_events_match, after_sequence_position }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendCondition {
    pub fail_if_events_match: Query,
    #[serde(default)]
    pub after_sequence_position: Option<u64>,
}

impl AppendCondition {
    pub fn new(fail_if_events_match: Query) -> Self {
        Self {
            fail_if_events_match,
            after_sequence_position: None,
        }
    }

    pub fn after(mut self, position: u64) -> Self {
        self.after_sequence_position = Some(position);
        self
    }
}
