pub mod config;
pub mod error;
pub mod event;
pub mod payload;
pub mod query;
pub mod tag;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use error::{Error, Result};
pub use event::{DomainEvent, Metadata, NewEvent, Payload, SequencedEvent};
pub use payload::PayloadRegistry;
pub use query::{AppendCondition, Query, QueryItem, ReadOption};
pub use tag::{event_type_file_stem, safe_file_name_component, tag_file_stem, Tag};
