use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// An ordered `(Key, Value)` pair attached to an event for secondary
/// indexing. `Key` is non-empty, non-whitespace, and free of characters
/// unsafe for use in a file name; `Value` may be empty or absent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

const UNSAFE_KEY_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        Self::with_optional_value(key, Some(value.into()))
    }

    /// A tag whose value is absent (distinct from an empty-string value).
    pub fn without_value(key: impl Into<String>) -> Result<Self> {
        Self::with_optional_value(key, None)
    }

    pub fn with_optional_value(key: impl Into<String>, value: Option<String>) -> Result<Self> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { key, value })
    }

    fn validate_key(key: &str) -> Result<()> {
        if key.is_empty() || key.trim().is_empty() {
            return Err(Error::InvalidArgument {
                reason: "tag key must be non-empty and non-whitespace".to_string(),
            });
        }
        if key.chars().any(|c| UNSAFE_KEY_CHARS.contains(&c)) {
            return Err(Error::InvalidArgument {
                reason: format!("tag key {key:?} contains a character unsafe for file names"),
            });
        }
        Ok(())
    }

    /// Value as it is compared for tag equality: `""` for an explicit
    /// empty value, distinct from an absent value.
    pub fn value_str(&self) -> &str {
        self.value.as_deref().unwrap_or_default()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

/// Percent-encode any byte outside `[A-Za-z0-9.-]` as `%XX` (uppercase
/// hex). Notably `_` is *not* in the passthrough set: it is reserved as
/// the unambiguous separator between a tag's key and value components
/// in [`tag_file_stem`], so it is always escaped here. The encoding is
/// injective, so two distinct inputs never produce the same output and
/// joining two encoded components on a bare `_` cannot collide with a
/// different key/value split.
pub fn safe_file_name_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.as_bytes() {
        match *byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' => out.push(*byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Sentinel marker for an absent tag value, itself percent-escaped so it
/// can never collide with a real value equal to the literal text
/// `ABSENT` (which would encode to `ABSENT`, not `%00ABSENT`).
const ABSENT_VALUE_MARKER: &str = "%00ABSENT";

/// Safe, collision-free file-name stem for a tag's `(key, value)` pair,
/// as used by the by-tag index (`Indices/Tags/<stem>.json`).
pub fn tag_file_stem(tag: &Tag) -> String {
    let key = safe_file_name_component(&tag.key);
    match &tag.value {
        Some(v) => format!("{key}_{}", safe_file_name_component(v)),
        None => format!("{key}_{ABSENT_VALUE_MARKER}"),
    }
}

/// Safe, collision-free file-name stem for an event type, as used by the
/// by-event-type index (`Indices/EventType/<stem>.json`).
pub fn event_type_file_stem(event_type: &str) -> String {
    safe_file_name_component(event_type)
}
