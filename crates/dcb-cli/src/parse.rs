use anyhow::{Context, Result};
use dcb_core::Tag;

/// Parse a `key=value` or bare `key` argument into a [`Tag`].
pub fn parse_tag(raw: &str) -> Result<Tag> {
    match raw.split_once('=') {
        Some((key, value)) => Tag::new(key, value).context("invalid tag"),
        None => Tag::without_value(raw).context("invalid tag"),
    }
}
