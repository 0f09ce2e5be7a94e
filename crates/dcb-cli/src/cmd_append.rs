use crate::parse::parse_tag;
use anyhow::Context;
use dcb_core::event::{DomainEvent, NewEvent, Payload};
use dcb_core::query::{AppendCondition, Query};
use dcb_engine::Engine;
use tokio_util::sync::CancellationToken;

#[allow(clippy::too_many_arguments)]
pub async fn execute(
    engine: &Engine,
    event_type: &str,
    raw_tags: &[String],
    payload_json: &str,
    payload_type: &str,
    if_none_match_type: Option<&str>,
    after: Option<u64>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let tags = raw_tags
        .iter()
        .map(|t| parse_tag(t))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let value: serde_json::Value =
        serde_json::from_str(payload_json).context("--payload must be valid JSON")?;
    let payload = Payload::new(payload_type, value);
    let domain = DomainEvent::new(event_type, payload, tags)?;
    let new_event = NewEvent::new(domain);

    let condition = if_none_match_type.map(|t| {
        let mut condition = AppendCondition::new(Query::from_event_types([t]));
        if let Some(after) = after {
            condition = condition.after(after);
        }
        condition
    });

    let positions = engine.append(vec![new_event], condition, cancel).await?;
    println!("appended at position {}", positions[0]);
    Ok(())
}
