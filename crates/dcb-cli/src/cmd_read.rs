use crate::parse::parse_tag;
use dcb_core::query::{Query, QueryItem, ReadOption};
use dcb_engine::Engine;
use tokio_util::sync::CancellationToken;

pub async fn execute(
    engine: &Engine,
    event_types: &[String],
    raw_tags: &[String],
    desc: bool,
    from: Option<u64>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let tags = raw_tags
        .iter()
        .map(|t| parse_tag(t))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let query = if event_types.is_empty() && tags.is_empty() {
        Query::all()
    } else {
        Query::from_items(vec![QueryItem {
            event_types: event_types.iter().cloned().collect(),
            tags: tags.into_iter().collect(),
        }])
    };

    let options = if desc { vec![ReadOption::Descending] } else { Vec::new() };
    let events = engine.read(&query, &options, from, cancel).await?;

    for event in events {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}
