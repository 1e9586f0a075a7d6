//! `watch`: print the current records, then follow server-pushed changes.

use serde_json::{Value, json};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use sailor_core::{CollectionEvent, Entity};

use crate::cli::{OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::{Context, util};

pub async fn handle(ctx: &Context<'_>, args: WatchArgs) -> Result<(), CliError> {
    let filter = util::build_filter(&args.filter.conditions);
    let collection = ctx.sailor.registry().get(&args.model, None, None, &filter)?;

    // The initial load runs in the background; subscribe before awaiting it.
    let mut events = collection.subscribe_events();
    let records = collection.loaded().await?;

    let values: Vec<Value> = records.iter().map(Entity::to_value).collect();
    output::print_output(&output::render_records(ctx.format, &values), ctx.global.quiet);

    let mut seen = 0usize;
    loop {
        if args.count.is_some_and(|limit| seen >= limit) {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = event_line(ctx.format, &event) {
                        output::print_output(&line, ctx.global.quiet);
                        seen += 1;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "fell behind the event stream");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

/// One line per item-level event; `ready` and `changed` are not printed.
fn event_line(format: OutputFormat, event: &CollectionEvent) -> Option<String> {
    let entity = event.entity()?;
    let kind = event.kind();
    let record = entity.to_value();
    let line = match format {
        OutputFormat::Plain => {
            let id = entity.id().map(|id| id.to_string()).unwrap_or_default();
            format!("{kind} {id}")
        }
        OutputFormat::Table => format!("{:<8} {}", kind.as_ref(), record),
        OutputFormat::Json | OutputFormat::JsonCompact => {
            output::render_json_compact(&json!({ "event": kind.as_ref(), "record": record }))
        }
        OutputFormat::Yaml => format!(
            "---\n{}",
            output::render_yaml(&json!({ "event": kind.as_ref(), "record": record }))
        ),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_level_events_are_not_printed() {
        let ready = CollectionEvent::Ready(std::sync::Arc::new(Vec::new()));
        assert!(event_line(OutputFormat::Json, &ready).is_none());
    }
}
