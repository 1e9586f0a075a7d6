// Built-in computation behind connection fields.

use tracing::debug;

use super::{Entity, FieldValue};
use crate::filter::Filter;
use crate::schema::{ComputeContext, ComputeFuture};
use crate::task;

/// Resolve the identifiers held in a connection field to live records of
/// `resource`.
///
/// Looks the ids up in the resource's unfiltered collection once its load
/// finished; a failed load fails the computation. Found records are
/// refreshed in the background unless the update asked not to. A single
/// reference resolves to one record (or nothing), a list to a list.
pub(super) fn resolve(resource: String, ctx: ComputeContext) -> ComputeFuture {
    Box::pin(async move {
        let Some(previous) = ctx.previous else {
            return Ok(None);
        };
        let plural = previous.is_plural();
        let ids = previous.referenced_ids();

        let target = ctx
            .entity
            .registry()?
            .get(&resource, None, None, &Filter::new())?;
        let found = if ids.is_empty() {
            Vec::new()
        } else {
            target.loaded().await?;
            target.search(&Filter::new().any("id", ids))
        };

        if !ctx.params.no_refresh {
            for entity in &found {
                spawn_refresh(entity.clone());
            }
        }

        if plural {
            Ok(Some(FieldValue::from(found)))
        } else {
            Ok(found.into_iter().next().map(FieldValue::Entity))
        }
    })
}

fn spawn_refresh(entity: Entity) {
    let runtime = entity.runtime().clone();
    task::spawn(&runtime, "connection refresh", async move {
        if let Err(e) = entity.refresh().await {
            debug!(model = entity.model(), error = %e, "connected record refresh failed");
        }
    });
}
