// ── Server-pushed changes ──
//
// How one collection reacts to a routed `created`/`updated`/`destroyed`
// message. Messages about records a collection does not hold are ignored.

use std::sync::Arc;

use sailor_api::{ResourceMessage, Verb};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use super::{Collection, CollectionEvent};
use crate::entity::{Entity, Patch};
use crate::filter::Filter;
use crate::id::EntityId;
use crate::schema::UpdateParams;
use crate::task;

/// Outcome of handing one message to one collection.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Applied synchronously.
    Applied,
    /// A remote match check is deciding whether the record belongs here.
    Checking(JoinHandle<()>),
    Ignored,
}

impl Collection {
    pub(crate) fn handle_message(&self, message: &Arc<ResourceMessage>) -> Inbound {
        match &message.verb {
            Verb::Created => self.on_created(message),
            Verb::Updated => self.on_updated(message),
            Verb::Destroyed => self.on_destroyed(message),
            Verb::Unknown(verb) => {
                trace!(model = self.name(), verb = %verb, "dropping unrecognized verb");
                Inbound::Ignored
            }
        }
    }

    fn on_created(&self, message: &Arc<ResourceMessage>) -> Inbound {
        let data = message
            .data
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let (entity, _computing) =
            Entity::attach(self, Patch::from_json(data), UpdateParams::default());

        if self.filter().is_empty() {
            self.add_created(entity, message);
            return Inbound::Applied;
        }

        let collection = self.clone();
        let message = Arc::clone(message);
        let filter: Filter = self.filter().clone();
        let check = task::spawn(self.runtime(), "match check", async move {
            match entity.matches(&filter).await {
                Ok(true) => collection.add_created(entity, &message),
                Ok(false) => trace!(
                    model = collection.name(),
                    filter = %filter,
                    "created record does not match collection filter"
                ),
                Err(e) => warn!(model = collection.name(), error = %e, "match check failed"),
            }
        });
        Inbound::Checking(check)
    }

    fn add_created(&self, entity: Entity, message: &Arc<ResourceMessage>) {
        self.push(entity.clone());
        self.emit(CollectionEvent::Created(entity));
        self.emit_changed(message);
    }

    fn on_updated(&self, message: &Arc<ResourceMessage>) -> Inbound {
        let Some(entity) = self.held_record(message) else {
            return Inbound::Ignored;
        };
        let data = message
            .data
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new()));
        drop(entity.apply(Patch::from_json(data), UpdateParams::default()));
        self.touch();

        self.emit(CollectionEvent::Updated(entity));
        self.emit_changed(message);
        Inbound::Applied
    }

    fn on_destroyed(&self, message: &Arc<ResourceMessage>) -> Inbound {
        let Some(entity) = self.held_record(message) else {
            return Inbound::Ignored;
        };
        self.remove(&entity);

        self.emit(CollectionEvent::Removed(entity));
        self.emit_changed(message);
        Inbound::Applied
    }

    fn held_record(&self, message: &ResourceMessage) -> Option<Entity> {
        let id = message.record_id().and_then(EntityId::from_json);
        let found = id.as_ref().and_then(|id| self.by_id(id));
        if found.is_none() {
            trace!(
                model = self.name(),
                verb = %message.verb,
                id = ?id,
                "message for a record this collection does not hold"
            );
        }
        found
    }

    fn emit_changed(&self, message: &Arc<ResourceMessage>) {
        self.emit(CollectionEvent::Changed {
            verb: message.verb.clone(),
            message: Arc::clone(message),
        });
    }
}
