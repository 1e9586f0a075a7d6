// ── Collection events ──
//
// Named handler lists with "memory": an event emitted with memory is
// replayed to handlers registered after the fact. Every emission is also
// broadcast for async consumers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use sailor_api::{ResourceMessage, Verb};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tokio::sync::broadcast;

use crate::entity::Entity;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Which event a handler listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    /// A full refresh completed. Emitted with memory.
    Ready,
    Created,
    Updated,
    Removed,
    /// Any server-pushed change was applied.
    Changed,
}

/// One emission, carrying the records it concerns.
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    Ready(Arc<Vec<Entity>>),
    Created(Entity),
    Updated(Entity),
    Removed(Entity),
    Changed {
        verb: Verb,
        message: Arc<ResourceMessage>,
    },
}

impl CollectionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ready(_) => EventKind::Ready,
            Self::Created(_) => EventKind::Created,
            Self::Updated(_) => EventKind::Updated,
            Self::Removed(_) => EventKind::Removed,
            Self::Changed { .. } => EventKind::Changed,
        }
    }

    /// The record an item-level event is about.
    pub fn entity(&self) -> Option<&Entity> {
        match self {
            Self::Created(e) | Self::Updated(e) | Self::Removed(e) => Some(e),
            Self::Ready(_) | Self::Changed { .. } => None,
        }
    }
}

pub type Handler = Arc<dyn Fn(&CollectionEvent) + Send + Sync>;

/// Token returned by [`Collection::on`](super::Collection::on), used to
/// remove the handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct HandlerList {
    handlers: Vec<(HandlerId, Handler)>,
    memory: Option<CollectionEvent>,
}

pub(crate) struct EventHandlers {
    next_id: AtomicU64,
    lists: Mutex<HashMap<EventKind, HandlerList>>,
    broadcast: broadcast::Sender<CollectionEvent>,
}

impl EventHandlers {
    pub(crate) fn new() -> Self {
        let (broadcast, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            next_id: AtomicU64::new(1),
            lists: Mutex::new(HashMap::new()),
            broadcast,
        }
    }

    /// Register `handler`; replays the remembered emission, if any.
    pub(crate) fn on(&self, kind: EventKind, handler: Handler) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let replay = {
            let mut lists = self.lists.lock().unwrap_or_else(PoisonError::into_inner);
            let list = lists.entry(kind).or_default();
            list.handlers.push((id, Arc::clone(&handler)));
            list.memory.clone()
        };
        if let Some(event) = replay {
            handler(&event);
        }
        id
    }

    pub(crate) fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut lists = self.lists.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = lists.get_mut(&kind) else {
            return false;
        };
        let before = list.handlers.len();
        list.handlers.retain(|(h, _)| *h != id);
        list.handlers.len() != before
    }

    pub(crate) fn emit(&self, event: CollectionEvent) {
        let handlers = self.handlers(event.kind(), None);
        self.dispatch(&handlers, event);
    }

    /// Emit and remember `event` for handlers registered later.
    pub(crate) fn emit_memory(&self, event: CollectionEvent) {
        let handlers = self.handlers(event.kind(), Some(event.clone()));
        self.dispatch(&handlers, event);
    }

    pub(crate) fn has_fired(&self, kind: EventKind) -> bool {
        let lists = self.lists.lock().unwrap_or_else(PoisonError::into_inner);
        lists.get(&kind).is_some_and(|l| l.memory.is_some())
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<CollectionEvent> {
        self.broadcast.subscribe()
    }

    /// Snapshot the handlers, storing `memory` under the same lock so a
    /// concurrent `on` sees either the emission or the memory.
    fn handlers(&self, kind: EventKind, memory: Option<CollectionEvent>) -> Vec<Handler> {
        let mut lists = self.lists.lock().unwrap_or_else(PoisonError::into_inner);
        let list = lists.entry(kind).or_default();
        if memory.is_some() {
            list.memory = memory;
        }
        list.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
    }

    fn dispatch(&self, handlers: &[Handler], event: CollectionEvent) {
        for handler in handlers {
            handler(&event);
        }
        // No receivers is fine.
        let _ = self.broadcast.send(event);
    }
}
