// ── Change router ──
//
// One transport subscription per resource name; every live collection of
// that resource receives each message.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use sailor_api::{ResourceMessage, Transport, Verb};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::collection::{Collection, Inbound, WeakCollection};
use crate::task;

type Routes = DashMap<String, Vec<WeakCollection>>;

pub struct ChangeRouter {
    transport: Arc<dyn Transport>,
    routes: Arc<Routes>,
    cancel: CancellationToken,
    runtime: Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// What one routed message did.
#[derive(Debug, Default)]
pub struct Delivery {
    applied: usize,
    checking: Vec<JoinHandle<()>>,
}

impl Delivery {
    /// Collections that applied the message synchronously.
    pub fn applied(&self) -> usize {
        self.applied
    }

    /// Collections still deciding (remote match check) whether to add
    /// the created record.
    pub fn checking(&self) -> usize {
        self.checking.len()
    }

    /// Whether the message reached no collection at all.
    pub fn is_empty(&self) -> bool {
        self.applied == 0 && self.checking.is_empty()
    }

    /// Wait for outstanding match checks.
    pub async fn settle(self) {
        for check in self.checking {
            if let Err(e) = check.await {
                warn!(error = %e, "match check task failed");
            }
        }
    }
}

impl ChangeRouter {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
        runtime: Handle,
    ) -> Self {
        Self {
            transport,
            routes: Arc::new(DashMap::new()),
            cancel,
            runtime,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start delivering messages for `collection`'s resource to it.
    pub(crate) fn register(&self, collection: &Collection) {
        let resource = collection.name().to_owned();
        let mut first = false;
        self.routes
            .entry(resource.clone())
            .or_insert_with(|| {
                first = true;
                Vec::new()
            })
            .push(collection.downgrade());

        if first {
            self.listen(resource);
        }
    }

    fn listen(&self, resource: String) {
        let mut events = self.transport.subscribe(&resource);
        let routes = Arc::clone(&self.routes);
        let cancel = self.cancel.clone();

        let handle = task::spawn(&self.runtime, "change router", async move {
            debug!(resource = %resource, "routing server events");
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(message) => {
                            route(&routes, &resource, &message);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(resource = %resource, skipped, "event subscriber lagged");
                        }
                        Err(RecvError::Closed) => {
                            debug!(resource = %resource, "event channel closed");
                            break;
                        }
                    },
                }
            }
        });
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Route a message received outside the transport subscription.
    ///
    /// The resource is taken from the message's `model`.
    pub fn dispatch(&self, message: impl Into<Arc<ResourceMessage>>) -> Delivery {
        let message = message.into();
        route(&self.routes, &message.model, &message)
    }

    /// Resources with at least one routed collection.
    pub fn resources(&self) -> Vec<String> {
        self.routes.iter().map(|r| r.key().clone()).collect()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

fn route(routes: &Routes, resource: &str, message: &Arc<ResourceMessage>) -> Delivery {
    if let Verb::Unknown(verb) = &message.verb {
        trace!(resource, verb = %verb, "dropping message with unrecognized verb");
        return Delivery::default();
    }

    // Collect first: collections must not run while the route entry is locked.
    let targets: Vec<Collection> = routes
        .get(resource)
        .map(|list| list.iter().filter_map(WeakCollection::upgrade).collect())
        .unwrap_or_default();

    let mut delivery = Delivery::default();
    for collection in targets {
        match collection.handle_message(message) {
            Inbound::Applied => delivery.applied += 1,
            Inbound::Checking(handle) => delivery.checking.push(handle),
            Inbound::Ignored => {}
        }
    }
    trace!(
        resource,
        verb = %message.verb,
        applied = delivery.applied,
        checking = delivery.checking.len(),
        "message routed"
    );
    delivery
}

impl Drop for ChangeRouter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
