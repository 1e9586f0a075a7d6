// ── Live collections ──
//
// A Collection is the cached result set of one resource under one filter.
// Records are held in a `watch` channel so readers always get a cheap
// snapshot and async consumers can await changes.

mod events;
mod inbound;

use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use dashmap::DashMap;
use sailor_api::{ResourcePath, Transport};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::entity::{Entity, Patch, Pending};
use crate::error::{CoreError, check_response};
use crate::filter::Filter;
use crate::id::EntityId;
use crate::registry::{Registry, RegistryInner};
use crate::schema::{CollectionSchema, ItemSchema, UpdateParams};
use crate::stream::EntityStream;
use crate::task;

pub use events::{CollectionEvent, EventKind, Handler, HandlerId};
pub(crate) use inbound::Inbound;

use events::EventHandlers;

#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

pub(crate) struct CollectionInner {
    path: ResourcePath,
    filter: Filter,
    item_schema: ArcSwap<ItemSchema>,
    collection_schema: ArcSwap<CollectionSchema>,
    transport: Arc<dyn Transport>,
    registry: Weak<RegistryInner>,
    runtime: Handle,
    items: watch::Sender<Arc<Vec<Entity>>>,
    load: watch::Sender<LoadState>,
    events: EventHandlers,
    /// Narrower collections derived through `find`, by filter signature.
    children: DashMap<String, WeakCollection>,
}

/// Outcome of the loads so far. Once loaded, a collection stays loaded;
/// a failure is kept until the next refresh starts.
#[derive(Debug, Clone)]
enum LoadState {
    Loading,
    Loaded,
    Failed(CoreError),
}

/// Non-owning collection handle, held by records and the router.
#[derive(Clone)]
pub(crate) struct WeakCollection(Weak<CollectionInner>);

impl WeakCollection {
    pub(crate) fn upgrade(&self) -> Option<Collection> {
        self.0.upgrade().map(|inner| Collection { inner })
    }
}

impl Collection {
    pub(crate) fn new(
        name: &str,
        filter: Filter,
        item_schema: Arc<ItemSchema>,
        collection_schema: Arc<CollectionSchema>,
        transport: Arc<dyn Transport>,
        registry: Weak<RegistryInner>,
        runtime: Handle,
    ) -> Self {
        let (items, _) = watch::channel(Arc::new(Vec::new()));
        let (load, _) = watch::channel(LoadState::Loading);
        Self {
            inner: Arc::new(CollectionInner {
                path: ResourcePath::new(name),
                filter,
                item_schema: ArcSwap::new(item_schema),
                collection_schema: ArcSwap::new(collection_schema),
                transport,
                registry,
                runtime,
                items,
                load,
                events: EventHandlers::new(),
                children: DashMap::new(),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakCollection {
        WeakCollection(Arc::downgrade(&self.inner))
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Resource name, including any namespace prefix.
    pub fn name(&self) -> &str {
        self.inner.path.name()
    }

    pub fn path(&self) -> &ResourcePath {
        &self.inner.path
    }

    pub fn filter(&self) -> &Filter {
        &self.inner.filter
    }

    pub fn item_schema(&self) -> Arc<ItemSchema> {
        self.inner.item_schema.load_full()
    }

    pub(crate) fn set_item_schema(&self, schema: Arc<ItemSchema>) {
        self.inner.item_schema.store(schema);
    }

    pub fn collection_schema(&self) -> Arc<CollectionSchema> {
        self.inner.collection_schema.load_full()
    }

    pub(crate) fn set_collection_schema(&self, schema: Arc<CollectionSchema>) {
        self.inner.collection_schema.store(schema);
    }

    /// A collection schema property.
    pub fn property(&self, name: &str) -> Option<Value> {
        self.inner.collection_schema.load().get(name).cloned()
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.transport)
    }

    pub(crate) fn registry(&self) -> Result<Registry, CoreError> {
        self.inner
            .registry
            .upgrade()
            .map(Registry::from_inner)
            .ok_or_else(|| CoreError::Detached {
                model: self.name().to_owned(),
            })
    }

    /// Current records, in arrival order.
    pub fn snapshot(&self) -> Arc<Vec<Entity>> {
        self.inner.items.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.borrow().is_empty()
    }

    pub fn first(&self) -> Option<Entity> {
        self.inner.items.borrow().first().cloned()
    }

    pub fn by_id(&self, id: &EntityId) -> Option<Entity> {
        self.inner
            .items
            .borrow()
            .iter()
            .find(|e| e.id().as_ref() == Some(id))
            .cloned()
    }

    /// Whether at least one refresh has completed.
    pub fn is_ready(&self) -> bool {
        matches!(*self.inner.load.borrow(), LoadState::Loaded)
    }

    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Subscribe to snapshots of the record sequence.
    pub fn stream(&self) -> EntityStream {
        EntityStream::new(self.inner.items.subscribe())
    }

    // ── Sequence mutation ────────────────────────────────────────────

    pub(crate) fn push(&self, entity: Entity) {
        self.inner
            .items
            .send_modify(|items| Arc::make_mut(items).push(entity));
    }

    /// Drop `entity` from the sequence. Returns whether it was present.
    pub(crate) fn remove(&self, entity: &Entity) -> bool {
        self.inner.items.send_if_modified(|items| {
            match items.iter().position(|e| e.ptr_eq(entity)) {
                Some(index) => {
                    Arc::make_mut(items).remove(index);
                    true
                }
                None => false,
            }
        })
    }

    /// Mark the sequence as changed after records mutated in place.
    pub(crate) fn touch(&self) {
        self.inner.items.send_modify(|_| ());
    }

    // ── Loading ──────────────────────────────────────────────────────

    /// Re-read the whole collection from the server.
    ///
    /// The sequence is replaced (a single object becomes one record) and
    /// `ready` is emitted with memory before field computations settle,
    /// so collections whose computed fields wait on each other make
    /// progress. The future completes once those computations settled,
    /// and fails with the first computation error after the sequence was
    /// replaced.
    pub async fn refresh(&self) -> Result<Arc<Vec<Entity>>, CoreError> {
        self.inner.load.send_if_modified(|state| {
            let failed = matches!(state, LoadState::Failed(_));
            if failed {
                *state = LoadState::Loading;
            }
            failed
        });
        let records = match self.fetch().await {
            Ok(records) => records,
            Err(e) => {
                self.inner.load.send_if_modified(|state| {
                    if matches!(state, LoadState::Loaded) {
                        return false;
                    }
                    *state = LoadState::Failed(e.clone());
                    true
                });
                return Err(e);
            }
        };

        let mut pending = Pending::default();
        let entities: Vec<Entity> = records
            .into_iter()
            .map(|record| {
                let (entity, computing) =
                    Entity::attach(self, Patch::from_json(record), UpdateParams::default());
                pending.extend(computing);
                entity
            })
            .collect();
        let snapshot = Arc::new(entities);

        self.inner.items.send_replace(Arc::clone(&snapshot));
        self.inner.load.send_replace(LoadState::Loaded);
        debug!(
            model = self.name(),
            filter = %self.inner.filter,
            count = snapshot.len(),
            "collection refreshed"
        );
        self.inner
            .events
            .emit_memory(CollectionEvent::Ready(Arc::clone(&snapshot)));

        pending.settle().await?;
        Ok(snapshot)
    }

    async fn fetch(&self) -> Result<Vec<Value>, CoreError> {
        let response = self
            .inner
            .transport
            .get(self.inner.path.base(), &self.inner.filter.to_query())
            .await?;
        Ok(match check_response(response)? {
            Value::Array(records) => records,
            Value::Null => Vec::new(),
            single => vec![single],
        })
    }

    pub(crate) fn spawn_refresh(&self) -> JoinHandle<()> {
        let collection = self.clone();
        task::spawn(&self.inner.runtime, "collection refresh", async move {
            if let Err(e) = collection.refresh().await {
                warn!(model = collection.name(), error = %e, "collection refresh failed");
            }
        })
    }

    /// Wait until the first refresh completed, then return the records.
    ///
    /// Keeps waiting through failed loads; see [`loaded`](Self::loaded)
    /// for a wait that reports them.
    pub async fn ready(&self) -> Arc<Vec<Entity>> {
        let mut load = self.inner.load.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = load.wait_for(|s| matches!(s, LoadState::Loaded)).await;
        self.snapshot()
    }

    /// Wait for the load in flight and return the records, or its error.
    ///
    /// Does not request anything itself: a collection that loaded before
    /// returns right away, one whose last load failed returns that error
    /// until a later refresh succeeds.
    pub async fn loaded(&self) -> Result<Arc<Vec<Entity>>, CoreError> {
        let mut load = self.inner.load.subscribe();
        let state = load
            .wait_for(|s| !matches!(s, LoadState::Loading))
            .await
            .map(|s| LoadState::clone(&s))
            .map_err(|e| CoreError::Internal(format!("collection load state lost: {e}")))?;
        match state {
            LoadState::Failed(e) => Err(e),
            LoadState::Loading | LoadState::Loaded => Ok(self.snapshot()),
        }
    }

    /// Re-read every current record individually.
    pub async fn refresh_items(&self) -> Result<(), CoreError> {
        let items = self.snapshot();
        let results = futures_util::future::join_all(items.iter().map(|e| e.refresh())).await;
        results.into_iter().collect()
    }

    // ── Derived collections ──────────────────────────────────────────

    /// The collection for this one's filter narrowed by `filter`.
    ///
    /// Children are cached, and the registry guarantees one instance per
    /// resource and filter, so equal requests return the same collection.
    pub fn find(&self, filter: &Filter) -> Result<Collection, CoreError> {
        let merged = self.inner.filter.merge(filter);
        let signature = merged.signature();
        if let Some(child) = self.inner.children.get(&signature).and_then(|c| c.upgrade()) {
            return Ok(child);
        }

        let child = self.registry()?.get(
            self.name(),
            Some(self.item_schema()),
            Some(self.collection_schema()),
            &merged,
        )?;
        self.inner.children.insert(signature, child.downgrade());
        Ok(child)
    }

    /// First record matching `filter` once the narrowed collection loaded.
    pub async fn find_one(&self, filter: &Filter) -> Result<Option<Entity>, CoreError> {
        let child = self.find(filter)?;
        Ok(child.ready().await.first().cloned())
    }

    /// Local-only search over the current records.
    ///
    /// When `filter` adds nothing to this collection's own filter the
    /// whole sequence is returned.
    pub fn search(&self, filter: &Filter) -> Vec<Entity> {
        let merged = self.inner.filter.merge(filter);
        let items = self.snapshot();
        if merged == self.inner.filter {
            return items.as_ref().clone();
        }
        items
            .iter()
            .filter(|e| e.matches_filter(&merged))
            .cloned()
            .collect()
    }

    /// [`search`](Self::search) after the first refresh completed.
    pub async fn async_search(&self, filter: &Filter) -> Vec<Entity> {
        self.ready().await;
        self.search(filter)
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Register `handler` for `kind`. A `ready` that already happened is
    /// replayed immediately.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerId
    where
        F: Fn(&CollectionEvent) + Send + Sync + 'static,
    {
        self.inner.events.on(kind, Arc::new(handler))
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn off(&self, kind: EventKind, id: HandlerId) -> bool {
        self.inner.events.off(kind, id)
    }

    /// Every emission, for async consumers.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CollectionEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: CollectionEvent) {
        self.inner.events.emit(event);
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Persist every record in the background.
    pub fn save(&self) -> Vec<JoinHandle<()>> {
        self.snapshot()
            .iter()
            .map(|entity| {
                let entity = entity.clone();
                task::spawn(&self.inner.runtime, "save record", async move {
                    if let Err(e) = entity.save().await {
                        warn!(model = entity.model(), error = %e, "saving record failed");
                    }
                })
            })
            .collect()
    }

    /// Add a new record to this collection and create it on the server.
    ///
    /// The record is appended right away; it gains its identifier once the
    /// server confirms the create.
    pub async fn insert(&self, data: impl Into<Patch>) -> Result<Entity, CoreError> {
        let patch = data.into();
        let sent = Patch::from(patch.ready_fields());
        let (entity, _computing) = Entity::attach(self, patch, UpdateParams::default());
        self.push(entity.clone());
        entity.create(Some(sent)).await?;
        Ok(entity)
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name())
            .field("filter", &self.inner.filter.signature())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
