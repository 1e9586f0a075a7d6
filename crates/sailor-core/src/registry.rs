// ── Model registry ──
//
// The single cache of collections, keyed by resource name plus filter
// signature. Explicitly constructed and passed around; clones share state.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sailor_api::Transport;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::collection::Collection;
use crate::error::CoreError;
use crate::filter::Filter;
use crate::router::ChangeRouter;
use crate::schema::{CollectionSchema, ItemSchema};
use crate::task;

#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

pub(crate) struct RegistryInner {
    transport: Arc<dyn Transport>,
    /// Background refreshes, computations and routing all run here.
    runtime: Handle,
    collections: DashMap<String, Collection>,
    router: ChangeRouter,
}

fn cache_key(name: &str, filter: &Filter) -> String {
    format!("{name}{}", filter.signature())
}

impl Registry {
    /// Build a registry on the calling thread's tokio runtime.
    ///
    /// Fails with [`CoreError::NoRuntime`] outside a runtime: collections
    /// load and recompute in the background, which needs one.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self, CoreError> {
        let runtime = task::current()?;
        let router = ChangeRouter::new(
            Arc::clone(&transport),
            CancellationToken::new(),
            runtime.clone(),
        );
        Ok(Self {
            inner: Arc::new(RegistryInner {
                transport,
                runtime,
                collections: DashMap::new(),
                router,
            }),
        })
    }

    pub(crate) fn from_inner(inner: Arc<RegistryInner>) -> Self {
        Self { inner }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }

    pub fn router(&self) -> &ChangeRouter {
        &self.inner.router
    }

    /// The collection for `name` under `filter`, created on first request.
    ///
    /// A new collection is validated, routed and refreshed in the
    /// background. On a cache hit, a different item schema replaces the
    /// cached one and triggers a refresh; a collection schema replaces
    /// the cached one.
    pub fn get(
        &self,
        name: &str,
        item_schema: Option<Arc<ItemSchema>>,
        collection_schema: Option<Arc<CollectionSchema>>,
        filter: &Filter,
    ) -> Result<Collection, CoreError> {
        if let Some(schema) = &item_schema {
            schema.validate(name)?;
        }
        if let Some(schema) = &collection_schema {
            schema.validate(name)?;
        }

        let key = cache_key(name, filter);
        let existing = self.inner.collections.get(&key).map(|c| c.clone());
        if let Some(collection) = existing {
            Self::update_cached(&collection, item_schema, collection_schema);
            return Ok(collection);
        }

        let collection = Collection::new(
            name,
            filter.clone(),
            item_schema.unwrap_or_default(),
            collection_schema.unwrap_or_default(),
            Arc::clone(&self.inner.transport),
            Arc::downgrade(&self.inner),
            self.inner.runtime.clone(),
        );
        match self.inner.collections.entry(key) {
            // Lost a race with another caller for the same key.
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(collection.clone());
            }
        }

        debug!(model = name, filter = %filter, "collection created");
        self.inner.router.register(&collection);
        collection.spawn_refresh();
        Ok(collection)
    }

    fn update_cached(
        collection: &Collection,
        item_schema: Option<Arc<ItemSchema>>,
        collection_schema: Option<Arc<CollectionSchema>>,
    ) {
        if let Some(schema) = item_schema {
            if !Arc::ptr_eq(&schema, &collection.item_schema()) {
                collection.set_item_schema(schema);
                collection.spawn_refresh();
            }
        }
        if let Some(schema) = collection_schema {
            collection.set_collection_schema(schema);
        }
    }

    /// The unfiltered collection of a registered resource.
    pub fn lookup(&self, name: &str) -> Result<Collection, CoreError> {
        self.inner
            .collections
            .get(&cache_key(name, &Filter::new()))
            .map(|c| c.clone())
            .ok_or_else(|| CoreError::UnknownModel {
                name: name.to_owned(),
            })
    }

    pub fn contains(&self, name: &str, filter: &Filter) -> bool {
        self.inner.collections.contains_key(&cache_key(name, filter))
    }

    /// Number of cached collections, across all resources and filters.
    pub fn len(&self) -> usize {
        self.inner.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.collections.is_empty()
    }

    /// Stop routing server events. Cached collections stay readable.
    pub fn shutdown(&self) {
        self.inner.router.shutdown();
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("collections", &self.inner.collections.len())
            .finish_non_exhaustive()
    }
}
