// ── Application entry point ──
//
// `Sailor` bundles a registry with the transport it was built on and,
// when connected from config, the event socket feeding that transport.

use std::future::Future;
use std::sync::Arc;

use sailor_api::{EventStreamHandle, HttpTransport, Transport};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::bind::Scope;
use crate::collection::Collection;
use crate::config::SailorConfig;
use crate::entity::{Entity, FieldValue, Patch};
use crate::error::CoreError;
use crate::filter::Filter;
use crate::registry::Registry;
use crate::schema::{CollectionSchema, ComputeContext, ComputedField, FieldSpec, ItemSchema};

#[derive(Clone)]
pub struct Sailor {
    registry: Registry,
    events: Option<Arc<EventStreamHandle>>,
}

impl Sailor {
    /// Build on an existing transport. Live updates arrive through its
    /// `subscribe` channels.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self, CoreError> {
        Ok(Self {
            registry: Registry::new(transport)?,
            events: None,
        })
    }

    /// Connect over HTTP, plus the event socket when one is configured.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: &SailorConfig) -> Result<Self, CoreError> {
        let transport = Arc::new(HttpTransport::new(
            config.url.clone(),
            &config.transport_config(),
        )?);
        let hub = Arc::clone(transport.hub());
        let registry = Registry::new(transport)?;

        let events = match &config.websocket_url {
            Some(ws_url) => {
                let authorization = config
                    .auth_token
                    .as_ref()
                    .map(|token| format!("Bearer {}", token.expose_secret()));
                info!(url = %ws_url, "connecting event socket");
                Some(Arc::new(EventStreamHandle::connect(
                    ws_url.clone(),
                    config.reconnect.clone(),
                    CancellationToken::new(),
                    hub,
                    authorization,
                )))
            }
            None => None,
        };

        Ok(Self { registry, events })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register (or re-register) a model and return its unfiltered collection.
    pub fn register_model(
        &self,
        name: &str,
        item_schema: Option<ItemSchema>,
        collection_schema: Option<CollectionSchema>,
    ) -> Result<Collection, CoreError> {
        self.registry.get(
            name,
            item_schema.map(Arc::new),
            collection_schema.map(Arc::new),
            &Filter::new(),
        )
    }

    /// Assign a registered model's collection into `scope`.
    ///
    /// `property` defaults to the model name plus "s".
    pub fn bind_model<S: Scope + ?Sized>(
        &self,
        name: &str,
        scope: &mut S,
        property: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<Collection, CoreError> {
        self.registry.lookup(name)?.bind(scope, property, filter)
    }

    /// The unfiltered collection of a registered model.
    pub fn model(&self, name: &str) -> Result<Collection, CoreError> {
        self.registry.lookup(name)
    }

    /// Create a record of a registered model.
    pub async fn create(&self, name: &str, data: impl Into<Patch>) -> Result<Entity, CoreError> {
        let patch = data.into();
        self.registry.lookup(name)?.insert(patch).await
    }

    /// Stop event routing and the event socket.
    pub fn shutdown(&self) {
        self.registry.shutdown();
        if let Some(events) = &self.events {
            events.shutdown();
        }
    }
}

/// Declare a computed schema field, optionally carrying extra descriptor
/// properties.
pub fn computed_field<F, Fut>(compute: F, props: Option<Map<String, Value>>) -> FieldSpec
where
    F: Fn(ComputeContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<FieldValue>, CoreError>> + Send + 'static,
{
    let field = ComputedField::new(compute);
    FieldSpec::Computed(match props {
        Some(props) => field.with_props(props),
        None => field,
    })
}

impl From<&Collection> for FieldSpec {
    /// A connection to the collection's resource.
    fn from(collection: &Collection) -> Self {
        FieldSpec::connection(collection.name())
    }
}
