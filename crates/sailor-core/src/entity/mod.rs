// ── Records ──
//
// An Entity is one record of a resource. It is a cheap, cloneable handle;
// all clones see the same fields. The owning collection is referenced
// weakly: collections own their records, never the other way round.

mod connection;
mod patch;
mod value;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::DashMap;
use sailor_api::{ResourcePath, Transport};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::collection::{Collection, WeakCollection};
use crate::error::{CoreError, check_response};
use crate::filter::Filter;
use crate::id::EntityId;
use crate::registry::Registry;
use crate::schema::{ComputeContext, FieldSpec, ItemSchema, UpdateParams};
use crate::task;

pub use patch::{Patch, Pending};
pub use value::FieldValue;

pub(crate) use patch::Fields;
pub(crate) use value::{deep_merge, merge_result};

/// Identity of an entity during a recursive walk.
type ChainKey = *const ();

#[derive(Clone)]
pub struct Entity {
    inner: Arc<EntityInner>,
}

struct EntityInner {
    resource: ResourcePath,
    collection: WeakCollection,
    runtime: Handle,
    fields: RwLock<Fields>,
    /// Bumped per field by every `apply` that writes it, now or later.
    /// Background results carry the generation they were started for and
    /// are dropped once a newer one exists.
    generations: DashMap<String, u64>,
}

impl Entity {
    /// Build a record owned by `collection` and apply its initial fields.
    pub(crate) fn attach(
        collection: &Collection,
        data: Patch,
        params: UpdateParams,
    ) -> (Self, Pending) {
        let entity = Self {
            inner: Arc::new(EntityInner {
                resource: collection.path().clone(),
                collection: collection.downgrade(),
                runtime: collection.runtime().clone(),
                fields: RwLock::new(Fields::new()),
                generations: DashMap::new(),
            }),
        };
        let pending = entity.apply(data, params);
        (entity, pending)
    }

    fn read(&self) -> RwLockReadGuard<'_, Fields> {
        self.inner.fields.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Fields> {
        self.inner.fields.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn runtime(&self) -> &Handle {
        &self.inner.runtime
    }

    fn key(&self) -> ChainKey {
        Arc::as_ptr(&self.inner).cast()
    }

    // ── Accessors ────────────────────────────────────────────────────

    /// Server-assigned identifier, once persisted.
    pub fn id(&self) -> Option<EntityId> {
        self.read()
            .get("id")
            .and_then(FieldValue::as_json)
            .and_then(EntityId::from_json)
    }

    pub fn is_persisted(&self) -> bool {
        self.id().is_some()
    }

    /// Resource name this record belongs to.
    pub fn model(&self) -> &str {
        self.inner.resource.name()
    }

    pub fn resource(&self) -> &ResourcePath {
        &self.inner.resource
    }

    pub fn get(&self, field: &str) -> Option<FieldValue> {
        self.read().get(field).cloned()
    }

    /// A field rendered as plain JSON.
    pub fn get_json(&self, field: &str) -> Option<Value> {
        self.get(field).map(|v| v.to_json())
    }

    pub fn field_names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// The owning collection, while it is alive.
    pub fn collection(&self) -> Option<Collection> {
        self.inner.collection.upgrade()
    }

    /// Whether both handles refer to the same record instance.
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// All fields as JSON. Linked records are rendered in full; a record
    /// that links back to one already being rendered appears as its id.
    pub fn to_value(&self) -> Value {
        self.render(&mut Vec::new())
    }

    pub(crate) fn render(&self, chain: &mut Vec<ChainKey>) -> Value {
        if chain.contains(&self.key()) {
            return self.id_json();
        }
        let fields = self.read().clone();
        chain.push(self.key());
        let object: Map<String, Value> = fields
            .iter()
            .map(|(k, v)| (k.clone(), v.render(chain)))
            .collect();
        chain.pop();
        Value::Object(object)
    }

    fn id_json(&self) -> Value {
        self.id().map_or(Value::Null, |id| id.to_json())
    }

    /// Whether this record satisfies `filter` locally.
    pub fn matches_filter(&self, filter: &Filter) -> bool {
        filter.matches_with(|field| self.get(field).as_ref().map(FieldValue::match_key))
    }

    fn schema(&self) -> Arc<ItemSchema> {
        self.collection()
            .map_or_else(|| Arc::new(ItemSchema::default()), |c| c.item_schema())
    }

    fn owner(&self) -> Result<Collection, CoreError> {
        self.collection().ok_or_else(|| CoreError::Detached {
            model: self.model().to_owned(),
        })
    }

    fn transport(&self) -> Result<Arc<dyn Transport>, CoreError> {
        Ok(self.owner()?.transport())
    }

    pub(crate) fn registry(&self) -> Result<Registry, CoreError> {
        self.owner()?.registry()
    }

    /// Start a new generation of `field`. Callers hold the field lock.
    fn bump(&self, field: &str) -> u64 {
        let mut generation = self.inner.generations.entry(field.to_owned()).or_insert(0);
        *generation += 1;
        *generation
    }

    /// Store a background result unless a newer update superseded it.
    fn set_field(&self, field: String, generation: u64, value: Option<FieldValue>) {
        {
            let mut fields = self.write();
            let current = self
                .inner
                .generations
                .get(&field)
                .is_some_and(|g| *g == generation);
            if !current {
                trace!(model = self.model(), field = %field, "dropping superseded field result");
                return;
            }
            match value {
                Some(value) => {
                    fields.insert(field, value);
                }
                None => {
                    fields.shift_remove(&field);
                }
            }
        }
        if let Some(collection) = self.collection() {
            collection.touch();
        }
    }

    // ── Local update ─────────────────────────────────────────────────

    /// Merge `data` into the record and re-derive schema fields.
    ///
    /// Incoming fields replace current ones. Plain schema fields are then
    /// reset to their defaults, and every computed or connection field is
    /// recomputed from its pre-update value (the incoming value when `data`
    /// carries the field, the current one otherwise). Computations and
    /// deferred values finish in the background; the returned [`Pending`]
    /// can be awaited to observe them. A result that arrives after a later
    /// `apply` wrote the same field is discarded.
    pub fn apply(&self, data: impl Into<Patch>, params: UpdateParams) -> Pending {
        let patch = data.into();
        let schema = self.schema();

        let mut fields = self.write();
        let derived: Vec<(String, FieldSpec, Option<FieldValue>)> = schema
            .iter()
            .filter(|(_, spec)| spec.is_derived())
            .map(|(name, spec)| {
                let previous = patch
                    .ready_value(name)
                    .or_else(|| fields.get(name).cloned());
                (name.to_owned(), spec.clone(), previous)
            })
            .collect();

        let (ready, deferred) = patch.split();
        for name in ready.keys() {
            self.bump(name);
        }
        fields.extend(ready);
        for (name, spec) in schema.iter() {
            if let FieldSpec::Plain(default) = spec {
                self.bump(name);
                fields.insert(name.to_owned(), FieldValue::Json(default.clone()));
            }
        }
        let deferred: Vec<_> = deferred
            .into_iter()
            .map(|(field, value)| (self.bump(&field), field, value))
            .collect();
        let derived: Vec<_> = derived
            .into_iter()
            .map(|(field, spec, previous)| (self.bump(&field), field, spec, previous))
            .collect();
        drop(fields);

        let mut pending = Pending::default();
        for (generation, field, value) in deferred {
            let entity = self.clone();
            pending.push(task::spawn(self.runtime(), "deferred field", async move {
                let value = value.await;
                entity.set_field(field, generation, Some(value));
                Ok::<_, CoreError>(())
            }));
        }

        for (generation, field, spec, previous) in derived {
            let ctx = ComputeContext {
                entity: self.clone(),
                previous: previous.clone(),
                params,
            };
            let future = match spec {
                FieldSpec::Computed(computed) => computed.run(ctx),
                FieldSpec::Connection { resource } => connection::resolve(resource, ctx),
                FieldSpec::Plain(_) => continue,
            };
            let entity = self.clone();
            pending.push(task::spawn(self.runtime(), "computed field", async move {
                match future.await {
                    Ok(result) => {
                        entity.set_field(field, generation, merge_result(previous, result));
                        Ok(())
                    }
                    Err(e) => {
                        warn!(
                            model = entity.model(),
                            field = %field,
                            error = %e,
                            "field computation failed"
                        );
                        Err(e)
                    }
                }
            }));
        }
        pending
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Apply `data` locally, then persist it when `sync` is set.
    ///
    /// A persisted record sends a partial update with the projection of
    /// `data`; an unpersisted one is created instead. The local change is
    /// kept even when the server rejects the write.
    pub async fn update(&self, data: impl Into<Patch>, sync: bool) -> Result<Value, CoreError> {
        let patch = data.into();
        let sent = patch.ready_fields();
        drop(self.apply(patch, UpdateParams::default()));

        if !sync {
            return Ok(Value::Null);
        }
        match self.id() {
            Some(id) => {
                let body = self.project(Some(&sent), &mut Vec::new());
                self.post_update(&id, &body).await
            }
            None => self.create_fields(Some(sent)).await,
        }
    }

    /// Persist every field.
    pub async fn save(&self) -> Result<Value, CoreError> {
        match self.id() {
            Some(id) => {
                let body = self.server_properties();
                self.post_update(&id, &body).await
            }
            None => self.create_fields(None).await,
        }
    }

    async fn post_update(&self, id: &EntityId, body: &Value) -> Result<Value, CoreError> {
        let path = self.inner.resource.update(id);
        debug!(model = self.model(), %id, "updating record");
        let response = self.transport()?.post(&path, body).await?;
        check_response(response)
    }

    /// Create this record on the server.
    ///
    /// Sends the projection of `data` (or of the whole record), then
    /// merges the server's response into what was sent and applies it,
    /// which is how the record learns its identifier.
    pub async fn create(&self, data: Option<Patch>) -> Result<Value, CoreError> {
        let sent = data.map(|p| p.ready_fields());
        self.create_fields(sent).await
    }

    async fn create_fields(&self, sent: Option<Fields>) -> Result<Value, CoreError> {
        let mut body = self.project(sent.as_ref(), &mut Vec::new());
        let path = self.inner.resource.create();
        debug!(model = self.model(), "creating record");

        let response = check_response(self.transport()?.put(&path, &body).await?)?;
        deep_merge(&mut body, response.clone());
        drop(self.apply(Patch::from_json(body), UpdateParams::default()));
        Ok(response)
    }

    /// Re-read the record from the server.
    ///
    /// Connection fields resolve without refreshing the records they
    /// point at; the first failed field computation is returned once all
    /// of them finished. An unpersisted record is created instead.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let Some(id) = self.id() else {
            self.create_fields(None).await?;
            return Ok(());
        };
        let path = self.inner.resource.item(&id);
        let response = self.transport()?.get(&path, &Value::Object(Map::new())).await?;
        let data = check_response(response)?;
        self.apply(Patch::from_json(data), UpdateParams::no_refresh())
            .settle()
            .await
    }

    /// Remove the record locally, then delete it on the server.
    ///
    /// An unpersisted record only leaves its collection.
    pub async fn destroy(&self) -> Result<Value, CoreError> {
        let owner = self.owner()?;
        owner.remove(self);

        let Some(id) = self.id() else {
            return Ok(Value::Null);
        };
        let path = self.inner.resource.delete(&id);
        debug!(model = self.model(), %id, "deleting record");
        let response = owner
            .transport()
            .delete(&path, &Value::Object(Map::new()))
            .await?;
        check_response(response)
    }

    /// Ask the server whether this record is among the results of `query`.
    pub async fn matches(&self, query: &Filter) -> Result<bool, CoreError> {
        let Some(id) = self.id() else {
            return Ok(false);
        };
        let response = self
            .transport()?
            .get(self.inner.resource.base(), &query.to_query())
            .await?;
        let response = check_response(response)?;
        let found = match &response {
            Value::Array(records) => records.iter().any(|r| is_record(r, &id)),
            single => is_record(single, &id),
        };
        Ok(found)
    }

    // ── Server projection ────────────────────────────────────────────

    /// The record in the shape the server accepts.
    ///
    /// Linked records are projected recursively (a record already being
    /// projected further up appears as its id). Plain and computed schema
    /// fields stay local; connection fields and undeclared fields are sent.
    pub fn server_properties(&self) -> Value {
        self.project(None, &mut Vec::new())
    }

    /// Project a partial field set instead of the whole record.
    pub fn server_properties_of(&self, data: impl Into<Patch>) -> Value {
        let fields = data.into().ready_fields();
        self.project(Some(&fields), &mut Vec::new())
    }

    fn project(&self, source: Option<&Fields>, chain: &mut Vec<ChainKey>) -> Value {
        let schema = self.schema();
        let owned;
        let fields = match source {
            Some(fields) => fields,
            None => {
                owned = self.read().clone();
                &owned
            }
        };

        chain.push(self.key());
        let mut out = Map::new();
        for (key, value) in fields {
            let projected = match value {
                FieldValue::Entity(entity) => Some(entity.project_nested(chain)),
                FieldValue::List(items) => Some(project_list(items, chain)),
                FieldValue::Json(v) if schema.contains(key) => {
                    schema.is_connection(key).then(|| v.clone())
                }
                FieldValue::Json(v) => Some(v.clone()),
            };
            if let Some(projected) = projected {
                out.insert(key.clone(), projected);
            }
        }
        chain.pop();
        Value::Object(out)
    }

    fn project_nested(&self, chain: &mut Vec<ChainKey>) -> Value {
        if chain.contains(&self.key()) {
            self.id_json()
        } else {
            self.project(None, chain)
        }
    }
}

/// Lists of records are projected element-wise; a list with anything
/// else in it is sent as plain values, records reduced to their ids.
fn project_list(items: &[FieldValue], chain: &mut Vec<ChainKey>) -> Value {
    if items.iter().all(|i| i.as_entity().is_some()) {
        Value::Array(
            items
                .iter()
                .filter_map(FieldValue::as_entity)
                .map(|e| e.project_nested(chain))
                .collect(),
        )
    } else {
        Value::Array(items.iter().map(FieldValue::match_key).collect())
    }
}

fn is_record(record: &Value, id: &EntityId) -> bool {
    record
        .get("id")
        .and_then(EntityId::from_json)
        .is_some_and(|found| &found == id)
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.model())
            .field("id", &self.id())
            .finish_non_exhaustive()
    }
}
