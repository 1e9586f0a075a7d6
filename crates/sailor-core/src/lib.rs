// sailor-core: reactive model cache kept in sync with a real-time CRUD backend.

pub mod bind;
pub mod collection;
pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod id;
pub mod registry;
pub mod router;
pub mod sailor;
pub mod schema;
pub mod stream;

mod task;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bind::{Scope, default_property};
pub use collection::{Collection, CollectionEvent, EventKind, HandlerId};
pub use config::{SailorConfig, TlsVerification};
pub use entity::{Entity, FieldValue, Patch, Pending};
pub use error::{CoreError, check_response};
pub use filter::Filter;
pub use id::EntityId;
pub use registry::Registry;
pub use router::{ChangeRouter, Delivery};
pub use sailor::{Sailor, computed_field};
pub use schema::{
    CollectionSchema, ComputeContext, ComputedField, FieldSpec, ItemSchema, UpdateParams,
};
pub use stream::EntityStream;

// Transport-level types consumers need to implement or feed a transport.
pub use sailor_api::{ResourceMessage, ResourcePath, Transport, Verb};
