// sailor-api: request/response and real-time event transport for sailor

pub mod error;
pub mod http;
pub mod hub;
pub mod message;
pub mod path;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use http::HttpTransport;
pub use hub::EventHub;
pub use message::{ResourceMessage, Verb};
pub use path::ResourcePath;
pub use transport::{TlsMode, Transport, TransportConfig};
pub use websocket::{EventStreamHandle, ReconnectConfig};
