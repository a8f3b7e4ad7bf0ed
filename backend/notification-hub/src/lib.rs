//! Real-time notification fan-out hub
//!
//! ```text
//! Publisher ──> backbone (Redis pub/sub) ──> bridge ──> hub loop ──> live connections
//!                                                          ▲
//!                          register / unregister / deliver ┘
//! ```
//!
//! A single task (the hub loop) owns the registry of live connections;
//! everything else talks to it through [`HubHandle`].

pub mod backbone;
mod bridge;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod global;
pub mod http;
pub mod hub;
pub mod localizer;
pub mod logging;
pub mod metrics;
pub mod publisher;
pub mod topics;
pub mod websocket;

pub use backbone::{Backbone, MemoryBackbone, RedisBackbone, Subscription};
pub use config::Config;
pub use connection::{BoxedConnection, ChannelConnection, Connection, ConnectionError};
pub use envelope::{Envelope, UserId};
pub use error::{HubError, Result};
pub use hub::{ConnectionId, Hub, HubBuilder, HubHandle, HubState, RegisterRejected};
pub use localizer::{CatalogLocalizer, Localizer};
pub use publisher::Publisher;
