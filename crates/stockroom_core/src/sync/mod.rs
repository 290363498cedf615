//! Real-time item sync: server connection, local relay and coordination.
//!
//! The layering goes bottom-up: [`transport`] defines the frame-level seam,
//! [`SyncConnection`] supervises one persistent WebSocket with reconnection,
//! [`RelayHub`] carries changes between contexts in the same process, and
//! [`SyncCoordinator`] ties both delivery paths to a subscriber registry.
//!
//! [`transport`]: SyncTransport

mod connection;
mod coordinator;
mod message;
mod relay;
mod tokio_transport;
mod transport;

pub use connection::{ConnectionConfig, ReconnectPolicy, SyncConnection, Visibility};
pub use coordinator::{SyncCoordinator, SyncSubscription};
pub use message::{ItemAction, OwnerType, SyncMessage};
pub use relay::{RelayChannel, RelayHub, RelaySubscription, items_channel_name};
pub use tokio_transport::{TokioConnector, TokioTransport};
pub use transport::{SyncEndpoint, SyncTransport, TransportConnector, TransportError, WsMessage};
