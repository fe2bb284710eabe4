//! Connection lifecycle for the single shared MQTT client
//!
//! - [`state`] - pure state machine (`Disconnected -> Connecting -> Connected`, `Failed`)
//! - [`manager`] - [`ConnectionManager`], the only writer of connection state
//! - [`handle`] - [`ConnectionHandle`], what bridges use to publish and subscribe
//! - [`subscriptions`] - inbound publish routing by topic filter

pub mod handle;
pub mod manager;
pub mod state;
pub mod subscriptions;

pub use handle::ConnectionHandle;
pub use manager::ConnectionManager;
pub use state::{can_publish, next_state, ConnectionEvent, ConnectionState, InvalidTransition};
pub use subscriptions::{InboundMessage, SubscriptionTable};
