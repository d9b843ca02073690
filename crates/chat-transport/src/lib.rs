//! # chat-transport
//!
//! Infrastructure adapters for the synchronization engine: the live
//! connection (handshake, heartbeats, reconnect with backoff), scope
//! subscriptions with join replay, and the HTTP message API client.

pub mod connection;
pub mod error;
pub mod http;
pub mod protocol;
pub mod subscription;

// Re-export commonly used types at crate root
pub use connection::{
    Backoff, ConnectionListener, ConnectionState, Connector, Frame, ListenerHandle, LiveLink,
    TransportClient, TransportSignal, WsConnector,
};
pub use error::{TransportError, TransportResult};
pub use http::{ApiError, ErrorDetail, HttpMessageApi};
pub use protocol::{CloseAction, CloseCode, GatewayMessage, OpCode, READY_EVENT};
pub use subscription::SubscriptionManager;
