//! Live connection management

mod backoff;
mod client;
mod connector;
mod listener;
mod state;

pub use backoff::Backoff;
pub use client::TransportClient;
pub use connector::{Connector, Frame, LiveLink, WsConnector};
pub use listener::{ConnectionListener, ListenerHandle};
pub use state::{ConnectionState, TransportSignal};
