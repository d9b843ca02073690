//! Ports - interfaces to the external collaborators the engine depends on

mod api;
mod auth;
mod live;

pub use api::{ApiResult, MessageApi, MessagePage, SendMessagePayload};
pub use auth::{AuthProvider, Credential};
pub use live::LiveChannel;
