#![deny(clippy::all)]

//! Protocol boundary for labterm sessions.
//!
//! Everything that crosses the wire is defined here: the closed
//! [`ClientEvent`] / [`ServerEvent`] message set with a single
//! encoder/decoder pair, the [`Channel`] capability the session client
//! drives, a WebSocket implementation of it, and the provisioning REST
//! client.

mod channel;
mod error;
mod events;
mod mock_channel;
mod provision;
mod websocket;

pub use channel::Channel;
pub use channel::ChannelSignal;
pub use error::ApiError;
pub use error::ChannelError;
pub use error::ProtoError;
pub use events::AckStatus;
pub use events::ClientEvent;
pub use events::ServerEvent;
pub use events::decode_server;
pub use events::encode_client;
pub use mock_channel::MockChannel;
pub use mock_channel::MockChannelHandle;
pub use provision::ProvisionedScenario;
pub use provision::Provisioner;
pub use provision::ScenarioApi;
pub use websocket::WsChannel;
pub use websocket::channel_url;
