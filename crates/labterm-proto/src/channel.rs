//! Transport channel capability.
//!
//! A channel is a persistent, ordered, bidirectional message path bound to
//! one backend session. The session client never touches raw frames: it
//! sends [`ClientEvent`]s and consumes an in-order stream of
//! [`ChannelSignal`]s. Connection-level conditions (connect, disconnect,
//! dial failure) travel through the same stream as decoded server events,
//! so the state machine has exactly one input.

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::events::ClientEvent;
use crate::events::ServerEvent;

/// One item from the channel's signal stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    /// The underlying transport is established (initially or after a
    /// reconnect).
    Connected,
    /// A decoded server event.
    Event(ServerEvent),
    /// The transport dropped, or a reconnect attempt failed. Emitted once
    /// per lost connection.
    Disconnected { reason: String },
    /// A dial attempt failed; the channel keeps retrying on its own.
    ConnectError { message: String },
}

/// Capability the session client drives. Implementations own their
/// reconnection/backoff policy; consumers only observe signals.
#[async_trait]
pub trait Channel: Send {
    /// Begin connecting. Progress is reported through the signal stream.
    async fn connect(&mut self) -> Result<(), ChannelError>;

    /// Send one event. Fails when not connected; never retries.
    async fn send(&mut self, event: ClientEvent) -> Result<(), ChannelError>;

    /// Next signal, in delivery order. `None` once the channel is closed
    /// and the stream is drained.
    async fn next_signal(&mut self) -> Option<ChannelSignal>;

    /// Whether the transport is currently established.
    fn is_connected(&self) -> bool;

    /// Close the transport and stop any reconnection. Idempotent.
    async fn close(&mut self);
}
