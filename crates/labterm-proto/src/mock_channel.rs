//! A scripted channel double for testing session behavior.
//!
//! The channel half is handed to the session client; the [`MockChannelHandle`]
//! stays with the test to push signals and inspect what was sent.
//!
//! # Example
//!
//! ```ignore
//! use labterm_proto::{Channel, ClientEvent, MockChannel};
//!
//! let (mut channel, handle) = MockChannel::new();
//! handle.push_connected();
//!
//! channel
//!     .send(ClientEvent::JoinScenario { session_id: "abc".to_string() })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(handle.sent_count("join_scenario"), 1);
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;

use labterm_common::mutex_lock_or_recover;

use crate::channel::Channel;
use crate::channel::ChannelSignal;
use crate::error::ChannelError;
use crate::events::AckStatus;
use crate::events::ClientEvent;
use crate::events::ServerEvent;

pub struct MockChannel {
    connected: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<ClientEvent>>>,
    connect_calls: Arc<AtomicUsize>,
    close_calls: Arc<AtomicUsize>,
    signal_rx: mpsc::UnboundedReceiver<ChannelSignal>,
}

/// Test-side controls for a [`MockChannel`].
#[derive(Clone)]
pub struct MockChannelHandle {
    connected: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<ClientEvent>>>,
    connect_calls: Arc<AtomicUsize>,
    close_calls: Arc<AtomicUsize>,
    signal_tx: mpsc::UnboundedSender<ChannelSignal>,
}

impl MockChannel {
    pub fn new() -> (Self, MockChannelHandle) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));
        let fail_sends = Arc::new(AtomicBool::new(false));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let connect_calls = Arc::new(AtomicUsize::new(0));
        let close_calls = Arc::new(AtomicUsize::new(0));

        let channel = Self {
            connected: Arc::clone(&connected),
            fail_sends: Arc::clone(&fail_sends),
            sent: Arc::clone(&sent),
            connect_calls: Arc::clone(&connect_calls),
            close_calls: Arc::clone(&close_calls),
            signal_rx,
        };
        let handle = MockChannelHandle {
            connected,
            fail_sends,
            sent,
            connect_calls,
            close_calls,
            signal_tx,
        };
        (channel, handle)
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn connect(&mut self) -> Result<(), ChannelError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&mut self, event: ClientEvent) -> Result<(), ChannelError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ChannelError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        mutex_lock_or_recover(&self.sent).push(event);
        Ok(())
    }

    async fn next_signal(&mut self) -> Option<ChannelSignal> {
        self.signal_rx.recv().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl MockChannelHandle {
    /// Mark the transport established and emit `Connected`.
    pub fn push_connected(&self) {
        self.connected.store(true, Ordering::SeqCst);
        let _ = self.signal_tx.send(ChannelSignal::Connected);
    }

    /// Emit a `pty-output` event.
    pub fn push_output(&self, output: &str) {
        let _ = self.signal_tx.send(ChannelSignal::Event(ServerEvent::PtyOutput {
            output: output.to_string(),
        }));
    }

    /// Emit an input acknowledgment.
    pub fn push_ack(&self, seq: u64, status: AckStatus, message: Option<&str>) {
        let _ = self
            .signal_tx
            .send(ChannelSignal::Event(ServerEvent::InputAck {
                seq,
                status,
                message: message.map(str::to_string),
            }));
    }

    /// Mark the transport down and emit `Disconnected`.
    pub fn push_disconnected(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.signal_tx.send(ChannelSignal::Disconnected {
            reason: reason.to_string(),
        });
    }

    /// Emit a dial failure.
    pub fn push_connect_error(&self, message: &str) {
        let _ = self.signal_tx.send(ChannelSignal::ConnectError {
            message: message.to_string(),
        });
    }

    /// Force the connected flag without emitting a signal.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make subsequent sends fail even while connected.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Returns all events successfully sent through the channel.
    pub fn sent_events(&self) -> Vec<ClientEvent> {
        mutex_lock_or_recover(&self.sent).clone()
    }

    /// Returns the number of sent events with the given wire name.
    pub fn sent_count(&self, name: &str) -> usize {
        mutex_lock_or_recover(&self.sent)
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }

    /// Returns the last sent event with the given wire name.
    pub fn last_sent(&self, name: &str) -> Option<ClientEvent> {
        mutex_lock_or_recover(&self.sent)
            .iter()
            .rev()
            .find(|e| e.name() == name)
            .cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}
