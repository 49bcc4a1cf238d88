//! WebSocket implementation of the [`Channel`] capability.
//!
//! One IO task owns the socket: it dials, pumps frames in both directions,
//! and redials with bounded exponential backoff when the link drops. Every
//! connection-state change and every decoded server event is pushed into
//! the signal stream in order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::SinkExt;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use tracing::warn;
use url::Url;

use crate::channel::Channel;
use crate::channel::ChannelSignal;
use crate::error::ChannelError;
use crate::events::ClientEvent;
use crate::events::decode_server;
use crate::events::encode_client;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(5);
const CLOSE_GRACE: Duration = Duration::from_millis(200);

/// Build the WebSocket endpoint for a session channel from the HTTP base
/// URL and the server-issued channel path.
pub fn channel_url(base_url: &str, channel_path: &str) -> Result<String, ChannelError> {
    let invalid = |url: &str, reason: String| ChannelError::InvalidEndpoint {
        url: url.to_string(),
        reason,
    };

    let parsed = Url::parse(base_url).map_err(|e| invalid(base_url, e.to_string()))?;
    let ws_scheme = match parsed.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(base_url, format!("unsupported scheme '{}'", other))),
    };

    let mut url = parsed
        .join(channel_path)
        .map_err(|e| invalid(channel_path, e.to_string()))?;
    url.set_scheme(ws_scheme)
        .map_err(|_| invalid(base_url, "scheme rewrite rejected".to_string()))?;

    Ok(url.to_string())
}

enum Outbound {
    Frame(String),
    Shutdown,
}

enum PumpEnd {
    Lost(String),
    LocalClose,
}

pub struct WsChannel {
    url: String,
    reconnect_attempts: u32,
    connected: Arc<AtomicBool>,
    signal_tx: mpsc::UnboundedSender<ChannelSignal>,
    signal_rx: mpsc::UnboundedReceiver<ChannelSignal>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
    io_task: Option<JoinHandle<()>>,
}

impl WsChannel {
    /// `url` must be a ws/wss endpoint (see [`channel_url`]).
    /// `reconnect_attempts` bounds redials after a lost connection.
    pub fn new(url: String, reconnect_attempts: u32) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            url,
            reconnect_attempts,
            connected: Arc::new(AtomicBool::new(false)),
            signal_tx,
            signal_rx,
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            io_task: None,
        }
    }
}

#[async_trait]
impl Channel for WsChannel {
    async fn connect(&mut self) -> Result<(), ChannelError> {
        let Some(outbound_rx) = self.outbound_rx.take() else {
            return Ok(());
        };

        let task = tokio::spawn(io_loop(
            self.url.clone(),
            self.reconnect_attempts,
            Arc::clone(&self.connected),
            self.signal_tx.clone(),
            outbound_rx,
        ));
        self.io_task = Some(task);
        Ok(())
    }

    async fn send(&mut self, event: ClientEvent) -> Result<(), ChannelError> {
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        let frame = encode_client(&event);
        self.outbound_tx
            .send(Outbound::Frame(frame))
            .map_err(|_| ChannelError::Closed)
    }

    async fn next_signal(&mut self) -> Option<ChannelSignal> {
        self.signal_rx.recv().await
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.outbound_tx.send(Outbound::Shutdown);
        if let Some(mut task) = self.io_task.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
    }
}

async fn io_loop(
    url: String,
    max_attempts: u32,
    connected: Arc<AtomicBool>,
    signal_tx: mpsc::UnboundedSender<ChannelSignal>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    let mut attempts_left = max_attempts;
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                attempts_left = max_attempts;
                backoff = INITIAL_BACKOFF;
                connected.store(true, Ordering::SeqCst);
                if signal_tx.send(ChannelSignal::Connected).is_err() {
                    return;
                }

                let end = pump(stream, &signal_tx, &mut outbound_rx).await;
                connected.store(false, Ordering::SeqCst);
                match end {
                    PumpEnd::LocalClose => return,
                    PumpEnd::Lost(reason) => {
                        if signal_tx
                            .send(ChannelSignal::Disconnected { reason })
                            .is_err()
                        {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                let message = e.to_string();
                let _ = signal_tx.send(ChannelSignal::ConnectError {
                    message: message.clone(),
                });
                if signal_tx
                    .send(ChannelSignal::Disconnected { reason: message })
                    .is_err()
                {
                    return;
                }
            }
        }

        if attempts_left == 0 {
            debug!(url = %url, "connection attempts exhausted");
            return;
        }
        attempts_left -= 1;
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn pump(
    stream: WsStream,
    signal_tx: &mpsc::UnboundedSender<ChannelSignal>,
    outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>,
) -> PumpEnd {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            maybe_out = outbound_rx.recv() => match maybe_out {
                Some(Outbound::Frame(frame)) => {
                    if let Err(e) = write.send(Message::Text(frame)).await {
                        return PumpEnd::Lost(format!("send failed: {}", e));
                    }
                }
                Some(Outbound::Shutdown) | None => {
                    let _ = write.send(Message::Close(None)).await;
                    return PumpEnd::LocalClose;
                }
            },
            maybe_msg = read.next() => match maybe_msg {
                Some(Ok(Message::Text(text))) => match decode_server(&text) {
                    Ok(event) => {
                        if signal_tx.send(ChannelSignal::Event(event)).is_err() {
                            return PumpEnd::LocalClose;
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping undecodable frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "transport close".to_string());
                    return PumpEnd::Lost(reason);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return PumpEnd::Lost(e.to_string()),
                None => return PumpEnd::Lost("transport close".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_url_http_to_ws() {
        let url = channel_url("http://localhost:5000", "/rt/abc").unwrap();
        assert_eq!(url, "ws://localhost:5000/rt/abc");
    }

    #[test]
    fn test_channel_url_https_to_wss() {
        let url = channel_url("https://lab.example.com", "/terminal_ws").unwrap();
        assert_eq!(url, "wss://lab.example.com/terminal_ws");
    }

    #[test]
    fn test_channel_url_ws_passthrough() {
        let url = channel_url("ws://127.0.0.1:9000", "/rt/x").unwrap();
        assert_eq!(url, "ws://127.0.0.1:9000/rt/x");
    }

    #[test]
    fn test_channel_url_rejects_unknown_scheme() {
        assert!(channel_url("ftp://example.com", "/rt/x").is_err());
    }

    #[test]
    fn test_channel_url_rejects_garbage_base() {
        assert!(channel_url("not a url", "/rt/x").is_err());
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let mut channel = WsChannel::new("ws://127.0.0.1:1/none".to_string(), 0);
        let result = channel
            .send(ClientEvent::JoinScenario {
                session_id: "abc".to_string(),
            })
            .await;
        assert!(matches!(result, Err(ChannelError::NotConnected)));
    }
}
