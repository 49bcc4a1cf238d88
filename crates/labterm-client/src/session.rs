//! The session client: one instance owns one session's connectivity and
//! data streaming from `start` to `Closed`.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use labterm_proto::AckStatus;
use labterm_proto::Channel;
use labterm_proto::ChannelSignal;
use labterm_proto::ClientEvent;
use labterm_proto::ServerEvent;
use labterm_terminal::TerminalEngine;

use crate::config::ClientConfig;
use crate::error::StartError;
use crate::resize::ResizeCoordinator;
use crate::state::ConnectionState;

#[derive(Debug)]
enum Command {
    Refit,
    LayoutChanged,
    Stop,
}

enum Step {
    Cmd(Option<Command>),
    Signal(Option<ChannelSignal>),
    Input(Option<String>),
    Settle,
}

/// Control surface for a running session.
///
/// Dropping the handle stops the session: the command channel closes and
/// the event loop tears down.
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// A receiver that observes every state change.
    pub fn state_rx(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Re-fit the terminal and negotiate dimensions now (host resize).
    pub fn refit(&self) {
        let _ = self.cmd_tx.send(Command::Refit);
    }

    /// A layout-mode change happened (maximize/fullscreen toggle); re-fit
    /// after a settle delay instead of immediately.
    pub fn layout_changed(&self) {
        let _ = self.cmd_tx.send(Command::LayoutChanged);
    }

    /// Tear the session down and wait for the event loop to finish.
    /// Idempotent: repeated calls are no-ops.
    pub async fn stop(&mut self) {
        let _ = self.cmd_tx.send(Command::Stop);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

/// One session's end-to-end connectivity and data streaming.
///
/// The client exclusively owns its channel and engine. All activity runs
/// on a single event-loop task; the loop exits exactly once, on teardown,
/// and nothing touches the disposed engine afterwards.
pub struct SessionClient {
    session_id: String,
    config: ClientConfig,
    engine: Box<dyn TerminalEngine>,
    channel: Box<dyn Channel>,
    coordinator: ResizeCoordinator,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    input_rx: mpsc::UnboundedReceiver<String>,
    input_open: bool,
    pending_inputs: HashSet<u64>,
    next_seq: u64,
    attempts_left: u32,
    settle_at: Option<Instant>,
}

impl SessionClient {
    /// Spawn the session event loop.
    ///
    /// `input_rx` carries the user's keystrokes from whatever owns the
    /// input side of the display. Both identifiers are preconditions:
    /// missing values abort with a logged diagnostic and create no state.
    pub fn start(
        config: ClientConfig,
        session_id: &str,
        channel_path: &str,
        engine: Box<dyn TerminalEngine>,
        channel: Box<dyn Channel>,
        input_rx: mpsc::UnboundedReceiver<String>,
    ) -> Result<SessionHandle, StartError> {
        if session_id.trim().is_empty() {
            warn!("refusing to start session: missing session id");
            return Err(StartError::MissingSessionId);
        }
        if channel_path.trim().is_empty() {
            warn!(session_id = session_id, "refusing to start session: missing channel path");
            return Err(StartError::MissingChannelPath);
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let attempts_left = config.reconnect_attempts;

        let client = Self {
            coordinator: ResizeCoordinator::new(session_id),
            session_id: session_id.to_string(),
            config,
            engine,
            channel,
            state: ConnectionState::Idle,
            state_tx,
            cmd_rx,
            input_rx,
            input_open: true,
            pending_inputs: HashSet::new(),
            next_seq: 1,
            attempts_left,
            settle_at: None,
        };

        let task = tokio::spawn(client.run());
        Ok(SessionHandle {
            cmd_tx,
            state_rx,
            task: Some(task),
        })
    }

    async fn run(mut self) {
        self.set_state(ConnectionState::Connecting);
        if let Err(e) = self.channel.connect().await {
            warn!(session_id = %self.session_id, error = %e, "channel connect failed");
            self.diagnostic(&format!("connection error: {}", e));
        }

        loop {
            let step = {
                let channel = &mut self.channel;
                let cmd_rx = &mut self.cmd_rx;
                let input_rx = &mut self.input_rx;
                let input_open = self.input_open;
                let settle_at = self.settle_at;

                tokio::select! {
                    maybe_cmd = cmd_rx.recv() => Step::Cmd(maybe_cmd),
                    maybe_signal = channel.next_signal() => Step::Signal(maybe_signal),
                    maybe_input = input_rx.recv(), if input_open => Step::Input(maybe_input),
                    _ = settle_sleep(settle_at), if settle_at.is_some() => Step::Settle,
                }
            };

            match step {
                Step::Cmd(Some(Command::Refit)) => self.negotiate_resize().await,
                Step::Cmd(Some(Command::LayoutChanged)) => {
                    self.settle_at = Some(Instant::now() + self.config.refit_settle);
                }
                Step::Cmd(Some(Command::Stop)) | Step::Cmd(None) => {
                    self.teardown(true).await;
                    break;
                }
                Step::Signal(Some(signal)) => {
                    if self.on_signal(signal).await {
                        break;
                    }
                }
                Step::Signal(None) => {
                    self.teardown(false).await;
                    break;
                }
                Step::Input(Some(input)) => self.on_input(input).await,
                Step::Input(None) => self.input_open = false,
                Step::Settle => {
                    self.settle_at = None;
                    self.negotiate_resize().await;
                    if self.state == ConnectionState::Joined {
                        self.set_state(ConnectionState::Active);
                    }
                }
            }
        }
    }

    /// Returns true once the session has closed and the loop must exit.
    async fn on_signal(&mut self, signal: ChannelSignal) -> bool {
        match signal {
            ChannelSignal::Connected => {
                self.attempts_left = self.config.reconnect_attempts;
                self.status_line("connected to backend session");
                self.set_state(ConnectionState::Joined);

                let join = ClientEvent::JoinScenario {
                    session_id: self.session_id.clone(),
                };
                if let Err(e) = self.channel.send(join).await {
                    warn!(session_id = %self.session_id, error = %e, "join send failed");
                    self.diagnostic(&format!("join failed: {}", e));
                }
                self.settle_at = Some(Instant::now() + self.config.join_settle);
                false
            }
            ChannelSignal::Event(ServerEvent::PtyOutput { output }) => {
                if self.state.can_render() && self.engine.is_live() {
                    self.engine.render(output.as_bytes());
                    if self.state == ConnectionState::Joined {
                        self.set_state(ConnectionState::Active);
                    }
                } else {
                    debug!(
                        session_id = %self.session_id,
                        state = %self.state,
                        "dropping output outside renderable state"
                    );
                }
                false
            }
            ChannelSignal::Event(ServerEvent::InputAck {
                seq,
                status,
                message,
            }) => {
                let known = self.pending_inputs.remove(&seq);
                if status == AckStatus::Error {
                    let detail = message.unwrap_or_else(|| "no acknowledgment".to_string());
                    self.diagnostic(&format!("error sending input: {}", detail));
                } else if !known {
                    debug!(session_id = %self.session_id, seq, "acknowledgment for unknown input");
                }
                false
            }
            ChannelSignal::Disconnected { reason } => {
                self.diagnostic(&format!("disconnected: {}", reason));
                if self.attempts_left > 0 {
                    self.attempts_left -= 1;
                    self.set_state(ConnectionState::Reconnecting);
                    false
                } else {
                    self.diagnostic("reconnect attempts exhausted; session closed");
                    self.teardown(false).await;
                    true
                }
            }
            ChannelSignal::ConnectError { message } => {
                self.diagnostic(&format!("connection error: {}", message));
                false
            }
        }
    }

    async fn on_input(&mut self, input: String) {
        if !self.state.can_send_input() || !self.channel.is_connected() {
            debug!(
                session_id = %self.session_id,
                state = %self.state,
                "dropping input while not active"
            );
            self.diagnostic("not connected; input dropped");
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending_inputs.insert(seq);

        let event = ClientEvent::TerminalInput {
            session_id: self.session_id.clone(),
            input,
            seq,
        };
        if let Err(e) = self.channel.send(event).await {
            self.pending_inputs.remove(&seq);
            self.diagnostic(&format!("error sending input: {}", e));
        }
    }

    async fn negotiate_resize(&mut self) {
        self.coordinator
            .negotiate(self.engine.as_mut(), self.channel.as_mut())
            .await;
    }

    async fn teardown(&mut self, send_notice: bool) {
        if self.state.is_closed() {
            return;
        }

        if send_notice && self.channel.is_connected() {
            let notice = ClientEvent::DisconnectRequest {
                session_id: self.session_id.clone(),
            };
            // Best effort; the backend cleans up on transport loss anyway.
            let _ = self.channel.send(notice).await;
        }

        self.channel.close().await;
        self.engine.dispose();
        self.pending_inputs.clear();
        self.settle_at = None;
        self.set_state(ConnectionState::Closed);
        info!(session_id = %self.session_id, "session closed");
    }

    fn set_state(&mut self, next: ConnectionState) {
        let applied = self.state.transition(next);
        if applied != self.state {
            debug!(session_id = %self.session_id, from = %self.state, to = %applied, "state change");
            self.state = applied;
            let _ = self.state_tx.send(applied);
        }
    }

    /// Red inline line in the terminal output region.
    fn diagnostic(&mut self, msg: &str) {
        warn!(session_id = %self.session_id, "{}", msg);
        if self.engine.is_live() {
            let line = format!("\r\n\x1b[31m[labterm] {}\x1b[0m\r\n", msg);
            self.engine.render(line.as_bytes());
        }
    }

    /// Green inline line for connection milestones.
    fn status_line(&mut self, msg: &str) {
        info!(session_id = %self.session_id, "{}", msg);
        if self.engine.is_live() {
            let line = format!("\r\n\x1b[32m[labterm] {}\x1b[0m\r\n", msg);
            self.engine.render(line.as_bytes());
        }
    }
}

async fn settle_sleep(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
