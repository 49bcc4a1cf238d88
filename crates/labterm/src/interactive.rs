//! Interactive attached session: raw-mode terminal, keystroke forwarding,
//! countdown notices, and the detach/extend keybindings.

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossterm::event;
use crossterm::event::Event;
use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyModifiers;
use crossterm::terminal::disable_raw_mode;
use crossterm::terminal::enable_raw_mode;
use tokio::sync::mpsc;
use tracing::debug;

use labterm_client::ClientConfig;
use labterm_client::ExpirationState;
use labterm_client::ExpirationTimer;
use labterm_client::ExtensionOutcome;
use labterm_client::SessionClient;
use labterm_common::Colors;
use labterm_common::SystemClock;
use labterm_proto::ProvisionedScenario;
use labterm_proto::ScenarioApi;
use labterm_proto::WsChannel;
use labterm_proto::channel_url;

use crate::engine::StdoutEngine;
use crate::keys::key_event_to_bytes;

enum UiEvent {
    Detach,
    Extend,
    Resize,
}

/// RAII guard that ignores a signal during its lifetime and restores
/// default behavior on drop.
#[cfg(unix)]
struct SignalGuard {
    signal: libc::c_int,
}

#[cfg(unix)]
impl SignalGuard {
    fn new(signal: libc::c_int) -> Self {
        unsafe {
            libc::signal(signal, libc::SIG_IGN);
        }
        Self { signal }
    }
}

#[cfg(unix)]
impl Drop for SignalGuard {
    fn drop(&mut self) {
        unsafe {
            libc::signal(self.signal, libc::SIG_DFL);
        }
    }
}

/// Attach the current terminal to a provisioned scenario and run until
/// the user detaches or the session closes.
pub async fn run_session(
    config: ClientConfig,
    scenario: ProvisionedScenario,
    api: Arc<ScenarioApi>,
) -> Result<(), Box<dyn Error>> {
    eprintln!(
        "{} Attaching to session {}...",
        Colors::dim("[labterm]"),
        Colors::session_id(&scenario.session_id)
    );
    eprintln!(
        "{} Press {} to detach, {} to extend the session.",
        Colors::success("Connected!"),
        Colors::bold("Ctrl+\\"),
        Colors::bold("Ctrl+T")
    );
    eprintln!();

    // Ignore SIGQUIT (Ctrl+\) so it can be captured for detachment.
    #[cfg(unix)]
    let _sigquit_guard = SignalGuard::new(libc::SIGQUIT);

    let url = channel_url(&config.base_url, &scenario.websocket_path)?;
    let channel = WsChannel::new(url, config.reconnect_attempts);
    let engine = StdoutEngine::new()?;
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    let mut timer = ExpirationTimer::start(
        &scenario.session_id,
        Some(scenario.end_time),
        &SystemClock,
        Arc::clone(&api) as Arc<dyn labterm_proto::Provisioner>,
    );

    let mut handle = SessionClient::start(
        config,
        &scenario.session_id,
        &scenario.websocket_path,
        Box::new(engine),
        Box::new(channel),
        input_rx,
    )?;

    enable_raw_mode()?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();
    let reader = spawn_event_reader(ui_tx, input_tx, Arc::clone(&shutdown));

    let mut state_rx = handle.state_rx();
    let mut expiry_rx = timer.state_rx();
    let mut low_warned = false;
    let mut expired_notified = false;

    loop {
        tokio::select! {
            maybe_ui = ui_rx.recv() => match maybe_ui {
                Some(UiEvent::Detach) | None => break,
                Some(UiEvent::Resize) => handle.refit(),
                Some(UiEvent::Extend) => match timer.request_extension().await {
                    Ok(ExtensionOutcome::Extended(_)) => {
                        eprint!(
                            "\r\n{}\r\n",
                            Colors::success("[labterm] session extended")
                        );
                    }
                    Ok(ExtensionOutcome::AlreadyInFlight) => {
                        debug!("extension already in progress");
                    }
                    Err(e) => {
                        eprint!(
                            "\r\n{}\r\n",
                            Colors::error(&format!("[labterm] extension failed: {}", e))
                        );
                    }
                },
            },
            changed = state_rx.changed() => {
                if changed.is_err() || state_rx.borrow().is_closed() {
                    break;
                }
            }
            changed = expiry_rx.changed() => {
                if changed.is_ok() {
                    let state = expiry_rx.borrow().clone();
                    expiry_notice(&state, &mut low_warned, &mut expired_notified);
                }
            }
        }
    }

    shutdown.store(true, Ordering::Relaxed);
    handle.stop().await;
    timer.shutdown().await;
    let _ = reader.join();
    let _ = disable_raw_mode();

    eprintln!();
    eprintln!(
        "{} Detached from session {}",
        Colors::dim("[labterm]"),
        Colors::session_id(&scenario.session_id)
    );
    Ok(())
}

fn spawn_event_reader(
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    input_tx: mpsc::UnboundedSender<String>,
    shutdown: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while !shutdown.load(Ordering::Relaxed) {
            if !event::poll(Duration::from_millis(50)).unwrap_or(false) {
                continue;
            }
            match event::read() {
                Ok(Event::Key(key)) => {
                    if is_detach_key(&key) {
                        let _ = ui_tx.send(UiEvent::Detach);
                        break;
                    }
                    if is_extend_key(&key) {
                        let _ = ui_tx.send(UiEvent::Extend);
                        continue;
                    }
                    if let Some(bytes) = key_event_to_bytes(&key) {
                        let input = String::from_utf8_lossy(&bytes).into_owned();
                        if input_tx.send(input).is_err() {
                            break;
                        }
                    }
                }
                Ok(Event::Resize(_, _)) => {
                    let _ = ui_tx.send(UiEvent::Resize);
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    })
}

/// Ctrl+\ detaches. Handle both the modifier form and the raw ASCII 28
/// (FS) representation some terminals deliver.
fn is_detach_key(key: &KeyEvent) -> bool {
    let modified = key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('\\');
    let raw = key.code == KeyCode::Char('\x1c');
    modified || raw
}

/// Ctrl+T requests a session extension.
fn is_extend_key(key: &KeyEvent) -> bool {
    let modified = key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('t');
    let raw = key.code == KeyCode::Char('\x14');
    modified || raw
}

fn expiry_notice(state: &ExpirationState, low_warned: &mut bool, expired_notified: &mut bool) {
    if !state.is_active() {
        return;
    }

    if state.expired {
        if !*expired_notified {
            *expired_notified = true;
            eprint!(
                "\r\n{}\r\n",
                Colors::error("[labterm] session time EXPIRED - press Ctrl+T to extend")
            );
        }
        return;
    }
    *expired_notified = false;

    if state.remaining_seconds < 5 * 60 {
        if !*low_warned {
            *low_warned = true;
            eprint!(
                "\r\n{}\r\n",
                Colors::warning(&format!(
                    "[labterm] {} remaining - press Ctrl+T to extend",
                    state.format_remaining()
                ))
            );
        }
    } else {
        *low_warned = false;
    }
}
