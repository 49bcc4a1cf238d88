//! Session expiration countdown and extension.
//!
//! The backend is the sole authority on actual expiry; this timer is
//! observational. It recomputes the remaining time once per second, stops
//! ticking at zero, and resumes when a successful extension replaces the
//! deadline. It never tears the session down.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::info;
use tracing::warn;

use labterm_common::Clock;
use labterm_proto::ApiError;
use labterm_proto::Provisioner;

/// Snapshot of the countdown, published on every recomputation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationState {
    /// Absolute deadline in epoch seconds. `None` means no timer is
    /// active, which is distinct from expired.
    pub end_time_epoch: Option<u64>,
    pub remaining_seconds: u64,
    pub expired: bool,
    pub extension_in_flight: bool,
}

impl ExpirationState {
    fn inactive() -> Self {
        Self {
            end_time_epoch: None,
            remaining_seconds: 0,
            expired: false,
            extension_in_flight: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_time_epoch.is_some()
    }

    /// Remaining time as `MM:SS`.
    pub fn format_remaining(&self) -> String {
        let minutes = self.remaining_seconds / 60;
        let seconds = self.remaining_seconds % 60;
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Result of an extension request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionOutcome {
    /// The deadline was replaced with this new epoch value.
    Extended(u64),
    /// Another request was already in flight; nothing was sent.
    AlreadyInFlight,
}

struct TimerInner {
    session_id: String,
    provisioner: Arc<dyn Provisioner>,
    in_flight: AtomicBool,
    base_epoch: u64,
    base_instant: Instant,
    deadline_tx: watch::Sender<Option<u64>>,
    state_tx: watch::Sender<ExpirationState>,
}

impl TimerInner {
    fn now_epoch(&self) -> u64 {
        self.base_epoch + self.base_instant.elapsed().as_secs()
    }

    fn publish(&self) {
        let deadline = *self.deadline_tx.borrow();
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        let state = match deadline {
            None => ExpirationState {
                extension_in_flight: in_flight,
                ..ExpirationState::inactive()
            },
            Some(end) => {
                let remaining = end.saturating_sub(self.now_epoch());
                ExpirationState {
                    end_time_epoch: Some(end),
                    remaining_seconds: remaining,
                    expired: remaining == 0,
                    extension_in_flight: in_flight,
                }
            }
        };
        let _ = self.state_tx.send(state);
    }
}

/// Clears the in-flight flag on every exit path.
struct InFlightGuard {
    inner: Arc<TimerInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.in_flight.store(false, Ordering::SeqCst);
        self.inner.publish();
    }
}

/// Countdown for one session's deadline, with a client-initiated
/// extension action.
pub struct ExpirationTimer {
    inner: Arc<TimerInner>,
    state_rx: watch::Receiver<ExpirationState>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ExpirationTimer {
    /// Start ticking against `end_time_epoch`. `None` starts the timer in
    /// the inactive state; a later extension can still activate it.
    pub fn start(
        session_id: &str,
        end_time_epoch: Option<u64>,
        clock: &dyn Clock,
        provisioner: Arc<dyn Provisioner>,
    ) -> Self {
        let (deadline_tx, deadline_rx) = watch::channel(end_time_epoch);
        let (state_tx, state_rx) = watch::channel(ExpirationState::inactive());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inner = Arc::new(TimerInner {
            session_id: session_id.to_string(),
            provisioner,
            in_flight: AtomicBool::new(false),
            base_epoch: clock.now_epoch(),
            base_instant: Instant::now(),
            deadline_tx,
            state_tx,
        });
        inner.publish();

        let task = tokio::spawn(tick_loop(Arc::clone(&inner), deadline_rx, shutdown_rx));
        Self {
            inner,
            state_rx,
            shutdown_tx,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ExpirationState {
        self.state_rx.borrow().clone()
    }

    pub fn state_rx(&self) -> watch::Receiver<ExpirationState> {
        self.state_rx.clone()
    }

    /// Ask the backend for more time. Guarded against concurrent
    /// duplicates: while one request is in flight, further calls are
    /// no-ops. On success the deadline is replaced atomically and ticking
    /// resumes; on failure the deadline is untouched and the error is
    /// returned for the caller to surface. The in-flight flag is released
    /// on every path.
    pub async fn request_extension(&self) -> Result<ExtensionOutcome, ApiError> {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(ExtensionOutcome::AlreadyInFlight);
        }
        let _guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
        };
        self.inner.publish();

        match self.inner.provisioner.extend(&self.inner.session_id).await {
            Ok(new_end) => {
                let _ = self.inner.deadline_tx.send(Some(new_end));
                info!(
                    session_id = %self.inner.session_id,
                    new_end_time = new_end,
                    "session deadline extended"
                );
                Ok(ExtensionOutcome::Extended(new_end))
            }
            Err(e) => {
                warn!(session_id = %self.inner.session_id, error = %e, "extension request failed");
                Err(e)
            }
        }
    }

    /// Cancel the tick task. Idempotent.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn tick_loop(
    inner: Arc<TimerInner>,
    mut deadline_rx: watch::Receiver<Option<u64>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        let ticking = match *deadline_rx.borrow() {
            None => false,
            Some(end) => end > inner.now_epoch(),
        };

        if ticking {
            tokio::select! {
                _ = interval.tick() => inner.publish(),
                changed = deadline_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    inner.publish();
                }
                _ = shutdown_rx.changed() => return,
            }
        } else {
            // Expired or inactive: publish the final state and halt until
            // the deadline is replaced.
            inner.publish();
            tokio::select! {
                changed = deadline_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    interval.reset();
                    inner.publish();
                }
                _ = shutdown_rx.changed() => return,
            }
        }
    }
}
