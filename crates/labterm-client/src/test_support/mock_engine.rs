use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use labterm_common::mutex_lock_or_recover;
use labterm_terminal::EngineError;
use labterm_terminal::TerminalEngine;

struct Shared {
    rendered: Mutex<Vec<String>>,
    fit: Mutex<Result<(u16, u16), String>>,
    size: Mutex<(u16, u16)>,
    live: AtomicBool,
    fit_calls: AtomicUsize,
    dispose_calls: AtomicUsize,
}

/// A recording engine double. The engine half goes to the session client;
/// the [`MockEngineHandle`] stays with the test.
pub struct MockEngine {
    shared: Arc<Shared>,
}

#[derive(Clone)]
pub struct MockEngineHandle {
    shared: Arc<Shared>,
}

impl MockEngine {
    pub fn new(cols: u16, rows: u16) -> (Self, MockEngineHandle) {
        let shared = Arc::new(Shared {
            rendered: Mutex::new(Vec::new()),
            fit: Mutex::new(Ok((cols, rows))),
            size: Mutex::new((cols, rows)),
            live: AtomicBool::new(true),
            fit_calls: AtomicUsize::new(0),
            dispose_calls: AtomicUsize::new(0),
        });
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockEngineHandle { shared },
        )
    }
}

impl TerminalEngine for MockEngine {
    fn render(&mut self, bytes: &[u8]) {
        if !self.shared.live.load(Ordering::SeqCst) {
            return;
        }
        mutex_lock_or_recover(&self.shared.rendered)
            .push(String::from_utf8_lossy(bytes).into_owned());
    }

    fn size(&self) -> (u16, u16) {
        *mutex_lock_or_recover(&self.shared.size)
    }

    fn fit(&mut self) -> Result<(u16, u16), EngineError> {
        self.shared.fit_calls.fetch_add(1, Ordering::SeqCst);
        match mutex_lock_or_recover(&self.shared.fit).clone() {
            Ok(dims) => {
                *mutex_lock_or_recover(&self.shared.size) = dims;
                Ok(dims)
            }
            Err(reason) => Err(EngineError::Fit(reason)),
        }
    }

    fn dispose(&mut self) {
        self.shared.live.store(false, Ordering::SeqCst);
        self.shared.dispose_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::SeqCst)
    }
}

impl MockEngineHandle {
    /// Every rendered chunk, in render order.
    pub fn rendered(&self) -> Vec<String> {
        mutex_lock_or_recover(&self.shared.rendered).clone()
    }

    /// All rendered chunks joined together.
    pub fn rendered_text(&self) -> String {
        self.rendered().concat()
    }

    /// Rendered chunks that are session output rather than inline
    /// status/diagnostic lines.
    pub fn rendered_output(&self) -> Vec<String> {
        self.rendered()
            .into_iter()
            .filter(|chunk| !chunk.contains("[labterm]"))
            .collect()
    }

    /// Rendered diagnostic lines (the red inline ones).
    pub fn rendered_diagnostics(&self) -> Vec<String> {
        self.rendered()
            .into_iter()
            .filter(|chunk| chunk.starts_with("\r\n\x1b[31m[labterm]"))
            .collect()
    }

    /// Script the next fit results. `Err` simulates a failed computation.
    pub fn set_fit(&self, fit: Result<(u16, u16), String>) {
        *mutex_lock_or_recover(&self.shared.fit) = fit;
    }

    pub fn fit_count(&self) -> usize {
        self.shared.fit_calls.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.shared.dispose_calls.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        self.shared.live.load(Ordering::SeqCst)
    }
}
