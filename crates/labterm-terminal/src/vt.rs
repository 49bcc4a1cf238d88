use std::sync::Arc;
use std::sync::Mutex;

use vt100::Parser;

use labterm_common::mutex_lock_or_recover;

use crate::engine::TerminalEngine;
use crate::error::EngineError;

const MAX_SCROLLBACK: usize = 2000;

/// Computes the `(cols, rows)` that best fill the current container.
pub type FitSource = Box<dyn FnMut() -> Result<(u16, u16), EngineError> + Send>;

/// A vt100-backed terminal engine.
///
/// Holds an in-memory character grid and cursor state. The fit source is
/// pluggable: the CLI probes the host terminal, tests supply a closure.
/// Without one, `fit` reports the current size unchanged.
pub struct VtEngine {
    parser: Arc<Mutex<Parser>>,
    cols: u16,
    rows: u16,
    live: bool,
    fit_source: Option<FitSource>,
}

impl VtEngine {
    pub fn new(cols: u16, rows: u16) -> Self {
        let parser = Parser::new(rows, cols, MAX_SCROLLBACK);
        Self {
            parser: Arc::new(Mutex::new(parser)),
            cols,
            rows,
            live: true,
            fit_source: None,
        }
    }

    pub fn with_fit_source(mut self, source: FitSource) -> Self {
        self.fit_source = Some(source);
        self
    }

    /// Visible screen contents with trailing blanks trimmed.
    pub fn screen_text(&self) -> String {
        screen_text(&self.parser)
    }

    /// A read-only view of the screen that stays valid after the engine
    /// has been handed off to its driver.
    pub fn viewer(&self) -> VtViewer {
        VtViewer {
            parser: Arc::clone(&self.parser),
        }
    }
}

/// Read-only access to a [`VtEngine`]'s screen.
#[derive(Clone)]
pub struct VtViewer {
    parser: Arc<Mutex<Parser>>,
}

impl VtViewer {
    pub fn screen_text(&self) -> String {
        screen_text(&self.parser)
    }
}

fn screen_text(parser: &Arc<Mutex<Parser>>) -> String {
    let parser = mutex_lock_or_recover(parser);
    let screen = parser.screen();

    let mut lines = Vec::new();
    for row in 0..screen.size().0 {
        let mut line = String::new();
        for col in 0..screen.size().1 {
            match screen.cell(row, col) {
                Some(cell) => line.push(cell.contents().chars().next().unwrap_or(' ')),
                None => line.push(' '),
            }
        }
        lines.push(line.trim_end().to_string());
    }

    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }

    lines.join("\n")
}

impl TerminalEngine for VtEngine {
    fn render(&mut self, bytes: &[u8]) {
        if !self.live {
            return;
        }
        let mut parser = mutex_lock_or_recover(&self.parser);
        parser.process(bytes);
    }

    fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn fit(&mut self) -> Result<(u16, u16), EngineError> {
        if !self.live {
            return Err(EngineError::Disposed);
        }

        if let Some(source) = self.fit_source.as_mut() {
            let (cols, rows) = source()?;
            let mut parser = mutex_lock_or_recover(&self.parser);
            parser.set_size(rows, cols);
            self.cols = cols;
            self.rows = rows;
        }

        Ok((self.cols, self.rows))
    }

    fn dispose(&mut self) {
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
