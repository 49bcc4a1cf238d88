use std::io;
use std::io::Write;

use labterm_terminal::EngineError;
use labterm_terminal::TerminalEngine;

/// Passthrough engine for attached CLI sessions.
///
/// The host terminal does the actual emulation; output bytes are written
/// straight through, and the fit is whatever the host terminal currently
/// measures.
pub struct StdoutEngine {
    cols: u16,
    rows: u16,
    live: bool,
}

impl StdoutEngine {
    pub fn new() -> io::Result<Self> {
        let (cols, rows) = crossterm::terminal::size()?;
        Ok(Self {
            cols,
            rows,
            live: true,
        })
    }
}

impl TerminalEngine for StdoutEngine {
    fn render(&mut self, bytes: &[u8]) {
        if !self.live {
            return;
        }
        let mut stdout = io::stdout();
        if stdout.write_all(bytes).and_then(|_| stdout.flush()).is_err() {
            self.live = false;
        }
    }

    fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn fit(&mut self) -> Result<(u16, u16), EngineError> {
        if !self.live {
            return Err(EngineError::Disposed);
        }
        let (cols, rows) =
            crossterm::terminal::size().map_err(|e| EngineError::Fit(e.to_string()))?;
        self.cols = cols;
        self.rows = rows;
        Ok((cols, rows))
    }

    fn dispose(&mut self) {
        self.live = false;
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
