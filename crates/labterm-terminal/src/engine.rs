use crate::error::EngineError;

/// Capability exposed by a terminal emulation engine.
///
/// The session client drives an engine without knowing what sits behind
/// it: a vt100 grid, a raw passthrough to the host terminal, or a test
/// double. The engine interprets control sequences itself; callers hand it
/// raw bytes and read back dimensions.
pub trait TerminalEngine: Send {
    /// Feed output bytes to the display, in arrival order. A disposed
    /// engine ignores this.
    fn render(&mut self, bytes: &[u8]);

    /// Current dimensions as `(cols, rows)`.
    fn size(&self) -> (u16, u16);

    /// Recompute the best fit for the current container and adopt it.
    /// Returns the resulting `(cols, rows)`.
    fn fit(&mut self) -> Result<(u16, u16), EngineError>;

    /// Release the display. Further renders are dropped.
    fn dispose(&mut self);

    /// False once disposed.
    fn is_live(&self) -> bool;
}
