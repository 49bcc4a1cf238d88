use tracing::debug;
use tracing::warn;

use labterm_proto::Channel;
use labterm_proto::ClientEvent;
use labterm_terminal::TerminalEngine;

/// Keeps backend-known terminal dimensions consistent with what is
/// actually rendered.
///
/// The engine is the source of truth for "what fits"; this coordinator
/// tracks "what was last told to the backend". On every trigger it re-reads
/// the engine's fit immediately before sending, so the payload always
/// matches the engine's latest computation. Fit failures are logged and
/// swallowed; nothing here is fatal.
pub struct ResizeCoordinator {
    session_id: String,
    last_sent: Option<(u16, u16)>,
}

impl ResizeCoordinator {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            last_sent: None,
        }
    }

    /// Recompute the engine's best fit and, if the channel is connected,
    /// send it to the backend. No acknowledgment is expected.
    pub async fn negotiate(&mut self, engine: &mut dyn TerminalEngine, channel: &mut dyn Channel) {
        if !channel.is_connected() {
            debug!(session_id = %self.session_id, "skipping resize while disconnected");
            return;
        }

        let (cols, rows) = match engine.fit() {
            Ok(dims) => dims,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "fit computation failed");
                return;
            }
        };

        let event = ClientEvent::Resize {
            session_id: self.session_id.clone(),
            cols,
            rows,
        };
        match channel.send(event).await {
            Ok(()) => {
                self.last_sent = Some((cols, rows));
                debug!(session_id = %self.session_id, cols, rows, "sent resize");
            }
            Err(e) => warn!(session_id = %self.session_id, error = %e, "resize send failed"),
        }
    }

    /// Dimensions most recently accepted by the channel, if any.
    pub fn last_sent(&self) -> Option<(u16, u16)> {
        self.last_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockEngine;
    use labterm_proto::MockChannel;

    #[tokio::test]
    async fn test_negotiate_sends_engine_fit() {
        let (mut engine, engine_handle) = MockEngine::new(80, 24);
        engine_handle.set_fit(Ok((100, 40)));
        let (mut channel, channel_handle) = MockChannel::new();
        channel_handle.set_connected(true);

        let mut coordinator = ResizeCoordinator::new("abc");
        coordinator.negotiate(&mut engine, &mut channel).await;

        assert_eq!(
            channel_handle.last_sent("resize"),
            Some(ClientEvent::Resize {
                session_id: "abc".to_string(),
                cols: 100,
                rows: 40,
            })
        );
        assert_eq!(coordinator.last_sent(), Some((100, 40)));
    }

    #[tokio::test]
    async fn test_negotiate_skips_while_disconnected() {
        let (mut engine, engine_handle) = MockEngine::new(80, 24);
        let (mut channel, channel_handle) = MockChannel::new();

        let mut coordinator = ResizeCoordinator::new("abc");
        coordinator.negotiate(&mut engine, &mut channel).await;

        assert_eq!(channel_handle.sent_count("resize"), 0);
        assert_eq!(engine_handle.fit_count(), 0);
        assert_eq!(coordinator.last_sent(), None);
    }

    #[tokio::test]
    async fn test_fit_error_is_swallowed() {
        let (mut engine, engine_handle) = MockEngine::new(80, 24);
        engine_handle.set_fit(Err("detached container".to_string()));
        let (mut channel, channel_handle) = MockChannel::new();
        channel_handle.set_connected(true);

        let mut coordinator = ResizeCoordinator::new("abc");
        coordinator.negotiate(&mut engine, &mut channel).await;

        assert_eq!(channel_handle.sent_count("resize"), 0);
        assert_eq!(coordinator.last_sent(), None);
    }
}
