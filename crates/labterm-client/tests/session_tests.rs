//! Session lifecycle tests against scripted channel and engine doubles.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use labterm_client::test_support::MockEngine;
use labterm_client::test_support::MockEngineHandle;
use labterm_client::ClientConfig;
use labterm_client::ConnectionState;
use labterm_client::SessionClient;
use labterm_client::SessionHandle;
use labterm_client::StartError;
use labterm_proto::AckStatus;
use labterm_proto::ClientEvent;
use labterm_proto::MockChannel;
use labterm_proto::MockChannelHandle;

const WAIT: Duration = Duration::from_secs(2);

struct Harness {
    handle: SessionHandle,
    channel: MockChannelHandle,
    engine: MockEngineHandle,
    input_tx: mpsc::UnboundedSender<String>,
}

fn config() -> ClientConfig {
    ClientConfig::from_env()
        .with_reconnect_attempts(3)
        .with_join_settle(Duration::from_millis(10))
        .with_refit_settle(Duration::from_millis(10))
}

fn start_session(config: ClientConfig) -> Harness {
    let (engine, engine_handle) = MockEngine::new(80, 24);
    let (channel, channel_handle) = MockChannel::new();
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    let handle = SessionClient::start(
        config,
        "abc",
        "/rt/abc",
        Box::new(engine),
        Box::new(channel),
        input_rx,
    )
    .expect("session should start");

    Harness {
        handle,
        channel: channel_handle,
        engine: engine_handle,
        input_tx,
    }
}

async fn wait_for_state(harness: &Harness, state: ConnectionState) {
    let mut rx = harness.handle.state_rx();
    timeout(WAIT, rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {}", state))
        .expect("state channel closed");
}

/// Wait until the session has processed the join. `Joined` itself is
/// transient (the settle delay promotes it to `Active`), so this keys off
/// the join message instead of the state value.
async fn wait_for_join(harness: &Harness, joins: usize) {
    wait_until(|| harness.channel.sent_count("join_scenario") == joins).await;
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_start_rejects_missing_session_id() {
    let (engine, _engine_handle) = MockEngine::new(80, 24);
    let (channel, _channel_handle) = MockChannel::new();
    let (_input_tx, input_rx) = mpsc::unbounded_channel();

    let result = SessionClient::start(
        config(),
        "  ",
        "/rt/abc",
        Box::new(engine),
        Box::new(channel),
        input_rx,
    );
    assert_eq!(result.err(), Some(StartError::MissingSessionId));
}

#[tokio::test]
async fn test_start_rejects_missing_channel_path() {
    let (engine, engine_handle) = MockEngine::new(80, 24);
    let (channel, channel_handle) = MockChannel::new();
    let (_input_tx, input_rx) = mpsc::unbounded_channel();

    let result = SessionClient::start(
        config(),
        "abc",
        "",
        Box::new(engine),
        Box::new(channel),
        input_rx,
    );
    assert_eq!(result.err(), Some(StartError::MissingChannelPath));

    // no partial state: nothing connected, nothing rendered
    assert_eq!(channel_handle.connect_count(), 0);
    assert!(engine_handle.rendered().is_empty());
}

#[tokio::test]
async fn test_connect_joins_then_negotiates_resize() {
    let harness = start_session(config());
    harness.channel.push_connected();

    wait_for_join(&harness, 1).await;
    assert_eq!(
        harness.channel.last_sent("join_scenario"),
        Some(ClientEvent::JoinScenario {
            session_id: "abc".to_string()
        })
    );

    // the settle delay elapses, the fit is negotiated, and the session
    // becomes active without any output arriving
    wait_for_state(&harness, ConnectionState::Active).await;
    wait_until(|| harness.channel.sent_count("resize") == 1).await;
    assert_eq!(
        harness.channel.last_sent("resize"),
        Some(ClientEvent::Resize {
            session_id: "abc".to_string(),
            cols: 80,
            rows: 24,
        })
    );
}

#[tokio::test]
async fn test_output_renders_in_delivery_order() {
    let harness = start_session(config());
    harness.channel.push_connected();
    wait_for_join(&harness, 1).await;

    harness.channel.push_output("one ");
    harness.channel.push_output("two ");
    harness.channel.push_output("three");

    wait_until(|| harness.engine.rendered_output().len() == 3).await;
    assert_eq!(
        harness.engine.rendered_output(),
        vec!["one ", "two ", "three"]
    );
    // first output promoted the session
    assert_eq!(harness.handle.state(), ConnectionState::Active);
}

#[tokio::test]
async fn test_end_to_end_happy_path() {
    let harness = start_session(config());
    harness.channel.push_connected();
    harness.channel.push_output("$ ");
    wait_for_state(&harness, ConnectionState::Active).await;

    harness.input_tx.send("ls\n".to_string()).unwrap();
    wait_until(|| harness.channel.sent_count("terminalInput") == 1).await;
    assert_eq!(
        harness.channel.last_sent("terminalInput"),
        Some(ClientEvent::TerminalInput {
            session_id: "abc".to_string(),
            input: "ls\n".to_string(),
            seq: 1,
        })
    );

    harness.channel.push_ack(1, AckStatus::Ok, None);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.engine.rendered_output(), vec!["$ "]);
    assert!(harness.engine.rendered_diagnostics().is_empty());
}

#[tokio::test]
async fn test_input_outside_active_is_dropped_with_diagnostic() {
    // a long settle keeps the session in Joined
    let harness = start_session(config().with_join_settle(Duration::from_secs(60)));
    harness.channel.push_connected();
    wait_for_join(&harness, 1).await;

    harness.input_tx.send("ls\n".to_string()).unwrap();
    wait_until(|| !harness.engine.rendered_diagnostics().is_empty()).await;

    assert_eq!(harness.channel.sent_count("terminalInput"), 0);
    assert_eq!(harness.handle.state(), ConnectionState::Joined);
}

#[tokio::test]
async fn test_nack_renders_diagnostic_and_does_not_retry() {
    let harness = start_session(config());
    harness.channel.push_connected();
    harness.channel.push_output("$ ");
    wait_for_state(&harness, ConnectionState::Active).await;

    harness.input_tx.send("ls\n".to_string()).unwrap();
    wait_until(|| harness.channel.sent_count("terminalInput") == 1).await;

    harness
        .channel
        .push_ack(1, AckStatus::Error, Some("No active channel"));
    wait_until(|| {
        harness
            .engine
            .rendered_diagnostics()
            .iter()
            .any(|d| d.contains("No active channel"))
    })
    .await;

    // the nack changed no state and triggered no resend
    assert_eq!(harness.handle.state(), ConnectionState::Active);
    assert_eq!(harness.channel.sent_count("terminalInput"), 1);

    // subsequent input still flows
    harness.input_tx.send("pwd\n".to_string()).unwrap();
    wait_until(|| harness.channel.sent_count("terminalInput") == 2).await;
    assert_eq!(
        harness.channel.last_sent("terminalInput"),
        Some(ClientEvent::TerminalInput {
            session_id: "abc".to_string(),
            input: "pwd\n".to_string(),
            seq: 2,
        })
    );
}

#[tokio::test]
async fn test_disconnect_reconnects_until_attempts_exhausted() {
    let harness = start_session(config().with_reconnect_attempts(2));
    harness.channel.push_connected();
    harness.channel.push_output("$ ");
    wait_for_state(&harness, ConnectionState::Active).await;

    harness.channel.push_disconnected("transport close");
    wait_for_state(&harness, ConnectionState::Reconnecting).await;
    wait_until(|| {
        harness
            .engine
            .rendered_diagnostics()
            .iter()
            .any(|d| d.contains("transport close"))
    })
    .await;

    harness.channel.push_disconnected("reconnect failed");
    harness.channel.push_disconnected("reconnect failed");
    wait_for_state(&harness, ConnectionState::Closed).await;

    // closed: late output is not rendered, input goes nowhere
    let outputs_before = harness.engine.rendered_output();
    harness.channel.push_output("late output");
    let _ = harness.input_tx.send("ls\n".to_string());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.engine.rendered_output(), outputs_before);
    assert_eq!(harness.channel.sent_count("terminalInput"), 0);
    assert_eq!(harness.channel.close_count(), 1);
    // exhaustion is not a user-initiated stop: no disconnect notice
    assert_eq!(harness.channel.sent_count("disconnect_request"), 0);
}

#[tokio::test]
async fn test_reconnect_rejoins_and_resets_attempt_budget() {
    let harness = start_session(config().with_reconnect_attempts(1));
    harness.channel.push_connected();
    wait_for_join(&harness, 1).await;

    harness.channel.push_disconnected("transport close");
    wait_for_state(&harness, ConnectionState::Reconnecting).await;

    harness.channel.push_connected();
    wait_for_join(&harness, 2).await;

    // the budget reset: the next drop still reconnects instead of closing
    harness.channel.push_disconnected("transport close");
    wait_for_state(&harness, ConnectionState::Reconnecting).await;
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let mut harness = start_session(config());
    harness.channel.push_connected();
    wait_for_state(&harness, ConnectionState::Active).await;

    harness.handle.stop().await;
    assert_eq!(harness.handle.state(), ConnectionState::Closed);
    assert_eq!(harness.channel.sent_count("disconnect_request"), 1);
    assert_eq!(harness.channel.close_count(), 1);
    assert_eq!(harness.engine.dispose_count(), 1);
    assert!(!harness.engine.is_live());

    harness.handle.stop().await;
    assert_eq!(harness.handle.state(), ConnectionState::Closed);
    assert_eq!(harness.channel.sent_count("disconnect_request"), 1);
    assert_eq!(harness.channel.close_count(), 1);
    assert_eq!(harness.engine.dispose_count(), 1);
}

#[tokio::test]
async fn test_output_after_stop_is_dropped() {
    let mut harness = start_session(config());
    harness.channel.push_connected();
    harness.channel.push_output("$ ");
    wait_for_state(&harness, ConnectionState::Active).await;
    wait_until(|| !harness.engine.rendered_output().is_empty()).await;

    harness.handle.stop().await;
    harness.channel.push_output("after teardown");
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.engine.rendered_output(), vec!["$ "]);
}

#[tokio::test]
async fn test_refit_sends_current_engine_fit() {
    let harness = start_session(config());
    harness.channel.push_connected();
    wait_for_state(&harness, ConnectionState::Active).await;
    wait_until(|| harness.channel.sent_count("resize") == 1).await;

    harness.engine.set_fit(Ok((100, 40)));
    harness.handle.refit();

    wait_until(|| harness.channel.sent_count("resize") == 2).await;
    assert_eq!(
        harness.channel.last_sent("resize"),
        Some(ClientEvent::Resize {
            session_id: "abc".to_string(),
            cols: 100,
            rows: 40,
        })
    );
}

#[tokio::test]
async fn test_no_resize_while_disconnected() {
    let harness = start_session(config());
    harness.channel.push_connected();
    wait_for_state(&harness, ConnectionState::Active).await;
    wait_until(|| harness.channel.sent_count("resize") == 1).await;
    let fits_before = harness.engine.fit_count();

    harness.channel.set_connected(false);
    harness.handle.refit();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(harness.channel.sent_count("resize"), 1);
    assert_eq!(harness.engine.fit_count(), fits_before);
}

#[tokio::test]
async fn test_layout_change_refits_after_settle() {
    let harness = start_session(config());
    harness.channel.push_connected();
    wait_for_state(&harness, ConnectionState::Active).await;
    wait_until(|| harness.channel.sent_count("resize") == 1).await;

    harness.engine.set_fit(Ok((132, 50)));
    harness.handle.layout_changed();

    wait_until(|| harness.channel.sent_count("resize") == 2).await;
    assert_eq!(
        harness.channel.last_sent("resize"),
        Some(ClientEvent::Resize {
            session_id: "abc".to_string(),
            cols: 132,
            rows: 50,
        })
    );
}

#[tokio::test]
async fn test_session_renders_into_vt_engine() {
    let engine = labterm_terminal::VtEngine::new(80, 24);
    let viewer = engine.viewer();
    let (channel, channel_handle) = MockChannel::new();
    let (_input_tx, input_rx) = mpsc::unbounded_channel();

    let mut handle = SessionClient::start(
        config(),
        "abc",
        "/rt/abc",
        Box::new(engine),
        Box::new(channel),
        input_rx,
    )
    .unwrap();

    channel_handle.push_connected();
    channel_handle.push_output("weka status\r\n");
    wait_until(|| viewer.screen_text().contains("weka status")).await;

    handle.stop().await;
}

#[tokio::test]
async fn test_connect_error_is_diagnostic_only() {
    let harness = start_session(config());

    harness.channel.push_connect_error("connection refused");
    wait_until(|| {
        harness
            .engine
            .rendered_diagnostics()
            .iter()
            .any(|d| d.contains("connection refused"))
    })
    .await;

    assert_eq!(harness.handle.state(), ConnectionState::Connecting);
}
