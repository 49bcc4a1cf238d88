//! Wire events for one terminal session.
//!
//! Frames are JSON text with the shape `{"event": <name>, "seq": <n>,
//! "data": <payload>}`. `seq` is present only on events that participate in
//! acknowledgment correlation (`terminalInput` out, `ack` back). The event
//! set is closed: encoding happens in [`encode_client`], decoding in
//! [`decode_server`], and nothing else touches raw frames.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::error::ProtoError;

/// Messages the client sends over the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Sent once per connection, immediately after the transport connects.
    JoinScenario { session_id: String },
    /// Keystroke bytes. Expects an `ack` frame carrying the same `seq`.
    TerminalInput {
        session_id: String,
        input: String,
        seq: u64,
    },
    /// Terminal dimension sync. No acknowledgment.
    Resize {
        session_id: String,
        cols: u16,
        rows: u16,
    },
    /// Best-effort teardown notice.
    DisconnectRequest { session_id: String },
}

impl ClientEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinScenario { .. } => "join_scenario",
            ClientEvent::TerminalInput { .. } => "terminalInput",
            ClientEvent::Resize { .. } => "resize",
            ClientEvent::DisconnectRequest { .. } => "disconnect_request",
        }
    }
}

/// Messages the server pushes to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Raw bytes for direct rendering, in delivery order.
    PtyOutput { output: String },
    /// Acknowledgment for a `terminalInput` frame.
    InputAck {
        seq: u64,
        status: AckStatus,
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Ok,
    Error,
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    seq: Option<u64>,
    data: Value,
}

#[derive(Deserialize)]
struct RawFrame {
    event: String,
    #[serde(default)]
    seq: Option<u64>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
struct OutputPayload {
    output: String,
}

#[derive(Deserialize)]
struct AckPayload {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

/// Encode a client event into a wire frame.
pub fn encode_client(event: &ClientEvent) -> String {
    let envelope = match event {
        ClientEvent::JoinScenario { session_id } => Envelope {
            event: event.name(),
            seq: None,
            data: json!({ "sessionId": session_id }),
        },
        ClientEvent::TerminalInput {
            session_id,
            input,
            seq,
        } => Envelope {
            event: event.name(),
            seq: Some(*seq),
            data: json!({ "input": input, "sessionId": session_id }),
        },
        ClientEvent::Resize {
            session_id,
            cols,
            rows,
        } => Envelope {
            event: event.name(),
            seq: None,
            data: json!({ "sessionId": session_id, "cols": cols, "rows": rows }),
        },
        ClientEvent::DisconnectRequest { session_id } => Envelope {
            event: event.name(),
            seq: None,
            data: json!({ "sessionId": session_id }),
        },
    };

    // Serialization of a Value-backed envelope cannot fail.
    serde_json::to_string(&envelope).unwrap_or_default()
}

/// Decode one server frame. Unknown event names are an error the caller
/// logs and skips; they never reach the session state machine.
pub fn decode_server(raw: &str) -> Result<ServerEvent, ProtoError> {
    let frame: RawFrame = serde_json::from_str(raw)?;

    match frame.event.as_str() {
        "pty-output" => {
            let data = frame.data.ok_or(ProtoError::MissingField("data"))?;
            let payload: OutputPayload = serde_json::from_value(data)?;
            Ok(ServerEvent::PtyOutput {
                output: payload.output,
            })
        }
        "ack" => {
            let seq = frame.seq.ok_or(ProtoError::MissingField("seq"))?;
            let data = frame.data.ok_or(ProtoError::MissingField("data"))?;
            let payload: AckPayload = serde_json::from_value(data)?;
            let status = if payload.status == "ok" {
                AckStatus::Ok
            } else {
                AckStatus::Error
            };
            Ok(ServerEvent::InputAck {
                seq,
                status,
                message: payload.message,
            })
        }
        other => Err(ProtoError::UnknownEvent(other.to_string())),
    }
}
