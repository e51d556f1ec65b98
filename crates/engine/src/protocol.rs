//! Wire framing for the remote intent port.
//!
//! Requests are one JSON object per line:
//! `{"id": "req-7", "kind": "move_to", "params": {"x": 4, "y": 9}}`.
//! Server lines carry a one-letter channel prefix: `C ` for control messages (ready, acks,
//! outcomes) and `T ` for telemetry frames.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::intent::{IntentKind, IntentRejection};
use crate::ledger::{ActiveKind, CorrelationId, Outcome, OutcomeData};
use crate::queue::{Ack, AckStatus};
use crate::tile::Tile;

pub const PROTOCOL_VERSION: u32 = 1;
pub const REMOTE_CONTROL_PREFIX: &str = "C ";
pub const REMOTE_TELEMETRY_PREFIX: &str = "T ";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("request is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("invalid request at '{path}': {message}")]
    Field {
        id: Option<CorrelationId>,
        path: String,
        message: String,
    },
    #[error("failed to encode server message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ProtocolError {
    /// Correlation id recovered from a request that failed to decode, when it had one.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        match self {
            Self::Field { id, .. } => id.as_ref(),
            Self::Json(_) | Self::Encode(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Request {
    pub id: CorrelationId,
    pub kind: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TileParams {
    x: Option<i32>,
    y: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SlotParams {
    slot: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RepeatParams {
    count: Option<u32>,
    slot: Option<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct HoldParams {
    ticks: Option<u32>,
    slot: Option<u8>,
}

pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    let value: Value = serde_json::from_str(line.trim()).map_err(ProtocolError::Json)?;
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .map(CorrelationId::new);
    serde_path_to_error::deserialize(value).map_err(|error| ProtocolError::Field {
        id,
        path: error.path().to_string(),
        message: error.inner().to_string(),
    })
}

impl Request {
    pub fn into_intent(self) -> Result<IntentKind, IntentRejection> {
        match self.kind.as_str() {
            "move_to" => {
                let params: TileParams = decode_params(self.params)?;
                Ok(IntentKind::MoveTo {
                    goal: required_tile(params)?,
                })
            }
            "find_path" => {
                let params: TileParams = decode_params(self.params)?;
                Ok(IntentKind::FindPath {
                    goal: required_tile(params)?,
                })
            }
            "stop" => Ok(IntentKind::Stop),
            "status" => Ok(IntentKind::Status),
            "use_tool_once" => {
                let params: SlotParams = decode_params(self.params)?;
                Ok(IntentKind::UseToolOnce { slot: params.slot })
            }
            "use_tool_repeat" => {
                let params: RepeatParams = decode_params(self.params)?;
                Ok(IntentKind::UseToolRepeat {
                    count: params.count.ok_or(IntentRejection::MissingParam("count"))?,
                    slot: params.slot,
                })
            }
            "hold_tool" => {
                let params: HoldParams = decode_params(self.params)?;
                Ok(IntentKind::HoldTool {
                    ticks: params.ticks.ok_or(IntentRejection::MissingParam("ticks"))?,
                    slot: params.slot,
                })
            }
            other => Err(IntentRejection::UnknownKind(other.to_string())),
        }
    }
}

fn decode_params<T: DeserializeOwned>(params: Value) -> Result<T, IntentRejection> {
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_path_to_error::deserialize(params).map_err(|error| {
        IntentRejection::InvalidParams(format!("{} at '{}'", error.inner(), error.path()))
    })
}

fn required_tile(params: TileParams) -> Result<Tile, IntentRejection> {
    let x = params.x.ok_or(IntentRejection::MissingParam("x"))?;
    let y = params.y.ok_or(IntentRejection::MissingParam("y"))?;
    Ok(Tile::new(x, y))
}

/// Failure outcome for a request that never reached the intent queue.
pub fn rejection_outcome(id: Option<CorrelationId>, message: impl Into<String>) -> Outcome {
    Outcome {
        id: id.unwrap_or_else(|| CorrelationId::new("")),
        success: false,
        message: message.into(),
        data: OutcomeData::Empty {},
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ready { version: u32, port: u16 },
    Ack { id: CorrelationId, status: AckStatus },
    Outcome(Outcome),
    Frame(Frame),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub tick: u64,
    pub x: i32,
    pub y: i32,
    pub can_act: bool,
    pub active: ActiveKind,
    pub queued: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_waypoint: Option<Tile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineChannel {
    Control,
    Telemetry,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub channel: LineChannel,
    pub payload: String,
}

impl From<Ack> for ServerMessage {
    fn from(ack: Ack) -> Self {
        Self::Ack {
            id: ack.id,
            status: ack.status,
        }
    }
}

impl ServerMessage {
    pub fn channel(&self) -> LineChannel {
        match self {
            Self::Frame(_) => LineChannel::Telemetry,
            Self::Ready { .. } | Self::Ack { .. } | Self::Outcome(_) => LineChannel::Control,
        }
    }

    /// Channel prefix, JSON payload and trailing newline.
    pub fn encode_line(&self) -> Result<String, ProtocolError> {
        let payload = serde_json::to_string(self).map_err(ProtocolError::Encode)?;
        let prefix = match self.channel() {
            LineChannel::Telemetry => REMOTE_TELEMETRY_PREFIX,
            LineChannel::Control | LineChannel::Unknown => REMOTE_CONTROL_PREFIX,
        };
        let mut line = String::with_capacity(prefix.len() + payload.len() + 1);
        line.push_str(prefix);
        line.push_str(&payload);
        line.push('\n');
        Ok(line)
    }

    pub fn decode_payload(payload: &str) -> Option<ServerMessage> {
        serde_json::from_str(payload).ok()
    }
}

pub fn parse_wire_line(raw: &str) -> ParsedLine {
    let trimmed = raw.trim_end_matches(['\r', '\n']);
    if let Some(payload) = trimmed.strip_prefix(REMOTE_CONTROL_PREFIX) {
        return ParsedLine {
            channel: LineChannel::Control,
            payload: payload.to_string(),
        };
    }
    if let Some(payload) = trimmed.strip_prefix(REMOTE_TELEMETRY_PREFIX) {
        return ParsedLine {
            channel: LineChannel::Telemetry,
            payload: payload.to_string(),
        };
    }
    ParsedLine {
        channel: LineChannel::Unknown,
        payload: trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn intent_of(line: &str) -> Result<IntentKind, IntentRejection> {
        decode_request(line).expect("decode").into_intent()
    }

    #[test]
    fn decodes_each_intent_kind() {
        assert_eq!(
            intent_of(r#"{"id":"a","kind":"move_to","params":{"x":4,"y":-2}}"#),
            Ok(IntentKind::MoveTo {
                goal: Tile::new(4, -2)
            })
        );
        assert_eq!(intent_of(r#"{"id":"b","kind":"stop"}"#), Ok(IntentKind::Stop));
        assert_eq!(
            intent_of(r#"{"id":"c","kind":"use_tool_repeat","params":{"count":3}}"#),
            Ok(IntentKind::UseToolRepeat {
                count: 3,
                slot: None
            })
        );
        assert_eq!(
            intent_of(r#"{"id":"d","kind":"hold_tool","params":{"ticks":60,"slot":1}}"#),
            Ok(IntentKind::HoldTool {
                ticks: 60,
                slot: Some(1)
            })
        );
        assert_eq!(
            intent_of(r#"{"id":"e","kind":"use_tool_once","params":null}"#),
            Ok(IntentKind::UseToolOnce { slot: None })
        );
    }

    #[test]
    fn missing_and_invalid_params_are_rejections() {
        assert_eq!(
            intent_of(r#"{"id":"a","kind":"move_to","params":{"x":4}}"#),
            Err(IntentRejection::MissingParam("y"))
        );
        assert_eq!(
            intent_of(r#"{"id":"b","kind":"use_tool_repeat"}"#),
            Err(IntentRejection::MissingParam("count"))
        );
        assert!(matches!(
            intent_of(r#"{"id":"c","kind":"hold_tool","params":{"ticks":-5}}"#),
            Err(IntentRejection::InvalidParams(message)) if message.contains("ticks")
        ));
        assert_eq!(
            intent_of(r#"{"id":"d","kind":"dance"}"#),
            Err(IntentRejection::UnknownKind("dance".to_string()))
        );
    }

    #[test]
    fn field_errors_keep_the_correlation_id_and_path() {
        let error = decode_request(r#"{"id":"req-9","kind":7}"#).expect_err("kind is a number");
        assert_eq!(error.correlation_id(), Some(&CorrelationId::new("req-9")));
        match error {
            ProtocolError::Field { path, .. } => assert_eq!(path, "kind"),
            other => panic!("unexpected error {other:?}"),
        }
        let error = decode_request("not json").expect_err("garbage");
        assert!(error.correlation_id().is_none());
    }

    #[test]
    fn outcome_line_uses_control_prefix_and_tagged_json() {
        let message = ServerMessage::Outcome(Outcome {
            id: CorrelationId::new("r1"),
            success: true,
            message: "3 swings with axe".to_string(),
            data: OutcomeData::ToolRepeat {
                swings: 3,
                tool: "axe".to_string(),
            },
        });
        let line = message.encode_line().expect("encode");
        assert!(line.starts_with("C "));
        assert!(line.ends_with('\n'));

        let parsed = parse_wire_line(&line);
        assert_eq!(parsed.channel, LineChannel::Control);
        let value: Value = serde_json::from_str(&parsed.payload).expect("json");
        assert_eq!(
            value,
            json!({
                "type": "outcome",
                "id": "r1",
                "success": true,
                "message": "3 swings with axe",
                "data": {"swings": 3, "tool": "axe"}
            })
        );
    }

    #[test]
    fn ack_line_names_the_request() {
        let ack = Ack {
            id: CorrelationId::new("r2"),
            status: AckStatus::Accepted,
        };
        let line = ServerMessage::from(ack).encode_line().expect("encode");
        assert_eq!(line, "C {\"type\":\"ack\",\"id\":\"r2\",\"status\":\"accepted\"}\n");
    }

    #[test]
    fn frame_goes_to_telemetry_channel() {
        let frame = ServerMessage::Frame(Frame {
            tick: 12,
            x: 1,
            y: 2,
            can_act: true,
            active: ActiveKind::Moving,
            queued: 0,
            next_waypoint: Some(Tile::new(2, 2)),
        });
        let parsed = parse_wire_line(&frame.encode_line().expect("encode"));
        assert_eq!(parsed.channel, LineChannel::Telemetry);
        assert_eq!(ServerMessage::decode_payload(&parsed.payload), Some(frame));
    }

    #[test]
    fn parse_wire_line_handles_unknown_and_crlf() {
        assert_eq!(
            parse_wire_line("raw text\r\n"),
            ParsedLine {
                channel: LineChannel::Unknown,
                payload: "raw text".to_string(),
            }
        );
    }
}
