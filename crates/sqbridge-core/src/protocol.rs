//! Debuggee Wire Protocol
//!
//! Schema types for the remote debuggee's split-channel protocol:
//! status pushes on the WebSocket channel, command responses and variable
//! listings on the HTTP channel. Decoding never hands back loosely-typed
//! JSON; a payload either matches its schema or becomes a `BridgeError`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::defaults::{COMMAND_CHANNEL_PATH, PUSH_CHANNEL_PATH};
use crate::error::{BridgeError, Result};

/// Command names understood by the debuggee's command channel
pub mod commands {
    pub const CONTINUE: &str = "Continue";
    pub const STEP_OVER: &str = "StepOver";
    pub const STEP_IN: &str = "StepIn";
    pub const STEP_OUT: &str = "StepOut";
    pub const PAUSE: &str = "Pause";
    pub const SEND_STATUS: &str = "SendStatus";
}

/// Where the debuggee's embedded server listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Use `wss`/`https` instead of `ws`/`http`
    pub secure: bool,
}

impl Endpoint {
    /// Parse `host:port`, optionally prefixed by a ws/wss/http/https scheme
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let (secure, rest) = if let Some(rest) = trimmed.strip_prefix("wss://") {
            (true, rest)
        } else if let Some(rest) = trimmed.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = trimmed.strip_prefix("ws://") {
            (false, rest)
        } else if let Some(rest) = trimmed.strip_prefix("http://") {
            (false, rest)
        } else {
            (false, trimmed)
        };

        // Drop any path the user pasted along with the authority
        let authority = rest.split('/').next().unwrap_or_default();

        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| BridgeError::InvalidEndpoint(format!("missing port in '{input}'")))?;

        if host.is_empty() {
            return Err(BridgeError::InvalidEndpoint(format!(
                "missing host in '{input}'"
            )));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| BridgeError::InvalidEndpoint(format!("bad port in '{input}': {e}")))?;

        Ok(Self {
            host: host.to_string(),
            port,
            secure,
        })
    }

    /// URL of the push channel
    pub fn push_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{PUSH_CHANNEL_PATH}", self.host, self.port)
    }

    /// URL of a command or query on the command channel.
    /// `name` may carry a pre-encoded query string.
    pub fn command_url(&self, name: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!(
            "{scheme}://{}:{}{COMMAND_CHANNEL_PATH}/{name}",
            self.host, self.port
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Coarse execution phase reported by the debuggee
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Running,
    Pausing,
    Paused,
    Stepping,
}

impl RunState {
    /// Whether the debuggee is halted with a meaningful stack
    pub fn is_stopped(self) -> bool {
        matches!(self, RunState::Paused | RunState::Stepping)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Pausing => write!(f, "pausing"),
            RunState::Paused => write!(f, "paused"),
            RunState::Stepping => write!(f, "stepping"),
        }
    }
}

/// One remote stack entry (line is 1-based on the wire)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackEntry {
    pub file: String,
    pub line: u32,
    pub function: String,
}

/// Debuggee status: run-state plus stack snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Status {
    pub runstate: RunState,
    #[serde(default)]
    pub stack: Vec<StackEntry>,
}

/// Status as it appears on the wire, before the stack requirement is checked
#[derive(Debug, Deserialize)]
struct WireStatus {
    runstate: RunState,
    stack: Option<Vec<StackEntry>>,
}

/// Envelope of every push frame
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    kind: String,
    message: Option<serde_json::Value>,
}

/// A decoded push-channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    Status(Status),
}

/// Decode one push frame.
///
/// Fails with `Decode` on malformed JSON or a missing `message`, and with
/// `UnknownMessageType` on any `type` other than `status`.
pub fn decode_push(text: &str) -> Result<PushMessage> {
    let envelope: EventEnvelope = serde_json::from_str(text)?;

    let message = envelope
        .message
        .ok_or_else(|| BridgeError::Decode("missing field `message`".to_string()))?;

    match envelope.kind.as_str() {
        "status" => Ok(PushMessage::Status(decode_status(message)?)),
        other => Err(BridgeError::UnknownMessageType(other.to_string())),
    }
}

/// Decode a status payload.
///
/// `stack` may be omitted while running or pausing; a stopped status
/// without one is rejected.
pub fn decode_status(value: serde_json::Value) -> Result<Status> {
    let wire: WireStatus = serde_json::from_value(value)?;

    let stack = match (wire.stack, wire.runstate.is_stopped()) {
        (Some(stack), _) => stack,
        (None, false) => Vec::new(),
        (None, true) => {
            return Err(BridgeError::Decode(format!(
                "missing field `stack` for runstate `{}`",
                wire.runstate
            )))
        }
    };

    Ok(Status {
        runstate: wire.runstate,
        stack,
    })
}

/// Body of a command-channel response
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommandResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// One variable as listed by the debuggee
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
}

/// Body of a variable query response
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VariableList {
    pub variables: Vec<RemoteVariable>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parse_plain() {
        let ep = Endpoint::parse("localhost:8000").unwrap();
        assert_eq!(ep.host, "localhost");
        assert_eq!(ep.port, 8000);
        assert!(!ep.secure);
        assert_eq!(ep.push_url(), "ws://localhost:8000/ws");
        assert_eq!(
            ep.command_url("StepOver"),
            "http://localhost:8000/DebugCommand/StepOver"
        );
    }

    #[test]
    fn test_endpoint_parse_secure_scheme() {
        let ep = Endpoint::parse("wss://debug.local:443/ws").unwrap();
        assert!(ep.secure);
        assert_eq!(ep.push_url(), "wss://debug.local:443/ws");
        assert_eq!(
            ep.command_url("StackLocals/0?path="),
            "https://debug.local:443/DebugCommand/StackLocals/0?path="
        );
    }

    #[test]
    fn test_endpoint_parse_invalid() {
        assert!(matches!(
            Endpoint::parse("localhost"),
            Err(BridgeError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::parse(":8000"),
            Err(BridgeError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::parse("localhost:http"),
            Err(BridgeError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_runstate_serde() {
        let parsed: RunState = serde_json::from_str("\"stepping\"").unwrap();
        assert_eq!(parsed, RunState::Stepping);
        assert_eq!(serde_json::to_string(&RunState::Pausing).unwrap(), "\"pausing\"");
        assert!(serde_json::from_str::<RunState>("\"halted\"").is_err());
    }

    #[test]
    fn test_decode_push_status() {
        let text = r#"{"type":"status","message":{"runstate":"paused","stack":[{"file":"a.sq","line":5,"function":"main"}]}}"#;
        let PushMessage::Status(status) = decode_push(text).unwrap();
        assert_eq!(status.runstate, RunState::Paused);
        assert_eq!(status.stack.len(), 1);
        assert_eq!(status.stack[0].line, 5);
        assert_eq!(status.stack[0].function, "main");
    }

    #[test]
    fn test_decode_push_truncated() {
        let err = decode_push(r#"{"type":"status","mess"#).unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
    }

    #[test]
    fn test_decode_push_missing_message() {
        let err = decode_push(r#"{"type":"status"}"#).unwrap_err();
        assert_eq!(
            err,
            BridgeError::Decode("missing field `message`".to_string())
        );
    }

    #[test]
    fn test_decode_push_unknown_type() {
        let err = decode_push(r#"{"type":"output","message":{}}"#).unwrap_err();
        assert_eq!(err, BridgeError::UnknownMessageType("output".to_string()));
    }

    #[test]
    fn test_decode_status_stack_rules() {
        let running = decode_status(serde_json::json!({"runstate": "running"})).unwrap();
        assert!(running.stack.is_empty());

        let err = decode_status(serde_json::json!({"runstate": "paused"})).unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));

        let err = decode_status(serde_json::json!({"runstate": "frozen", "stack": []})).unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
    }

    #[test]
    fn test_variable_list_serde() {
        let list: VariableList = serde_json::from_str(
            r#"{"variables":[{"name":"t","type":"object","value":"{...}"}]}"#,
        )
        .unwrap();
        assert_eq!(list.variables[0].type_name, "object");

        let json = serde_json::to_string(&list).unwrap();
        assert!(json.contains("\"type\":\"object\""));
    }

    #[test]
    fn test_command_response_without_data() {
        let resp: CommandResponse = serde_json::from_str(r#"{"code":0}"#).unwrap();
        assert_eq!(resp.code, Some(0));
        assert!(resp.data.is_none());
    }
}
