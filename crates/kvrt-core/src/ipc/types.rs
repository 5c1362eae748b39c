//! Protocol values shared by the daemon and the client.
//!
//! These are the in-memory forms of the messages exchanged over the Unix
//! socket; [`codec`](super::codec) maps them to and from JSON.

use std::fmt;

use serde::Serialize;

/// Capacity of a message field, terminator included. A message carries at
/// most `MESSAGE_CAPACITY - 1` bytes of text.
pub const MESSAGE_CAPACITY: usize = 256;

/// Longest message text, in bytes, that survives encoding or decoding.
pub const MAX_MESSAGE_LEN: usize = MESSAGE_CAPACITY - 1;

/// `request_code` used in error responses when no command could be read
/// from the request at all.
pub const NO_COMMAND: i64 = 0;

/// Administrative command carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    /// Liveness check.
    Hello,
    /// Host status query.
    Status,
    /// Graceful daemon shutdown.
    Shutdown,
    /// A wire value that names no known command. Only produced by
    /// [`CommandCode::from_wire`], so it never holds 1, 2 or 3.
    Unrecognized(i64),
}

impl CommandCode {
    /// Every command a client can send.
    pub const ALL: [CommandCode; 3] = [Self::Hello, Self::Status, Self::Shutdown];

    pub fn from_wire(code: i64) -> Self {
        match code {
            1 => Self::Hello,
            2 => Self::Status,
            3 => Self::Shutdown,
            other => Self::Unrecognized(other),
        }
    }

    pub fn to_wire(self) -> i64 {
        match self {
            Self::Hello => 1,
            Self::Status => 2,
            Self::Shutdown => 3,
            Self::Unrecognized(code) => code,
        }
    }

    /// Lower-case command word, or `"unknown"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hello => "hello",
            Self::Status => "status",
            Self::Shutdown => "shutdown",
            Self::Unrecognized(_) => "unknown",
        }
    }

    /// Resolve a command word, ignoring ASCII case.
    pub fn from_name(word: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.name().eq_ignore_ascii_case(word))
    }

    pub fn is_recognized(self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrecognized(code) => write!(f, "unknown ({code})"),
            known => f.write_str(known.name()),
        }
    }
}

/// Outcome code carried by a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    BadRequest,
    BadResponse,
    InternalError,
    /// Also the local value for any unrecognized wire code.
    Unknown,
}

impl StatusCode {
    pub fn from_wire(code: i64) -> Self {
        match code {
            10 => Self::Ok,
            11 => Self::BadRequest,
            12 => Self::BadResponse,
            13 => Self::InternalError,
            _ => Self::Unknown,
        }
    }

    pub fn to_wire(self) -> i64 {
        match self {
            Self::Ok => 10,
            Self::BadRequest => 11,
            Self::BadResponse => 12,
            Self::InternalError => 13,
            Self::Unknown => 14,
        }
    }

    /// Human-readable status name used in error messages and rendering.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::BadRequest => "bad request",
            Self::BadResponse => "bad response",
            Self::InternalError => "internal server",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A request: just the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub command: CommandCode,
}

impl Request {
    pub fn new(command: CommandCode) -> Self {
        Self { command }
    }
}

/// Host figures returned by the status command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusBody {
    pub cpu_cores: u32,
    pub memory_usage: u64,
    pub memory_capacity: u64,
}

/// Response payload. Non-OK responses always carry a [`Body::Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Message(String),
    Status(StatusBody),
}

impl Body {
    /// Build a message body, truncating it to [`MAX_MESSAGE_LEN`] bytes.
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(truncate_message(text.into()))
    }

    /// The message text, if this is a message body.
    pub fn as_message(&self) -> Option<&str> {
        match self {
            Self::Message(text) => Some(text),
            Self::Status(_) => None,
        }
    }
}

/// A response to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub command: CommandCode,
    pub body: Body,
}

impl Response {
    /// Successful response for `command`.
    pub fn ok(command: CommandCode, body: Body) -> Self {
        Self {
            status: StatusCode::Ok,
            command,
            body,
        }
    }

    /// Error response whose message reads `"<status name>: <detail>"`.
    pub fn error(command: CommandCode, status: StatusCode, detail: &str) -> Self {
        Self {
            status,
            command,
            body: Body::message(format!("{}: {detail}", status.name())),
        }
    }
}

/// Cut `text` down to at most [`MAX_MESSAGE_LEN`] bytes on a character
/// boundary.
pub fn truncate_message(mut text: String) -> String {
    if text.len() > MAX_MESSAGE_LEN {
        let mut end = MAX_MESSAGE_LEN;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_wire_values_are_stable() {
        assert_eq!(CommandCode::Hello.to_wire(), 1);
        assert_eq!(CommandCode::Status.to_wire(), 2);
        assert_eq!(CommandCode::Shutdown.to_wire(), 3);
        for command in CommandCode::ALL {
            assert_eq!(CommandCode::from_wire(command.to_wire()), command);
        }
    }

    #[test]
    fn test_unknown_command_keeps_raw_value() {
        let command = CommandCode::from_wire(999);
        assert_eq!(command, CommandCode::Unrecognized(999));
        assert_eq!(command.to_wire(), 999);
        assert!(!command.is_recognized());
        assert_eq!(command.name(), "unknown");
        assert_eq!(command.to_string(), "unknown (999)");
    }

    #[test]
    fn test_command_from_name_ignores_case() {
        assert_eq!(CommandCode::from_name("hello"), Some(CommandCode::Hello));
        assert_eq!(CommandCode::from_name("STATUS"), Some(CommandCode::Status));
        assert_eq!(
            CommandCode::from_name("ShutDown"),
            Some(CommandCode::Shutdown)
        );
        assert_eq!(CommandCode::from_name("ping"), None);
        assert_eq!(CommandCode::from_name("unknown"), None);
        assert_eq!(CommandCode::from_name(""), None);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(StatusCode::Ok.to_wire(), 10);
        assert_eq!(StatusCode::Unknown.to_wire(), 14);
        assert_eq!(StatusCode::from_wire(11), StatusCode::BadRequest);
        assert_eq!(StatusCode::from_wire(13), StatusCode::InternalError);
        assert_eq!(StatusCode::from_wire(42), StatusCode::Unknown);
        assert_eq!(StatusCode::from_wire(-1), StatusCode::Unknown);
        assert_eq!(StatusCode::InternalError.name(), "internal server");
        assert!(StatusCode::Ok.is_ok());
        assert!(!StatusCode::BadResponse.is_ok());
    }

    #[test]
    fn test_error_response_prefixes_status_name() {
        let response = Response::error(
            CommandCode::from_wire(7),
            StatusCode::BadRequest,
            "bad request",
        );
        assert_eq!(response.body.as_message(), Some("bad request: bad request"));
        assert_eq!(response.command.to_wire(), 7);
    }

    #[test]
    fn test_truncate_message() {
        let short = truncate_message("short".to_string());
        assert_eq!(short, "short");

        let long = truncate_message("x".repeat(400));
        assert_eq!(long.len(), MAX_MESSAGE_LEN);

        let exact = truncate_message("y".repeat(MAX_MESSAGE_LEN));
        assert_eq!(exact.len(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_truncate_message_respects_char_boundaries() {
        // 'é' is two bytes, so byte 255 falls inside a character.
        let truncated = truncate_message("é".repeat(200));
        assert_eq!(truncated.len(), 254);
        assert!(truncated.ends_with('é'));
    }
}
