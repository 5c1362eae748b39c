//! JSON wire codec for requests and responses.
//!
//! Encoding goes through `serde` wire structs. Decoding parses into a
//! generic [`serde_json::Value`] first and then checks the shape by hand,
//! because the protocol is strict about which members appear but lenient
//! about how numbers are written.
//!
//! ## Formats
//!
//! ```text
//! request:   {"code": <command>}
//! response:  {"code": <status>, "request_code": <command>, "body": {...}}
//! message:   {"message": "<at most 255 bytes>"}
//! status:    {"cpu_cores": <uint>, "memory_usage": <uint>, "memory_capacity": <uint>}
//! ```

use serde::Serialize;
use serde_json::error::Category;
use serde_json::{Map, Number, Value};

use super::types::{Body, CommandCode, Request, Response, StatusBody, StatusCode, truncate_message};

/// Largest document the decoder will parse.
///
/// Half the largest configurable read buffer. A daemon whose
/// `max_message_bytes` exceeds this can receive documents the decoder
/// refuses as [`DecodeError::Exhausted`]; those connections are dropped
/// without a response.
pub const MAX_DOCUMENT_BYTES: usize = kvrt_config::MAX_MESSAGE_BYTES / 2;

const RESPONSE_MEMBERS: [&str; 3] = ["code", "request_code", "body"];
const STATUS_MEMBERS: [&str; 3] = ["cpu_cores", "memory_usage", "memory_capacity"];

/// Why a message could not be decoded.
///
/// The variants keep the three failure classes apart: an `Exhausted`
/// message cannot be answered at all, while `Partial` and `Invalid` ones
/// are answered with a bad-request response.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("message of {len} bytes exceeds the {limit}-byte decode buffer")]
    Exhausted { len: usize, limit: usize },

    #[error("incomplete JSON document: {0}")]
    Partial(#[source] serde_json::Error),

    #[error("invalid message: {reason}")]
    Invalid {
        reason: String,
        /// Raw `code` member salvaged from an otherwise invalid request.
        echo: Option<i64>,
    },
}

impl DecodeError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
            echo: None,
        }
    }

    /// Whether the peer can still be sent a bad-request response.
    pub fn is_answerable(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }

    /// The command value salvaged from the rejected request, if any.
    pub fn echoed_command(&self) -> Option<i64> {
        match self {
            Self::Invalid { echo, .. } => *echo,
            _ => None,
        }
    }
}

/// A value could not be serialized.
#[derive(Debug, thiserror::Error)]
#[error("failed to encode message: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

#[derive(Serialize)]
struct WireRequest {
    code: i64,
}

#[derive(Serialize)]
struct WireResponse<'a> {
    code: i64,
    request_code: i64,
    body: WireBody<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireBody<'a> {
    Message { message: &'a str },
    Status(&'a StatusBody),
}

/// Encode a request document (without frame terminator).
pub fn encode_request(request: &Request) -> Result<Vec<u8>, EncodeError> {
    Ok(serde_json::to_vec(&WireRequest {
        code: request.command.to_wire(),
    })?)
}

/// Encode a response document (without frame terminator). Message text is
/// truncated to the protocol limit.
pub fn encode_response(response: &Response) -> Result<Vec<u8>, EncodeError> {
    let truncated;
    let body = match &response.body {
        Body::Message(text) => {
            truncated = truncate_message(text.clone());
            WireBody::Message {
                message: &truncated,
            }
        }
        Body::Status(status) => WireBody::Status(status),
    };
    Ok(serde_json::to_vec(&WireResponse {
        code: response.status.to_wire(),
        request_code: response.command.to_wire(),
        body,
    })?)
}

/// Decode a request document.
///
/// The document must be an object with exactly one numeric `code`
/// member. When it is an object holding a numeric `code` but is otherwise
/// malformed, the returned [`DecodeError::Invalid`] carries that value.
pub fn decode_request(bytes: &[u8]) -> Result<Request, DecodeError> {
    let document = parse_document(bytes)?;
    let Value::Object(members) = &document else {
        return Err(DecodeError::invalid("request is not a JSON object"));
    };

    let echo = members.get("code").and_then(integer);
    if members.len() != 1 {
        return Err(DecodeError::Invalid {
            reason: format!(
                "request must have exactly one member, found {}",
                members.len()
            ),
            echo,
        });
    }

    let code = echo.ok_or_else(|| DecodeError::invalid("request needs a numeric `code`"))?;
    Ok(Request::new(CommandCode::from_wire(code)))
}

/// Decode a response document.
pub fn decode_response(bytes: &[u8]) -> Result<Response, DecodeError> {
    let document = parse_document(bytes)?;
    let Value::Object(members) = &document else {
        return Err(DecodeError::invalid("response is not a JSON object"));
    };

    if !(2..=3).contains(&members.len()) {
        return Err(DecodeError::invalid(format!(
            "response must have 2 or 3 members, found {}",
            members.len()
        )));
    }
    if let Some(name) = members
        .keys()
        .find(|name| !RESPONSE_MEMBERS.contains(&name.as_str()))
    {
        return Err(DecodeError::invalid(format!(
            "unexpected response member `{name}`"
        )));
    }

    let status = StatusCode::from_wire(required_integer(members, "code")?);
    let command = CommandCode::from_wire(required_integer(members, "request_code")?);
    let body = members.get("body");

    let body = if !status.is_ok() {
        Body::Message(message_body(body))
    } else {
        match command {
            CommandCode::Hello | CommandCode::Shutdown => Body::Message(message_body(body)),
            CommandCode::Status => Body::Status(status_body(body)?),
            CommandCode::Unrecognized(_) => Body::Message(String::new()),
        }
    };

    Ok(Response {
        status,
        command,
        body,
    })
}

fn parse_document(bytes: &[u8]) -> Result<Value, DecodeError> {
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(DecodeError::Exhausted {
            len: bytes.len(),
            limit: MAX_DOCUMENT_BYTES,
        });
    }
    serde_json::from_slice(bytes).map_err(|err| match err.classify() {
        Category::Eof => DecodeError::Partial(err),
        Category::Io | Category::Syntax | Category::Data => DecodeError::invalid(err.to_string()),
    })
}

fn required_integer(members: &Map<String, Value>, name: &str) -> Result<i64, DecodeError> {
    let value = members
        .get(name)
        .ok_or_else(|| DecodeError::invalid(format!("missing member `{name}`")))?;
    integer(value).ok_or_else(|| DecodeError::invalid(format!("member `{name}` must be a number")))
}

/// Text of a `{"message": "..."}` body. Anything else reads as empty.
fn message_body(body: Option<&Value>) -> String {
    let Some(Value::Object(members)) = body else {
        return String::new();
    };
    if members.len() != 1 {
        return String::new();
    }
    match members.get("message") {
        Some(Value::String(text)) => truncate_message(text.clone()),
        _ => String::new(),
    }
}

fn status_body(body: Option<&Value>) -> Result<StatusBody, DecodeError> {
    let Some(Value::Object(members)) = body else {
        return Err(DecodeError::invalid("status response needs an object body"));
    };
    if members.len() != STATUS_MEMBERS.len() {
        return Err(DecodeError::invalid(format!(
            "status body must have {} members, found {}",
            STATUS_MEMBERS.len(),
            members.len()
        )));
    }

    let field = |name: &str| -> Result<u64, DecodeError> {
        members
            .get(name)
            .and_then(unsigned)
            .ok_or_else(|| DecodeError::invalid(format!("status member `{name}` must be a number")))
    };

    Ok(StatusBody {
        cpu_cores: u32::try_from(field("cpu_cores")?).unwrap_or(u32::MAX),
        memory_usage: field("memory_usage")?,
        memory_capacity: field("memory_capacity")?,
    })
}

/// Read a JSON number as a signed integer: fractions truncate, values out
/// of range saturate.
fn integer(value: &Value) -> Option<i64> {
    let Value::Number(number) = value else {
        return None;
    };
    Some(match (number.as_i64(), number.as_u64()) {
        (Some(signed), _) => signed,
        (None, Some(_)) => i64::MAX,
        (None, None) => float(number) as i64,
    })
}

/// Read a JSON number as an unsigned integer: fractions truncate, negative
/// values read as zero.
fn unsigned(value: &Value) -> Option<u64> {
    let Value::Number(number) = value else {
        return None;
    };
    Some(match (number.as_u64(), number.as_i64()) {
        (Some(plain), _) => plain,
        (None, Some(_)) => 0,
        (None, None) => float(number) as u64,
    })
}

fn float(number: &Number) -> f64 {
    number.as_f64().unwrap_or_default()
}
