// Wire protocol: one JSON object per connection in each direction

use crate::chatserver::message::{LogError, LogStats, Message};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Which listening endpoint accepted a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Client,
    Admin,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Client => f.write_str("client"),
            Endpoint::Admin => f.write_str("admin"),
        }
    }
}

/// Every failure a single exchange can report back to the peer
///
/// The `Display` text is what goes into the `what` field of the error
/// response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unicode error: check message encoding to be utf-8")]
    Encoding,

    #[error("JSON error: {0}")]
    Syntax(#[from] serde_json::Error),

    #[error("Request format error: request must be a JSON object")]
    NotAnObject,

    #[error("Request format error: no \"{0}\" field specified")]
    MissingField(&'static str),

    #[error("Request format error: \"{field}\" field must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Request format error: invalid action is passed ({0})")]
    UnknownAction(String),

    #[error("Request format error: request exceeds {0} bytes")]
    TooLarge(usize),

    #[error(transparent)]
    Range(#[from] LogError),

    #[error("Invalid password.")]
    Unauthorized,

    #[error("shutdown is already scheduled")]
    ShutdownPending,
}

/// A decoded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Fetch retained messages newer than `last`
    Get { last: u64 },
    /// Post a message
    Post { sender: String, text: String },
    /// Admin: report log counters
    Status { token: String },
    /// Admin: stop the server after `timeout_ms` milliseconds
    Shutdown { token: String, timeout_ms: u64 },
}

impl Request {
    /// The wire name of the action
    pub fn action(&self) -> &'static str {
        match self {
            Request::Get { .. } => "get",
            Request::Post { .. } => "post",
            Request::Status { .. } => "status",
            Request::Shutdown { .. } => "shutdown",
        }
    }
}

/// A syntactically valid request object whose action has not been
/// interpreted yet
///
/// Splitting decoding in two lets the admin endpoint check the token before
/// it looks at the action.
#[derive(Debug, Clone)]
pub struct Envelope {
    fields: Map<String, Value>,
}

impl Envelope {
    /// Parse raw request bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::Encoding)?;

        match serde_json::from_str::<Value>(text)? {
            Value::Object(fields) => Ok(Self { fields }),
            _ => Err(ProtocolError::NotAnObject),
        }
    }

    /// The admin token carried by the request
    pub fn token(&self) -> Result<&str, ProtocolError> {
        self.str_field("token")
    }

    /// Interpret the action for the given endpoint
    pub fn into_request(self, endpoint: Endpoint) -> Result<Request, ProtocolError> {
        let action = match self.fields.get("action") {
            Some(Value::String(action)) => action.as_str(),
            Some(other) => return Err(ProtocolError::UnknownAction(other.to_string())),
            None => return Err(ProtocolError::MissingField("action")),
        };

        match (endpoint, action) {
            (Endpoint::Client, "get") => Ok(Request::Get {
                last: self.watermark_field("last")?,
            }),
            (Endpoint::Client, "post") => Ok(Request::Post {
                sender: self.str_field("nick")?.to_string(),
                text: self.str_field("text")?.to_string(),
            }),
            (Endpoint::Admin, "status") => Ok(Request::Status {
                token: self.token()?.to_string(),
            }),
            (Endpoint::Admin, "shutdown") => Ok(Request::Shutdown {
                token: self.token()?.to_string(),
                timeout_ms: self.duration_field("timeout")?,
            }),
            (_, other) => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }

    fn field(&self, name: &'static str) -> Result<&Value, ProtocolError> {
        self.fields
            .get(name)
            .ok_or(ProtocolError::MissingField(name))
    }

    fn str_field(&self, name: &'static str) -> Result<&str, ProtocolError> {
        self.field(name)?
            .as_str()
            .ok_or(ProtocolError::InvalidField {
                field: name,
                expected: "a string",
            })
    }

    // Negative watermarks select everything retained
    fn watermark_field(&self, name: &'static str) -> Result<u64, ProtocolError> {
        let value = self.field(name)?;

        if let Some(n) = value.as_u64() {
            Ok(n)
        } else if value.as_i64().is_some() {
            Ok(0)
        } else {
            Err(ProtocolError::InvalidField {
                field: name,
                expected: "an integer",
            })
        }
    }

    fn duration_field(&self, name: &'static str) -> Result<u64, ProtocolError> {
        self.field(name)?
            .as_u64()
            .ok_or(ProtocolError::InvalidField {
                field: name,
                expected: "a non-negative integer",
            })
    }
}

/// A result ready to be written back to the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Messages newer than the requested watermark
    Messages {
        timeout_ms: u64,
        messages: Vec<Message>,
    },
    /// A message was accepted
    Posted { timeout_ms: u64 },
    /// Admin status report
    Status(LogStats),
    /// Admin shutdown was armed
    ShutdownScheduled,
    /// Any failure, carrying the description sent as `what`
    Error(String),
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireResponse<'a> {
    Ack {
        status: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        messages: Option<&'a [Message]>,
    },
    Status(&'a LogStats),
    Error {
        status: &'static str,
        what: &'a str,
    },
}

impl Response {
    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_wire())
    }

    /// Serialize to a JSON value
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self.to_wire())
    }

    fn to_wire(&self) -> WireResponse<'_> {
        match self {
            Response::Messages {
                timeout_ms,
                messages,
            } => WireResponse::Ack {
                status: "ok",
                timeout: Some(*timeout_ms),
                messages: Some(messages.as_slice()),
            },
            Response::Posted { timeout_ms } => WireResponse::Ack {
                status: "ok",
                timeout: Some(*timeout_ms),
                messages: None,
            },
            Response::Status(stats) => WireResponse::Status(stats),
            Response::ShutdownScheduled => WireResponse::Ack {
                status: "ok",
                timeout: None,
                messages: None,
            },
            Response::Error(what) => WireResponse::Error {
                status: "err",
                what,
            },
        }
    }
}

impl From<ProtocolError> for Response {
    fn from(err: ProtocolError) -> Self {
        Response::Error(err.to_string())
    }
}
