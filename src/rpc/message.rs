//! JSON-RPC 2.0 message model.
//!
//! A message on the wire is one JSON object. Which variant it is can only
//! be decided once the whole object has been scanned, because the deciding
//! fields (`id`, `method`, `result`, `error`) may arrive in any order. The
//! deserializer below accumulates fields in a single left-to-right pass and
//! classifies at the closing brace:
//!
//! - `result` or `error` present → [`Response`] (exactly one of the two)
//! - otherwise `method` present → [`Request`] when an id is present,
//!   [`Notification`] when it is missing
//! - otherwise the object is not a JSON-RPC message
//!
//! Unknown fields are skipped for forward compatibility, and an unexpected
//! `jsonrpc` tag is carried through verbatim rather than rejected.

use std::fmt;

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::id::RequestId;
use crate::{Error, Result};

/// The protocol version this library speaks.
pub const VERSION: &str = "2.0";

/// A parsed JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call expecting a correlated response.
    Request(Request),
    /// A call with no id, hence no response.
    Notification(Notification),
    /// A reply to an earlier request.
    Response(Response),
}

/// A call carrying an id the peer must echo back.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Protocol version tag, normally "2.0".
    pub version: String,
    /// The id the response will be correlated by.
    pub id: RequestId,
    /// The method to invoke.
    pub method: String,
    /// Positional or named parameters, if any.
    pub params: Option<Value>,
}

/// A fire-and-forget call. Has no id field at all, so it cannot be
/// constructed with one.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Protocol version tag, normally "2.0".
    pub version: String,
    /// The method to invoke.
    pub method: String,
    /// Positional or named parameters, if any.
    pub params: Option<Value>,
}

/// A reply carrying exactly one of a result or an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Protocol version tag, normally "2.0".
    pub version: String,
    /// The id of the request being answered. May be missing when the
    /// peer could not identify the originating request; it is still
    /// written to the wire as `null`, never omitted.
    pub id: RequestId,
    /// The outcome of the call.
    pub body: ResponseBody,
}

/// The outcome half of a response. Exactly one of result or error,
/// by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// The call succeeded with this value.
    Result(Value),
    /// The call failed.
    Error(RpcError),
}

/// A structured JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    /// Error code.
    pub code: i64,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    /// Create an error with no extra data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach extra data to the error.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote error {}: {}", self.code, self.message)
    }
}

impl Request {
    /// Create a request.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            version: VERSION.to_owned(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

impl Notification {
    /// Create a notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            version: VERSION.to_owned(),
            method: method.into(),
            params,
        }
    }
}

impl Response {
    /// Create a success response.
    pub fn result(id: impl Into<RequestId>, value: Value) -> Self {
        Self {
            version: VERSION.to_owned(),
            id: id.into(),
            body: ResponseBody::Result(value),
        }
    }

    /// Create an error response.
    pub fn error(id: impl Into<RequestId>, error: RpcError) -> Self {
        Self {
            version: VERSION.to_owned(),
            id: id.into(),
            body: ResponseBody::Error(error),
        }
    }

    /// The success value, if the call succeeded.
    pub fn ok(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Result(v) => Some(v),
            ResponseBody::Error(_) => None,
        }
    }

    /// The error, if the call failed.
    pub fn err(&self) -> Option<&RpcError> {
        match &self.body {
            ResponseBody::Result(_) => None,
            ResponseBody::Error(e) => Some(e),
        }
    }
}

impl Message {
    /// Parse a single message from JSON text.
    pub fn parse(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| Error::protocol(e, input))
    }

    /// Serialize the message to its canonical JSON text.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::from)
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(r) => Some(&r.method),
            Message::Notification(n) => Some(&n.method),
            Message::Response(_) => None,
        }
    }

    /// Get as request.
    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Message::Request(r) => Some(r),
            _ => None,
        }
    }

    /// Get as notification.
    pub fn as_notification(&self) -> Option<&Notification> {
        match self {
            Message::Notification(n) => Some(n),
            _ => None,
        }
    }

    /// Get as response.
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Message::Response(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Request> for Message {
    fn from(r: Request) -> Self {
        Message::Request(r)
    }
}

impl From<Notification> for Message {
    fn from(n: Notification) -> Self {
        Message::Notification(n)
    }
}

impl From<Response> for Message {
    fn from(r: Response) -> Self {
        Message::Response(r)
    }
}

// -----------------------------------------------------------------------------
// Wire encoding
// -----------------------------------------------------------------------------

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", &self.version)?;
        if !self.id.is_missing() {
            map.serialize_entry("id", &self.id)?;
        }
        map.serialize_entry("method", &self.method)?;
        if let Some(params) = &self.params {
            map.serialize_entry("params", params)?;
        }
        map.end()
    }
}

impl Serialize for Notification {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", &self.version)?;
        map.serialize_entry("method", &self.method)?;
        if let Some(params) = &self.params {
            map.serialize_entry("params", params)?;
        }
        map.end()
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("jsonrpc", &self.version)?;
        // A missing id is written as null here; a response must always
        // carry the id field so the peer can route or reject it.
        map.serialize_entry("id", &self.id)?;
        match &self.body {
            ResponseBody::Result(v) => map.serialize_entry("result", v)?,
            ResponseBody::Error(e) => map.serialize_entry("error", e)?,
        }
        map.end()
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Message::Request(r) => r.serialize(serializer),
            Message::Notification(n) => n.serialize(serializer),
            Message::Response(r) => r.serialize(serializer),
        }
    }
}

struct MessageVisitor;

impl<'de> Visitor<'de> for MessageVisitor {
    type Value = Message;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON-RPC message object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Message, A::Error> {
        let mut version: Option<String> = None;
        let mut id = RequestId::Missing;
        let mut method: Option<String> = None;
        let mut params: Option<Value> = None;
        let mut result: Option<Value> = None;
        let mut saw_result = false;
        let mut error: Option<RpcError> = None;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "jsonrpc" => version = Some(map.next_value()?),
                "id" => id = map.next_value()?,
                "method" => method = Some(map.next_value()?),
                "params" => params = Some(map.next_value()?),
                "result" => {
                    // `result: null` is a legal success value; track
                    // presence separately from the value itself.
                    saw_result = true;
                    result = Some(map.next_value()?);
                }
                "error" => error = Some(map.next_value()?),
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        let version = version.unwrap_or_else(|| VERSION.to_owned());

        let body = match (saw_result, error) {
            (true, Some(_)) => {
                return Err(de::Error::custom("message carries both result and error"));
            }
            (true, None) => Some(ResponseBody::Result(result.unwrap_or(Value::Null))),
            (false, Some(e)) => Some(ResponseBody::Error(e)),
            (false, None) => None,
        };

        if let Some(body) = body {
            return Ok(Message::Response(Response { version, id, body }));
        }

        match method {
            Some(method) if method.is_empty() => Err(de::Error::custom("empty method name")),
            Some(method) if id.is_missing() => Ok(Message::Notification(Notification {
                version,
                method,
                params,
            })),
            Some(method) => Ok(Message::Request(Request {
                version,
                id,
                method,
                params,
            })),
            None => Err(de::Error::custom(
                "message has none of method, result, or error",
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Message {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(MessageVisitor)
    }
}
