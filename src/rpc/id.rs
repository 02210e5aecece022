//! The dual-typed JSON-RPC request identifier.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A JSON-RPC request id: absent, a 64-bit integer, or a string.
///
/// A missing id marks a notification and is distinct from both the
/// number zero and the empty string. Numeric and string ids never
/// compare equal, even when they look alike (`1` vs `"1"`).
///
/// On the wire a missing id is `null`; requests simply omit the field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum RequestId {
    /// No id; the message is a notification.
    #[default]
    Missing,
    /// A numeric id.
    Number(i64),
    /// A string id.
    Text(String),
}

impl RequestId {
    /// Check whether the id is absent.
    pub fn is_missing(&self) -> bool {
        matches!(self, RequestId::Missing)
    }

    /// Check whether the id is numeric.
    pub fn is_number(&self) -> bool {
        matches!(self, RequestId::Number(_))
    }

    /// The numeric value, if this is a numeric id.
    pub fn as_number(&self) -> Option<i64> {
        match self {
            RequestId::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string value, if this is a string id.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RequestId::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::Text(s.to_owned())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::Text(s)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Missing => f.write_str("null"),
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RequestId::Missing => serializer.serialize_none(),
            RequestId::Number(n) => serializer.serialize_i64(*n),
            RequestId::Text(s) => serializer.serialize_str(s),
        }
    }
}

struct RequestIdVisitor;

impl<'de> Visitor<'de> for RequestIdVisitor {
    type Value = RequestId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number, a string, or null")
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<RequestId, E> {
        Ok(RequestId::Number(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<RequestId, E> {
        i64::try_from(n)
            .map(RequestId::Number)
            .map_err(|_| E::custom(format!("request id {n} out of range")))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<RequestId, E> {
        Ok(RequestId::Text(s.to_owned()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<RequestId, E> {
        Ok(RequestId::Text(s))
    }

    fn visit_unit<E: de::Error>(self) -> Result<RequestId, E> {
        Ok(RequestId::Missing)
    }

    fn visit_none<E: de::Error>(self) -> Result<RequestId, E> {
        Ok(RequestId::Missing)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RequestIdVisitor)
    }
}
