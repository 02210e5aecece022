use crate::rpc::{RequestId, RpcError};

/// Errors that can occur when using childrpc.
///
/// Errors are organized by category:
/// - Spawn errors: the child process could not be launched
/// - IO errors: communication failures with the child
/// - Protocol errors: malformed or ambiguous JSON-RPC traffic
/// - Dispatch errors: request/response correlation failures
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    // -------------------------------------------------------------------------
    // Spawn errors
    // -------------------------------------------------------------------------
    /// The executable was not found.
    #[error("program not found: {program}")]
    ProgramNotFound { program: String },

    /// The child process could not be started.
    #[error("failed to spawn child process: {0}")]
    Spawn(#[source] std::io::Error),

    // -------------------------------------------------------------------------
    // IO errors
    // -------------------------------------------------------------------------
    /// IO error communicating with the child process.
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),

    /// Captured output bytes could not be decoded as text.
    #[error("output is not valid in the configured encoding")]
    OutputDecode(#[source] std::string::FromUtf8Error),

    // -------------------------------------------------------------------------
    // Protocol errors
    // -------------------------------------------------------------------------
    /// A message could not be parsed as a JSON-RPC request, notification
    /// or response. Fatal to that single message, not to the transport.
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// The remote peer reported an error for a call.
    #[error("{0}")]
    Rpc(RpcError),

    /// A successful result did not match the expected result type.
    #[error("result conversion failed: {message}")]
    Conversion {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    // -------------------------------------------------------------------------
    // Dispatch errors
    // -------------------------------------------------------------------------
    /// A request was registered with an id that is already pending.
    #[error("duplicate request id '{id}'")]
    DuplicateRequest { id: RequestId },

    /// A response arrived for an id with no pending request.
    #[error("no pending request for response id '{id}'")]
    UnroutableResponse { id: RequestId },

    /// The transport shut down while the call was still pending.
    #[error("transport closed: {reason}")]
    TransportClosed { reason: String },
}

/// A specialized Result type for childrpc operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an IO error.
    pub fn io(source: std::io::Error) -> Self {
        Self::Io(source)
    }

    /// Create a protocol error with the offending input as context.
    pub fn protocol(source: serde_json::Error, raw: &str) -> Self {
        Self::Protocol {
            message: format!(
                "at column {}: {}",
                source.column(),
                raw.chars().take(100).collect::<String>()
            ),
            source,
        }
    }

    /// Create a conversion error for a result of the wrong shape.
    pub fn conversion(source: serde_json::Error, expected: &str) -> Self {
        Self::Conversion {
            message: format!("expected {expected}: {source}"),
            source,
        }
    }

    /// Create a transport-closed error.
    pub fn closed(reason: impl Into<String>) -> Self {
        Self::TransportClosed {
            reason: reason.into(),
        }
    }

    /// The error code reported by the remote peer, if any.
    pub fn rpc_code(&self) -> Option<i64> {
        match self {
            Error::Rpc(e) => Some(e.code),
            _ => None,
        }
    }

    /// Check if this error means the peer went away.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::TransportClosed { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol {
            message: err.to_string(),
            source: err,
        }
    }
}
