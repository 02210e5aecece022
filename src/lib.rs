//! # childrpc
//!
//! Drive a child process as a JSON-RPC 2.0 peer: spawn it, exchange
//! newline-delimited JSON-RPC messages over its standard streams, and
//! await results as typed values.
//!
//! ## Calling into a child
//!
//! ```ignore
//! use childrpc::{RpcSession, StartInfo, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = RpcSession::spawn(&StartInfo::new("my-peer"))?;
//!     let sum: i64 = session.call("sum", Some(vec![1, 2, 3])).await?;
//!     session.notify("log", Some("done")).await?;
//!     session.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! Responses are correlated to calls strictly by request id, so replies
//! may arrive in any order. When the child exits or the connection
//! breaks, every pending call resolves with a transport-closed error
//! instead of hanging.
//!
//! ## Running a child to completion
//!
//! For one-shot children that are not RPC peers there is a plain process
//! runner capturing exit code and output together:
//!
//! ```ignore
//! use childrpc::{process, StartInfo};
//!
//! let result = process::run(&StartInfo::new("git").arg("--version")).await?;
//! assert!(result.success());
//! println!("{}", result.stdout_text()?);
//! ```

pub mod config;
mod error;
pub mod process;
pub mod rpc;
mod session;

pub use error::{Error, Result};

// Re-export the main session types at crate root
pub use session::{NotificationStream, RpcSession, UnroutablePolicy};

// Re-export commonly used config types at crate root
pub use config::{StartInfo, TextEncoding};

// Re-export commonly used rpc types at crate root
pub use rpc::{
    DispatchMap, Message, Notification, PendingCall, Request, RequestId, Response, ResponseBody,
    RpcError,
};

// Re-export commonly used process types at crate root
pub use process::ProcessResult;
