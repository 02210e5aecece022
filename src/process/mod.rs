//! Child process lifecycle management.
//!
//! # Architecture
//!
//! ```text
//! parent                              child
//! ┌─────────────┐                    ┌─────────────┐
//! │ run /       │───stdin (input)───▶│             │
//! │ RpcSession  │◀──stdout (bytes)───│             │
//! │             │◀──stderr (bytes)───│             │
//! └─────────────┘                    └─────────────┘
//! ```
//!
//! [`run`] and [`run_with_input`] drive a child to completion and hand back
//! exit code plus captured output as one [`ProcessResult`]. The message
//! reader/writer pair turns the same byte streams into newline-delimited
//! JSON-RPC traffic for [`RpcSession`](crate::RpcSession).

mod io;
mod spawn;

pub use io::{MessageReader, MessageWriter};
pub use spawn::{run, run_with_input, ProcessResult};

pub(crate) use spawn::launch;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProcessResult>();
        assert_send_sync::<MessageReader<tokio::process::ChildStdout>>();
        assert_send_sync::<MessageWriter<tokio::process::ChildStdin>>();
    }
}
