//! JSON-RPC 2.0 message model and request/response correlation.
//!
//! One message is one JSON object on the wire:
//!
//! ```text
//! Request:      {"jsonrpc":"2.0","id":<num|str>,"method":<str>,"params":<any>}
//! Notification: {"jsonrpc":"2.0","method":<str>,"params":<any>}
//! Response-ok:  {"jsonrpc":"2.0","id":<num|str>,"result":<any>}
//! Response-err: {"jsonrpc":"2.0","id":<num|str|null>,"error":{"code":..,"message":..,"data":..?}}
//! ```
//!
//! [`Message`] discriminates the three variants in a single parsing pass;
//! [`DispatchMap`] matches responses back to the calls that issued them.

mod dispatch;
mod id;
mod message;

pub use dispatch::{DispatchMap, PendingCall};
pub use id::RequestId;
pub use message::{
    Message, Notification, Request, Response, ResponseBody, RpcError, VERSION,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RequestId>();
        assert_send_sync::<Message>();
        assert_send_sync::<DispatchMap>();
        assert_send_sync::<PendingCall<serde_json::Value>>();
    }
}
