//! Correlation of outbound requests to inbound responses.
//!
//! The map is mutated from two directions: the side issuing calls inserts,
//! the side reading the transport removes and resolves. A plain mutex
//! serializes the table; each entry is resolved at most once because the
//! entry is removed before its completion slot is fired.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use super::id::RequestId;
use super::message::{Response, ResponseBody};
use crate::{Error, Result};

type Slot = oneshot::Sender<Result<Value>>;

#[derive(Debug, Default)]
struct Table {
    slots: HashMap<RequestId, Slot>,
    /// Set by `fail_all`; once closed, registration fails instead of
    /// parking a call nothing will ever resolve.
    closed: Option<String>,
}

/// In-flight request table keyed by [`RequestId`].
#[derive(Debug, Default)]
pub struct DispatchMap {
    pending: Mutex<Table>,
}

/// A handle to one registered call. Awaiting it yields the typed result
/// once the matching response arrives, or the failure the transport
/// resolved it with.
#[derive(Debug)]
pub struct PendingCall<T> {
    rx: oneshot::Receiver<Result<Value>>,
    marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> PendingCall<T> {
    /// Wait for the call to resolve.
    ///
    /// A success value whose JSON shape does not convert to `T` yields
    /// [`Error::Conversion`]; a remote error yields [`Error::Rpc`].
    pub async fn wait(self) -> Result<T> {
        let outcome = self
            .rx
            .await
            .map_err(|_| Error::closed("call abandoned before a response arrived"))?;
        let value = outcome?;
        serde_json::from_value(value).map_err(|e| Error::conversion(e, std::any::type_name::<T>()))
    }
}

impl DispatchMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Table> {
        self.pending.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Register an outbound call before it is sent.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::DuplicateRequest`] if `id` is already pending.
    /// A duplicate id is a caller bug; the earlier registration is left
    /// untouched. Fails with [`Error::TransportClosed`] once
    /// [`fail_all`](Self::fail_all) has run.
    pub fn register<T: DeserializeOwned>(&self, id: RequestId) -> Result<PendingCall<T>> {
        let (tx, rx) = oneshot::channel();
        let mut table = self.lock();
        if let Some(reason) = &table.closed {
            return Err(Error::closed(reason.clone()));
        }
        if table.slots.contains_key(&id) {
            return Err(Error::DuplicateRequest { id });
        }
        table.slots.insert(id, tx);
        Ok(PendingCall {
            rx,
            marker: PhantomData,
        })
    }

    /// Route an inbound response to its pending call.
    ///
    /// The entry is removed before the slot is resolved, so a given id
    /// observes at most one resolution.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnroutableResponse`] when no call with the
    /// response's id is pending. Other pending calls are unaffected.
    pub fn resolve(&self, response: Response) -> Result<()> {
        let slot = self.lock().slots.remove(&response.id);
        let Some(slot) = slot else {
            return Err(Error::UnroutableResponse { id: response.id });
        };

        let outcome = match response.body {
            ResponseBody::Result(value) => Ok(value),
            ResponseBody::Error(error) => Err(Error::Rpc(error)),
        };

        if slot.send(outcome).is_err() {
            // The caller stopped waiting; nothing left to deliver to.
            debug!(id = %response.id, "response arrived for an abandoned call");
        }
        Ok(())
    }

    /// Remove a pending call without resolving it.
    ///
    /// Used when sending the request failed after registration, or by a
    /// caller that timed out and no longer wants the response.
    pub fn cancel(&self, id: &RequestId) {
        self.lock().slots.remove(id);
    }

    /// Fail every still-pending call, leave the table empty, and refuse
    /// further registrations.
    ///
    /// Called on transport shutdown so a dead child never leaves callers
    /// blocked forever, and never accepts calls it cannot deliver.
    pub fn fail_all(&self, reason: &str) {
        let drained: Vec<Slot> = {
            let mut table = self.lock();
            table.closed = Some(reason.to_owned());
            table.slots.drain().map(|(_, slot)| slot).collect()
        };
        for slot in drained {
            let _ = slot.send(Err(Error::closed(reason)));
        }
    }

    /// Number of calls still waiting for a response.
    pub fn pending_calls(&self) -> usize {
        self.lock().slots.len()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn request_response() {
        let map = DispatchMap::new();
        let call = map.register::<String>(RequestId::Number(1)).unwrap();
        map.resolve(Response::result(1, json!("Hello World!"))).unwrap();

        assert_eq!(call.wait().await.unwrap(), "Hello World!");
        assert_eq!(map.pending_calls(), 0);
    }

    #[tokio::test]
    async fn error_response() {
        let map = DispatchMap::new();
        let call = map.register::<String>(RequestId::Text("error".into())).unwrap();
        map.resolve(Response::error(
            "error",
            crate::rpc::RpcError::new(-32000, "Something something."),
        ))
        .unwrap();

        let err = call.wait().await.unwrap_err();
        assert_eq!(err.rpc_code(), Some(-32000));
    }

    #[tokio::test]
    async fn invalid_response_type() {
        let map = DispatchMap::new();
        let call = map.register::<i64>(RequestId::Number(2)).unwrap();
        map.resolve(Response::result(2, json!("Wrong."))).unwrap();

        let err = call.wait().await.unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
    }

    #[test]
    fn disallow_duplicate_requests() {
        let map = DispatchMap::new();
        let _first = map.register::<String>(RequestId::Number(3)).unwrap();
        let err = map.register::<String>(RequestId::Number(3)).unwrap_err();
        assert!(matches!(err, Error::DuplicateRequest { .. }));
        assert_eq!(map.pending_calls(), 1);
    }

    #[tokio::test]
    async fn unroutable_response_leaves_others_pending() {
        let map = DispatchMap::new();
        let call = map.register::<i64>(RequestId::Number(1)).unwrap();

        let err = map
            .resolve(Response::result(99, json!(0)))
            .unwrap_err();
        assert!(matches!(err, Error::UnroutableResponse { .. }));
        assert_eq!(map.pending_calls(), 1);

        map.resolve(Response::result(1, json!(10))).unwrap();
        assert_eq!(call.wait().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn fail_all_resolves_everything_and_clears() {
        let map = DispatchMap::new();
        let a = map.register::<i64>(RequestId::Number(1)).unwrap();
        let b = map.register::<i64>(RequestId::Text("b".into())).unwrap();

        map.fail_all("child exited");
        assert_eq!(map.pending_calls(), 0);

        for call in [a, b] {
            let err = call.wait().await.unwrap_err();
            assert!(err.is_closed());
        }
    }

    #[test]
    fn register_after_fail_all_is_refused() {
        let map = DispatchMap::new();
        map.fail_all("gone");
        let err = map.register::<i64>(RequestId::Number(1)).unwrap_err();
        assert!(err.is_closed());
    }

    #[tokio::test]
    async fn cancel_removes_without_resolving() {
        let map = DispatchMap::new();
        let call = map.register::<i64>(RequestId::Number(5)).unwrap();
        map.cancel(&RequestId::Number(5));
        assert_eq!(map.pending_calls(), 0);

        // The slot is gone, so waiting reports the call as abandoned.
        let err = call.wait().await.unwrap_err();
        assert!(err.is_closed());

        // The id is free for reuse after cancellation.
        let _again = map.register::<i64>(RequestId::Number(5)).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn out_of_order_resolution_correlates_by_id() {
        use std::sync::Arc;

        let map = Arc::new(DispatchMap::new());
        let n = 32i64;

        let calls: Vec<_> = (0..n)
            .map(|i| map.register::<i64>(RequestId::Number(i)).unwrap())
            .collect();

        let resolver = {
            let map = Arc::clone(&map);
            tokio::spawn(async move {
                // Visit ids in a scrambled order; 7 is coprime with 32 so
                // every id is hit exactly once.
                for i in 0..n {
                    let id = (i * 7 + 3) % n;
                    map.resolve(Response::result(id, json!(id * 100))).unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        for (i, call) in calls.into_iter().enumerate() {
            assert_eq!(call.wait().await.unwrap(), i as i64 * 100);
        }
        resolver.await.unwrap();
        assert_eq!(map.pending_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_register_and_resolve() {
        use std::sync::Arc;

        let map = Arc::new(DispatchMap::new());
        let mut waiters = Vec::new();

        for i in 0..64i64 {
            let call = map.register::<i64>(RequestId::Number(i)).unwrap();
            let map = Arc::clone(&map);
            // Resolve from a separate task while other registrations race on.
            tokio::spawn(async move {
                map.resolve(Response::result(i, json!(i))).unwrap();
            });
            waiters.push((i, call));
        }

        for (i, call) in waiters {
            assert_eq!(call.wait().await.unwrap(), i);
        }
        assert_eq!(map.pending_calls(), 0);
    }
}
