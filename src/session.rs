//! The RPC session: a child process driven as a JSON-RPC peer.
//!
//! [`RpcSession`] glues the pieces together: the child's stdin carries
//! outbound requests, a background task reads its stdout and routes
//! responses through the [`DispatchMap`], and `call` awaits the correlated
//! reply. Responses are matched strictly by id, so out-of-order replies
//! resolve the right callers.

use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::StartInfo;
use crate::process::{launch, MessageReader, MessageWriter};
use crate::rpc::{DispatchMap, Message, Notification, Request, RequestId};
use crate::{Error, Result};

/// Log target for traffic the child writes to its stderr.
const STDERR_TARGET: &str = "childrpc::child_stderr";

/// Inbound notifications buffered for [`RpcSession::notifications`] before
/// the reader applies backpressure by dropping.
const NOTIFICATION_BUFFER: usize = 256;

/// What to do with a response whose id matches no pending call.
///
/// The default is to treat it as a protocol-level fault and close the
/// transport; a peer that fabricates ids is not one we can trust to route
/// anything else correctly. [`UnroutablePolicy::Ignore`] drops such
/// responses instead and keeps the session alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnroutablePolicy {
    /// Close the transport and fail all pending calls.
    #[default]
    Fail,
    /// Log and drop the stray response.
    Ignore,
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An open JSON-RPC session with a child process (or any byte stream pair).
///
/// # Lifecycle
///
/// Dropping the session kills the child and fails every pending call.
/// [`shutdown`](Self::shutdown) closes the child's stdin first so a
/// well-behaved peer can exit on EOF.
///
/// # Timeouts
///
/// The session imposes none. Callers race `call` against a timer and,
/// on timeout, either drop the session or use [`abort`](Self::abort) so
/// pending calls do not linger:
///
/// ```ignore
/// let reply = tokio::time::timeout(limit, session.call::<_, i64>("slow", None::<()>)).await;
/// if reply.is_err() {
///     session.abort("timed out");
/// }
/// ```
pub struct RpcSession {
    dispatch: Arc<DispatchMap>,
    // None once shutdown has begun. The writer must be dropped, not just
    // shut down, to close a pipe fd and deliver EOF to the child.
    writer: tokio::sync::Mutex<Option<MessageWriter<BoxedWriter>>>,
    next_id: AtomicI64,
    reader_task: JoinHandle<()>,
    stderr_task: Option<JoinHandle<()>>,
    notifications: Mutex<Option<mpsc::Receiver<Notification>>>,
    child: Option<Child>,
}

impl RpcSession {
    /// Spawn `info` and open a session over its standard streams.
    ///
    /// The child's stderr is drained into tracing logs under the
    /// `childrpc::child_stderr` target.
    pub fn spawn(info: &StartInfo) -> Result<Self> {
        Self::spawn_with(info, UnroutablePolicy::default())
    }

    /// Spawn with an explicit policy for unroutable responses.
    pub fn spawn_with(info: &StartInfo, policy: UnroutablePolicy) -> Result<Self> {
        let mut child = launch(info)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("stdin was not captured")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("stdout was not captured")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("stderr was not captured")))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: STDERR_TARGET, "{line}");
            }
        });

        let mut session = Self::build(Box::new(stdout), Box::new(stdin), policy);
        session.stderr_task = Some(stderr_task);
        session.child = Some(child);
        Ok(session)
    }

    /// Open a session over an arbitrary async byte stream pair.
    ///
    /// Useful for in-memory peers in tests, or transports that are not
    /// child processes at all.
    pub fn over(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self::build(Box::new(reader), Box::new(writer), UnroutablePolicy::default())
    }

    /// Like [`over`](Self::over), with an explicit unroutable policy.
    pub fn over_with(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        policy: UnroutablePolicy,
    ) -> Self {
        Self::build(Box::new(reader), Box::new(writer), policy)
    }

    fn build(reader: BoxedReader, writer: BoxedWriter, policy: UnroutablePolicy) -> Self {
        let dispatch = Arc::new(DispatchMap::new());
        let (notif_tx, notif_rx) = mpsc::channel(NOTIFICATION_BUFFER);

        let reader_task = tokio::spawn(read_loop(
            MessageReader::new(reader),
            Arc::clone(&dispatch),
            notif_tx,
            policy,
        ));

        Self {
            dispatch,
            writer: tokio::sync::Mutex::new(Some(MessageWriter::new(writer))),
            next_id: AtomicI64::new(1),
            reader_task,
            stderr_task: None,
            notifications: Mutex::new(Some(notif_rx)),
            child: None,
        }
    }

    /// Send a request and await its correlated response, converted to `T`.
    ///
    /// Ids are numeric and allocated per session starting at 1. A remote
    /// error surfaces as [`Error::Rpc`]; a result of the wrong shape as
    /// [`Error::Conversion`]; a dead transport as [`Error::TransportClosed`].
    pub async fn call<P, T>(&self, method: &str, params: Option<P>) -> Result<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let params = match params {
            Some(p) => Some(serde_json::to_value(p)?),
            None => None,
        };

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        // Register before sending so the response cannot win the race.
        let pending = self.dispatch.register::<T>(id.clone())?;

        debug!(method, id = %id, "sending request");
        if let Err(e) = self.send(Request::new(id.clone(), method, params).into()).await {
            self.dispatch.cancel(&id);
            return Err(e);
        }

        pending.wait().await
    }

    /// Send a notification. Fire-and-forget: no response will ever arrive.
    pub async fn notify<P: Serialize>(&self, method: &str, params: Option<P>) -> Result<()> {
        let params = match params {
            Some(p) => Some(serde_json::to_value(p)?),
            None => None,
        };
        debug!(method, "sending notification");
        self.send(Notification::new(method, params).into()).await
    }

    /// Notifications the peer sent us, as an async stream.
    ///
    /// Can be taken once; returns `None` afterwards. Inbound *requests*
    /// from the peer are not supported and are logged and dropped.
    pub fn notifications(&self) -> Option<NotificationStream> {
        let rx = self
            .notifications
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take()?;
        Some(NotificationStream { rx })
    }

    /// Number of calls still awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.dispatch.pending_calls()
    }

    /// Tear the session down, failing every pending call with `reason`.
    ///
    /// The child itself is killed when the session is dropped.
    pub fn abort(&self, reason: &str) {
        self.reader_task.abort();
        self.dispatch.fail_all(reason);
    }

    /// Graceful shutdown: close the child's stdin so it sees EOF, wait
    /// for it to exit, and fail anything still pending.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.shutdown().await?;
            // Dropping the writer is what actually closes the pipe;
            // shutdown on a pipe fd is a no-op.
            drop(writer);
        }
        if let Some(mut child) = self.child.take() {
            child.wait().await.map_err(Error::io)?;
        }
        self.reader_task.abort();
        self.dispatch.fail_all("session shut down");
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<()> {
        match self.writer.lock().await.as_mut() {
            Some(writer) => writer.write_message(&message).await,
            None => Err(Error::closed("session is shutting down")),
        }
    }
}

impl Drop for RpcSession {
    fn drop(&mut self) {
        self.reader_task.abort();
        if let Some(task) = &self.stderr_task {
            task.abort();
        }
        if let Some(child) = &mut self.child {
            let _ = child.start_kill();
        }
        self.dispatch.fail_all("session dropped");
    }
}

impl std::fmt::Debug for RpcSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcSession")
            .field("pending_calls", &self.dispatch.pending_calls())
            .field("child", &self.child.as_ref().and_then(Child::id))
            .finish()
    }
}

/// Stream of notifications received from the peer.
///
/// Created by [`RpcSession::notifications`].
pub struct NotificationStream {
    rx: mpsc::Receiver<Notification>,
}

impl futures::Stream for NotificationStream {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Reads the peer's output until EOF or a fatal fault, routing responses
/// and forwarding notifications. Always fails outstanding calls on exit.
async fn read_loop(
    mut reader: MessageReader<BoxedReader>,
    dispatch: Arc<DispatchMap>,
    notifications: mpsc::Sender<Notification>,
    policy: UnroutablePolicy,
) {
    let reason = loop {
        match reader.read_message().await {
            Ok(Some(Message::Response(response))) => {
                if let Err(e) = dispatch.resolve(response) {
                    match policy {
                        UnroutablePolicy::Fail => {
                            warn!(error = %e, "unroutable response, closing transport");
                            break format!("unroutable response: {e}");
                        }
                        UnroutablePolicy::Ignore => {
                            debug!(error = %e, "dropping unroutable response");
                        }
                    }
                }
            }
            Ok(Some(Message::Notification(notification))) => {
                if notifications.try_send(notification).is_err() {
                    debug!("inbound notification dropped: no listener or buffer full");
                }
            }
            Ok(Some(Message::Request(request))) => {
                warn!(
                    method = %request.method,
                    id = %request.id,
                    "ignoring inbound request; serving calls from the peer is unsupported"
                );
            }
            Ok(None) => {
                debug!("peer closed its output stream");
                break "peer closed its output stream".to_owned();
            }
            Err(e @ Error::Protocol { .. }) => {
                // Fatal to that one message only.
                warn!(error = %e, "skipping malformed message");
            }
            Err(e) => {
                warn!(error = %e, "transport read failed");
                break format!("transport read failed: {e}");
            }
        }
    };
    dispatch.fail_all(&reason);
}
