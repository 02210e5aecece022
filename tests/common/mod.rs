//! Test utilities: in-memory JSON-RPC peers for driving an `RpcSession`
//! without a real child process.

use serde_json::{json, Value};
use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use childrpc::process::{MessageReader, MessageWriter};
use childrpc::rpc::{Message, Request, Response, RpcError};
use childrpc::{RpcSession, UnroutablePolicy};

/// Install a log subscriber honoring `RUST_LOG`, for inspecting session
/// traffic while debugging a test. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// The far end of an in-memory session: what the "child" sees.
pub struct PeerEnd {
    reader: MessageReader<ReadHalf<DuplexStream>>,
    writer: MessageWriter<WriteHalf<DuplexStream>>,
}

impl PeerEnd {
    /// Receive the next message the session sent.
    pub async fn recv(&mut self) -> Option<Message> {
        self.reader.read_message().await.expect("peer read failed")
    }

    /// Receive the next message, asserting it is a request.
    pub async fn recv_request(&mut self) -> Request {
        match self.recv().await {
            Some(Message::Request(req)) => req,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    /// Send a message back to the session.
    pub async fn send(&mut self, message: Message) {
        self.writer
            .write_message(&message)
            .await
            .expect("peer write failed");
    }

    /// Answer a request with a success value.
    pub async fn respond_ok(&mut self, request: &Request, value: Value) {
        self.send(Response::result(request.id.clone(), value).into())
            .await;
    }

    /// Answer a request with an error.
    pub async fn respond_err(&mut self, request: &Request, error: RpcError) {
        self.send(Response::error(request.id.clone(), error).into())
            .await;
    }
}

/// Connect an [`RpcSession`] to an in-memory [`PeerEnd`].
pub fn pipes() -> (RpcSession, PeerEnd) {
    pipes_with(UnroutablePolicy::default())
}

/// Like [`pipes`], with an explicit unroutable-response policy.
pub fn pipes_with(policy: UnroutablePolicy) -> (RpcSession, PeerEnd) {
    init_tracing();
    let (session_side, peer_side) = duplex(64 * 1024);
    let (session_read, session_write) = split(session_side);
    let (peer_read, peer_write) = split(peer_side);

    let session = RpcSession::over_with(session_read, session_write, policy);
    let peer = PeerEnd {
        reader: MessageReader::new(peer_read),
        writer: MessageWriter::new(peer_write),
    };
    (session, peer)
}

/// A session backed by a peer task that sums the `params` array for the
/// `sum` method and reports method-not-found for anything else.
pub fn sum_peer() -> (RpcSession, JoinHandle<()>) {
    let (session, mut peer) = pipes();
    let task = tokio::spawn(async move {
        while let Some(message) = peer.recv().await {
            let Message::Request(req) = message else {
                continue;
            };
            match req.method.as_str() {
                "sum" => {
                    let total: i64 = req
                        .params
                        .as_ref()
                        .and_then(Value::as_array)
                        .map(|xs| xs.iter().filter_map(Value::as_i64).sum())
                        .unwrap_or(0);
                    peer.respond_ok(&req, json!(total)).await;
                }
                other => {
                    let err = RpcError::new(-32601, format!("method '{other}' not found"))
                        .with_data(json!({"method": other}));
                    peer.respond_err(&req, err).await;
                }
            }
        }
    });
    (session, task)
}
