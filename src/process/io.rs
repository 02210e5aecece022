//! Byte-stream plumbing between the parent and a child process.

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use crate::rpc::Message;
use crate::{Error, Result};

/// Reads newline-delimited JSON-RPC messages from a byte stream.
///
/// One line is one message. Blank lines are skipped.
pub struct MessageReader<R> {
    reader: BufReader<R>,
    buffer: String,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Create a new reader over a byte stream, typically a child's stdout.
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buffer: String::with_capacity(4096),
        }
    }

    /// Read the next message.
    ///
    /// Returns `Ok(Some(message))` for each message, `Ok(None)` at EOF,
    /// or `Err` on I/O or parse failures. A parse failure consumes only
    /// the offending line; the reader stays usable.
    pub async fn read_message(&mut self) -> Result<Option<Message>> {
        loop {
            self.buffer.clear();

            let bytes_read = self
                .reader
                .read_line(&mut self.buffer)
                .await
                .map_err(Error::io)?;

            if bytes_read == 0 {
                return Ok(None);
            }

            let line = self.buffer.trim();
            if line.is_empty() {
                continue;
            }

            return Message::parse(line).map(Some);
        }
    }
}

/// Writes newline-delimited JSON-RPC messages to a byte stream.
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    /// Create a new writer over a byte stream, typically a child's stdin.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize and send one message followed by a newline.
    pub async fn write_message(&mut self, message: &Message) -> Result<()> {
        let mut payload = serde_json::to_vec(message)?;
        payload.push(b'\n');
        self.writer.write_all(&payload).await.map_err(Error::io)?;
        self.writer.flush().await.map_err(Error::io)?;
        Ok(())
    }

    /// Close the underlying stream, signalling EOF to the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(Error::io)
    }
}

/// Copy a stream to completion into a growable byte sink.
pub(crate) async fn drain<R: AsyncRead + Unpin>(mut stream: R) -> Result<Vec<u8>> {
    let mut sink = Vec::new();
    stream.read_to_end(&mut sink).await.map_err(Error::io)?;
    Ok(sink)
}

/// Write an optional input payload to the child's stdin, then close it
/// so the child sees EOF.
pub(crate) async fn feed_input<W: AsyncWrite + Unpin>(
    mut stdin: W,
    payload: Option<Vec<u8>>,
) -> Result<()> {
    if let Some(bytes) = payload {
        stdin.write_all(&bytes).await.map_err(Error::io)?;
    }
    stdin.shutdown().await.map_err(Error::io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::rpc::{Notification, Request, Response};

    #[tokio::test]
    async fn reads_messages_and_skips_blank_lines() {
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":5}\n",
            "\n",
            "   \n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"ping\"}\n",
        );
        let mut reader = MessageReader::new(input.as_bytes());

        let first = reader.read_message().await.unwrap().unwrap();
        assert!(first.as_response().is_some());

        let second = reader.read_message().await.unwrap().unwrap();
        assert_eq!(second.method(), Some("ping"));

        assert!(reader.read_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn parse_failure_does_not_poison_the_reader() {
        let input = "not json\n{\"jsonrpc\":\"2.0\",\"id\":2,\"result\":true}\n";
        let mut reader = MessageReader::new(input.as_bytes());

        assert!(reader.read_message().await.is_err());

        let next = reader.read_message().await.unwrap().unwrap();
        assert_eq!(next.as_response().unwrap().ok(), Some(&json!(true)));
    }

    #[tokio::test]
    async fn writer_delimits_with_newlines() {
        let mut sink = Vec::new();
        {
            let mut writer = MessageWriter::new(&mut sink);
            writer
                .write_message(&Request::new(1, "a", None).into())
                .await
                .unwrap();
            writer
                .write_message(&Notification::new("b", None).into())
                .await
                .unwrap();
        }
        let text = String::from_utf8(sink).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));
    }

    #[tokio::test]
    async fn writer_reader_roundtrip() {
        let mut sink = Vec::new();
        let original: Message = Response::result("x", json!([1, 2])).into();
        MessageWriter::new(&mut sink)
            .write_message(&original)
            .await
            .unwrap();

        let mut reader = MessageReader::new(sink.as_slice());
        let back = reader.read_message().await.unwrap().unwrap();
        assert_eq!(original, back);
    }

    #[tokio::test]
    async fn feed_input_writes_payload_then_eof() {
        let (client, server) = tokio::io::duplex(64);
        let write = tokio::spawn(feed_input(client, Some(b"hello".to_vec())));

        let collected = drain(server).await.unwrap();
        assert_eq!(collected, b"hello");
        write.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn feed_input_without_payload_just_closes() {
        let (client, server) = tokio::io::duplex(64);
        let write = tokio::spawn(feed_input(client, None));

        let collected = drain(server).await.unwrap();
        assert!(collected.is_empty());
        write.await.unwrap().unwrap();
    }
}
