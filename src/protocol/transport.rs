//! Newline-delimited transports for JSON-RPC frames.

use crate::error::TransportError;
use crate::protocol::codec;
use crate::protocol::types::Message;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout,
};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};

/// Default upper bound for a single frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Transport trait for MCP communication.
///
/// Frames are whole messages without the delimiter. `read_frame` returns `None`
/// once the peer has closed; after that the transport is not reusable.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn read_frame(&self) -> Result<Option<String>, TransportError>;
    async fn write_frame(&self, frame: &str) -> Result<(), TransportError>;
    async fn close(&self) -> Result<(), TransportError>;

    /// Encode and send a message.
    async fn write_message(&self, message: &Message) -> Result<(), TransportError> {
        self.write_frame(&codec::encode(message)).await
    }
}

/// Line-delimited transport over any async byte stream pair.
pub struct StreamTransport<R, W> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<W>,
    max_frame_bytes: usize,
}

/// Stdio-based transport for MCP.
pub type StdioTransport = StreamTransport<Stdin, Stdout>;

/// Transport over one accepted TCP connection.
pub type TcpTransport = StreamTransport<OwnedReadHalf, OwnedWriteHalf>;

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }
}

impl StreamTransport<Stdin, Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl StreamTransport<OwnedReadHalf, OwnedWriteHalf> {
    pub fn tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(reader, writer)
    }
}

/// Skip the remainder of an oversized line. Returns the number of bytes skipped.
async fn discard_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> std::io::Result<usize> {
    let mut skipped = 0;
    loop {
        let mut scratch = Vec::new();
        let n = (&mut *reader)
            .take(64 * 1024)
            .read_until(b'\n', &mut scratch)
            .await?;
        skipped += n;
        if n == 0 || scratch.last() == Some(&b'\n') {
            return Ok(skipped);
        }
    }
}

#[async_trait::async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_frame(&self) -> Result<Option<String>, TransportError> {
        let mut reader = self.reader.lock().await;

        loop {
            let mut buf = Vec::new();
            let n = (&mut *reader)
                .take(self.max_frame_bytes as u64 + 1)
                .read_until(b'\n', &mut buf)
                .await
                .inspect_err(|e| error!("Error reading frame: {}", e))?;

            if n == 0 {
                debug!("EOF on transport");
                return Ok(None);
            }

            if buf.last() != Some(&b'\n') && buf.len() > self.max_frame_bytes {
                let skipped = discard_line(&mut reader).await?;
                let size = buf.len() + skipped;
                warn!("Dropping oversized frame: {} bytes", size);
                return Err(TransportError::FrameTooLarge {
                    size,
                    limit: self.max_frame_bytes,
                });
            }

            let line = match String::from_utf8(buf) {
                Ok(line) => line,
                Err(e) => {
                    let valid_up_to = e.utf8_error().valid_up_to();
                    warn!("Dropping frame with invalid UTF-8 at byte {}", valid_up_to);
                    return Err(TransportError::InvalidUtf8 { valid_up_to });
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            trace!("Received line: {}", line);
            return Ok(Some(line.to_string()));
        }
    }

    async fn write_frame(&self, frame: &str) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        trace!("Sending line: {}", frame);
        writer.write_all(frame.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.flush().await?;
        writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{JsonRpcResponse, RequestId};

    #[tokio::test]
    async fn test_reads_frames_and_skips_blank_lines() {
        let input: &[u8] = b"\n{\"a\":1}\n\n  \n{\"b\":2}";
        let transport = StreamTransport::new(input, tokio::io::sink());

        assert_eq!(transport.read_frame().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(transport.read_frame().await.unwrap().as_deref(), Some("{\"b\":2}"));
        assert!(transport.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_is_dropped() {
        let input: &[u8] = b"0123456789abcdef\n{}\n";
        let transport = StreamTransport::new(input, tokio::io::sink()).with_max_frame_bytes(8);

        let err = transport.read_frame().await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge { limit: 8, .. }));
        assert_eq!(transport.read_frame().await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_frame_is_dropped() {
        let input: &[u8] = b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\",\"params\":{\"k\":\"a\xffb\"}}\n{}\n";
        let transport = StreamTransport::new(input, tokio::io::sink());

        let err = transport.read_frame().await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidUtf8 { valid_up_to: 56 }));
        assert_eq!(transport.read_frame().await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_write_message_is_newline_delimited() {
        let (client, server) = tokio::io::duplex(1024);
        let transport = StreamTransport::new(tokio::io::empty(), server);

        let message = Message::Response(JsonRpcResponse::success(
            RequestId::Number(1),
            serde_json::json!({}),
        ));
        transport.write_message(&message).await.unwrap();

        let mut lines = tokio::io::BufReader::new(client).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
    }
}
