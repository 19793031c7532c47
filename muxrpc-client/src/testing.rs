//! In-memory peers for connection tests.

use crate::connection::{Connection, ConnectionConfig};
use muxrpc_protocol::{Decoder, Encoder, RequestFrame, ResponseFrame};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::oneshot;

/// The remote end of an in-memory connection.
pub struct Peer {
    stream: DuplexStream,
    decoder: Decoder,
}

impl Peer {
    /// Reads until a whole request has arrived.
    pub async fn next_request(&mut self) -> RequestFrame {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(request) = self.decoder.decode_request().unwrap() {
                return request;
            }
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "client hung up");
            self.decoder.extend(&buf[..n]);
        }
    }

    pub async fn respond(&mut self, response: &ResponseFrame) {
        let encoded = Encoder::encode_response(response).unwrap();
        self.send_raw(&encoded).await;
    }

    /// Frames and sends an arbitrary message.
    pub async fn send_message(&mut self, message: &[u8]) {
        let encoded = Encoder::encode_message(message.to_vec()).unwrap();
        self.send_raw(&encoded).await;
    }

    /// Sends bytes with no framing at all.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }
}

/// A connection wired to an in-memory peer.
pub fn pair(call_timeout: Duration) -> (Connection, Peer) {
    let (client, remote) = tokio::io::duplex(64 * 1024);
    let config = ConnectionConfig::new("127.0.0.1:8001".parse().unwrap())
        .with_call_timeout(call_timeout);
    let conn = Connection::with_stream(client, &config);
    (
        conn,
        Peer {
            stream: remote,
            decoder: Decoder::new(),
        },
    )
}

/// A stream that misbehaves on demand.
///
/// Reads stay pending until the trigger fires, then fail. Writes either
/// succeed silently or accept zero bytes.
pub struct BrokenStream {
    read_failure: Option<oneshot::Receiver<()>>,
    write_zero: bool,
}

impl BrokenStream {
    /// A stream whose reads fail once the returned trigger is fired.
    pub fn new() -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                read_failure: Some(rx),
                write_zero: false,
            },
            tx,
        )
    }

    /// A stream that never reads and never manages to write a byte.
    pub fn write_zero() -> Self {
        Self {
            read_failure: None,
            write_zero: true,
        }
    }
}

impl AsyncRead for BrokenStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.read_failure.as_mut() {
            Some(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(_) => {
                    self.read_failure = None;
                    Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::ConnectionReset,
                        "connection reset by peer",
                    )))
                }
                Poll::Pending => Poll::Pending,
            },
            None => Poll::Pending,
        }
    }
}

impl AsyncWrite for BrokenStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if self.write_zero {
            Poll::Ready(Ok(0))
        } else {
            Poll::Ready(Ok(buf.len()))
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
