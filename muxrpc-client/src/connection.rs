//! Connection management.
//!
//! A [`Connection`] owns one duplex stream. Calls from any number of tasks
//! share it: each call registers a waiter under a fresh identifier, writes its
//! request, and waits. A single receive task, started when the connection is
//! created, reads every message off the stream and hands responses to their
//! waiters.

use crate::dial;
use crate::error::ClientError;
use crate::nonce::NonceAllocator;
use crate::registry::PendingCalls;
use bytes::Bytes;
use muxrpc_protocol::{Decoder, Encoder, MessageKind, RequestFrame, ResponseFrame};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

/// Default time a call waits for its response.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default read buffer size (64 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default capacity of the unsolicited message channel.
const MESSAGE_CHANNEL_CAPACITY: usize = 256;

/// How long `close` waits to shut the write half down.
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// TLS configuration for client connections.
#[derive(Debug, Clone, Default)]
pub struct TlsClientConfig {
    /// Enable TLS for the connection.
    pub enabled: bool,
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, the bundled web PKI roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE - development only).
    pub insecure: bool,
    /// Server name for SNI (defaults to the IP of the address).
    pub server_name: Option<String>,
}

impl TlsClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self.enabled = true;
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self.enabled = true;
        self
    }

    pub fn with_insecure(mut self) -> Self {
        self.insecure = true;
        self.enabled = true;
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Remote node address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// How long a call waits for its response.
    pub call_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
    /// Capacity of the unsolicited message channel.
    pub message_channel_capacity: usize,
    /// TLS configuration (optional).
    pub tls: Option<TlsClientConfig>,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            message_channel_capacity: MESSAGE_CHANNEL_CAPACITY,
            tls: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    pub fn with_message_channel_capacity(mut self, capacity: usize) -> Self {
        self.message_channel_capacity = capacity.max(1);
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = Some(tls_config);
        self
    }
}

/// A message of a kind the RPC layer does not handle.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub kind: MessageKind,
    /// The whole message, discriminator included.
    pub message: Bytes,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// State shared between callers and the receive task.
struct Shared {
    /// Write half of the stream. Held for the whole of a frame write.
    writer: Mutex<Option<BoxedWriter>>,
    /// Calls waiting for a response.
    pending: PendingCalls,
    /// Call identifier source.
    nonce: NonceAllocator,
    /// Cleared once the connection is shut down for any reason.
    connected: AtomicBool,
    /// Tells the receive task to stop.
    shutdown: watch::Sender<bool>,
    /// Messages of other kinds, for whoever listens.
    messages: broadcast::Sender<InboundMessage>,
}

impl Shared {
    /// Marks the connection dead and fails every pending call.
    fn shut_down(&self, reason: &str) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);
        let failed = self.pending.close();
        tracing::debug!(
            "connection shut down ({}), failed {} pending calls",
            reason,
            failed
        );
    }

    /// Resolves once the connection has been shut down.
    async fn stopped(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Writes one request frame in full.
    ///
    /// A write error, short writes included, leaves the stream in an unknown
    /// state, so it shuts the connection down. Waiting for the writer and the
    /// write itself both give up once the connection is shut down, so a peer
    /// that stops reading cannot hold the writer past `close`.
    async fn send(&self, request: &RequestFrame) -> Result<(), ClientError> {
        let encoded = Encoder::encode_request(request)?;

        let stopped = self.stopped();
        tokio::pin!(stopped);

        let mut writer_guard = tokio::select! {
            guard = self.writer.lock() => guard,
            _ = &mut stopped => return Err(ClientError::ConnectionClosed),
        };
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;

        let written = tokio::select! {
            written = async {
                writer.write_all(&encoded).await?;
                writer.flush().await
            } => written,
            _ = &mut stopped => {
                tracing::debug!("write of call id={} abandoned on shutdown", request.id);
                return Err(ClientError::ConnectionClosed);
            }
        };

        if let Err(e) = written {
            drop(writer_guard);
            tracing::warn!("write of call id={} failed: {}", request.id, e);
            self.shut_down("write failed");
            return Err(ClientError::Io(e));
        }

        tracing::trace!("call id={} sent ({} bytes)", request.id, encoded.len());
        Ok(())
    }

    /// Hands a response message to its waiter.
    fn deliver(&self, message: &[u8]) {
        let response = match ResponseFrame::decode(message) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("dropping malformed RPC response: {}", e);
                return;
            }
        };

        let id = response.id;
        match self.pending.take(id) {
            Some(tx) => {
                if tx.send(response).is_err() {
                    tracing::trace!("waiter for id={} already gone, response dropped", id);
                } else {
                    tracing::trace!("delivered response id={}", id);
                }
            }
            None => tracing::trace!("no pending call for id={}, response discarded", id),
        }
    }

    /// Routes every complete message in the decoder.
    fn dispatch(&self, decoder: &mut Decoder) -> Result<(), ClientError> {
        while let Some(message) = decoder.decode_message()? {
            match MessageKind::of(&message) {
                Ok(MessageKind::RemoteRpcResponse) => self.deliver(&message),
                Ok(kind) => {
                    tracing::trace!("passing on message of kind {:#04x}", kind.as_byte());
                    // No subscribers is fine: the message is simply not ours.
                    let _ = self.messages.send(InboundMessage { kind, message });
                }
                Err(e) => tracing::warn!("ignoring message: {}", e),
            }
        }
        Ok(())
    }
}

/// Reads the stream until shutdown or a fatal error.
async fn receive_loop<R>(
    shared: Arc<Shared>,
    mut reader: R,
    buffer_size: usize,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
{
    tracing::debug!("receive loop started");
    let mut buf = vec![0u8; buffer_size];
    let mut decoder = Decoder::new();

    let result = loop {
        if *shutdown.borrow_and_update() {
            break Ok(());
        }

        let n = tokio::select! {
            biased;
            _ = shutdown.changed() => continue,
            read = reader.read(&mut buf) => match read {
                Ok(0) => break Err(ClientError::ConnectionClosed),
                Ok(n) => n,
                Err(e) => break Err(ClientError::Io(e)),
            },
        };

        decoder.extend(&buf[..n]);
        if let Err(e) = shared.dispatch(&mut decoder) {
            break Err(e);
        }
    };

    match &result {
        Ok(()) => tracing::debug!("receive loop stopped"),
        Err(e) => {
            tracing::warn!("receive loop failed: {}", e);
            shared.shut_down("receive failed");
        }
    }
    result
}

/// A multiplexed RPC connection.
pub struct Connection {
    shared: Arc<Shared>,
    call_timeout: Duration,
    receive_task: parking_lot::Mutex<Option<JoinHandle<Result<(), ClientError>>>>,
}

impl Connection {
    /// Dials the configured address and starts the connection.
    pub async fn connect(config: ConnectionConfig) -> Result<Self, ClientError> {
        tracing::debug!("Connecting to {}...", config.addr);
        let tcp = dial::connect_tcp(&config).await?;

        match config.tls {
            Some(ref tls) if tls.enabled => {
                let stream = dial::upgrade_tls(tls, &config.addr, tcp).await?;
                Ok(Self::with_stream(stream, &config))
            }
            _ => Ok(Self::with_stream(tcp, &config)),
        }
    }

    /// Wraps an already established stream and starts its receive task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn with_stream<S>(stream: S, config: &ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (messages, _) = broadcast::channel(config.message_channel_capacity.max(1));

        let shared = Arc::new(Shared {
            writer: Mutex::new(Some(Box::new(write_half))),
            pending: PendingCalls::new(),
            nonce: NonceAllocator::new(),
            connected: AtomicBool::new(true),
            shutdown,
            messages,
        });

        let receive_task = tokio::spawn(receive_loop(
            shared.clone(),
            read_half,
            config.read_buffer_size,
            shutdown_rx,
        ));

        Self {
            shared,
            call_timeout: config.call_timeout,
            receive_task: parking_lot::Mutex::new(Some(receive_task)),
        }
    }

    /// Subscribes to messages of kinds other than RPC responses.
    ///
    /// Only messages received after subscribing are seen.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<InboundMessage> {
        self.shared.messages.subscribe()
    }

    /// Sends a request and waits for its response, with the configured timeout.
    pub async fn request(&self, method: &str, args: Bytes) -> Result<ResponseFrame, ClientError> {
        self.request_with_timeout(method, args, self.call_timeout)
            .await
    }

    /// Sends a request and waits for its response.
    ///
    /// The waiter is registered before the request is written. The write runs
    /// as its own task so that a timeout, or dropping this future, never cuts
    /// a frame in half; a write failure still comes back as this call's error.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        args: Bytes,
        timeout: Duration,
    ) -> Result<ResponseFrame, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::ConnectionClosed);
        }

        let id = self.shared.nonce.next();
        let mut call = self.shared.pending.register(id)?;
        tracing::debug!("call id={} method={}", id, method);

        let request = RequestFrame::new(id, method, args);
        let shared = self.shared.clone();
        let mut send = tokio::spawn(async move { shared.send(&request).await });
        let mut sent = false;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        // Dropping `call` on any exit removes the registry entry.
        loop {
            tokio::select! {
                biased;
                joined = &mut send, if !sent => {
                    sent = true;
                    match joined {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => return Err(e),
                        Err(e) => return Err(ClientError::TaskAborted(e.to_string())),
                    }
                }
                response = call.wait() => match response {
                    Ok(response) => {
                        tracing::debug!("call id={} answered (error={})", id, response.is_error);
                        return Ok(response);
                    }
                    Err(closed) => {
                        // A failed write closes the registry before its task
                        // returns; wait for it so the write error wins.
                        if !sent {
                            let joined =
                                tokio::time::timeout_at(deadline.deadline(), &mut send).await;
                            if let Ok(Ok(Err(e))) = joined {
                                return Err(e);
                            }
                        }
                        return Err(closed);
                    }
                },
                _ = &mut deadline => {
                    tracing::debug!("call id={} timed out after {:?}", id, timeout);
                    return Err(ClientError::Timeout { id, after: timeout });
                }
            }
        }
    }

    /// Returns whether the connection is still usable.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Returns the number of calls waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// The per-call timeout used by [`Connection::request`].
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Waits until the connection has shut down, whatever the cause.
    pub async fn closed(&self) {
        self.shared.stopped().await;
    }

    /// Waits for the receive task to finish and returns why it stopped.
    ///
    /// `Ok(())` means an orderly close. Once joined, later calls return `Ok(())`.
    pub async fn join(&self) -> Result<(), ClientError> {
        let handle = self.receive_task.lock().take();
        match handle {
            Some(handle) => handle
                .await
                .unwrap_or_else(|e| Err(ClientError::TaskAborted(e.to_string()))),
            None => Ok(()),
        }
    }

    /// Closes the connection.
    ///
    /// Pending calls fail with `ConnectionClosed`, the write half is shut
    /// down, and the receive task is joined. In-flight writes are abandoned;
    /// shutting the writer down is bounded so a stuck peer cannot stall it.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.shared.shut_down("closed by client");

        let shutdown_writer = async {
            if let Some(mut writer) = self.shared.writer.lock().await.take() {
                tracing::debug!("Shutting down writer");
                let _ = writer.shutdown().await;
            }
        };
        if tokio::time::timeout(WRITER_CLOSE_TIMEOUT, shutdown_writer)
            .await
            .is_err()
        {
            tracing::debug!("writer did not shut down within {:?}", WRITER_CLOSE_TIMEOUT);
        }

        match self.join().await {
            Ok(()) => {}
            Err(e) => tracing::debug!("receive task had already failed: {}", e),
        }

        tracing::debug!("Connection closed");
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.shut_down("dropped");
        if let Some(handle) = self.receive_task.get_mut().take() {
            handle.abort();
        }
    }
}
