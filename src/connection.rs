use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio_util::codec::{Decoder, FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::codec::StompCodec;
use crate::error::ConnError;
use crate::frame::{Command, Frame, Headers};
use crate::options::ConnectOptions;

/// Alias for the reconnect replay registry: subscription id -> the headers
/// of the SUBSCRIBE frame that created it.
pub(crate) type SubscriptionRegistry = HashMap<String, Headers>;

/// One dialled and handshaken socket.
///
/// The read and write halves sit behind their own locks so a transmit never
/// waits for a blocked receive. Once any operation fails on a session it is
/// marked failed and the next caller replaces it.
struct Session {
    id: u64,
    reader: Mutex<FramedRead<OwnedReadHalf, StompCodec>>,
    writer: Mutex<FramedWrite<OwnedWriteHalf, StompCodec>>,
    failed: AtomicBool,
}

impl Session {
    fn is_live(&self) -> bool {
        !self.failed.load(Ordering::SeqCst)
    }

    fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }
}

/// Move whatever the socket already holds into the read buffer without
/// waiting. Returns `true` once the broker has closed its side.
fn fill_ready(reader: &mut FramedRead<OwnedReadHalf, StompCodec>) -> io::Result<bool> {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.get_mut().try_read(&mut chunk) {
            Ok(0) => return Ok(true),
            Ok(n) => reader.read_buffer_mut().extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) => return Err(e),
        }
    }
}

/// Connection to a single broker over one TCP socket.
///
/// The socket is dialled when the connection is opened and re-dialled
/// whenever an operation finds it failed. In reliable mode every I/O
/// failure is logged and retried (reconnecting as needed, pausing between
/// dial attempts); otherwise the failure is returned to the caller.
///
/// Transmit and receive use independent locks so one task may block in
/// `receive` while others `transmit`. Concurrent transmits are serialized.
pub struct Connection {
    options: ConnectOptions,
    /// Current socket. Held while dialling so only one task reconnects.
    session: Mutex<Option<Arc<Session>>>,
    /// Subscriptions replayed on every new socket (reliable mode only).
    subscriptions: Mutex<SubscriptionRegistry>,
    last_failure: Mutex<Option<String>>,
    /// Set once `disconnect` starts; end of stream is then expected.
    closing: AtomicBool,
    closed: AtomicBool,
    session_counter: AtomicU64,
}

impl Connection {
    /// Validate `options` and connect to the broker.
    ///
    /// The socket is established before this returns. With
    /// `options.reliable` set this keeps retrying until the broker accepts
    /// the CONNECT handshake; otherwise the first failure is returned.
    pub async fn open(options: ConnectOptions) -> Result<Self, ConnError> {
        options.validate()?;
        let conn = Self::unconnected(options);
        conn.ensure_session().await?;
        Ok(conn)
    }

    fn unconnected(options: ConnectOptions) -> Self {
        Self {
            options,
            session: Mutex::new(None),
            subscriptions: Mutex::new(HashMap::new()),
            last_failure: Mutex::new(None),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            session_counter: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> &ConnectOptions {
        &self.options
    }

    pub fn is_reliable(&self) -> bool {
        self.options.reliable
    }

    /// Is this connection open?
    pub fn is_open(&self) -> bool {
        !self.is_closed()
    }

    /// Is this connection closed?
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Description of the most recent I/O or handshake failure, if any.
    pub async fn last_failure(&self) -> Option<String> {
        self.last_failure.lock().await.clone()
    }

    /// Return the live session, dialling a new one if there is none or the
    /// current one failed.
    async fn ensure_session(&self) -> Result<Arc<Session>, ConnError> {
        let mut slot = self.session.lock().await;
        let mut attempt: u32 = 0;
        loop {
            if self.is_closed() {
                return Err(ConnError::Closed);
            }
            if let Some(session) = slot.as_ref().filter(|s| s.is_live()) {
                return Ok(session.clone());
            }
            *slot = None;

            match self.establish().await {
                Ok(session) => {
                    let session = Arc::new(session);
                    *slot = Some(session.clone());
                    return Ok(session);
                }
                Err(e) => {
                    self.record_failure(&e).await;
                    if !self.options.reliable || !e.is_retryable() {
                        return Err(e);
                    }
                    let delay = self.options.retry_delay(attempt);
                    warn!(
                        addr = %self.options.addr(),
                        error = %e,
                        ?delay,
                        "connect failed, will retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// Dial, send CONNECT, wait for CONNECTED and replay subscriptions.
    async fn establish(&self) -> Result<Session, ConnError> {
        let stream = TcpStream::connect((self.options.host.as_str(), self.options.port)).await?;
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, StompCodec::new());
        let mut writer = FramedWrite::new(write_half, StompCodec::new());

        let connect = Frame::new(Command::Connect)
            .header("login", self.options.login.as_str())
            .header("passcode", self.options.passcode.as_str())
            .with_headers(self.options.connect_headers.clone());
        writer.send(connect).await?;

        let reply = reader.next().await.transpose()?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before CONNECTED",
            )
        })?;
        match reply.kind() {
            Some(Command::Connected) => {}
            Some(Command::Error) => {
                return Err(ConnError::Protocol(format!(
                    "broker rejected CONNECT: {}",
                    reply.get_header("message").unwrap_or("no message")
                )));
            }
            _ => {
                return Err(ConnError::Protocol(format!(
                    "expected CONNECTED, got {}",
                    reply.command
                )));
            }
        }

        // Resume subscriptions on the new socket. Snapshot the registry so
        // the lock is not held across writes.
        let replay: Vec<(String, Headers)> = {
            let subs = self.subscriptions.lock().await;
            subs.iter().map(|(id, h)| (id.clone(), h.clone())).collect()
        };
        for (id, headers) in replay {
            debug!(subscription = %id, "replaying subscription");
            writer
                .send(Frame::new(Command::Subscribe).with_headers(headers))
                .await?;
        }

        let id = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            addr = %self.options.addr(),
            session = id,
            server = reply.get_header("server").unwrap_or("unknown"),
            "session established"
        );

        Ok(Session {
            id,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            failed: AtomicBool::new(false),
        })
    }

    async fn record_failure(&self, err: &ConnError) {
        *self.last_failure.lock().await = Some(err.to_string());
    }

    /// Sleep before retry number `attempt` of a failed operation.
    async fn pause_before_retry(&self, attempt: &mut u32) {
        tokio::time::sleep(self.options.retry_delay(*attempt)).await;
        *attempt = attempt.saturating_add(1);
    }

    /// Mark `session` failed after `err`. Returns `Ok` when the caller should
    /// retry (reliable mode), or the error to surface.
    async fn fail_session(
        &self,
        session: &Session,
        err: ConnError,
        op: &str,
    ) -> Result<(), ConnError> {
        session.mark_failed();
        self.record_failure(&err).await;
        if !self.options.reliable || !err.is_retryable() {
            return Err(err);
        }
        warn!(session = session.id, error = %err, "{} failed, reconnecting", op);
        Ok(())
    }

    /// Write one frame to the broker.
    ///
    /// In reliable mode I/O failures re-establish the socket and retry the
    /// write until it succeeds.
    pub async fn transmit(&self, frame: Frame) -> Result<(), ConnError> {
        let mut attempt: u32 = 0;
        loop {
            let session = self.ensure_session().await?;
            let result = {
                let mut writer = session.writer.lock().await;
                writer.send(frame.clone()).await
            };
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    self.fail_session(&session, e, "transmit").await?;
                    self.pause_before_retry(&mut attempt).await;
                }
            }
        }
    }

    /// Read the next frame from the broker, waiting until one arrives.
    ///
    /// Returns `Ok(None)` at end of stream. In reliable mode a clean end of
    /// stream on an open connection is first treated as a dropped socket:
    /// the socket is discarded and the read retried once on a new one.
    pub async fn receive(&self) -> Result<Option<Frame>, ConnError> {
        let mut eof_retried = false;
        let mut attempt: u32 = 0;
        loop {
            let session = self.ensure_session().await?;
            let result = {
                let mut reader = session.reader.lock().await;
                reader.next().await.transpose()
            };
            match result {
                Ok(Some(frame)) => return Ok(Some(frame)),
                Ok(None)
                    if self.options.reliable
                        && !self.closing.load(Ordering::SeqCst)
                        && !eof_retried =>
                {
                    warn!(session = session.id, "end of stream from broker, resetting connection");
                    session.mark_failed();
                    eof_retried = true;
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    self.fail_session(&session, e, "receive").await?;
                    self.pause_before_retry(&mut attempt).await;
                }
            }
        }
    }

    /// Return a complete frame if one has already arrived, never waiting on
    /// the network.
    ///
    /// Returns `Ok(None)` when there is no live socket, another task is
    /// receiving, or no complete frame is buffered yet. A partially
    /// received frame stays buffered for the next call. A broker that hung
    /// up is reported as `Io(UnexpectedEof)` unless the connection is
    /// reliable, in which case the socket is marked failed and the next
    /// operation reconnects.
    pub async fn poll(&self) -> Result<Option<Frame>, ConnError> {
        let session = match self.session.try_lock() {
            Ok(slot) => match slot.as_ref() {
                Some(s) if s.is_live() => s.clone(),
                _ => return Ok(None),
            },
            // a reconnect is in progress
            Err(_) => return Ok(None),
        };

        let result = {
            let Ok(mut reader) = session.reader.try_lock() else {
                // another receive is in progress
                return Ok(None);
            };
            match fill_ready(&mut reader) {
                Ok(false) => StompCodec::new().decode(reader.read_buffer_mut()),
                Ok(true) => match StompCodec::new().decode_eof(reader.read_buffer_mut()) {
                    Ok(None) if self.closing.load(Ordering::SeqCst) => return Ok(None),
                    Ok(None) => Err(ConnError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "broker closed the connection",
                    ))),
                    decoded => decoded,
                },
                Err(e) => Err(e.into()),
            }
        };

        match result {
            Ok(frame) => Ok(frame),
            Err(e) => {
                self.fail_session(&session, e, "poll").await?;
                Ok(None)
            }
        }
    }

    /// Helper to send a transaction frame (BEGIN, COMMIT, or ABORT).
    async fn send_transaction_frame(
        &self,
        command: Command,
        name: &str,
        headers: Headers,
    ) -> Result<(), ConnError> {
        let mut f = Frame::new(command).with_headers(headers);
        f.set_header("transaction", name);
        self.transmit(f).await
    }

    /// Begin a transaction, requires a name for the transaction.
    pub async fn begin(&self, name: &str, headers: Headers) -> Result<(), ConnError> {
        self.send_transaction_frame(Command::Begin, name, headers)
            .await
    }

    /// Commit a transaction by name.
    pub async fn commit(&self, name: &str, headers: Headers) -> Result<(), ConnError> {
        self.send_transaction_frame(Command::Commit, name, headers)
            .await
    }

    /// Abort a transaction by name.
    pub async fn abort(&self, name: &str, headers: Headers) -> Result<(), ConnError> {
        self.send_transaction_frame(Command::Abort, name, headers)
            .await
    }

    /// Subscribe to a destination.
    ///
    /// Parameters
    /// - `destination`: the destination to subscribe to (e.g. "/queue/foo").
    /// - `headers`: extra SUBSCRIBE headers (ack mode, selector, id, ...).
    /// - `subscription_id`: key under which a reliable connection remembers
    ///   the subscription for replay after reconnect. Defaults to the
    ///   destination.
    pub async fn subscribe(
        &self,
        destination: &str,
        headers: Headers,
        subscription_id: Option<&str>,
    ) -> Result<(), ConnError> {
        let mut f = Frame::new(Command::Subscribe).with_headers(headers);
        f.set_header("destination", destination);
        let replay_headers = f.headers.clone();
        self.transmit(f).await?;

        if self.options.reliable {
            let id = subscription_id.unwrap_or(destination).to_string();
            self.subscriptions.lock().await.insert(id, replay_headers);
        }
        Ok(())
    }

    /// Unsubscribe from a destination. In reliable mode the matching
    /// replay entry (keyed by `subscription_id`, else the destination) is
    /// forgotten.
    pub async fn unsubscribe(
        &self,
        destination: &str,
        headers: Headers,
        subscription_id: Option<&str>,
    ) -> Result<(), ConnError> {
        let mut f = Frame::new(Command::Unsubscribe).with_headers(headers);
        f.set_header("destination", destination);
        self.transmit(f).await?;

        if self.options.reliable {
            let id = subscription_id.unwrap_or(destination);
            self.subscriptions.lock().await.remove(id);
        }
        Ok(())
    }

    /// Acknowledge a message by its `message-id`. Accepts a `transaction`
    /// header to make the ACK part of a transaction.
    pub async fn ack(&self, message_id: &str, headers: Headers) -> Result<(), ConnError> {
        let mut f = Frame::new(Command::Ack).with_headers(headers);
        f.set_header("message-id", message_id);
        self.transmit(f).await
    }

    /// Send a message to a destination. Accepts a `transaction` header.
    pub async fn send(
        &self,
        destination: &str,
        body: impl Into<Vec<u8>>,
        headers: Headers,
    ) -> Result<(), ConnError> {
        let mut f = Frame::new(Command::Send)
            .with_headers(headers)
            .set_body(body);
        f.set_header("destination", destination);
        self.transmit(f).await
    }

    /// Send DISCONNECT and close this connection for good.
    ///
    /// The connection counts as closed even if the DISCONNECT could not be
    /// written. The write half of the socket is shut down afterwards so the
    /// broker ends the stream and any pending `receive` returns.
    pub async fn disconnect(&self, headers: Headers) -> Result<(), ConnError> {
        self.closing.store(true, Ordering::SeqCst);
        let result = self
            .transmit(Frame::new(Command::Disconnect).with_headers(headers))
            .await;
        self.closed.store(true, Ordering::SeqCst);

        let session = self.session.lock().await.take();
        if let Some(session) = session {
            let mut writer = session.writer.lock().await;
            if let Err(e) = writer.close().await {
                debug!(session = session.id, error = %e, "closing write half failed");
            }
        }
        debug!(addr = %self.options.addr(), "disconnected");
        result
    }

    /// Number of sockets established over the lifetime of this connection.
    pub fn sessions_established(&self) -> u64 {
        self.session_counter.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) async fn registered_subscriptions(&self) -> SubscriptionRegistry {
        self.subscriptions.lock().await.clone()
    }
}
