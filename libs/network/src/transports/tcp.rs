//! TCP Request/Reply Transport Implementation
//!
//! Length-prefixed frames over TCP. A bound transport accepts any number of
//! peers and answers each request on the connection it arrived on; a
//! connected transport holds exactly one outbound connection.
//!
//! Non-blocking paths (`try_send`, `recv(false)`) use the socket's cached
//! readiness, so they only observe new data after the runtime has polled its
//! I/O driver. Tick loops get that for free by sleeping between ticks.

use crate::transports::{SendStatus, Transport, TransportInfo, TransportMetrics, TransportType};
use crate::transports::metrics::MetricsTracker;
use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use runtime_config::ModuleSettings;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// TCP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpNetworkConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum message size
    pub max_message_size: usize,
    /// Limit on finishing a frame once its first bytes are on the wire
    pub write_timeout: Duration,
}

impl Default for TcpNetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            max_message_size: codec::DEFAULT_MAX_MESSAGE_SIZE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

impl TcpNetworkConfig {
    pub fn from_settings(settings: &ModuleSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            max_message_size: settings.max_message_size,
            write_timeout: settings.connect_timeout(),
        }
    }
}

const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP connection wrapper with reusable frame buffers
pub struct TcpConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    write_timeout: Duration,
    bytes_sent: u64,
    bytes_received: u64,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        Self {
            stream,
            peer_addr,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            bytes_sent: 0,
            bytes_received: 0,
            read_buffer: BytesMut::with_capacity(8 * 1024),
            write_buffer: BytesMut::with_capacity(8 * 1024),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn with_write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = limit;
        self
    }

    /// Send one frame, waiting until it is fully written
    pub async fn send_message(&mut self, data: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        codec::encode_frame(data, &mut self.write_buffer)?;

        self.stream
            .write_all(&self.write_buffer)
            .await
            .map_err(|e| TransportError::network_with_source("Failed to write message", e))?;
        self.stream
            .flush()
            .await
            .map_err(|e| TransportError::network_with_source("Failed to flush TCP stream", e))?;

        self.sent(data.len());
        Ok(())
    }

    /// Send one frame only if the socket takes at least part of it right now.
    ///
    /// Once any byte is on the wire the frame is committed and the remainder
    /// is written before returning, within the write timeout. A frame that
    /// cannot be finished in time leaves the stream unusable, so the caller
    /// must drop the connection after a `Timeout`.
    pub async fn try_send_message(&mut self, data: &[u8]) -> Result<SendStatus> {
        self.write_buffer.clear();
        codec::encode_frame(data, &mut self.write_buffer)?;

        match self.stream.try_write(&self.write_buffer) {
            Ok(0) => Err(TransportError::connection(
                "peer closed the connection",
                Some(&self.peer_addr.to_string()),
            )),
            Ok(written) => {
                if written < self.write_buffer.len() {
                    let rest = self.stream.write_all(&self.write_buffer[written..]);
                    tokio::time::timeout(self.write_timeout, rest)
                        .await
                        .map_err(|_| {
                            TransportError::timeout(
                                format!("finishing a frame to {}", self.peer_addr),
                                self.write_timeout.as_millis() as u64,
                            )
                        })?
                        .map_err(|e| {
                            TransportError::network_with_source("Failed to finish message", e)
                        })?;
                }
                self.sent(data.len());
                Ok(SendStatus::Sent)
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(SendStatus::WouldBlock),
            Err(e) => Err(TransportError::network_with_source("Failed to write message", e)),
        }
    }

    /// Receive one frame, waiting for it to arrive completely
    pub async fn receive_message(&mut self, max_size: usize) -> Result<Bytes> {
        loop {
            if let Some(frame) = codec::decode_frame(&mut self.read_buffer, max_size)? {
                self.received(frame.len());
                return Ok(frame);
            }

            let read = self
                .stream
                .read_buf(&mut self.read_buffer)
                .await
                .map_err(|e| TransportError::network_with_source("Failed to read message", e))?;
            if read == 0 {
                return Err(self.closed_error());
            }
        }
    }

    /// Receive one frame if a complete one can be read without waiting
    pub fn try_receive_message(&mut self, max_size: usize) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = codec::decode_frame(&mut self.read_buffer, max_size)? {
                self.received(frame.len());
                return Ok(Some(frame));
            }

            self.read_buffer.reserve(1024);
            match self.stream.try_read_buf(&mut self.read_buffer) {
                Ok(0) => return Err(self.closed_error()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => {
                    return Err(TransportError::network_with_source(
                        "Failed to read message",
                        e,
                    ))
                }
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer_addr, "Error shutting down TCP connection: {}", e);
        }
    }

    fn sent(&mut self, bytes: usize) {
        self.bytes_sent += (codec::FRAME_HEADER_LEN + bytes) as u64;
        debug!(
            peer = %self.peer_addr,
            bytes,
            total_sent = self.bytes_sent,
            "Sent frame over TCP"
        );
    }

    fn received(&mut self, bytes: usize) {
        self.bytes_received += (codec::FRAME_HEADER_LEN + bytes) as u64;
        debug!(
            peer = %self.peer_addr,
            bytes,
            total_received = self.bytes_received,
            "Received frame over TCP"
        );
    }

    fn closed_error(&self) -> TransportError {
        TransportError::connection(
            "peer closed the connection",
            Some(&self.peer_addr.to_string()),
        )
    }
}

/// Request/reply transport over TCP
pub struct TcpReqRepTransport {
    config: TcpNetworkConfig,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    inbound: Vec<TcpConnection>,
    next_inbound: usize,
    /// Peer whose request has been delivered but not yet answered
    awaiting_reply: Option<SocketAddr>,
    outbound: Option<TcpConnection>,
    metrics: MetricsTracker,
}

impl TcpReqRepTransport {
    pub fn new(config: TcpNetworkConfig) -> Self {
        Self {
            config,
            listener: None,
            local_addr: None,
            inbound: Vec::new(),
            next_inbound: 0,
            awaiting_reply: None,
            outbound: None,
            metrics: MetricsTracker::new(),
        }
    }

    /// Address actually bound, useful after binding port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn accept_pending(&mut self) -> Result<()> {
        let Some(listener) = self.listener.as_ref() else {
            return Ok(());
        };

        let mut cx = Context::from_waker(futures::task::noop_waker_ref());
        loop {
            match listener.poll_accept(&mut cx) {
                Poll::Ready(Ok((stream, peer))) => {
                    debug!(peer = %peer, "Accepted TCP peer");
                    self.inbound.push(TcpConnection::new(stream, peer));
                }
                Poll::Ready(Err(e)) => {
                    self.metrics.record_error();
                    return Err(TransportError::network_with_source(
                        "Failed to accept TCP connection",
                        e,
                    ));
                }
                Poll::Pending => return Ok(()),
            }
        }
    }

    /// One non-blocking pass over the listener and every inbound peer
    fn poll_inbound(&mut self) -> Result<Option<Bytes>> {
        self.accept_pending()?;

        let count = self.inbound.len();
        let mut closed = Vec::new();
        let mut found = None;

        for offset in 0..count {
            let index = (self.next_inbound + offset) % count;
            match self.inbound[index].try_receive_message(self.config.max_message_size) {
                Ok(Some(frame)) => {
                    found = Some((index, frame));
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(peer = %self.inbound[index].peer_addr(), error = %e, "Dropping inbound peer");
                    closed.push(index);
                }
            }
        }

        let result = found.map(|(index, frame)| {
            self.awaiting_reply = Some(self.inbound[index].peer_addr());
            self.next_inbound = index + 1;
            self.metrics.record_receive(frame.len());
            frame
        });

        closed.sort_unstable();
        for index in closed.into_iter().rev() {
            self.inbound.remove(index);
        }
        if self.next_inbound >= self.inbound.len() {
            self.next_inbound = 0;
        }

        Ok(result)
    }

    /// Wait until a peer connects or an inbound peer has bytes to read
    async fn wait_inbound(&mut self) -> Result<()> {
        let accepted = {
            let accept = accept_next(self.listener.as_ref());
            let readable = any_readable(&self.inbound);
            tokio::select! {
                accepted = accept => Some(accepted.map_err(|e| {
                    TransportError::network_with_source("Failed to accept TCP connection", e)
                })?),
                ready = readable => {
                    ready.map_err(|e| TransportError::network_with_source("Failed to poll TCP peers", e))?;
                    None
                }
            }
        };

        if let Some((stream, peer)) = accepted {
            debug!(peer = %peer, "Accepted TCP peer");
            self.inbound.push(TcpConnection::new(stream, peer));
        }
        Ok(())
    }

    async fn recv_server(&mut self, blocking: bool) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.poll_inbound()? {
                return Ok(Some(frame));
            }
            if !blocking {
                return Ok(None);
            }
            self.wait_inbound().await?;
        }
    }

    async fn recv_client(&mut self, blocking: bool) -> Result<Option<Bytes>> {
        let max = self.config.max_message_size;
        let Some(connection) = self.outbound.as_mut() else {
            return if blocking {
                Err(TransportError::connection("not connected to any peer", None))
            } else {
                Ok(None)
            };
        };

        let frame = if blocking {
            Some(connection.receive_message(max).await?)
        } else {
            connection.try_receive_message(max)?
        };
        if let Some(frame) = &frame {
            self.metrics.record_receive(frame.len());
        }
        Ok(frame)
    }

    fn check_size(&self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_message_size {
            return Err(TransportError::protocol(format!(
                "Message size {} exceeds maximum {}",
                payload.len(),
                self.config.max_message_size
            )));
        }
        Ok(())
    }
}

async fn accept_next(listener: Option<&TcpListener>) -> io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

async fn any_readable(connections: &[TcpConnection]) -> io::Result<()> {
    if connections.is_empty() {
        return std::future::pending().await;
    }
    let waits = connections
        .iter()
        .map(|connection| Box::pin(connection.stream.readable()));
    let (ready, _, _) = futures::future::select_all(waits).await;
    ready
}

#[async_trait]
impl Transport for TcpReqRepTransport {
    async fn bind(&mut self, endpoint: &str) -> Result<()> {
        let listener = TcpListener::bind(endpoint).await.map_err(|e| {
            TransportError::network_with_source(format!("Failed to bind TCP listener at {}", endpoint), e)
        })?;
        let local = listener
            .local_addr()
            .map_err(|e| TransportError::network_with_source("Failed to read bound address", e))?;

        info!("TCP server listening on {}", local);
        self.local_addr = Some(local);
        self.listener = Some(listener);
        Ok(())
    }

    async fn connect(&mut self, endpoint: &str) -> Result<()> {
        if let Some(mut previous) = self.outbound.take() {
            info!(peer = %previous.peer_addr(), "Replacing TCP connection");
            previous.shutdown().await;
        }

        info!("Connecting to TCP peer at {}", endpoint);
        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| {
                TransportError::timeout(
                    format!("TCP connect to {}", endpoint),
                    self.config.connect_timeout.as_millis() as u64,
                )
            })?
            .map_err(|e| {
                TransportError::connection_with_source("Failed to connect to TCP peer", Some(endpoint), e)
            })?;

        let peer_addr = stream
            .peer_addr()
            .map_err(|e| TransportError::network_with_source("Failed to get peer address", e))?;
        self.outbound = Some(
            TcpConnection::new(stream, peer_addr).with_write_timeout(self.config.write_timeout),
        );

        info!("Successfully connected to TCP peer at {}", peer_addr);
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        self.check_size(payload)?;
        let connection = self
            .outbound
            .as_mut()
            .ok_or_else(|| TransportError::connection("not connected to any peer", None))?;

        if let Err(e) = connection.send_message(payload).await {
            self.metrics.record_error();
            return Err(e);
        }
        self.metrics.record_send(payload.len());
        Ok(())
    }

    async fn try_send(&mut self, payload: &[u8]) -> Result<SendStatus> {
        self.check_size(payload)?;
        let Some(connection) = self.outbound.as_mut() else {
            return Ok(SendStatus::WouldBlock);
        };

        let status = connection.try_send_message(payload).await;
        match &status {
            Ok(SendStatus::Sent) => self.metrics.record_send(payload.len()),
            Ok(SendStatus::WouldBlock) => {}
            Err(TransportError::Timeout { .. }) => {
                // a half-written frame would desynchronize the peer
                self.metrics.record_error();
                if let Some(connection) = self.outbound.take() {
                    warn!(peer = %connection.peer_addr(), "Dropping connection with an unfinished frame");
                }
            }
            Err(_) => self.metrics.record_error(),
        }
        status
    }

    async fn recv(&mut self, blocking: bool) -> Result<Option<Bytes>> {
        if self.listener.is_some() {
            self.recv_server(blocking).await
        } else {
            self.recv_client(blocking).await
        }
    }

    async fn reply(&mut self, payload: &[u8]) -> Result<()> {
        self.check_size(payload)?;
        let peer = self
            .awaiting_reply
            .take()
            .ok_or_else(|| TransportError::protocol("no request is waiting for a reply"))?;

        let Some(connection) = self.inbound.iter_mut().find(|c| c.peer_addr() == peer) else {
            warn!(peer = %peer, "Peer left before its reply was sent");
            return Err(TransportError::connection(
                "peer disconnected before the reply",
                Some(&peer.to_string()),
            ));
        };

        connection.send_message(payload).await?;
        self.metrics.record_send(payload.len());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.outbound.is_some() || !self.inbound.is_empty()
    }

    fn transport_info(&self) -> TransportInfo {
        TransportInfo {
            transport_type: TransportType::Tcp,
            local_address: self.local_addr.map(|a| a.to_string()),
            remote_address: self.outbound.as_ref().map(|c| c.peer_addr().to_string()),
            connection_count: self.inbound.len() + usize::from(self.outbound.is_some()),
        }
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut connection) = self.outbound.take() {
            connection.shutdown().await;
            info!("Closed TCP connection to {}", connection.peer_addr());
        }
        for mut connection in self.inbound.drain(..) {
            connection.shutdown().await;
        }
        if self.listener.take().is_some() {
            info!("Stopped TCP listener on {:?}", self.local_addr);
        }
        self.awaiting_reply = None;
        self.next_inbound = 0;
        Ok(())
    }
}
