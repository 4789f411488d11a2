//! In-process request/reply transport
//!
//! Endpoints live in a [`MemoryHub`] keyed by the same `host:port` strings
//! the registry hands out, so modules that share a process can be wired
//! exactly like remote ones without touching a socket.

use crate::transports::metrics::MetricsTracker;
use crate::transports::{SendStatus, Transport, TransportInfo, TransportMetrics, TransportType};
use crate::{Result, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

/// A request together with the channel its reply goes back on
type Envelope = (Bytes, UnboundedSender<Bytes>);

/// Registry of bound in-process endpoints
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    endpoints: Arc<Mutex<HashMap<String, UnboundedSender<Envelope>>>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, endpoint: &str) -> Result<UnboundedReceiver<Envelope>> {
        let mut endpoints = self.endpoints.lock();
        if let Some(existing) = endpoints.get(endpoint) {
            if !existing.is_closed() {
                return Err(TransportError::configuration(
                    format!("in-process endpoint {} is already bound", endpoint),
                    Some("endpoint"),
                ));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        endpoints.insert(endpoint.to_string(), tx);
        Ok(rx)
    }

    fn lookup(&self, endpoint: &str) -> Option<UnboundedSender<Envelope>> {
        self.endpoints
            .lock()
            .get(endpoint)
            .filter(|tx| !tx.is_closed())
            .cloned()
    }

    fn unregister(&self, endpoint: &str) {
        self.endpoints.lock().remove(endpoint);
    }

    /// Number of endpoints currently bound
    pub fn len(&self) -> usize {
        self.endpoints.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Request/reply transport over in-process channels
pub struct MemoryTransport {
    hub: MemoryHub,
    bound: Option<(String, UnboundedReceiver<Envelope>)>,
    awaiting_reply: Option<UnboundedSender<Bytes>>,
    peer: Option<(String, UnboundedSender<Envelope>)>,
    replies_tx: UnboundedSender<Bytes>,
    replies_rx: UnboundedReceiver<Bytes>,
    metrics: MetricsTracker,
}

impl MemoryTransport {
    pub fn new(hub: MemoryHub) -> Self {
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        Self {
            hub,
            bound: None,
            awaiting_reply: None,
            peer: None,
            replies_tx,
            replies_rx,
            metrics: MetricsTracker::new(),
        }
    }

    fn deliver(&mut self, payload: &[u8]) -> Result<SendStatus> {
        let Some((endpoint, requests)) = self.peer.as_ref() else {
            return Ok(SendStatus::WouldBlock);
        };

        requests
            .send((Bytes::copy_from_slice(payload), self.replies_tx.clone()))
            .map_err(|_| {
                TransportError::connection("in-process peer has closed", Some(endpoint.as_str()))
            })?;
        self.metrics.record_send(payload.len());
        Ok(SendStatus::Sent)
    }

    async fn recv_server(&mut self, blocking: bool) -> Result<Option<Bytes>> {
        let Some((endpoint, requests)) = self.bound.as_mut() else {
            return Ok(None);
        };

        let envelope = if blocking {
            requests.recv().await
        } else {
            match requests.try_recv() {
                Ok(envelope) => Some(envelope),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => None,
            }
        };

        let (payload, reply_to) = envelope.ok_or_else(|| {
            TransportError::connection("in-process endpoint was unregistered", Some(endpoint.as_str()))
        })?;
        self.awaiting_reply = Some(reply_to);
        self.metrics.record_receive(payload.len());
        Ok(Some(payload))
    }

    async fn recv_client(&mut self, blocking: bool) -> Result<Option<Bytes>> {
        if self.peer.is_none() && blocking {
            return Err(TransportError::connection("not connected to any peer", None));
        }

        let reply = if blocking {
            // replies_tx lives in self, so the channel never reports closed
            self.replies_rx.recv().await
        } else {
            self.replies_rx.try_recv().ok()
        };
        if let Some(reply) = &reply {
            self.metrics.record_receive(reply.len());
        }
        Ok(reply)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn bind(&mut self, endpoint: &str) -> Result<()> {
        let requests = self.hub.register(endpoint)?;
        info!("In-process endpoint bound at {}", endpoint);
        self.bound = Some((endpoint.to_string(), requests));
        Ok(())
    }

    async fn connect(&mut self, endpoint: &str) -> Result<()> {
        let requests = self.hub.lookup(endpoint).ok_or_else(|| {
            TransportError::connection("no in-process endpoint is bound there", Some(endpoint))
        })?;

        // replies to requests sent over an earlier connection must not leak into this one
        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        self.replies_tx = replies_tx;
        self.replies_rx = replies_rx;
        self.peer = Some((endpoint.to_string(), requests));

        debug!("Connected to in-process endpoint {}", endpoint);
        Ok(())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<()> {
        match self.deliver(payload)? {
            SendStatus::Sent => Ok(()),
            SendStatus::WouldBlock => Err(TransportError::connection("not connected to any peer", None)),
        }
    }

    async fn try_send(&mut self, payload: &[u8]) -> Result<SendStatus> {
        self.deliver(payload)
    }

    async fn recv(&mut self, blocking: bool) -> Result<Option<Bytes>> {
        if self.bound.is_some() {
            self.recv_server(blocking).await
        } else {
            self.recv_client(blocking).await
        }
    }

    async fn reply(&mut self, payload: &[u8]) -> Result<()> {
        let reply_to = self
            .awaiting_reply
            .take()
            .ok_or_else(|| TransportError::protocol("no request is waiting for a reply"))?;

        // a requester that went away simply never reads its reply
        if reply_to.send(Bytes::copy_from_slice(payload)).is_ok() {
            self.metrics.record_send(payload.len());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.peer.is_some() || self.bound.is_some()
    }

    fn transport_info(&self) -> TransportInfo {
        TransportInfo {
            transport_type: TransportType::Memory,
            local_address: self.bound.as_ref().map(|(endpoint, _)| endpoint.clone()),
            remote_address: self.peer.as_ref().map(|(endpoint, _)| endpoint.clone()),
            connection_count: usize::from(self.peer.is_some()),
        }
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some((endpoint, _)) = self.bound.take() {
            self.hub.unregister(&endpoint);
            info!("In-process endpoint {} closed", endpoint);
        }
        self.peer = None;
        self.awaiting_reply = None;
        Ok(())
    }
}
