//! Ports and the request/reply discipline
//!
//! A [`Port`] wraps one [`Transport`] and enforces the exchange rules on top
//! of it:
//!
//! - a port is unusable until [`Port::open`] attached a resolved [`PortRecord`]
//! - client ports send one request at a time; a second send while the first
//!   is unacknowledged fails with [`TransportError::NotReady`] and changes
//!   nothing
//! - server ports answer every delivered request with `ACK`
//! - a client returns to [`PortState::Ready`] only after consuming an `ACK`;
//!   any other reply is a protocol error and leaves it awaiting
//!
//! "Send would block" and "no ack yet" are ordinary outcomes, reported as
//! [`SendStatus::WouldBlock`] and [`AckStatus::Pending`], so a tick loop can
//! poll them without ever blocking.

use crate::transports::{SendStatus, Transport, TransportInfo};
use crate::{Result, TransportError};
use bytes::Bytes;
use codec::ACK;
use std::time::Duration;
use tracing::{debug, info, warn};
use types::{Direction, PortKind, PortRecord, PortState, Role, Value};

/// Static description of a port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Name the module declared, e.g. `Output`
    pub name: String,
    /// Registry path, e.g. `/producer0/output`
    pub path: String,
    pub direction: Direction,
    /// `None` for ports carrying raw payloads, such as the control channel
    pub kind: Option<PortKind>,
}

impl PortSpec {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        direction: Direction,
        kind: PortKind,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            direction,
            kind: Some(kind),
        }
    }

    /// Untyped port carrying raw payloads
    pub fn raw(name: impl Into<String>, path: impl Into<String>, direction: Direction) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            direction,
            kind: None,
        }
    }
}

/// Result of polling for an acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    /// No request outstanding; the port is ready
    Acked,
    /// The acknowledgment has not arrived yet
    Pending,
}

/// Addressable, directional endpoint with request/reply flow control
pub struct Port {
    spec: PortSpec,
    role: Role,
    transport: Box<dyn Transport>,
    record: Option<PortRecord>,
    state: PortState,
    /// Server side: a delivered request still owes its reply
    reply_owed: bool,
    ack_timeout: Option<Duration>,
}

impl Port {
    pub fn new(spec: PortSpec, transport: Box<dyn Transport>) -> Self {
        let role = spec.direction.role();
        Self {
            spec,
            role,
            transport,
            record: None,
            state: PortState::Ready,
            reply_owed: false,
            ack_timeout: None,
        }
    }

    /// Limit for blocking [`receive_ack`](Port::receive_ack) waits
    pub fn with_ack_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn path(&self) -> &str {
        &self.spec.path
    }

    pub fn direction(&self) -> Direction {
        self.spec.direction
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn kind(&self) -> Option<PortKind> {
        self.spec.kind
    }

    pub fn state(&self) -> PortState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == PortState::Ready
    }

    pub fn is_open(&self) -> bool {
        self.record.is_some()
    }

    /// Record this port was opened with
    pub fn record(&self) -> Option<&PortRecord> {
        self.record.as_ref()
    }

    pub fn transport_info(&self) -> TransportInfo {
        self.transport.transport_info()
    }

    /// Attach the resolved record; server ports start listening on it
    pub async fn open(&mut self, record: PortRecord) -> Result<()> {
        if !record.is_resolved() {
            return Err(TransportError::resolution(
                &record.name,
                "cannot open a port from an unresolved record",
            ));
        }

        if self.role == Role::Server {
            self.transport.bind(&record.endpoint()).await?;
        }

        info!(
            port = %self.spec.name,
            path = %self.spec.path,
            role = ?self.role,
            endpoint = %record.endpoint(),
            "Port opened"
        );
        self.record = Some(record);
        Ok(())
    }

    /// Connect a client port to the server registered as `target`
    pub async fn connect(&mut self, target: &PortRecord) -> Result<()> {
        self.ensure_open()?;
        self.ensure_role(Role::Client, "connect")?;
        if !target.is_resolved() {
            return Err(TransportError::resolution(
                &target.name,
                "cannot connect to an unresolved record",
            ));
        }

        self.transport.connect(&target.endpoint()).await?;

        if self.state == PortState::AwaitingAck {
            warn!(port = %self.spec.name, "Abandoning unacknowledged request on reconnect");
            self.state = PortState::Ready;
        }
        info!(port = %self.spec.name, target = %target, "Port connected");
        Ok(())
    }

    /// Send a typed value; see [`send_payload`](Port::send_payload)
    pub async fn send(&mut self, value: &Value) -> Result<SendStatus> {
        self.check_kind(value)?;
        let payload = codec::encode_value(value);
        self.send_payload(&payload).await
    }

    /// Non-blocking send of a raw payload.
    ///
    /// Moves the port to [`PortState::AwaitingAck`] only when the payload was
    /// actually handed over.
    pub async fn send_payload(&mut self, payload: &[u8]) -> Result<SendStatus> {
        self.ensure_sendable()?;

        let status = self.transport.try_send(payload).await?;
        if status == SendStatus::Sent {
            self.state = PortState::AwaitingAck;
            debug!(port = %self.spec.name, bytes = payload.len(), "Request sent");
        }
        Ok(status)
    }

    /// Send a raw payload, waiting until the transport has written it
    pub async fn send_payload_blocking(&mut self, payload: &[u8]) -> Result<()> {
        self.ensure_sendable()?;

        self.transport.send(payload).await?;
        self.state = PortState::AwaitingAck;
        debug!(port = %self.spec.name, bytes = payload.len(), "Request sent");
        Ok(())
    }

    /// Receive and decode one value, acknowledging it to the sender
    pub async fn receive(&mut self, blocking: bool) -> Result<Option<Value>> {
        let Some(kind) = self.spec.kind else {
            return Err(TransportError::configuration(
                format!("port {} carries raw payloads", self.spec.name),
                Some("kind"),
            ));
        };

        match self.receive_payload(blocking).await? {
            Some(payload) => codec::decode_value(kind, &payload)
                .map(Some)
                .map_err(|e| TransportError::protocol_on_port(e.to_string(), &self.spec.name)),
            None => Ok(None),
        }
    }

    /// Receive one raw payload, acknowledging it to the sender
    pub async fn receive_payload(&mut self, blocking: bool) -> Result<Option<Bytes>> {
        let request = self.receive_request(blocking).await?;
        if request.is_some() {
            self.acknowledge().await?;
        }
        Ok(request)
    }

    /// Receive one raw payload and leave its acknowledgment to the caller.
    ///
    /// The caller must [`acknowledge`](Port::acknowledge) before receiving again.
    pub async fn receive_request(&mut self, blocking: bool) -> Result<Option<Bytes>> {
        self.ensure_open()?;
        self.ensure_role(Role::Server, "receive")?;
        if self.reply_owed {
            return Err(TransportError::protocol_on_port(
                "previous request has not been acknowledged",
                &self.spec.name,
            ));
        }

        let request = self.transport.recv(blocking).await?;
        if let Some(payload) = &request {
            self.reply_owed = true;
            debug!(port = %self.spec.name, bytes = payload.len(), "Request received");
        }
        Ok(request)
    }

    /// Send `ACK` for the request delivered last
    pub async fn acknowledge(&mut self) -> Result<()> {
        self.ensure_role(Role::Server, "acknowledge")?;
        if !self.reply_owed {
            return Err(TransportError::protocol_on_port(
                "no request to acknowledge",
                &self.spec.name,
            ));
        }

        self.reply_owed = false;
        self.transport.reply(ACK).await
    }

    /// Consume the peer's acknowledgment of the outstanding request.
    ///
    /// A blocking wait honours the port's ack timeout; timing out leaves
    /// the port awaiting, like any other unanswered poll.
    pub async fn receive_ack(&mut self, blocking: bool) -> Result<AckStatus> {
        self.ensure_open()?;
        self.ensure_role(Role::Client, "receive an acknowledgment")?;
        if self.state == PortState::Ready {
            return Ok(AckStatus::Acked);
        }

        let reply = match (blocking, self.ack_timeout) {
            (true, Some(limit)) => tokio::time::timeout(limit, self.transport.recv(true))
                .await
                .map_err(|_| {
                    TransportError::timeout(
                        format!("acknowledgment on {}", self.spec.name),
                        limit.as_millis() as u64,
                    )
                })??,
            _ => self.transport.recv(blocking).await?,
        };

        match reply {
            None => Ok(AckStatus::Pending),
            Some(reply) if codec::is_ack(&reply) => {
                self.state = PortState::Ready;
                debug!(port = %self.spec.name, "Acknowledgment received");
                Ok(AckStatus::Acked)
            }
            Some(reply) => Err(TransportError::protocol_on_port(
                format!("expected ACK, got {:?}", String::from_utf8_lossy(&reply)),
                &self.spec.name,
            )),
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await?;
        self.record = None;
        self.state = PortState::Ready;
        self.reply_owed = false;
        debug!(port = %self.spec.name, "Port closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.record.is_none() {
            return Err(TransportError::not_open(&self.spec.name));
        }
        Ok(())
    }

    fn ensure_role(&self, role: Role, operation: &str) -> Result<()> {
        if self.role != role {
            return Err(TransportError::configuration(
                format!(
                    "port {} is a {:?}-role port and cannot {}",
                    self.spec.name, self.role, operation
                ),
                Some("direction"),
            ));
        }
        Ok(())
    }

    fn ensure_sendable(&self) -> Result<()> {
        self.ensure_open()?;
        self.ensure_role(Role::Client, "send")?;
        if self.state == PortState::AwaitingAck {
            return Err(TransportError::not_ready(&self.spec.name));
        }
        Ok(())
    }

    fn check_kind(&self, value: &Value) -> Result<()> {
        match self.spec.kind {
            Some(kind) if kind == value.kind() => Ok(()),
            Some(kind) => Err(TransportError::configuration(
                format!(
                    "port {} carries {} values, got {}",
                    self.spec.name,
                    kind,
                    value.kind()
                ),
                Some("kind"),
            )),
            None => Err(TransportError::configuration(
                format!("port {} carries raw payloads", self.spec.name),
                Some("kind"),
            )),
        }
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("spec", &self.spec)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("record", &self.record)
            .finish()
    }
}
