//! # Name Server
//!
//! The registry modules resolve their port paths against. One TCP listener,
//! one framed request/reply exchange per resolution:
//!
//! ```text
//! request:  /resolve/consumer0/input:4242
//! reply:    {"identifier":"/consumer0/input","server":"127.0.0.1","port":"60001","pid":"4242"}
//! ```
//!
//! The first resolution of a path allocates an endpoint and remembers the
//! requesting pid as the owner. Later resolutions of the same path, from any
//! process, return that record unchanged.

use anyhow::{Context, Result};
use codec::{ResolveReply, ResolveRequest};
use network::TcpConnection;
use runtime_config::defaults;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use types::PortRecord;

/// Name server settings
#[derive(Debug, Clone)]
pub struct NameServerConfig {
    pub bind_address: String,
    /// Host written into every record
    pub advertised_host: String,
    /// Hand out ports sequentially from here; `None` asks the OS for free ports
    pub port_base: Option<u16>,
    pub max_message_size: usize,
}

impl Default for NameServerConfig {
    fn default() -> Self {
        Self {
            bind_address: defaults::name_server::BIND_ADDRESS.to_string(),
            advertised_host: defaults::name_server::ADVERTISED_HOST.to_string(),
            port_base: Some(defaults::name_server::PORT_BASE),
            max_message_size: defaults::module::MAX_MESSAGE_SIZE,
        }
    }
}

/// Records keyed by port path
#[derive(Debug)]
struct Directory {
    records: HashMap<String, PortRecord>,
    host: String,
    next_port: Option<u32>,
}

impl Directory {
    fn new(config: &NameServerConfig) -> Self {
        Self {
            records: HashMap::new(),
            host: config.advertised_host.clone(),
            next_port: config.port_base.map(u32::from),
        }
    }

    fn resolve(&mut self, request: &ResolveRequest) -> Result<PortRecord> {
        if let Some(record) = self.records.get(&request.path) {
            debug!(path = %request.path, requester = %request.pid, "Returning registered record");
            return Ok(record.clone());
        }

        let port = self.allocate_port()?;
        let record = PortRecord {
            name: request.path.clone(),
            host: self.host.clone(),
            port: port.to_string(),
            pid: request.pid.clone(),
        };
        info!(path = %record.name, endpoint = %record.endpoint(), owner = %record.pid, "Registered port path");
        self.records.insert(request.path.clone(), record.clone());
        Ok(record)
    }

    fn allocate_port(&mut self) -> Result<u16> {
        match self.next_port.as_mut() {
            Some(next) => {
                let port = u16::try_from(*next).context("sequential port range exhausted")?;
                *next += 1;
                Ok(port)
            }
            None => {
                // ask the OS for a port that is free right now
                let probe = std::net::TcpListener::bind((self.host.as_str(), 0))
                    .with_context(|| format!("Failed to probe a free port on {}", self.host))?;
                Ok(probe.local_addr()?.port())
            }
        }
    }
}

/// Registry server bound to its listening socket
pub struct NameServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    directory: Arc<Mutex<Directory>>,
    max_message_size: usize,
}

impl NameServer {
    pub async fn bind(config: NameServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .with_context(|| format!("Failed to bind name server at {}", config.bind_address))?;
        let local_addr = listener.local_addr()?;

        info!(
            address = %local_addr,
            advertised_host = %config.advertised_host,
            port_base = ?config.port_base,
            "Name server listening"
        );
        Ok(Self {
            listener,
            local_addr,
            directory: Arc::new(Mutex::new(Directory::new(&config))),
            max_message_size: config.max_message_size,
        })
    }

    /// Address actually bound, useful after binding port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve clients until the task is dropped
    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let connection = TcpConnection::new(stream, peer);
                    let directory = self.directory.clone();
                    let max = self.max_message_size;
                    tokio::spawn(async move {
                        serve_connection(connection, directory, max).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept registry client: {}", e);
                }
            }
        }
    }
}

async fn serve_connection(
    mut connection: TcpConnection,
    directory: Arc<Mutex<Directory>>,
    max_message_size: usize,
) {
    let peer = connection.peer_addr();
    debug!(peer = %peer, "Registry client connected");

    loop {
        let request = match connection.receive_message(max_message_size).await {
            Ok(request) => request,
            Err(e) => {
                debug!(peer = %peer, reason = %e, "Registry client disconnected");
                return;
            }
        };

        let reply = answer(&request, &directory).await;
        if let Err(e) = connection.send_message(&reply).await {
            warn!(peer = %peer, error = %e, "Failed to send registry reply");
            return;
        }
    }
}

async fn answer(request: &[u8], directory: &Mutex<Directory>) -> Vec<u8> {
    let outcome = match ResolveRequest::parse(request) {
        Ok(request) => directory.lock().await.resolve(&request),
        Err(e) => Err(e.into()),
    };

    let encoded = outcome.and_then(|record| {
        ResolveReply::from(&record)
            .encode()
            .map_err(anyhow::Error::from)
    });
    match encoded {
        Ok(reply) => reply,
        Err(e) => {
            warn!(
                request = %String::from_utf8_lossy(request),
                error = %e,
                "Rejecting registry request"
            );
            serde_json::json!({ "error": e.to_string() }).to_string().into_bytes()
        }
    }
}
