//! Registry Client
//!
//! Resolves port paths to network endpoints by asking the name server.
//! Each resolution is one request/reply exchange: `"/resolve<path>:<pid>"`
//! out, a JSON record back. Resolving the same path again returns the same
//! record, so callers can resolve as often as they like.

use crate::transports::{TcpNetworkConfig, TcpReqRepTransport, Transport};
use crate::{Result, TransportError};
use runtime_config::{RegistryConfig, RetryConfig};
use std::time::Duration;
use tracing::{debug, info, warn};
use types::{resolve_path, PortRecord};

/// Client side of the name server exchange
pub struct RegistryClient {
    endpoint: String,
    transport: Box<dyn Transport>,
    resolve_timeout: Option<Duration>,
    retry: RetryConfig,
}

impl RegistryClient {
    /// Connect to the registry over TCP
    pub async fn connect(config: &RegistryConfig) -> Result<Self> {
        let tcp = TcpNetworkConfig {
            connect_timeout: config.resolve_timeout().unwrap_or(Duration::from_secs(5)),
            ..Default::default()
        };
        let mut transport: Box<dyn Transport> = Box::new(TcpReqRepTransport::new(tcp));
        transport.connect(&config.address).await.map_err(|e| {
            TransportError::resolution(&config.address, format!("registry unreachable: {}", e))
        })?;

        info!(registry = %config.address, "Connected to registry");
        Ok(Self::with_transport(config, transport))
    }

    /// Use an already connected transport for the exchange
    pub fn with_transport(config: &RegistryConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            endpoint: config.address.clone(),
            transport,
            resolve_timeout: config.resolve_timeout(),
            retry: config.retry.clone(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fill `record` with the endpoint registered under its name.
    ///
    /// `record.name` is the port path and `record.pid` the requesting
    /// process. On failure the record is left as it was and the registry
    /// connection is re-established, so a reply that arrives late is never
    /// read as the answer to a later request.
    pub async fn resolve(&mut self, record: &mut PortRecord) -> Result<()> {
        let path = resolve_path(&record.name);
        let request = codec::encode_request(&path, &record.pid);
        debug!(path = %record.name, pid = %record.pid, "Resolving port path");

        let limit = self.resolve_timeout;
        let transport = &mut self.transport;
        let exchange = async move {
            transport.send(&request).await?;
            transport.recv(true).await
        };
        let outcome = match limit {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .unwrap_or_else(|_| {
                    Err(TransportError::resolution(
                        &record.name,
                        format!("registry did not answer within {}ms", limit.as_millis()),
                    ))
                }),
            None => exchange.await,
        };

        let decoded = match outcome {
            Ok(Some(reply)) => codec::decode_reply(&reply, record)
                .map_err(|e| TransportError::resolution(&record.name, e.to_string())),
            Ok(None) => Err(TransportError::resolution(&record.name, "registry sent no reply")),
            Err(e @ TransportError::Resolution { .. }) => Err(e),
            Err(e) => Err(TransportError::resolution(&record.name, e.to_string())),
        };
        if let Err(e) = decoded {
            self.reconnect().await;
            return Err(e);
        }

        info!(path = %record.name, endpoint = %record.endpoint(), owner = %record.pid, "Resolved port path");
        Ok(())
    }

    /// [`resolve`](RegistryClient::resolve) under the configured retry policy
    pub async fn resolve_with_retry(&mut self, record: &mut PortRecord) -> Result<()> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.resolve(record).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    warn!(
                        path = %record.name,
                        attempt,
                        attempts,
                        error = %e,
                        "Resolution failed, retrying"
                    );
                    tokio::time::sleep(self.retry.backoff()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn reconnect(&mut self) {
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "Error closing registry connection");
        }
        if let Err(e) = self.transport.connect(&self.endpoint).await {
            warn!(registry = %self.endpoint, error = %e, "Failed to reconnect to registry");
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }
}

impl std::fmt::Debug for RegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryClient")
            .field("endpoint", &self.endpoint)
            .field("resolve_timeout", &self.resolve_timeout)
            .finish()
    }
}
