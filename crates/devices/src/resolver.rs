use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netops_core::config::DevicesConfig;
use netops_core::{DeviceError, DeviceTarget};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::output::OutputStore;

/// Name resolution and TCP reachability, split out so resolution order can be tested.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    async fn lookup(&self, host: &str, port: u16) -> Option<SocketAddr>;
    async fn reachable(&self, address: SocketAddr, timeout: Duration) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TcpProbe;

#[async_trait]
impl NetworkProbe for TcpProbe {
    async fn lookup(&self, host: &str, port: u16) -> Option<SocketAddr> {
        match lookup_host((host, port)).await {
            Ok(addresses) => {
                let addresses: Vec<SocketAddr> = addresses.collect();
                addresses
                    .iter()
                    .find(|address| address.is_ipv4())
                    .or_else(|| addresses.first())
                    .copied()
            }
            Err(error) => {
                debug!(event_name = "devices.resolver.lookup_failed", host, error = %error);
                None
            }
        }
    }

    async fn reachable(&self, address: SocketAddr, limit: Duration) -> bool {
        matches!(timeout(limit, TcpStream::connect(address)).await, Ok(Ok(_)))
    }
}

/// Tokens split into reachable targets and recorded failures, in input order.
#[derive(Debug, Default)]
pub struct Resolution {
    pub targets: Vec<DeviceTarget>,
    pub unreachable: Vec<DeviceError>,
}

pub struct DeviceResolver {
    probe: Arc<dyn NetworkProbe>,
    port: u16,
    connect_timeout: Duration,
    suffixes: Vec<String>,
    output: Option<Arc<OutputStore>>,
}

impl DeviceResolver {
    pub fn new(probe: Arc<dyn NetworkProbe>, config: &DevicesConfig) -> Self {
        Self {
            probe,
            port: config.management_port,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            suffixes: config.domain_suffixes.clone(),
            output: None,
        }
    }

    /// Unreachable tokens are appended to the invalid-destinations record in `output`.
    pub fn with_output(mut self, output: Arc<OutputStore>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn candidates(&self, token: &str) -> Vec<String> {
        self.suffixes.iter().map(|suffix| format!("{token}.{suffix}")).collect()
    }

    /// Literal address first, then each suffixed hostname in order. No retries, no caching.
    pub async fn resolve(&self, raw_token: &str) -> Result<DeviceTarget, DeviceError> {
        let token = raw_token.trim();

        if let Ok(ip) = token.parse::<IpAddr>() {
            let socket = SocketAddr::new(ip, self.port);
            if self.probe.reachable(socket, self.connect_timeout).await {
                info!(
                    event_name = "devices.resolver.literal_reachable",
                    device = token,
                    port = self.port,
                    "device reachable on management port"
                );
                return Ok(DeviceTarget {
                    token: token.to_owned(),
                    address: token.to_owned(),
                    socket,
                    reachable: true,
                });
            }
            debug!(event_name = "devices.resolver.literal_unreachable", device = token);
        }

        let candidates = self.candidates(token);
        for candidate in &candidates {
            let Some(socket) = self.probe.lookup(candidate, self.port).await else {
                continue;
            };
            if self.probe.reachable(socket, self.connect_timeout).await {
                info!(
                    event_name = "devices.resolver.hostname_reachable",
                    device = token,
                    hostname = %candidate,
                    resolved = %socket.ip(),
                    "device reachable on management port"
                );
                return Ok(DeviceTarget {
                    token: token.to_owned(),
                    address: candidate.clone(),
                    socket,
                    reachable: true,
                });
            }
        }

        warn!(
            event_name = "devices.resolver.unreachable",
            device = token,
            tried = %candidates.join(", "),
            "not a valid IP address or hostname"
        );
        if let Some(output) = &self.output {
            output.record_invalid(&candidates);
        }
        Err(DeviceError::Unreachable { token: token.to_owned(), tried: candidates })
    }

    pub async fn resolve_all(&self, tokens: &[String]) -> Resolution {
        let mut resolution = Resolution::default();
        for token in tokens {
            match self.resolve(token).await {
                Ok(target) => resolution.targets.push(target),
                Err(error) => resolution.unreachable.push(error),
            }
        }
        resolution
    }
}
