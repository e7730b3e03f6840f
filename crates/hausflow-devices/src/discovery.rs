/*!
 * UDP discovery of networked air conditioners.
 *
 * A discovery probe is broadcast every few minutes; units answer with a
 * `key=value` list carrying their hardware address. Replies keep the shared
 * address to host table current for every AC adapter.
 */
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::net::UdpSocket;
use tracing::{debug, info};

use hausflow_core::config::DaikinConfig;
use hausflow_core::task::Progress;
use hausflow_core::types::MacAddress;
use hausflow_core::utils::random_duration;

use crate::protocol::parse_values;

/// Probe sent to the broadcast address
pub const DISCOVERY_PAYLOAD: &[u8] = b"DAIKIN_UDP/common/basic_info";

/// Last known host for each discovered AC, shared by all AC adapters
#[derive(Debug, Clone, Default)]
pub struct AcHostTable(Arc<RwLock<HashMap<MacAddress, String>>>);

impl AcHostTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Host for `mac`, if it has been seen
    pub fn get(&self, mac: &MacAddress) -> Option<String> {
        self.0
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(mac)
            .cloned()
    }

    /// Record `host` for `mac`, returning whether the mapping changed
    pub fn insert(&self, mac: MacAddress, host: impl Into<String>) -> bool {
        let host = host.into();
        let mut hosts = self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if hosts.get(&mac) == Some(&host) {
            return false;
        }
        hosts.insert(mac, host);
        true
    }

    /// Number of known units
    pub fn len(&self) -> usize {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Whether no unit has been discovered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Broadcast discovery loop for networked ACs
#[derive(Debug, Clone)]
pub struct AcDiscovery {
    hosts: AcHostTable,
    target: SocketAddr,
    interval: (Duration, Duration),
}

impl AcDiscovery {
    /// Create a discovery loop feeding `hosts`
    pub fn new(hosts: AcHostTable, config: &DaikinConfig) -> Self {
        Self {
            hosts,
            target: config.discovery_target,
            interval: config.discovery_interval(),
        }
    }

    /// Override the probe destination
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    /// Override the delay bounds between probes
    pub fn with_interval(mut self, min: Duration, max: Duration) -> Self {
        self.interval = (min, max);
        self
    }

    /// One attempt of the discovery loop; only returns on failure.
    ///
    /// Each probe that leaves the socket counts as progress.
    pub async fn run(&self, progress: Progress) -> anyhow::Result<()> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))
            .await
            .context("Failed to bind discovery socket")?;
        socket
            .set_broadcast(true)
            .context("Failed to enable broadcast on discovery socket")?;
        debug!("Discovery socket bound to {}", socket.local_addr()?);

        let mut buf = vec![0u8; 2048];

        loop {
            let sent = socket
                .send_to(DISCOVERY_PAYLOAD, self.target)
                .await
                .with_context(|| format!("Failed to send discovery probe to {}", self.target))?;
            progress.report();
            if sent != DISCOVERY_PAYLOAD.len() {
                bail!("Discovery probe truncated: sent {} of {} bytes", sent, DISCOVERY_PAYLOAD.len());
            }

            let (min, max) = self.interval;
            let pause = tokio::time::sleep(random_duration(min, max));
            tokio::pin!(pause);

            loop {
                tokio::select! {
                    _ = &mut pause => break,
                    received = socket.recv_from(&mut buf) => {
                        let (n, from) = received.context("Failed to receive discovery reply")?;
                        self.handle_reply(&buf[..n], from);
                    }
                }
            }
        }
    }

    /// Record the unit described by one reply, returning its address
    pub fn handle_reply(&self, reply: &[u8], from: SocketAddr) -> Option<MacAddress> {
        let values = parse_values(&String::from_utf8_lossy(reply));
        let raw = values.get("mac")?;

        let mac: MacAddress = match raw.parse() {
            Ok(mac) => mac,
            Err(e) => {
                debug!("Ignoring discovery reply from {}: {}", from, e);
                return None;
            }
        };

        let host = from.ip().to_string();
        if self.hosts.insert(mac, host.clone()) {
            info!("Found AC device {} at {}", mac, host);
        }
        Some(mac)
    }
}
