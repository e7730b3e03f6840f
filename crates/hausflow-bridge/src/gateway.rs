/*!
 * Gateway assembly.
 *
 * Builds the registry and adapters from configuration, binds the beacon,
 * action and push listeners, and starts the supervised background loops.
 */
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use hausflow_core::config::Config;
use hausflow_core::task::{spawn_supervised, BackoffPolicy};
use hausflow_core::utils::spawn_and_log;
use hausflow_devices::{AcDiscovery, AdapterContext, BeaconServer, ConnectionSet, DeviceRegistry};

use crate::error::Result;
use crate::http::serve_actions;
use crate::push::serve_push;
use crate::reporting::{ChangeReporter, StaticToken};
use crate::smarthome::SmartHome;

/// A running gateway
#[derive(Debug)]
pub struct Gateway {
    registry: Arc<DeviceRegistry>,
    connections: Arc<ConnectionSet>,
    beacon_addr: SocketAddr,
    action_addr: SocketAddr,
    push_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl Gateway {
    /// Bind every listener and start all background tasks
    pub async fn start(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.daikin.http_timeout())
            .build()?;

        let connections = Arc::new(ConnectionSet::new());
        let ctx = AdapterContext::new(connections.clone(), http.clone());
        let registry = Arc::new(DeviceRegistry::new(config.device_descriptors(), &ctx));
        let mut tasks = Vec::new();

        let beacons =
            BeaconServer::bind(config.beacon.bind_addr, connections.clone(), registry.clone()).await?;
        let beacon_addr = beacons.local_addr()?;
        tasks.push(tokio::spawn(beacons.run()));

        let smarthome = Arc::new(SmartHome::new(
            registry.clone(),
            config.bridge.agent_user_id.clone(),
        ));
        let listener = TcpListener::bind(config.bridge.action_addr).await?;
        let action_addr = listener.local_addr()?;
        tasks.push(spawn_and_log("actions", serve_actions(listener, smarthome)));

        let listener = TcpListener::bind(config.bridge.push_addr).await?;
        let push_addr = listener.local_addr()?;
        tasks.push(spawn_and_log("push", serve_push(listener, registry.clone())));

        if config.daikin.discovery_enabled {
            let discovery = Arc::new(AcDiscovery::new(ctx.ac_hosts.clone(), &config.daikin));
            tasks.push(spawn_supervised(
                "discovery",
                BackoffPolicy::default(),
                move |progress| {
                    let discovery = discovery.clone();
                    async move { discovery.run(progress).await }
                },
            ));
        }

        if config.reporting.enabled {
            match &config.reporting.token {
                Some(token) => {
                    let reporter = Arc::new(ChangeReporter::new(
                        http,
                        &config.reporting,
                        config.bridge.agent_user_id.clone(),
                        Arc::new(StaticToken::new(token.clone())),
                    ));
                    tasks.extend(reporter.start(registry.subscribe()));
                }
                None => warn!("No reporting token configured, state reporting disabled"),
            }
        }

        info!(
            "Gateway started with {} devices (beacons {}, actions {}, push {})",
            registry.len(),
            beacon_addr,
            action_addr,
            push_addr
        );

        Ok(Self {
            registry,
            connections,
            beacon_addr,
            action_addr,
            push_addr,
            tasks,
        })
    }

    /// The device registry
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Number of connected beacon relays
    pub fn relay_count(&self) -> usize {
        self.connections.len()
    }

    /// Bound beacon transport address
    pub fn beacon_addr(&self) -> SocketAddr {
        self.beacon_addr
    }

    /// Bound action endpoint address
    pub fn action_addr(&self) -> SocketAddr {
        self.action_addr
    }

    /// Bound push channel address
    pub fn push_addr(&self) -> SocketAddr {
        self.push_addr
    }

    /// Stop every background task
    pub fn shutdown(self) {
        info!("Stopping gateway");
        for task in self.tasks {
            task.abort();
        }
    }
}
