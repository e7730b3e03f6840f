/*!
 * Debounced state reporting.
 *
 * Change events are coalesced per device into a pending batch. The upload
 * loop waits for the batch to become non-empty, lets more changes gather for
 * the aggregation window, then swaps the batch out and posts it in a single
 * request. A failed upload fails the loop attempt; the batch is not requeued.
 */
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use hausflow_core::config::ReportingConfig;
use hausflow_core::event::Subscription;
use hausflow_core::queue::CoalescingQueue;
use hausflow_core::task::{spawn_supervised, BackoffPolicy, Progress};
use hausflow_core::types::{ChangeEvent, DeviceState, MacAddress};
use hausflow_core::utils::random_hex;

/// Supplier of bearer tokens for the reporting endpoint
#[async_trait]
pub trait TokenSource: Send + Sync + Debug {
    /// Current token
    async fn token(&self) -> anyhow::Result<String>;
}

/// A fixed token obtained out of band
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Wrap a token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

/// Body of a state report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    /// Account the devices belong to
    pub agent_user_id: String,
    /// Unique id of this report
    pub request_id: String,
    /// Reported states
    pub payload: ReportPayload,
}

/// `{devices: {states: {...}}}`
#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload {
    /// Reported devices
    pub devices: ReportStates,
}

/// States keyed by device id
#[derive(Debug, Clone, Serialize)]
pub struct ReportStates {
    /// Latest state per device
    pub states: BTreeMap<String, DeviceState>,
}

/// Coalescing uploader of device state changes
#[derive(Debug)]
pub struct ChangeReporter {
    pending: CoalescingQueue<MacAddress, DeviceState>,
    http: reqwest::Client,
    endpoint: String,
    agent_user_id: String,
    tokens: Arc<dyn TokenSource>,
    window: Duration,
    request_suffix: String,
    next_request: AtomicU64,
}

impl ChangeReporter {
    /// Create a reporter posting to the configured endpoint
    pub fn new(
        http: reqwest::Client,
        config: &ReportingConfig,
        agent_user_id: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            pending: CoalescingQueue::new(),
            http,
            endpoint: config.endpoint.clone(),
            agent_user_id: agent_user_id.into(),
            tokens,
            window: config.aggregate_window(),
            request_suffix: random_hex(4),
            next_request: AtomicU64::new(0),
        }
    }

    /// Queue a change. Events that did not change the device are ignored.
    pub fn record(&self, event: &ChangeEvent) -> bool {
        if !event.is_change {
            return false;
        }
        self.pending.insert(event.id, event.state.clone());
        true
    }

    /// Number of devices waiting to be reported
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Feed `changes` into the pending batch until the bus closes
    pub fn spawn_collector(self: &Arc<Self>, mut changes: Subscription<ChangeEvent>) -> JoinHandle<()> {
        let reporter = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = changes.recv().await {
                reporter.record(&event);
            }
            debug!("Change bus closed, collector exiting");
        })
    }

    /// Start the collector and the supervised upload loop
    pub fn start(self: Arc<Self>, changes: Subscription<ChangeEvent>) -> Vec<JoinHandle<()>> {
        let collector = self.spawn_collector(changes);
        let uploader = spawn_supervised("reporting", BackoffPolicy::default(), move |progress| {
            let reporter = Arc::clone(&self);
            async move { reporter.run(progress).await }
        });
        vec![collector, uploader]
    }

    /// One attempt of the upload loop; only returns on failure
    pub async fn run(&self, progress: Progress) -> anyhow::Result<()> {
        loop {
            self.flush_next().await?;
            progress.report();
        }
    }

    /// Wait for pending changes, aggregate, and upload one batch.
    /// Returns the number of devices reported.
    pub async fn flush_next(&self) -> anyhow::Result<usize> {
        self.pending.wait_for_non_empty().await;
        tokio::time::sleep(self.window).await;

        let batch: BTreeMap<String, DeviceState> = self
            .pending
            .drain()
            .into_iter()
            .map(|(id, state)| (id.to_string(), state))
            .collect();
        let count = batch.len();
        self.upload(batch).await?;
        Ok(count)
    }

    async fn upload(&self, states: BTreeMap<String, DeviceState>) -> anyhow::Result<()> {
        let request_id = format!(
            "{}_r{}",
            self.next_request.fetch_add(1, Ordering::SeqCst) + 1,
            self.request_suffix
        );
        info!("Reporting {} device states ({})", states.len(), request_id);

        let body = ReportRequest {
            agent_user_id: self.agent_user_id.clone(),
            request_id,
            payload: ReportPayload {
                devices: ReportStates { states },
            },
        };

        let token = self.tokens.token().await.context("no reporting token")?;
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .context("reporting request failed")?;

        let status = response.status();
        if status != StatusCode::OK {
            bail!("reporting endpoint answered {}", status);
        }
        Ok(())
    }
}
