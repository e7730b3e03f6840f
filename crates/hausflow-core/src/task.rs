/*!
 * Supervision for long-lived network loops.
 *
 * [`run_forever`] re-invokes one attempt of a logically infinite loop
 * forever. After a failure it sleeps for
 * `min(max, base_ms ^ failures) * uniform(0.5, 1.5)` before trying again.
 * The attempt receives a [`Progress`] handle; reporting progress resets the
 * failure count, so a loop that ran fine for hours before failing restarts
 * quickly.
 */
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Base of the exponential delay, in milliseconds
pub const DEFAULT_BASE_DELAY_MS: f64 = 100.0;

/// Upper bound of the delay before jitter
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry delay policy for [`run_forever`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Base of the exponent, in milliseconds
    pub base_ms: f64,
    /// Cap applied before jitter
    pub max: Duration,
    /// Jitter factor range; the capped delay is multiplied by a uniform
    /// sample from `[jitter.0, jitter.1)`
    pub jitter: (f64, f64),
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_BASE_DELAY_MS,
            max: DEFAULT_MAX_DELAY,
            jitter: (0.5, 1.5),
        }
    }
}

impl BackoffPolicy {
    /// Delay before jitter after `failures` consecutive failures
    pub fn base_delay(&self, failures: u32) -> Duration {
        let exponent = failures.min(i32::MAX as u32) as i32;
        let millis = self.base_ms.powi(exponent);
        let max_millis = self.max.as_secs_f64() * 1000.0;

        if !millis.is_finite() || millis < 0.0 || millis > max_millis {
            self.max
        } else {
            Duration::from_secs_f64(millis / 1000.0)
        }
    }

    /// Jittered delay after `failures` consecutive failures
    pub fn delay(&self, failures: u32) -> Duration {
        let base = self.base_delay(failures);
        let (low, high) = self.jitter;
        if high <= low {
            return base.mul_f64(low.max(0.0));
        }
        let factor = rand::thread_rng().gen_range(low..high);
        base.mul_f64(factor)
    }
}

/// Handle passed to each attempt for reporting successful work
#[derive(Debug, Clone, Default)]
pub struct Progress {
    failures: Arc<AtomicU32>,
}

impl Progress {
    /// Create a fresh handle with no recorded failures
    pub fn new() -> Self {
        Self::default()
    }

    /// Record successful work, resetting the failure count
    pub fn report(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    /// Consecutive failures since the last report
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }
}

/// Run `attempt` forever, backing off after failures.
///
/// An attempt that returns `Ok(())` is restarted immediately.
pub async fn run_forever<F, Fut>(name: &str, policy: BackoffPolicy, mut attempt: F)
where
    F: FnMut(Progress) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let progress = Progress::new();

    loop {
        match attempt(progress.clone()).await {
            Ok(()) => {
                debug!("Task '{}' attempt finished, restarting", name);
            }
            Err(e) => {
                let failures = progress.record_failure();
                let delay = policy.delay(failures);
                warn!(
                    "Task '{}' failed ({} in a row), delaying {:?}: {:#}",
                    name, failures, delay, e
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Spawn [`run_forever`] on the current runtime
pub fn spawn_supervised<F, Fut>(name: impl Into<String>, policy: BackoffPolicy, attempt: F) -> JoinHandle<()>
where
    F: FnMut(Progress) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move { run_forever(&name, policy, attempt).await })
}
