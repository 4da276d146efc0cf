//! Condition poller - waits for external state to converge

use crate::core::condition::{Condition, Observation, WaitReport};
use crate::error::DeployError;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Polls a condition's probe until its target holds or its budget runs out.
///
/// Elapsed time is the sum of poll intervals slept, not wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionPoller;

impl ConditionPoller {
    pub fn new() -> Self {
        Self
    }

    /// Block until `condition` is satisfied
    pub async fn wait_until(&self, condition: &Condition) -> Result<WaitReport, DeployError> {
        let mut elapsed = Duration::ZERO;
        let mut probes = 0usize;
        let mut previous: Option<Observation> = None;

        info!(
            "Waiting for {} (target {}, every {}s, up to {}s)",
            condition.description,
            condition.target,
            condition.poll_interval.as_secs(),
            condition.timeout.as_secs()
        );

        loop {
            let result = condition.probe.observe().await;
            if let Err(e) = &result {
                debug!("Probe for {} failed: {}", condition.description, e);
            }
            let observed = Observation::from_probe(result);
            probes += 1;

            if condition.target.is_satisfied(observed) {
                info!(
                    "{} satisfied ({}) after {}s",
                    condition.description,
                    observed,
                    elapsed.as_secs()
                );
                return Ok(WaitReport {
                    probes,
                    elapsed,
                    observed,
                });
            }

            if elapsed >= condition.timeout {
                if let Some(dump) = condition.probe.diagnostics().await {
                    warn!("Last status for {}:\n{}", condition.description, dump);
                }
                return Err(DeployError::TimeoutExceeded {
                    condition: condition.description.clone(),
                    elapsed,
                    last_observed: observed,
                });
            }

            if previous != Some(observed) {
                info!(
                    "{}: observed {}, want {} ({}s elapsed)",
                    condition.description,
                    observed,
                    condition.target,
                    elapsed.as_secs()
                );
            } else {
                debug!(
                    "{}: still {} ({}s elapsed)",
                    condition.description,
                    observed,
                    elapsed.as_secs()
                );
            }
            previous = Some(observed);

            tokio::time::sleep(condition.poll_interval).await;
            elapsed += condition.poll_interval;
        }
    }
}
