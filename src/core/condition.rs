//! Readiness condition model

use crate::error::DeployError;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Supplies the observed count a condition is evaluated against
#[async_trait]
pub trait Probe: Send + Sync {
    /// Observe the current count (e.g. pods currently not Running)
    async fn observe(&self) -> Result<i64, DeployError>;

    /// Raw state worth dumping when a wait gives up
    async fn diagnostics(&self) -> Option<String> {
        None
    }
}

/// One probe result as seen by the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Observation {
    /// A usable, non-negative count
    Count(u64),
    /// The probe failed or produced something that is not a count
    Unavailable,
}

impl Observation {
    /// Convert a probe result into an observation.
    ///
    /// Errors become `Unavailable`; negative counts clamp to zero.
    pub fn from_probe(result: Result<i64, DeployError>) -> Self {
        match result {
            Ok(count) => Observation::Count(count.max(0) as u64),
            Err(_) => Observation::Unavailable,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Count(n) => write!(f, "{}", n),
            Observation::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Predicate over an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Count reaches at least the required number
    AtLeast(u64),
    /// Count of not-yet-ready entities drops to exactly zero
    Zero,
}

impl Target {
    /// Check whether the observation satisfies this target
    pub fn is_satisfied(&self, observed: Observation) -> bool {
        match (self, observed) {
            (_, Observation::Unavailable) => false,
            (Target::AtLeast(required), Observation::Count(n)) => n >= *required,
            (Target::Zero, Observation::Count(n)) => n == 0,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::AtLeast(n) => write!(f, ">= {}", n),
            Target::Zero => write!(f, "== 0"),
        }
    }
}

/// A polling rule: probe, target, interval and timeout
#[derive(Clone)]
pub struct Condition {
    /// Human-readable description used in logs and errors
    pub description: String,

    /// Source of observations
    pub probe: Arc<dyn Probe>,

    /// Predicate the observation must satisfy
    pub target: Target,

    /// Sleep between probes
    pub poll_interval: Duration,

    /// Wait budget
    pub timeout: Duration,
}

impl Condition {
    /// Wait until the probe's count reaches at least `required`
    pub fn count_reaches(
        description: impl Into<String>,
        probe: Arc<dyn Probe>,
        required: u64,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            description: description.into(),
            probe,
            target: Target::AtLeast(required),
            poll_interval,
            timeout,
        }
    }

    /// Wait until the probe's count of not-ready entities reaches zero
    pub fn count_reaches_zero(
        description: impl Into<String>,
        probe: Arc<dyn Probe>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            description: description.into(),
            probe,
            target: Target::Zero,
            poll_interval,
            timeout,
        }
    }
}

/// Result of a satisfied wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaitReport {
    /// Number of probes issued, including the satisfying one
    pub probes: usize,

    /// Accumulated poll intervals slept before the condition held
    pub elapsed: Duration,

    /// The satisfying observation
    pub observed: Observation,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("description", &self.description)
            .field("target", &self.target)
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
