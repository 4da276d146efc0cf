//! Pipeline domain model

use crate::core::{state::PipelineState, step::Step};
use serde::Serialize;
use std::collections::HashSet;

/// An ordered deployment pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Provisioning steps, in execution order
    steps: Vec<Step>,

    /// Teardown run before the first provisioning step
    cleanup: Option<Step>,

    /// Whether the caller asked for the teardown
    cleanup_enabled: bool,

    /// Execution state
    pub state: PipelineState,
}

/// One line of a pipeline's execution plan
#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub index: usize,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness: Option<PlannedWait>,
}

/// Readiness wait as shown in a plan
#[derive(Debug, Clone, Serialize)]
pub struct PlannedWait {
    pub description: String,
    pub target: String,
    pub poll_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Pipeline {
    /// Create a pipeline from an ordered list of steps
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
            cleanup: None,
            cleanup_enabled: false,
            state: PipelineState::new(),
        }
    }

    /// Register a teardown pre-step, run only when `enabled`
    pub fn with_cleanup(mut self, step: Step, enabled: bool) -> Self {
        self.cleanup = Some(step);
        self.cleanup_enabled = enabled;
        self
    }

    /// Get a step by name
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.sequence().find(|s| s.name == name)
    }

    /// The steps a run will execute: the teardown (if enabled) followed by
    /// the provisioning steps
    pub fn sequence(&self) -> impl Iterator<Item = &Step> {
        self.cleanup
            .iter()
            .filter(|_| self.cleanup_enabled)
            .chain(self.steps.iter())
    }

    /// Names of the steps a run will execute
    pub fn step_names(&self) -> Vec<String> {
        self.sequence().map(|s| s.name.clone()).collect()
    }

    /// Check that step names are unique
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for step in self.cleanup.iter().chain(self.steps.iter()) {
            if !seen.insert(step.name.as_str()) {
                return Err(format!("Duplicate step name: {}", step.name));
            }
        }
        Ok(())
    }

    /// Describe what a run would execute, without running anything
    pub fn plan(&self) -> Vec<PlannedStep> {
        self.sequence()
            .enumerate()
            .map(|(i, step)| PlannedStep {
                index: i + 1,
                name: step.name.clone(),
                readiness: step.readiness.as_ref().map(|c| PlannedWait {
                    description: c.description.clone(),
                    target: c.target.to_string(),
                    poll_interval_secs: c.poll_interval.as_secs(),
                    timeout_secs: c.timeout.as_secs(),
                }),
            })
            .collect()
    }
}
