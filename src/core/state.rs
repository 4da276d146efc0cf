//! Execution state models

use crate::core::condition::WaitReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every step completed
    Completed,
    /// A step requested an early, successful exit
    Stopped,
    /// A step failed and the run was aborted
    Aborted,
}

/// State of a single step
#[derive(Debug, Clone, Serialize)]
pub enum StepState {
    /// Step has not run yet
    Pending,
    /// Step action is running
    Running { started_at: DateTime<Utc> },
    /// Step action finished; waiting for its readiness condition
    Waiting {
        started_at: DateTime<Utc>,
        condition: String,
    },
    /// Step completed (including its readiness wait)
    Completed {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        wait: Option<WaitReport>,
    },
    /// Step failed and aborted the run
    Failed {
        error: String,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    /// Step never ran because the run ended before it
    Skipped { reason: String },
}

/// Bookkeeping for one step of a run
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub state: StepState,
}

/// Terminal value of a run that did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PipelineOutcome {
    /// Every step ran to completion
    Completed { steps_run: usize },
    /// A step ended the run early on purpose
    Stopped { step: String, reason: String },
}

/// Overall pipeline state
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed, stopped or aborted
    pub completed_at: Option<DateTime<Utc>>,

    /// One record per executed-or-skipped step, in run order
    pub steps: Vec<StepRecord>,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            steps: Vec::new(),
        }
    }

    /// Mark pipeline as started with the given step sequence under a fresh
    /// execution ID
    pub fn start(&mut self, step_names: &[String]) {
        self.execution_id = Uuid::new_v4();
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
        self.steps = step_names
            .iter()
            .map(|name| StepRecord {
                name: name.clone(),
                state: StepState::Pending,
            })
            .collect();
    }

    /// Update the state of the step at `index`
    pub fn set_step_state(&mut self, index: usize, state: StepState) {
        if let Some(record) = self.steps.get_mut(index) {
            record.state = state;
        }
    }

    /// Mark every still-pending step as skipped
    pub fn skip_remaining(&mut self, reason: &str) {
        for record in &mut self.steps {
            if matches!(record.state, StepState::Pending) {
                record.state = StepState::Skipped {
                    reason: reason.to_string(),
                };
            }
        }
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.status = ExecutionStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as stopped early
    pub fn stop(&mut self) {
        self.status = ExecutionStatus::Stopped;
        self.completed_at = Some(Utc::now());
    }

    /// Mark pipeline as aborted
    pub fn abort(&mut self) {
        self.status = ExecutionStatus::Aborted;
        self.completed_at = Some(Utc::now());
    }

    /// Number of steps that completed
    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|r| matches!(r.state, StepState::Completed { .. }))
            .count()
    }

    /// Calculate progress percentage (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.completed_steps() as f64 / self.steps.len() as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
