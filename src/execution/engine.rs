//! Pipeline runner - executes steps in order and gates them on readiness

use crate::{
    core::{
        config::RuntimeSettings, ExecutionStatus, Pipeline, PipelineOutcome, Step, StepOutcome,
        StepState, WaitReport,
    },
    error::DeployError,
    execution::poller::ConditionPoller,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        pipeline_name: String,
        total_steps: usize,
    },
    StepStarted {
        index: usize,
        name: String,
    },
    WaitStarted {
        step: String,
        description: String,
        target: String,
        timeout: Duration,
    },
    WaitFinished {
        step: String,
        report: WaitReport,
    },
    StepCompleted {
        index: usize,
        name: String,
    },
    StepFailed {
        index: usize,
        name: String,
        error: String,
    },
    PipelineStopped {
        execution_id: Uuid,
        step: String,
        reason: String,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Runs a pipeline one step at a time
pub struct PipelineRunner {
    poller: ConditionPoller,
    settings: RuntimeSettings,
    event_handlers: Vec<EventHandler>,
}

impl PipelineRunner {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            poller: ConditionPoller::new(),
            settings,
            event_handlers: Vec::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(&event);
        }
    }

    /// Execute the pipeline.
    ///
    /// Returns the outcome of a run that did not fail. The first failing
    /// step aborts the run with [`DeployError::RunAborted`]; steps after it
    /// are never invoked and steps before it are not undone.
    pub async fn run(&self, pipeline: &mut Pipeline) -> Result<PipelineOutcome, DeployError> {
        pipeline.validate().map_err(DeployError::Config)?;

        let steps: Vec<Step> = pipeline.sequence().cloned().collect();
        let names: Vec<String> = steps.iter().map(|s| s.name.clone()).collect();
        pipeline.state.start(&names);
        let execution_id = pipeline.state.execution_id;

        info!(
            "Starting pipeline {} ({}) with {} steps",
            pipeline.name,
            execution_id,
            steps.len()
        );
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            pipeline_name: pipeline.name.clone(),
            total_steps: steps.len(),
        });

        for (index, step) in steps.iter().enumerate() {
            match self.run_step(pipeline, index, steps.len(), step).await {
                Ok(StepOutcome::Continue) => {}
                Ok(StepOutcome::Stop { reason }) => {
                    info!("Stopping after {}: {}", step.name, reason);
                    pipeline
                        .state
                        .skip_remaining(&format!("run stopped at {}", step.name));
                    pipeline.state.stop();
                    self.emit_event(ExecutionEvent::PipelineStopped {
                        execution_id,
                        step: step.name.clone(),
                        reason: reason.clone(),
                    });
                    return Ok(PipelineOutcome::Stopped {
                        step: step.name.clone(),
                        reason,
                    });
                }
                Err(cause) => {
                    error!("Step {} ({}) failed: {}", index + 1, step.name, cause);
                    pipeline
                        .state
                        .skip_remaining(&format!("run aborted at {}", step.name));
                    pipeline.state.abort();
                    self.emit_event(ExecutionEvent::StepFailed {
                        index,
                        name: step.name.clone(),
                        error: cause.to_string(),
                    });
                    self.emit_event(ExecutionEvent::PipelineCompleted {
                        execution_id,
                        status: ExecutionStatus::Aborted,
                    });
                    return Err(DeployError::RunAborted {
                        step_index: index + 1,
                        step_name: step.name.clone(),
                        cause: Box::new(cause),
                    });
                }
            }
        }

        pipeline.state.complete();
        info!("Pipeline {} completed", pipeline.name);
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id,
            status: ExecutionStatus::Completed,
        });

        Ok(PipelineOutcome::Completed {
            steps_run: steps.len(),
        })
    }

    /// Run one step's action and, if it continues, its readiness wait
    async fn run_step(
        &self,
        pipeline: &mut Pipeline,
        index: usize,
        total: usize,
        step: &Step,
    ) -> Result<StepOutcome, DeployError> {
        let started_at = Utc::now();
        pipeline
            .state
            .set_step_state(index, StepState::Running { started_at });
        info!("[{}/{}] {}", index + 1, total, step.name);
        self.emit_event(ExecutionEvent::StepStarted {
            index,
            name: step.name.clone(),
        });

        let outcome = match step.action.run().await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_failure(pipeline, index, started_at, &e);
                return Err(e);
            }
        };

        let mut wait = None;
        if let (StepOutcome::Continue, Some(condition)) = (&outcome, &step.readiness) {
            pipeline.state.set_step_state(
                index,
                StepState::Waiting {
                    started_at,
                    condition: condition.description.clone(),
                },
            );
            self.emit_event(ExecutionEvent::WaitStarted {
                step: step.name.clone(),
                description: condition.description.clone(),
                target: condition.target.to_string(),
                timeout: condition.timeout,
            });

            let report = match self.poller.wait_until(condition).await {
                Ok(report) => report,
                Err(e) => {
                    self.record_failure(pipeline, index, started_at, &e);
                    return Err(e);
                }
            };
            self.emit_event(ExecutionEvent::WaitFinished {
                step: step.name.clone(),
                report,
            });
            wait = Some(report);
        }

        let completed_at = Utc::now();
        pipeline.state.set_step_state(
            index,
            StepState::Completed {
                started_at,
                completed_at,
                wait,
            },
        );

        let took = (completed_at - started_at).num_milliseconds();
        if self.settings.verbose {
            info!("{} finished in {}ms", step.name, took);
        } else {
            debug!("{} finished in {}ms", step.name, took);
        }
        self.emit_event(ExecutionEvent::StepCompleted {
            index,
            name: step.name.clone(),
        });

        Ok(outcome)
    }

    fn record_failure(
        &self,
        pipeline: &mut Pipeline,
        index: usize,
        started_at: chrono::DateTime<Utc>,
        error: &DeployError,
    ) {
        pipeline.state.set_step_state(
            index,
            StepState::Failed {
                error: error.to_string(),
                started_at,
                failed_at: Utc::now(),
            },
        );
    }
}
