//! kolla-aio - deploy Kubernetes and Kolla on a single host

pub mod cli;
pub mod core;
pub mod error;
pub mod execution;
pub mod stages;

// Re-export commonly used types
pub use crate::core::{Condition, ExecutionStatus, Pipeline, PipelineOutcome, Probe, Step, StepOutcome};
pub use crate::error::DeployError;
pub use crate::execution::{CommandExecutor, CommandSpec, ConditionPoller, ExecutionEvent, PipelineRunner};
pub use crate::stages::{build_pipeline, DeployContext, HostTarget, PipelineOptions};
