//! Pipeline execution: command executor, condition poller and runner

pub mod engine;
pub mod executor;
pub mod poller;

pub use engine::{EventHandler, ExecutionEvent, PipelineRunner};
pub use executor::{
    CommandExecutor, CommandRunner, CommandSpec, ExecOptions, ExecutionResult, SystemRunner,
};
pub use poller::ConditionPoller;
