//! Step domain model

use crate::core::condition::Condition;
use crate::error::DeployError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// What a step tells the runner once its action returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Proceed to the readiness wait (if any) and the next step
    Continue,
    /// End the run successfully at this step
    Stop { reason: String },
}

/// The work a step performs
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn run(&self) -> Result<StepOutcome, DeployError>;
}

/// Adapter that turns an async closure into a [`StepAction`]
pub struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> StepAction for FnAction<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutcome, DeployError>> + Send,
{
    async fn run(&self) -> Result<StepOutcome, DeployError> {
        (self.0)().await
    }
}

/// A single named step in a pipeline
#[derive(Clone)]
pub struct Step {
    /// Step name, unique within a pipeline
    pub name: String,

    /// The action to invoke
    pub action: Arc<dyn StepAction>,

    /// Readiness condition polled after the action succeeds
    pub readiness: Option<Condition>,
}

impl Step {
    /// Create a step from any action
    pub fn new(name: impl Into<String>, action: impl StepAction + 'static) -> Self {
        Self {
            name: name.into(),
            action: Arc::new(action),
            readiness: None,
        }
    }

    /// Create a step from an async closure
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<StepOutcome, DeployError>> + Send + 'static,
    {
        Self::new(name, FnAction(f))
    }

    /// Attach a readiness condition
    pub fn with_readiness(mut self, condition: Condition) -> Self {
        self.readiness = Some(condition);
        self
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("readiness", &self.readiness)
            .finish_non_exhaustive()
    }
}
