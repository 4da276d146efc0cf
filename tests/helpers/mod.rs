//! Test utilities shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use kolla_aio::core::config::{DeployConfig, RuntimeSettings};
use kolla_aio::core::{Probe, Step, StepOutcome};
use kolla_aio::execution::{CommandExecutor, CommandRunner, CommandSpec, ExecutionResult};
use kolla_aio::stages::{DeployContext, HostTarget, PipelineOptions};
use kolla_aio::DeployError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Effect = Box<dyn Fn(&CommandSpec) + Send + Sync>;

/// Mock runner that records every command and answers from canned rules.
///
/// A rule matches when its pattern occurs in the rendered command line; the
/// first matching rule wins and unmatched commands succeed with no output.
/// `curl ... -o <file>` writes the matching download body to `<file>`.
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<CommandSpec>>,
    rules: Vec<(String, ExecutionResult)>,
    downloads: Vec<(String, String)>,
    effects: Vec<(String, Effect)>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `pattern` with `result`
    pub fn respond(mut self, pattern: &str, result: ExecutionResult) -> Self {
        self.rules.push((pattern.to_string(), result));
        self
    }

    /// Body written by `curl` for URLs containing `pattern`
    pub fn download(mut self, pattern: &str, body: &str) -> Self {
        self.downloads.push((pattern.to_string(), body.to_string()));
        self
    }

    /// Run `effect` whenever a command containing `pattern` is executed
    pub fn on<F>(mut self, pattern: &str, effect: F) -> Self
    where
        F: Fn(&CommandSpec) + Send + Sync + 'static,
    {
        self.effects.push((pattern.to_string(), Box::new(effect)));
        self
    }

    /// Append `other`'s rules after this runner's, so ours take precedence
    pub fn merge(mut self, other: RecordingRunner) -> Self {
        self.rules.extend(other.rules);
        self.downloads.extend(other.downloads);
        self.effects.extend(other.effects);
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.to_string())
            .collect()
    }

    /// Index of the first recorded command containing `pattern`
    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.commands().iter().position(|c| c.contains(pattern))
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.position(pattern).is_some()
    }

    fn simulate_download(&self, command: &CommandSpec) {
        let CommandSpec::Args(args) = command else {
            return;
        };
        if args.first().map(String::as_str) != Some("curl") {
            return;
        }
        let Some(out) = args.iter().position(|a| a == "-o").and_then(|i| args.get(i + 1)) else {
            return;
        };
        let body = self
            .downloads
            .iter()
            .find(|(pattern, _)| args.iter().any(|a| a.contains(pattern.as_str())))
            .map(|(_, body)| body.clone())
            .unwrap_or_default();
        std::fs::write(out, body).unwrap();
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        _timeout: Option<Duration>,
    ) -> Result<ExecutionResult, DeployError> {
        self.commands.lock().unwrap().push(command.clone());
        let line = command.to_string();

        self.simulate_download(command);
        for (pattern, effect) in &self.effects {
            if line.contains(pattern.as_str()) {
                effect(command);
            }
        }

        Ok(self
            .rules
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| ExecutionResult::ok("")))
    }
}

/// Probe replaying scripted results, repeating the last one forever
pub struct ScriptedProbe {
    script: Vec<Result<i64, String>>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn counts(values: &[i64]) -> Arc<Self> {
        Self::new(values.iter().map(|v| Ok(*v)).collect())
    }

    pub fn new(script: Vec<Result<i64, String>>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn observe(&self) -> Result<i64, DeployError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = n.min(self.script.len() - 1);
        self.script[index]
            .clone()
            .map_err(|e| DeployError::aborted(e))
    }
}

/// Shared log of step invocations, in order
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.0.lock().unwrap().push(name.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|n| *n == name).count()
    }

    /// Step that records itself and continues
    pub fn step(&self, name: &str) -> Step {
        self.step_returning(name, Ok(StepOutcome::Continue))
    }

    /// Step that records itself and fails
    pub fn failing_step(&self, name: &str) -> Step {
        let command = format!("{}-command", name);
        self.step_with(name, move || {
            Err(DeployError::CommandFailed {
                command: command.clone(),
                exit_status: 1,
                stderr: "boom".to_string(),
            })
        })
    }

    /// Step that records itself and asks the run to stop
    pub fn stopping_step(&self, name: &str, reason: &str) -> Step {
        self.step_returning(
            name,
            Ok(StepOutcome::Stop {
                reason: reason.to_string(),
            }),
        )
    }

    fn step_returning(&self, name: &str, result: Result<StepOutcome, String>) -> Step {
        self.step_with(name, move || result.clone().map_err(DeployError::Aborted))
    }

    fn step_with<F>(&self, name: &str, result: F) -> Step
    where
        F: Fn() -> Result<StepOutcome, DeployError> + Send + Sync + 'static,
    {
        let log = self.clone();
        let label = name.to_string();
        let result = Arc::new(result);
        Step::from_fn(name, move || {
            let log = log.clone();
            let label = label.clone();
            let result = result.clone();
            async move {
                log.record(&label);
                result()
            }
        })
    }
}

/// Host used by the deployment tests
pub fn test_target() -> HostTarget {
    HostTarget {
        mgmt_int: "eth0".to_string(),
        mgmt_ip: "10.240.83.111".to_string(),
        neutron_int: "eth1".to_string(),
    }
}

/// Temporary host layout: work dir, sysctl.conf and kube config dir
pub struct Sandbox {
    pub root: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("sysctl.conf"), "vm.swappiness=10\n").unwrap();
        Self { root }
    }

    pub fn work_dir(&self) -> PathBuf {
        self.root.path().join("work")
    }

    pub fn sysctl_conf(&self) -> PathBuf {
        self.root.path().join("sysctl.conf")
    }

    /// Default configuration pointed at the sandbox
    pub fn config(&self) -> DeployConfig {
        let mut config = DeployConfig::default();
        config.paths.work_dir = self.work_dir();
        config.paths.sysctl_conf = self.sysctl_conf();
        config.paths.kube_config_dir = Some(self.root.path().join("kube"));
        config.kolla.min_chart_packages = 3;
        config
    }
}

/// Build a deploy context that runs every command through `runner`
pub fn deploy_context(
    runner: Arc<RecordingRunner>,
    config: DeployConfig,
    options: PipelineOptions,
) -> Arc<DeployContext> {
    let executor = CommandExecutor::new(runner, RuntimeSettings::default());
    Arc::new(DeployContext::new(executor, config, test_target(), options))
}
