//! Status probes that count lines of command output

use crate::core::condition::Probe;
use crate::error::DeployError;
use crate::execution::{CommandExecutor, CommandSpec, ExecOptions};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Mutex;
use tracing::debug;

/// Which output lines a [`CommandCountProbe`] counts
#[derive(Debug, Clone)]
pub enum LineFilter {
    /// Every non-empty line
    All,
    /// Non-empty lines the pattern matches
    Matching(Regex),
    /// Non-empty lines the pattern does not match
    NotMatching(Regex),
}

impl LineFilter {
    pub fn matching(pattern: &str) -> Result<Self, DeployError> {
        Ok(LineFilter::Matching(compile(pattern)?))
    }

    pub fn not_matching(pattern: &str) -> Result<Self, DeployError> {
        Ok(LineFilter::NotMatching(compile(pattern)?))
    }

    /// Lines containing `text` literally
    pub fn containing(text: &str) -> Result<Self, DeployError> {
        Self::matching(&regex::escape(text))
    }

    pub fn count(&self, output: &str) -> usize {
        let lines = output.lines().filter(|line| !line.trim().is_empty());
        match self {
            LineFilter::All => lines.count(),
            LineFilter::Matching(re) => lines.filter(|line| re.is_match(line)).count(),
            LineFilter::NotMatching(re) => lines.filter(|line| !re.is_match(line)).count(),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, DeployError> {
    Regex::new(pattern)
        .map_err(|e| DeployError::Config(format!("invalid line filter `{}`: {}", pattern, e)))
}

/// Runs a status command and reports how many output lines pass a filter.
///
/// A command that exits non-zero is a probe error, which the poller treats
/// as "not ready yet".
pub struct CommandCountProbe {
    executor: CommandExecutor,
    command: CommandSpec,
    filter: LineFilter,
    last_output: Mutex<Option<String>>,
}

impl CommandCountProbe {
    pub fn new(executor: CommandExecutor, command: CommandSpec, filter: LineFilter) -> Self {
        Self {
            executor,
            command,
            filter,
            last_output: Mutex::new(None),
        }
    }

    fn remember(&self, output: String) {
        if let Ok(mut last) = self.last_output.lock() {
            *last = Some(output);
        }
    }
}

#[async_trait]
impl Probe for CommandCountProbe {
    async fn observe(&self) -> Result<i64, DeployError> {
        let result = self
            .executor
            .execute(&self.command, ExecOptions::new().continue_on_error().quiet())
            .await?;

        if !result.success() {
            let stderr = result.stderr_text();
            self.remember(stderr.clone());
            return Err(DeployError::CommandFailed {
                command: self.command.to_string(),
                exit_status: result.exit_status,
                stderr: stderr.trim().to_string(),
            });
        }

        let stdout = result.stdout_text();
        let count = self.filter.count(&stdout);
        debug!("`{}` counted {} lines", self.command, count);
        self.remember(stdout);
        Ok(count as i64)
    }

    async fn diagnostics(&self) -> Option<String> {
        self.last_output.lock().ok().and_then(|last| last.clone())
    }
}
