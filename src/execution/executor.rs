//! Command executor - runs external commands and applies the failure policy

use crate::core::config::RuntimeSettings;
use crate::error::DeployError;
use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A command to run: an argument vector or a shell string for `sh -c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSpec {
    /// Program followed by its arguments
    Args(Vec<String>),
    /// Shell command line (pipes, redirections, substitutions)
    Shell(String),
}

impl CommandSpec {
    /// Build an argument-vector command
    pub fn args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::Args(args.into_iter().map(Into::into).collect())
    }

    /// Build a shell command
    pub fn shell(line: impl Into<String>) -> Self {
        CommandSpec::Shell(line.into())
    }

    /// Prefix the command with `sudo`
    pub fn privileged(self) -> Self {
        match self {
            CommandSpec::Args(mut args) => {
                args.insert(0, "sudo".to_string());
                CommandSpec::Args(args)
            }
            CommandSpec::Shell(line) => CommandSpec::Shell(format!("sudo {}", line)),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Args(args) => {
                let quoted: Vec<String> = args.iter().map(|a| quote_arg(a)).collect();
                write!(f, "{}", quoted.join(" "))
            }
            CommandSpec::Shell(line) => write!(f, "{}", line),
        }
    }
}

/// Quote a single argument as a shell word
pub(crate) fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    const SHELL_META: &[char] = &[
        ' ', '\t', '\n', '\'', '"', '\\', '$', '`', '!', '*', '?', '[', ']', '(', ')', '{', '}',
        '<', '>', '|', '&', ';', '#', '~',
    ];

    if !arg.contains(SHELL_META) {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Per-call executor options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Don't log stderr of a failed command
    pub suppress_error_log: bool,

    /// Return the result instead of failing on non-zero exit
    pub continue_on_error: bool,

    /// Kill the command if it runs longer than this
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand non-zero exits back to the caller
    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Don't log stderr on failure
    pub fn quiet(mut self) -> Self {
        self.suppress_error_log = true;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Captured result of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exit code, or -1 if the process was killed by a signal
    pub exit_status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecutionResult {
    /// A successful result with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_status: 0,
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// A failed result with the given exit status and stderr
    pub fn failed(exit_status: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_status,
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_status == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Spawns processes. Implementations never interpret exit codes.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, DeployError>;
}

/// Runs commands as child processes of this one
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        limit: Option<Duration>,
    ) -> Result<ExecutionResult, DeployError> {
        let mut process = match command {
            CommandSpec::Args(args) => {
                let (program, rest) = args.split_first().ok_or_else(|| DeployError::Spawn {
                    command: String::new(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
                })?;
                let mut process = Command::new(program);
                process.args(rest);
                process
            }
            CommandSpec::Shell(line) => {
                let mut process = Command::new("sh");
                process.args(["-c", line.as_str()]);
                process
            }
        };
        process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match limit {
            Some(limit) => timeout(limit, process.output())
                .await
                .map_err(|_| DeployError::CommandTimedOut {
                    command: command.to_string(),
                    timeout: limit,
                })?,
            None => process.output().await,
        }
        .map_err(|source| DeployError::Spawn {
            command: command.to_string(),
            source,
        })?;

        Ok(ExecutionResult {
            exit_status: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Runs commands through a [`CommandRunner`] and turns non-zero exits into
/// errors unless told otherwise
#[derive(Clone)]
pub struct CommandExecutor {
    runner: Arc<dyn CommandRunner>,
    settings: RuntimeSettings,
    default_timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: RuntimeSettings) -> Self {
        Self {
            runner,
            settings,
            default_timeout: None,
        }
    }

    /// Executor backed by real child processes
    pub fn system(settings: RuntimeSettings) -> Self {
        Self::new(Arc::new(SystemRunner), settings)
    }

    /// Bound every command that doesn't set its own timeout
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Run a command with default options (fail on non-zero exit)
    pub async fn run(&self, command: &CommandSpec) -> Result<ExecutionResult, DeployError> {
        self.execute(command, ExecOptions::default()).await
    }

    /// Run a command and apply the failure policy in `options`
    pub async fn execute(
        &self,
        command: &CommandSpec,
        options: ExecOptions,
    ) -> Result<ExecutionResult, DeployError> {
        if self.settings.verbose {
            info!("Running: {}", command);
        } else {
            debug!("Running: {}", command);
        }

        let limit = options.timeout.or(self.default_timeout);
        let result = self.runner.run(command, limit).await?;

        if !result.stdout.is_empty() {
            if self.settings.verbose {
                info!("stdout: {}", result.stdout_text().trim_end());
            } else {
                debug!("stdout: {}", result.stdout_text().trim_end());
            }
        }

        if result.success() {
            return Ok(result);
        }

        if !options.suppress_error_log {
            warn!(
                "`{}` exited with status {}: {}",
                command,
                result.exit_status,
                result.stderr_text().trim()
            );
        }

        if options.continue_on_error {
            return Ok(result);
        }

        Err(DeployError::CommandFailed {
            command: command.to_string(),
            exit_status: result.exit_status,
            stderr: result.stderr_text().trim().to_string(),
        })
    }
}

impl fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("settings", &self.settings)
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Runner returning a canned result and remembering the timeout it got
    struct Canned {
        result: ExecutionResult,
        seen_timeout: Mutex<Option<Duration>>,
    }

    #[async_trait]
    impl CommandRunner for Canned {
        async fn run(
            &self,
            _command: &CommandSpec,
            timeout: Option<Duration>,
        ) -> Result<ExecutionResult, DeployError> {
            *self.seen_timeout.lock().unwrap() = timeout;
            Ok(self.result.clone())
        }
    }

    fn system() -> CommandExecutor {
        CommandExecutor::system(RuntimeSettings::default())
    }

    #[test]
    fn test_display_quotes_args() {
        let cmd = CommandSpec::args(["kubectl", "label", "node", "aio", "kolla_compute=true"]);
        assert_eq!(cmd.to_string(), "kubectl label node aio kolla_compute=true");

        let cmd = CommandSpec::args(["sed", "-i", "s/a b/c/g", "/etc/x"]);
        assert_eq!(cmd.to_string(), "sed -i 's/a b/c/g' /etc/x");
        assert_eq!(CommandSpec::args(["echo", ""]).to_string(), "echo ''");
    }

    #[test]
    fn test_privileged_prefixes_sudo() {
        assert_eq!(
            CommandSpec::args(["systemctl", "daemon-reload"]).privileged(),
            CommandSpec::args(["sudo", "systemctl", "daemon-reload"])
        );
        assert_eq!(
            CommandSpec::shell("rm -rf /var/lib/kolla*").privileged(),
            CommandSpec::shell("sudo rm -rf /var/lib/kolla*")
        );
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let result = system()
            .run(&CommandSpec::args(["sh", "-c", "echo out; echo err >&2"]))
            .await
            .unwrap();
        assert_eq!(result.exit_status, 0);
        assert_eq!(result.stdout_text(), "out\n");
        assert_eq!(result.stderr_text(), "err\n");
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_with_command_and_status() {
        let err = system()
            .run(&CommandSpec::shell("echo broken >&2; exit 3"))
            .await
            .unwrap_err();

        match err {
            DeployError::CommandFailed {
                command,
                exit_status,
                stderr,
            } => {
                assert_eq!(command, "echo broken >&2; exit 3");
                assert_eq!(exit_status, 3);
                assert_eq!(stderr, "broken");
            }
            other => panic!("Expected CommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_continue_on_error_returns_result() {
        let result = system()
            .execute(
                &CommandSpec::shell("exit 4"),
                ExecOptions::new().continue_on_error().quiet(),
            )
            .await
            .unwrap();
        assert_eq!(result.exit_status, 4);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_timeout_kills_command() {
        let err = system()
            .execute(
                &CommandSpec::args(["sleep", "5"]),
                ExecOptions::new().with_timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::CommandTimedOut { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = system()
            .run(&CommandSpec::args(["definitely-not-a-real-binary-kolla"]))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_default_timeout_applies_when_unset() {
        let runner = Arc::new(Canned {
            result: ExecutionResult::ok("fine"),
            seen_timeout: Mutex::new(None),
        });
        let executor = CommandExecutor::new(runner.clone(), RuntimeSettings { verbose: true })
            .with_default_timeout(Some(Duration::from_secs(30)));

        executor.run(&CommandSpec::args(["true"])).await.unwrap();
        assert_eq!(*runner.seen_timeout.lock().unwrap(), Some(Duration::from_secs(30)));

        executor
            .execute(
                &CommandSpec::args(["true"]),
                ExecOptions::new().with_timeout(Duration::from_secs(2)),
            )
            .await
            .unwrap();
        assert_eq!(*runner.seen_timeout.lock().unwrap(), Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_policy_applies_to_any_runner() {
        let runner = Arc::new(Canned {
            result: ExecutionResult::failed(1, "no such pod"),
            seen_timeout: Mutex::new(None),
        });
        let executor = CommandExecutor::new(runner, RuntimeSettings::default());
        let cmd = CommandSpec::args(["kubectl", "get", "pods"]);

        let err = executor.run(&cmd).await.unwrap_err();
        assert!(matches!(err, DeployError::CommandFailed { exit_status: 1, .. }));

        let result = executor
            .execute(&cmd, ExecOptions::new().continue_on_error())
            .await
            .unwrap();
        assert_eq!(result.stderr_text(), "no such pod");
    }
}
