//! Concrete provisioning stages of a single-node Kubernetes + Kolla deployment
//!
//! Stages run in order:
//! 1. Host preparation (security, packages, kubelet, sysctl)
//! 2. Kubernetes bootstrap (kubeadm, canal, helm)
//! 3. Kolla configuration (sources, globals, secrets, config maps, charts)
//! 4. Helm chart installation
//!
//! Each stage is a thin sequence of [`CommandExecutor`] calls and file
//! edits. [`build_pipeline`] turns them into an ordered [`Pipeline`].

pub mod cleanup;
pub mod host;
pub mod kolla;
pub mod kubernetes;
pub mod packages;
pub mod probes;
pub mod templates;

use crate::core::config::DeployConfig;
use crate::core::{Condition, Pipeline, Step, StepOutcome};
use crate::error::DeployError;
use crate::execution::executor::quote_arg;
use crate::execution::{CommandExecutor, CommandSpec, ExecOptions, ExecutionResult};
use probes::{CommandCountProbe, LineFilter};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Name of the deployment pipeline
pub const PIPELINE_NAME: &str = "kolla-aio";

/// The host being deployed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTarget {
    /// Management interface, e.g. eth0
    pub mgmt_int: String,
    /// Address of the management interface
    pub mgmt_ip: String,
    /// Interface handed to neutron, e.g. eth1
    pub neutron_int: String,
}

/// Run-shaping switches chosen by the operator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Tear down an existing cluster before deploying
    pub cleanup: bool,
    /// Stop once the base Kubernetes platform is up
    pub kubernetes_only: bool,
    /// Wait for Enter after printing the DNS check hint
    pub pause: bool,
}

/// Everything a stage needs: the executor, configuration and target host
#[derive(Debug)]
pub struct DeployContext {
    pub executor: CommandExecutor,
    pub config: DeployConfig,
    pub target: HostTarget,
    pub options: PipelineOptions,
}

impl DeployContext {
    pub fn new(
        executor: CommandExecutor,
        config: DeployConfig,
        target: HostTarget,
        options: PipelineOptions,
    ) -> Self {
        Self {
            executor,
            config,
            target,
            options,
        }
    }

    /// Prefix `command` with sudo when configured to
    pub fn privileged(&self, command: CommandSpec) -> CommandSpec {
        if self.config.use_sudo {
            command.privileged()
        } else {
            command
        }
    }

    /// `sudo ` or nothing, for shell lines that escalate mid-pipeline
    pub fn sudo_prefix(&self) -> &'static str {
        if self.config.use_sudo {
            "sudo "
        } else {
            ""
        }
    }

    /// Run an unprivileged command, failing on non-zero exit
    pub async fn run(&self, args: &[&str]) -> Result<ExecutionResult, DeployError> {
        self.executor.run(&CommandSpec::args(args.iter().copied())).await
    }

    /// Run a privileged command, failing on non-zero exit
    pub async fn sudo(&self, args: &[&str]) -> Result<ExecutionResult, DeployError> {
        let command = self.privileged(CommandSpec::args(args.iter().copied()));
        self.executor.run(&command).await
    }

    /// Run a privileged command with explicit options
    pub async fn sudo_with(
        &self,
        args: &[&str],
        options: ExecOptions,
    ) -> Result<ExecutionResult, DeployError> {
        let command = self.privileged(CommandSpec::args(args.iter().copied()));
        self.executor.execute(&command, options).await
    }

    /// Run a shell line, failing on non-zero exit
    pub async fn shell(&self, line: impl Into<String>) -> Result<ExecutionResult, DeployError> {
        self.executor.run(&CommandSpec::shell(line)).await
    }

    /// Download `url` to `dest`
    pub async fn download(&self, url: &str, dest: &Path) -> Result<(), DeployError> {
        let dest = path_str(dest);
        self.run(&["curl", "-fsSL", url, "-o", dest.as_str()]).await?;
        Ok(())
    }

    /// Working directory for downloads, clones and rendered files
    pub fn work_dir(&self) -> &Path {
        &self.config.paths.work_dir
    }

    pub fn work_path(&self, name: &str) -> PathBuf {
        self.config.paths.work_dir.join(name)
    }

    /// Write `contents` to a file in the work directory and return its path
    pub async fn write_work_file(&self, name: &str, contents: &str) -> Result<PathBuf, DeployError> {
        tokio::fs::create_dir_all(self.work_dir()).await?;
        let path = self.work_path(name);
        tokio::fs::write(&path, contents).await?;
        debug!("Wrote {}", path.display());
        Ok(path)
    }

    /// Probe counting `kubectl get pods` lines that pass `filter`
    fn pod_probe(&self, namespace: Option<&str>, filter: LineFilter) -> Arc<CommandCountProbe> {
        let mut args = vec!["kubectl", "get", "pods", "--no-headers"];
        match namespace {
            Some(ns) => args.extend(["-n", ns]),
            None => args.push("--all-namespaces"),
        }
        Arc::new(CommandCountProbe::new(
            self.executor.clone(),
            CommandSpec::args(args),
            filter,
        ))
    }

    /// kube-system pods in Running state reach the configured minimum
    pub fn kube_system_ready(&self) -> Result<Condition, DeployError> {
        let waits = &self.config.waits;
        Ok(Condition::count_reaches(
            format!("{} kube-system pods Running", waits.kube_system_min_running),
            self.pod_probe(Some("kube-system"), LineFilter::matching(r"\bRunning\b")?),
            waits.kube_system_min_running,
            waits.kube_system.interval(),
            waits.kube_system.timeout(),
        ))
    }

    /// No pod in any namespace is outside Running state
    pub fn all_pods_running(&self) -> Result<Condition, DeployError> {
        let waits = &self.config.waits;
        Ok(Condition::count_reaches_zero(
            "all pods Running",
            self.pod_probe(None, LineFilter::not_matching(r"\bRunning\b")?),
            waits.all_running.interval(),
            waits.all_running.timeout(),
        ))
    }

    /// Both helm client and tiller report the configured version
    pub fn helm_ready(&self) -> Result<Condition, DeployError> {
        let waits = &self.config.waits;
        let version = &self.config.versions.helm;
        let probe = CommandCountProbe::new(
            self.executor.clone(),
            CommandSpec::args(["helm", "version"]),
            LineFilter::containing(version)?,
        );
        Ok(Condition::count_reaches(
            format!("helm client and server at {}", version),
            Arc::new(probe),
            2,
            waits.helm_ready.interval(),
            waits.helm_ready.timeout(),
        ))
    }
}

/// Render a path for a command line
pub(crate) fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Render a path as a single word of a shell line
pub(crate) fn shell_path(path: &Path) -> String {
    quote_arg(&path_str(path))
}

/// Wrap a stage function as a step that always continues
fn stage<F, Fut>(ctx: &Arc<DeployContext>, name: &str, f: F) -> Step
where
    F: Fn(Arc<DeployContext>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DeployError>> + Send + 'static,
{
    let ctx = ctx.clone();
    Step::from_fn(name, move || {
        let run = f(ctx.clone());
        async move {
            run.await?;
            Ok(StepOutcome::Continue)
        }
    })
}

/// Build the full deployment pipeline for `ctx`
pub fn build_pipeline(ctx: Arc<DeployContext>) -> Result<Pipeline, DeployError> {
    let kubernetes_only = ctx.options.kubernetes_only;

    let steps = vec![
        stage(&ctx, "disable_host_security", host::disable_host_security),
        stage(&ctx, "install_packages", packages::install_packages),
        stage(&ctx, "configure_cluster_dns", host::configure_cluster_dns),
        stage(&ctx, "reload_service_files", host::reload_service_files),
        stage(&ctx, "start_kubelet", host::start_kubelet),
        stage(&ctx, "enable_bridge_netfilter", host::enable_bridge_netfilter),
        stage(&ctx, "kubeadm_init", kubernetes::kubeadm_init),
        stage(&ctx, "load_kubeadm_credentials", kubernetes::load_kubeadm_credentials)
            .with_readiness(ctx.kube_system_ready()?),
        stage(&ctx, "deploy_canal", kubernetes::deploy_canal)
            .with_readiness(ctx.all_pods_running()?),
        stage(&ctx, "untaint_master", kubernetes::untaint_master),
        stage(&ctx, "dns_check", kubernetes::dns_check),
        Step::from_fn("kubernetes_checkpoint", move || async move {
            if kubernetes_only {
                Ok(StepOutcome::Stop {
                    reason: "Kubernetes cluster is running; Kolla not requested".to_string(),
                })
            } else {
                Ok(StepOutcome::Continue)
            }
        }),
        stage(&ctx, "update_rbac", kubernetes::update_rbac),
        stage(&ctx, "install_helm", kubernetes::install_helm)
            .with_readiness(ctx.all_pods_running()?),
        Step::from_fn("verify_helm", || async { Ok(StepOutcome::Continue) })
            .with_readiness(ctx.helm_ready()?),
        stage(&ctx, "install_kolla_sources", packages::install_kolla_sources),
        stage(&ctx, "generate_passwords", kolla::generate_passwords),
        stage(&ctx, "create_namespace", kolla::create_namespace),
        stage(&ctx, "label_nodes", kolla::label_nodes),
        stage(&ctx, "configure_globals", kolla::configure_globals),
        stage(&ctx, "extend_globals", kolla::extend_globals),
        stage(&ctx, "enable_qemu", kolla::enable_qemu),
        stage(&ctx, "generate_configs", kolla::generate_configs),
        stage(&ctx, "generate_secrets", kolla::generate_secrets),
        stage(&ctx, "create_config_maps", kolla::create_config_maps),
        stage(&ctx, "resolv_conf_workaround", kolla::resolv_conf_workaround),
        stage(&ctx, "build_helm_charts", kolla::build_helm_charts),
        stage(&ctx, "verify_helm_charts", kolla::verify_helm_charts),
        stage(&ctx, "write_cloud_values", kolla::write_cloud_values),
        stage(&ctx, "install_charts_infrastructure", kolla::install_infrastructure_charts)
            .with_readiness(ctx.all_pods_running()?),
        stage(&ctx, "install_charts_services", kolla::install_service_charts)
            .with_readiness(ctx.all_pods_running()?),
    ];

    let cleanup = stage(&ctx, "cleanup", cleanup::reset_cluster);
    let pipeline =
        Pipeline::new(PIPELINE_NAME, steps).with_cleanup(cleanup, ctx.options.cleanup);
    pipeline.validate().map_err(DeployError::Config)?;
    Ok(pipeline)
}
