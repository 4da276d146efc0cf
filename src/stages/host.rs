//! Host preparation: SELinux, firewall, docker, kubelet and sysctl

use crate::error::DeployError;
use crate::execution::{CommandSpec, ExecOptions};
use crate::stages::{path_str, templates, DeployContext};
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, info};

/// kubeadm's default cluster DNS address, baked into the kubelet drop-in
const DEFAULT_CLUSTER_DNS: &str = "10.96.0.10";

/// Put SELinux in permissive mode and stop firewalld if it is running
pub async fn disable_host_security(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Turning off SELinux");
    // Both fail harmlessly on hosts without SELinux
    let tolerant = ExecOptions::new().continue_on_error().quiet();
    ctx.sudo_with(&["setenforce", "0"], tolerant).await?;
    ctx.sudo_with(
        &["sed", "-i", "s/enforcing/permissive/g", "/etc/selinux/config"],
        tolerant,
    )
    .await?;

    let firewalld = ctx
        .executor
        .execute(
            &CommandSpec::args(["systemctl", "is-active", "firewalld"]),
            tolerant,
        )
        .await?;
    if firewalld.success() {
        info!("Found firewalld, stopping and disabling it");
        ctx.sudo(&["systemctl", "stop", "firewalld"]).await?;
        ctx.sudo(&["systemctl", "disable", "firewalld"]).await?;
    } else {
        debug!("firewalld is not active");
    }
    Ok(())
}

/// Start docker and point the kubelet at the configured cluster DNS address
pub async fn configure_cluster_dns(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!(
        "Starting docker and setting cluster DNS to {}",
        ctx.config.network.cluster_dns
    );
    ctx.sudo(&["systemctl", "enable", "docker"]).await?;
    ctx.sudo(&["systemctl", "start", "docker"]).await?;

    let expr = format!(
        "s/{}/{}/g",
        DEFAULT_CLUSTER_DNS, ctx.config.network.cluster_dns
    );
    let dropin = path_str(&ctx.config.paths.kubeadm_dropin);
    ctx.sudo(&["sed", "-i", expr.as_str(), dropin.as_str()])
        .await?;
    Ok(())
}

pub async fn reload_service_files(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Reloading modified service files");
    ctx.sudo(&["systemctl", "daemon-reload"]).await?;
    Ok(())
}

pub async fn start_kubelet(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Enabling and starting kubelet");
    ctx.sudo(&["systemctl", "enable", "kubelet"]).await?;
    ctx.sudo(&["systemctl", "start", "kubelet"]).await?;
    Ok(())
}

/// Make bridged traffic visible to iptables.
///
/// Only touches sysctl.conf, and only reloads sysctl, when a setting is
/// missing.
pub async fn enable_bridge_netfilter(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    let sysctl_conf = &ctx.config.paths.sysctl_conf;
    let contents = match tokio::fs::read_to_string(sysctl_conf).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };

    let missing = templates::missing_sysctl_lines(&contents);
    if missing.is_empty() {
        info!("Bridge netfilter already enabled");
        return Ok(());
    }

    info!("Enabling {}", missing.join(", "));
    let staged = ctx
        .write_work_file("sysctl.conf", &templates::append_lines(&contents, &missing))
        .await?;
    let staged = path_str(&staged);
    let target = path_str(sysctl_conf);
    ctx.sudo(&["cp", staged.as_str(), target.as_str()]).await?;
    ctx.sudo(&["sysctl", "-p"]).await?;
    Ok(())
}
