//! Teardown of a previous deployment

use crate::error::DeployError;
use crate::stages::DeployContext;
use std::sync::Arc;
use tracing::info;

/// Configuration trees left behind by kubeadm and kolla
const STATE_DIRS: [&str; 3] = ["/etc/kolla", "/etc/kubernetes", "/etc/kolla-kubernetes"];

/// Reset kubeadm and remove kolla and kubernetes state from the host
pub async fn reset_cluster(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Cleaning up existing Kubernetes cluster");
    ctx.sudo(&["kubeadm", "reset"]).await?;

    for dir in STATE_DIRS {
        ctx.sudo(&["rm", "-rf", dir]).await?;
    }

    // Glob needs a shell
    ctx.shell(format!("{}rm -rf /var/lib/kolla*", ctx.sudo_prefix()))
        .await?;
    Ok(())
}
