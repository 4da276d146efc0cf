//! Kubernetes bootstrap with kubeadm, canal and helm

use crate::error::DeployError;
use crate::stages::{path_str, shell_path, templates, DeployContext};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use uuid::Uuid;

const ADMIN_CONF: &str = "/etc/kubernetes/admin.conf";
const HELM_BIN: &str = "/usr/local/bin/helm";

pub async fn kubeadm_init(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Deploying Kubernetes with kubeadm");
    let network = &ctx.config.network;
    let pod_cidr = format!("--pod-network-cidr={}", network.pod_cidr);
    let service_cidr = format!("--service-cidr={}", network.service_cidr);
    ctx.sudo(&[
        "kubeadm",
        "init",
        pod_cidr.as_str(),
        service_cidr.as_str(),
        "--skip-preflight-checks",
    ])
    .await?;
    Ok(())
}

/// Copy the kubeadm admin credentials where kubectl looks for them
pub async fn load_kubeadm_credentials(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Loading kubeadm credentials");
    let dir = ctx
        .config
        .kube_config_dir()
        .map_err(|e| DeployError::Config(e.to_string()))?;
    tokio::fs::create_dir_all(&dir).await?;

    let config = path_str(&dir.join("config"));
    ctx.sudo(&["cp", ADMIN_CONF, config.as_str()]).await?;
    ctx.shell(format!(
        "{}chown $(id -u):$(id -g) {}",
        ctx.sudo_prefix(),
        shell_path(&dir.join("config"))
    ))
    .await?;
    Ok(())
}

/// Install the canal CNI driver on our pod network
pub async fn deploy_canal(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Deploying the canal CNI driver");
    tokio::fs::create_dir_all(ctx.work_dir()).await?;

    let rbac = ctx.work_path("canal-rbac.yaml");
    ctx.download(&ctx.config.urls.canal_rbac, &rbac).await?;
    let rbac = path_str(&rbac);
    ctx.run(&["kubectl", "apply", "-f", rbac.as_str()]).await?;

    let manifest = ctx.work_path("canal.yaml");
    ctx.download(&ctx.config.urls.canal_manifest, &manifest)
        .await?;
    let contents = tokio::fs::read_to_string(&manifest).await?;
    tokio::fs::write(
        &manifest,
        templates::rewrite_canal_manifest(&contents, &ctx.config),
    )
    .await?;
    let manifest = path_str(&manifest);
    ctx.run(&["kubectl", "apply", "-f", manifest.as_str()])
        .await?;
    Ok(())
}

/// Allow workloads on the single (master) node
pub async fn untaint_master(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Marking master node as schedulable");
    ctx.run(&[
        "kubectl",
        "taint",
        "nodes",
        "--all=true",
        "node-role.kubernetes.io/master:NoSchedule-",
    ])
    .await?;
    Ok(())
}

/// Tell the operator how to check cluster DNS, optionally waiting for them
pub async fn dns_check(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!(
        "Check DNS with: kubectl run -i -t {} --image=busybox --restart=Never, then `nslookup kubernetes`",
        Uuid::new_v4()
    );

    if ctx.options.pause {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(b"Press Enter to continue").await?;
        stdout.flush().await?;
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;
    }
    Ok(())
}

/// Bind cluster-admin to every group
pub async fn update_rbac(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Overriding default RBAC settings");
    let rbac = ctx
        .write_work_file("rbac.yaml", templates::RBAC_OVERRIDE)
        .await?;
    let rbac = path_str(&rbac);
    ctx.run(&["kubectl", "apply", "-f", rbac.as_str()]).await?;
    Ok(())
}

/// Install the helm client and deploy tiller
pub async fn install_helm(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    let version = &ctx.config.versions.helm;
    info!("Installing helm {}", version);

    let tarball = format!("helm-v{}-linux-amd64.tar.gz", version);
    let url = format!(
        "{}/{}",
        ctx.config.urls.helm_releases.trim_end_matches('/'),
        tarball
    );
    tokio::fs::create_dir_all(ctx.work_dir()).await?;
    let archive = ctx.work_path(&tarball);
    ctx.download(&url, &archive).await?;

    let archive = path_str(&archive);
    let work_dir = path_str(ctx.work_dir());
    ctx.run(&["tar", "-xzf", archive.as_str(), "-C", work_dir.as_str()])
        .await?;

    let binary = path_str(&ctx.work_path("linux-amd64/helm"));
    ctx.sudo(&["mv", "-f", binary.as_str(), HELM_BIN]).await?;
    ctx.run(&["helm", "init"]).await?;
    Ok(())
}
