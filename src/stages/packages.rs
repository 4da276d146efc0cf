//! Package installation
//!
//! Installs the Kubernetes packages from their yum repository and the Kolla
//! tooling from fresh git clones.

use crate::error::DeployError;
use crate::stages::{path_str, templates, DeployContext};
use std::sync::Arc;
use tracing::info;

/// Where kolla-ansible installs its example configuration
const KOLLA_ETC_EXAMPLES: &str = "/usr/share/kolla-ansible/etc_examples/kolla";

const KUBELET_BIN: &str = "/usr/bin/kubelet";

/// Write the Kubernetes repository and install docker, kubeadm and friends
pub async fn install_packages(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    let config = &ctx.config;

    info!("Upgrading pip");
    ctx.sudo(&["pip", "install", "--upgrade", "pip"]).await?;

    info!("Creating Kubernetes yum repository");
    let repo = ctx
        .write_work_file("kubernetes.repo", &templates::kubernetes_repo(&config.urls))
        .await?;
    let repo = path_str(&repo);
    let yum_repo = path_str(&config.paths.yum_repo);
    ctx.sudo(&["cp", repo.as_str(), yum_repo.as_str()]).await?;

    info!(
        "Installing Kubernetes {} packages, please wait",
        config.versions.kubernetes
    );
    let k8s = &config.versions.kubernetes;
    let kubelet = format!("kubelet-{}", k8s);
    let kubeadm = format!("kubeadm-{}", k8s);
    let kubectl = format!("kubectl-{}", k8s);
    let kubernetes = format!("kubernetes-{}", config.versions.kubernetes_package);
    ctx.sudo(&[
        "yum",
        "install",
        "-y",
        "docker",
        "ebtables",
        kubelet.as_str(),
        kubeadm.as_str(),
        kubectl.as_str(),
        kubernetes.as_str(),
        "git",
        "gcc",
    ])
    .await?;

    if let Some(url) = &config.urls.kubelet_override {
        info!("Replacing kubelet with {}", url);
        let archive = ctx.work_path("kubelet.gz");
        tokio::fs::create_dir_all(ctx.work_dir()).await?;
        ctx.download(url, &archive).await?;
        let archive = path_str(&archive);
        ctx.run(&["gunzip", "-f", archive.as_str()]).await?;

        let binary = path_str(&ctx.work_path("kubelet"));
        ctx.sudo(&["mv", "-f", binary.as_str(), KUBELET_BIN]).await?;
        ctx.sudo(&["chmod", "+x", KUBELET_BIN]).await?;
    }
    Ok(())
}

/// Clone kolla-ansible and kolla-kubernetes, install them and seed /etc
pub async fn install_kolla_sources(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Installing packages needed for Kolla");
    ctx.sudo(&[
        "yum",
        "install",
        "-y",
        "epel-release",
        "ansible",
        "python-pip",
        "python-devel",
    ])
    .await?;

    tokio::fs::create_dir_all(ctx.work_dir()).await?;
    let urls = &ctx.config.urls;
    for (url, name) in [
        (&urls.kolla_ansible_git, "kolla-ansible"),
        (&urls.kolla_kubernetes_git, "kolla-kubernetes"),
    ] {
        let dest = ctx.work_path(name);
        let dest_str = path_str(&dest);
        if tokio::fs::try_exists(&dest).await? {
            info!("Removing previous {} checkout", name);
            ctx.sudo(&["rm", "-rf", dest_str.as_str()]).await?;
        }
        info!("Cloning {}", name);
        ctx.run(&["git", "clone", url.as_str(), dest_str.as_str()])
            .await?;
    }

    info!("Installing kolla-ansible and kolla-kubernetes");
    let ansible_src = format!("{}/", path_str(&ctx.work_path("kolla-ansible")));
    let kubernetes_src = format!("{}/", path_str(&ctx.work_path("kolla-kubernetes")));
    ctx.sudo(&[
        "pip",
        "install",
        "-U",
        ansible_src.as_str(),
        kubernetes_src.as_str(),
    ])
    .await?;

    info!("Copying default Kolla configuration to /etc");
    ctx.sudo(&["cp", "-aR", KOLLA_ETC_EXAMPLES, "/etc"]).await?;
    let kk_etc = path_str(&ctx.work_path("kolla-kubernetes/etc/kolla-kubernetes"));
    ctx.sudo(&["cp", "-aR", kk_etc.as_str(), "/etc"]).await?;
    Ok(())
}
