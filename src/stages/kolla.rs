//! Kolla configuration and Helm chart installation

use crate::error::DeployError;
use crate::execution::{CommandSpec, ExecOptions};
use crate::stages::{path_str, shell_path, templates, DeployContext, HostTarget};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const GLOBALS: &str = "/etc/kolla/globals.yml";
const KOLLA_CONFIG_DIR: &str = "/etc/kolla/config";
const NOVA_CONF: &str = "/etc/kolla/config/nova.conf";

/// Checkout of kolla-kubernetes inside the work directory
const KOLLA_KUBERNETES: &str = "kolla-kubernetes";

pub async fn generate_passwords(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Generating default passwords");
    ctx.sudo(&["kolla-kubernetes-genpwd"]).await?;
    Ok(())
}

/// Create the namespace that isolates the Kolla deployment
pub async fn create_namespace(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    let namespace = ctx.config.kolla.namespace.as_str();
    let existing = ctx
        .executor
        .execute(
            &CommandSpec::args(["kubectl", "get", "namespace", namespace]),
            ExecOptions::new().continue_on_error().quiet(),
        )
        .await?;
    if existing.success() {
        info!("Namespace {} already exists", namespace);
        return Ok(());
    }

    info!("Creating namespace {}", namespace);
    ctx.run(&["kubectl", "create", "namespace", namespace]).await?;
    Ok(())
}

/// Label this host with every configured Kolla role
pub async fn label_nodes(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    let hostname = ctx.run(&["hostname"]).await?.stdout_text();
    let hostname = hostname.trim();

    for label in &ctx.config.kolla.node_labels {
        info!("Labelling {} as {}", hostname, label);
        let assignment = format!("{}=true", label);
        ctx.run(&[
            "kubectl",
            "label",
            "node",
            hostname,
            assignment.as_str(),
            "--overwrite",
        ])
        .await?;
    }
    Ok(())
}

/// sed expressions that fill the interface and address placeholders of the
/// stock globals.yml
pub fn globals_edits(target: &HostTarget) -> Vec<String> {
    vec![
        format!("s/eth0/{}/g", target.mgmt_int),
        "s/#network_interface/network_interface/g".to_string(),
        format!("s/10.10.10.254/{}/g", target.mgmt_ip),
        format!("s/eth1/{}/g", target.neutron_int),
        "s/#neutron_external_interface/neutron_external_interface/g".to_string(),
    ]
}

pub async fn configure_globals(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Setting interfaces and addresses in {}", GLOBALS);
    let edits = globals_edits(&ctx.target);
    let mut args = vec!["sed", "-i"];
    for edit in &edits {
        args.extend(["-e", edit.as_str()]);
    }
    args.push(GLOBALS);
    ctx.sudo(&args).await?;
    Ok(())
}

/// Append the Kubernetes-specific settings to globals.yml
pub async fn extend_globals(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Extending {}", GLOBALS);
    let extension = ctx
        .write_work_file("globals-extension.yml", templates::GLOBALS_EXTENSION)
        .await?;
    ctx.shell(format!(
        "cat {} | {}tee -a {} > /dev/null",
        shell_path(&extension),
        ctx.sudo_prefix(),
        GLOBALS
    ))
    .await?;
    Ok(())
}

/// Run nova with plain qemu
pub async fn enable_qemu(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Enabling qemu");
    ctx.sudo(&["mkdir", "-p", KOLLA_CONFIG_DIR]).await?;
    let staged = ctx.write_work_file("nova.conf", templates::NOVA_QEMU).await?;
    let staged = path_str(&staged);
    ctx.sudo(&["cp", staged.as_str(), NOVA_CONF]).await?;
    Ok(())
}

/// Generate the service configuration with the kolla-kubernetes playbook
pub async fn generate_configs(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    let versions = &ctx.config.versions;
    info!("Generating the default configuration");

    // The distribution's jinja2 breaks the playbook
    let jinja2 = format!("Jinja2=={}", versions.jinja2);
    let ansible = format!("ansible=={}", versions.ansible);
    ctx.sudo(&["pip", "install", jinja2.as_str()]).await?;
    ctx.sudo(&["pip", "install", ansible.as_str()]).await?;

    let checkout = shell_path(&ctx.work_path(KOLLA_KUBERNETES));
    let out = ctx
        .shell(format!(
            "cd {} && {}ansible-playbook -e ansible_python_interpreter=/usr/bin/python \
             -e @/etc/kolla/globals.yml -e @/etc/kolla/passwords.yml \
             -e CONFIG_DIR=/etc/kolla ./ansible/site.yml",
            checkout,
            ctx.sudo_prefix()
        ))
        .await?;
    debug!("ansible-playbook: {}", out.stdout_text());
    Ok(())
}

/// Generate the Kubernetes secrets and register them
pub async fn generate_secrets(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Generating Kubernetes secrets");
    let script = path_str(&ctx.work_path("kolla-kubernetes/tools/secret-generator.py"));
    ctx.run(&["python", script.as_str(), "create"]).await?;
    Ok(())
}

pub async fn create_config_maps(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    let kolla = &ctx.config.kolla;
    info!("Creating {} Kolla config maps", kolla.config_maps.len());

    let mut args = vec!["kollakube", "res", "create", "configmap"];
    args.extend(kolla.config_maps.iter().map(String::as_str));
    ctx.run(&args).await?;

    let listing = ctx
        .run(&["kubectl", "get", "configmap", "-n", kolla.namespace.as_str()])
        .await?;
    debug!("Config maps:\n{}", listing.stdout_text());
    Ok(())
}

pub async fn resolv_conf_workaround(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Enabling resolv.conf workaround");
    let script = path_str(&ctx.work_path("kolla-kubernetes/tools/setup-resolv-conf.sh"));
    ctx.run(&[script.as_str(), ctx.config.kolla.namespace.as_str()])
        .await?;
    Ok(())
}

/// Package every micro, service and meta chart into the work directory
pub async fn build_helm_charts(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Building all Helm charts");
    ctx.shell(format!(
        "cd {} && {}/tools/helm_build_all.sh .",
        shell_path(ctx.work_dir()),
        KOLLA_KUBERNETES
    ))
    .await?;
    Ok(())
}

/// Number of packaged charts (`.tgz`) directly inside `dir`
pub async fn count_chart_packages(dir: &Path) -> Result<usize, DeployError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().ends_with(".tgz") {
            count += 1;
        }
    }
    Ok(count)
}

/// Abort unless the chart build produced enough packages
pub async fn verify_helm_charts(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    let required = ctx.config.kolla.min_chart_packages;
    let built = count_chart_packages(ctx.work_dir()).await?;
    if built > required {
        info!("{} Helm chart packages built", built);
        Ok(())
    } else {
        Err(DeployError::aborted(format!(
            "only {} Helm chart packages built, expected more than {}",
            built, required
        )))
    }
}

pub async fn write_cloud_values(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    info!("Writing cloud values for {}", ctx.target.mgmt_ip);
    ctx.write_work_file(
        "cloud.yaml",
        &templates::cloud_values(&ctx.config, &ctx.target),
    )
    .await?;
    Ok(())
}

async fn install_charts(ctx: &DeployContext, charts: &[String]) -> Result<(), DeployError> {
    let values = path_str(&ctx.work_path("cloud.yaml"));
    let namespace = ctx.config.kolla.namespace.as_str();

    for chart in charts {
        info!("Installing chart {}", chart);
        let path = path_str(
            &ctx.work_path(KOLLA_KUBERNETES)
                .join("helm/service")
                .join(chart),
        );
        ctx.run(&[
            "helm",
            "install",
            "--debug",
            path.as_str(),
            "--namespace",
            namespace,
            "--name",
            chart.as_str(),
            "--values",
            values.as_str(),
        ])
        .await?;
    }
    Ok(())
}

/// Install the charts the services depend on (mariadb)
pub async fn install_infrastructure_charts(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    install_charts(&ctx, &ctx.config.kolla.infrastructure_charts).await
}

pub async fn install_service_charts(ctx: Arc<DeployContext>) -> Result<(), DeployError> {
    install_charts(&ctx, &ctx.config.kolla.service_charts).await
}
