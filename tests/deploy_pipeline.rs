//! End-to-end runs of the deployment pipeline against a recording runner

mod helpers;

use helpers::{deploy_context, RecordingRunner, Sandbox};
use kolla_aio::core::config::{DeployConfig, RuntimeSettings};
use kolla_aio::core::{ExecutionStatus, PipelineOutcome};
use kolla_aio::execution::{ExecutionResult, PipelineRunner};
use kolla_aio::stages::{build_pipeline, PipelineOptions};
use kolla_aio::DeployError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CANAL_MANIFEST: &str = "\
- name: CALICO_IPV4POOL_CIDR
  value: \"192.168.0.0/16\"
- name: etcd_endpoints
  value: \"http://10.96.232.136:6666\"
";

fn running_pods(count: usize) -> String {
    (0..count)
        .map(|i| format!("pod-{}   1/1   Running   0   1m\n", i))
        .collect()
}

fn write_charts(dir: &Path, count: usize) {
    std::fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        std::fs::write(dir.join(format!("chart-{}-0.7.0-1.tgz", i)), b"").unwrap();
    }
}

/// A cluster that comes up healthy and builds `charts` chart packages
fn healthy_host(work_dir: PathBuf, charts: usize) -> RecordingRunner {
    RecordingRunner::new()
        .respond("is-active firewalld", ExecutionResult::failed(3, ""))
        .respond("pods --no-headers -n kube-system", ExecutionResult::ok(running_pods(6)))
        .respond("pods --no-headers --all-namespaces", ExecutionResult::ok(running_pods(9)))
        .respond(
            "helm version",
            ExecutionResult::ok(
                "Client: &version.Version{SemVer:\"v2.2.3\"}\nServer: &version.Version{SemVer:\"v2.2.3\"}\n",
            ),
        )
        .respond("hostname", ExecutionResult::ok("aio-host\n"))
        .download("canal.yaml", CANAL_MANIFEST)
        .on("helm_build_all.sh", move |_| write_charts(&work_dir, charts))
}

async fn deploy(
    runner: Arc<RecordingRunner>,
    config: DeployConfig,
    options: PipelineOptions,
) -> Result<PipelineOutcome, DeployError> {
    let ctx = deploy_context(runner, config, options);
    let mut pipeline = build_pipeline(ctx).unwrap();
    PipelineRunner::new(RuntimeSettings::default())
        .run(&mut pipeline)
        .await
}

#[tokio::test]
async fn test_full_deployment_completes() {
    let sandbox = Sandbox::new();
    let runner = Arc::new(healthy_host(sandbox.work_dir(), 4));

    let outcome = deploy(runner.clone(), sandbox.config(), PipelineOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, PipelineOutcome::Completed { steps_run: 31 });
    assert!(!runner.ran("kubeadm reset"));

    let order = [
        "setenforce 0",
        "sudo pip install --upgrade pip",
        "yum install -y docker",
        "systemctl start kubelet",
        "sysctl -p",
        "kubeadm init --pod-network-cidr=10.1.0.0/16 --service-cidr=10.3.3.0/24",
        "cp /etc/kubernetes/admin.conf",
        "kubectl apply -f",
        "kubectl taint nodes",
        "helm init",
        "git clone http://github.com/openstack/kolla-kubernetes",
        "kolla-kubernetes-genpwd",
        "kubectl label node aio-host kolla_compute=true --overwrite",
        "ansible-playbook",
        "kollakube res create configmap mariadb",
        "helm_build_all.sh",
        "--name mariadb",
        "--name rabbitmq",
        "--name nova-compute",
    ];
    let positions: Vec<usize> = order
        .iter()
        .map(|pattern| {
            runner
                .position(pattern)
                .unwrap_or_else(|| panic!("{} never ran", pattern))
        })
        .collect();
    assert!(
        positions.windows(2).all(|w| w[0] < w[1]),
        "commands out of order: {:?}",
        positions
    );

    // The helm readiness wait only probes
    assert_eq!(runner.commands().iter().filter(|c| c.as_str() == "helm init").count(), 1);
}

#[tokio::test]
async fn test_generated_files() {
    let sandbox = Sandbox::new();
    let runner = Arc::new(healthy_host(sandbox.work_dir(), 4));

    deploy(runner.clone(), sandbox.config(), PipelineOptions::default())
        .await
        .unwrap();

    let work = sandbox.work_dir();
    let canal = std::fs::read_to_string(work.join("canal.yaml")).unwrap();
    assert!(canal.contains("\"10.1.0.0/16\""));
    assert!(canal.contains("http://10.3.3.100:6666"));
    assert!(!canal.contains("192.168.0.0/16"));

    let cloud = std::fs::read_to_string(work.join("cloud.yaml")).unwrap();
    assert!(cloud.contains("external_vip: \"10.240.83.111\""));
    assert!(cloud.contains("tunnel_interface: \"eth0\""));
    assert!(cloud.contains("ext_interface_name: eth1"));

    let sysctl = std::fs::read_to_string(work.join("sysctl.conf")).unwrap();
    assert!(sysctl.starts_with("vm.swappiness=10\n"));
    assert!(sysctl.contains("net.bridge.bridge-nf-call-iptables=1"));
    assert!(sysctl.contains("net.bridge.bridge-nf-call-ip6tables=1"));

    let staged = format!(
        "sudo cp {} {}",
        work.join("sysctl.conf").display(),
        sandbox.sysctl_conf().display()
    );
    assert!(runner.ran(&staged), "missing {}", staged);
}

#[tokio::test]
async fn test_kubernetes_only_stops_before_kolla() {
    let sandbox = Sandbox::new();
    let runner = Arc::new(healthy_host(sandbox.work_dir(), 4));

    let outcome = deploy(
        runner.clone(),
        sandbox.config(),
        PipelineOptions {
            kubernetes_only: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(matches!(
        outcome,
        PipelineOutcome::Stopped { ref step, .. } if step == "kubernetes_checkpoint"
    ));
    assert!(runner.ran("kubectl taint nodes"));
    assert!(!runner.ran("helm"));
    assert!(!runner.ran("kolla"));
}

#[tokio::test]
async fn test_kubeadm_failure_aborts_run() {
    let sandbox = Sandbox::new();
    let runner = Arc::new(
        RecordingRunner::new()
            .respond(
                "kubeadm init",
                ExecutionResult::failed(2, "port 6443 is in use\n"),
            )
            .merge(healthy_host(sandbox.work_dir(), 4)),
    );

    let err = deploy(runner.clone(), sandbox.config(), PipelineOptions::default())
        .await
        .unwrap_err();

    match &err {
        DeployError::RunAborted {
            step_index,
            step_name,
            ..
        } => {
            assert_eq!(*step_index, 7);
            assert_eq!(step_name, "kubeadm_init");
        }
        other => panic!("Expected RunAborted, got {:?}", other),
    }
    assert!(matches!(
        err.root_cause(),
        DeployError::CommandFailed { exit_status: 2, stderr, .. } if stderr == "port 6443 is in use"
    ));
    assert!(!runner.ran("admin.conf"));
    assert!(!runner.ran("canal"));
    assert!(runner
        .commands()
        .last()
        .map(|c| c.contains("kubeadm init"))
        .unwrap_or(false));
}

#[tokio::test]
async fn test_cleanup_resets_cluster_first() {
    let sandbox = Sandbox::new();
    let runner = Arc::new(healthy_host(sandbox.work_dir(), 4));

    let outcome = deploy(
        runner.clone(),
        sandbox.config(),
        PipelineOptions {
            cleanup: true,
            kubernetes_only: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(matches!(outcome, PipelineOutcome::Stopped { .. }));
    let commands = runner.commands();
    assert_eq!(commands[0], "sudo kubeadm reset");
    assert_eq!(commands[1], "sudo rm -rf /etc/kolla");
    assert!(commands.iter().any(|c| c == "sudo rm -rf /var/lib/kolla*"));
    assert_eq!(runner.commands().iter().filter(|c| c.contains("kubeadm reset")).count(), 1);
}

#[tokio::test]
async fn test_configured_sysctl_is_left_alone() {
    let sandbox = Sandbox::new();
    std::fs::write(
        sandbox.sysctl_conf(),
        "net.bridge.bridge-nf-call-ip6tables=1\nnet.bridge.bridge-nf-call-iptables=1\n",
    )
    .unwrap();
    let runner = Arc::new(healthy_host(sandbox.work_dir(), 4));

    deploy(
        runner.clone(),
        sandbox.config(),
        PipelineOptions {
            kubernetes_only: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(!runner.ran("sysctl -p"));
    assert!(!sandbox.work_dir().join("sysctl.conf").exists());
}

#[tokio::test]
async fn test_too_few_charts_aborts_before_install() {
    let sandbox = Sandbox::new();
    let runner = Arc::new(healthy_host(sandbox.work_dir(), 3));

    let err = deploy(runner.clone(), sandbox.config(), PipelineOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::RunAborted { step_index: 28, ref step_name, .. } if step_name == "verify_helm_charts"
    ));
    match err.root_cause() {
        DeployError::Aborted(reason) => {
            assert_eq!(reason, "only 3 Helm chart packages built, expected more than 3");
        }
        other => panic!("Expected Aborted, got {:?}", other),
    }
    assert!(!runner.ran("helm install"));
}

#[tokio::test]
async fn test_firewalld_is_disabled_when_active() {
    let sandbox = Sandbox::new();
    let runner = Arc::new(
        RecordingRunner::new()
            .respond("is-active firewalld", ExecutionResult::ok("active\n"))
            .merge(healthy_host(sandbox.work_dir(), 4)),
    );

    deploy(
        runner.clone(),
        sandbox.config(),
        PipelineOptions {
            kubernetes_only: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert!(runner.ran("sudo systemctl stop firewalld"));
    assert!(runner.ran("sudo systemctl disable firewalld"));
}

#[tokio::test]
async fn test_missing_namespace_is_created() {
    let sandbox = Sandbox::new();
    let runner = Arc::new(
        RecordingRunner::new()
            .respond(
                "kubectl get namespace kolla",
                ExecutionResult::failed(1, "namespaces \"kolla\" not found"),
            )
            .merge(healthy_host(sandbox.work_dir(), 4)),
    );

    deploy(runner.clone(), sandbox.config(), PipelineOptions::default())
        .await
        .unwrap();

    assert!(runner.ran("kubectl create namespace kolla"));
}

#[tokio::test]
async fn test_without_sudo() {
    let sandbox = Sandbox::new();
    let runner = Arc::new(healthy_host(sandbox.work_dir(), 4));
    let mut config = sandbox.config();
    config.use_sudo = false;

    deploy(runner.clone(), config, PipelineOptions::default())
        .await
        .unwrap();

    let commands = runner.commands();
    assert!(commands.iter().any(|c| c.starts_with("kubeadm init")));
    assert!(commands.iter().all(|c| !c.contains("sudo")), "{:?}", commands);
}

#[tokio::test]
async fn test_stuck_control_plane_times_out() {
    let sandbox = Sandbox::new();
    let mut config = sandbox.config();
    config.waits.kube_system.interval_secs = 1;
    config.waits.kube_system.timeout_secs = 1;
    let runner = Arc::new(
        RecordingRunner::new()
            .respond(
                "pods --no-headers -n kube-system",
                ExecutionResult::ok(running_pods(2)),
            )
            .merge(healthy_host(sandbox.work_dir(), 4)),
    );

    let err = deploy(runner.clone(), config, PipelineOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::RunAborted { step_index: 8, ref step_name, .. } if step_name == "load_kubeadm_credentials"
    ));
    assert!(matches!(err.root_cause(), DeployError::TimeoutExceeded { .. }));
    assert!(!runner.ran("canal"));
}

#[tokio::test]
async fn test_plan_lists_readiness_waits() {
    let sandbox = Sandbox::new();
    let ctx = deploy_context(
        Arc::new(RecordingRunner::new()),
        sandbox.config(),
        PipelineOptions::default(),
    );
    let pipeline = build_pipeline(ctx).unwrap();

    let plan = pipeline.plan();
    let waits: Vec<&str> = plan
        .iter()
        .filter(|step| step.readiness.is_some())
        .map(|step| step.name.as_str())
        .collect();
    assert_eq!(
        waits,
        vec![
            "load_kubeadm_credentials",
            "deploy_canal",
            "install_helm",
            "verify_helm",
            "install_charts_infrastructure",
            "install_charts_services",
        ]
    );
    assert_eq!(pipeline.state.status, ExecutionStatus::Pending);
}

#[tokio::test]
async fn test_shell_lines_quote_work_dir_with_space() {
    let sandbox = Sandbox::new();
    let work = sandbox.root.path().join("my work");
    let kube = sandbox.root.path().join("kube config");
    let mut config = sandbox.config();
    config.paths.work_dir = work.clone();
    config.paths.kube_config_dir = Some(kube.clone());
    let runner = Arc::new(healthy_host(work.clone(), 4));

    let outcome = deploy(runner.clone(), config, PipelineOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome, PipelineOutcome::Completed { steps_run: 31 });

    let quoted = |path: &Path| format!("'{}'", path.display());
    let expected = [
        format!(
            "sudo chown $(id -u):$(id -g) {}",
            quoted(&kube.join("config"))
        ),
        format!(
            "cat {} | sudo tee -a /etc/kolla/globals.yml > /dev/null",
            quoted(&work.join("globals-extension.yml"))
        ),
        format!(
            "cd {} && sudo ansible-playbook",
            quoted(&work.join("kolla-kubernetes"))
        ),
        format!(
            "cd {} && kolla-kubernetes/tools/helm_build_all.sh .",
            quoted(&work)
        ),
    ];
    for line in &expected {
        assert!(runner.ran(line), "missing {}", line);
    }
}

