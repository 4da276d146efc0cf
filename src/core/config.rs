//! Deployment configuration from YAML

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime switches threaded into the executor and the runner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Log command lines, command output and wait reports at info level
    pub verbose: bool,
}

/// Top-level deployment configuration.
///
/// Every field has a default matching a stock single-node deployment, so
/// an empty YAML document is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Component versions
    pub versions: Versions,

    /// Cluster networking
    pub network: NetworkConfig,

    /// Readiness wait tuning
    pub waits: WaitConfig,

    /// Kolla deployment settings
    pub kolla: KollaConfig,

    /// Download and clone locations
    pub urls: UrlConfig,

    /// Filesystem locations
    pub paths: PathConfig,

    /// Prefix privileged commands with `sudo`
    pub use_sudo: bool,

    /// Upper bound for any single command, in seconds
    pub command_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Versions {
    pub helm: String,
    /// kubelet, kubeadm and kubectl package version
    pub kubernetes: String,
    /// Version of the `kubernetes` meta package
    pub kubernetes_package: String,
    pub kolla_image_tag: String,
    pub ansible: String,
    pub jinja2: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub pod_cidr: String,
    pub service_cidr: String,
    pub cluster_dns: String,
    /// Service IP of canal's etcd
    pub canal_etcd_ip: String,
}

/// Interval and timeout of one readiness wait
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Wait for the control plane pods after kubeadm init
    pub kube_system: PollConfig,

    /// Minimum number of Running kube-system pods
    pub kube_system_min_running: u64,

    /// Wait for every pod in every namespace to be Running
    pub all_running: PollConfig,

    /// Wait for helm client and tiller to report the expected version
    pub helm_ready: PollConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KollaConfig {
    pub namespace: String,
    pub node_labels: Vec<String>,
    /// Chart packages that must exist after the chart build
    pub min_chart_packages: usize,
    /// Charts installed first, each batch followed by a readiness wait
    pub infrastructure_charts: Vec<String>,
    pub service_charts: Vec<String>,
    /// Services registered as config maps
    pub config_maps: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlConfig {
    pub kubernetes_repo: String,
    pub kubernetes_gpg_keys: Vec<String>,
    pub canal_rbac: String,
    pub canal_manifest: String,
    /// Base URL of helm release tarballs
    pub helm_releases: String,
    pub kolla_ansible_git: String,
    pub kolla_kubernetes_git: String,
    /// Replacement kubelet binary (gzip), if the packaged one is broken
    pub kubelet_override: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Scratch directory for generated files, downloads and clones
    pub work_dir: PathBuf,
    pub sysctl_conf: PathBuf,
    pub kubeadm_dropin: PathBuf,
    pub yum_repo: PathBuf,
    /// Defaults to `$HOME/.kube`
    pub kube_config_dir: Option<PathBuf>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            versions: Versions::default(),
            network: NetworkConfig::default(),
            waits: WaitConfig::default(),
            kolla: KollaConfig::default(),
            urls: UrlConfig::default(),
            paths: PathConfig::default(),
            use_sudo: true,
            command_timeout_secs: None,
        }
    }
}

impl Default for Versions {
    fn default() -> Self {
        Self {
            helm: "2.2.3".to_string(),
            kubernetes: "1.6.3".to_string(),
            kubernetes_package: "1.5.4".to_string(),
            kolla_image_tag: "4.0.0".to_string(),
            ansible: "2.2.0.0".to_string(),
            jinja2: "2.8.1".to_string(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            pod_cidr: "10.1.0.0/16".to_string(),
            service_cidr: "10.3.3.0/24".to_string(),
            cluster_dns: "10.3.3.10".to_string(),
            canal_etcd_ip: "10.3.3.100".to_string(),
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            kube_system: PollConfig {
                interval_secs: 5,
                timeout_secs: 350,
            },
            kube_system_min_running: 6,
            all_running: PollConfig {
                interval_secs: 3,
                timeout_secs: 1000,
            },
            helm_ready: PollConfig {
                interval_secs: 3,
                timeout_secs: 300,
            },
        }
    }
}

impl Default for KollaConfig {
    fn default() -> Self {
        Self {
            namespace: "kolla".to_string(),
            node_labels: strings(&["kolla_compute", "kolla_controller"]),
            min_chart_packages: 180,
            infrastructure_charts: strings(&["mariadb"]),
            service_charts: strings(&[
                "rabbitmq",
                "memcached",
                "keystone",
                "glance",
                "cinder-control",
                "horizon",
                "openvswitch",
                "neutron",
                "nova-control",
                "nova-compute",
            ]),
            config_maps: strings(&[
                "mariadb",
                "keystone",
                "horizon",
                "rabbitmq",
                "memcached",
                "nova-api",
                "nova-conductor",
                "nova-scheduler",
                "glance-api-haproxy",
                "glance-registry-haproxy",
                "glance-api",
                "glance-registry",
                "neutron-server",
                "neutron-dhcp-agent",
                "neutron-l3-agent",
                "neutron-metadata-agent",
                "neutron-openvswitch-agent",
                "openvswitch-db-server",
                "openvswitch-vswitchd",
                "nova-libvirt",
                "nova-compute",
                "nova-consoleauth",
                "nova-novncproxy",
                "nova-novncproxy-haproxy",
                "neutron-server-haproxy",
                "nova-api-haproxy",
                "cinder-api",
                "cinder-api-haproxy",
                "cinder-backup",
                "cinder-scheduler",
                "cinder-volume",
                "iscsid",
                "tgtd",
                "keepalived",
                "placement-api",
                "placement-api-haproxy",
            ]),
        }
    }
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            kubernetes_repo: "http://yum.kubernetes.io/repos/kubernetes-el7-x86_64".to_string(),
            kubernetes_gpg_keys: vec![
                "https://packages.cloud.google.com/yum/doc/yum-key.gpg".to_string(),
                "https://packages.cloud.google.com/yum/doc/rpm-package-key.gpg".to_string(),
            ],
            canal_rbac: "https://raw.githubusercontent.com/projectcalico/canal/master/k8s-install/1.6/rbac.yaml"
                .to_string(),
            canal_manifest: "https://raw.githubusercontent.com/projectcalico/canal/master/k8s-install/1.6/canal.yaml"
                .to_string(),
            helm_releases: "https://storage.googleapis.com/kubernetes-helm".to_string(),
            kolla_ansible_git: "http://github.com/openstack/kolla-ansible".to_string(),
            kolla_kubernetes_git: "http://github.com/openstack/kolla-kubernetes".to_string(),
            kubelet_override: Some(
                "https://github.com/sbezverk/kubelet--45613/raw/master/kubelet.gz".to_string(),
            ),
        }
    }
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("/tmp/kolla-aio"),
            sysctl_conf: PathBuf::from("/etc/sysctl.conf"),
            kubeadm_dropin: PathBuf::from("/etc/systemd/system/kubelet.service.d/10-kubeadm.conf"),
            yum_repo: PathBuf::from("/etc/yum.repos.d/kubernetes.repo"),
            kube_config_dir: None,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl DeployConfig {
    /// Load deployment configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse deployment configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping
        let config: DeployConfig = if yaml.trim().is_empty() {
            DeployConfig::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the deployment configuration
    pub fn validate(&self) -> Result<()> {
        for (name, poll) in [
            ("kube_system", &self.waits.kube_system),
            ("all_running", &self.waits.all_running),
            ("helm_ready", &self.waits.helm_ready),
        ] {
            if poll.interval_secs == 0 {
                anyhow::bail!("waits.{}.interval_secs must be greater than zero", name);
            }
            if poll.timeout_secs < poll.interval_secs {
                anyhow::bail!(
                    "waits.{}.timeout_secs ({}) is shorter than its interval ({})",
                    name,
                    poll.timeout_secs,
                    poll.interval_secs
                );
            }
        }

        if self.versions.helm.trim().is_empty() {
            anyhow::bail!("versions.helm must not be empty");
        }

        if self.kolla.namespace.trim().is_empty() {
            anyhow::bail!("kolla.namespace must not be empty");
        }

        if self.command_timeout_secs == Some(0) {
            anyhow::bail!("command_timeout_secs must be greater than zero");
        }

        Ok(())
    }

    /// Directory holding the kubectl config
    pub fn kube_config_dir(&self) -> Result<PathBuf> {
        match &self.paths.kube_config_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::home_dir()
                .map(|home| home.join(".kube"))
                .ok_or_else(|| anyhow::anyhow!("Cannot determine home directory for .kube")),
        }
    }

    /// Per-command timeout, if configured
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}
