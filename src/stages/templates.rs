//! File contents written by the stage library

use crate::core::config::{DeployConfig, UrlConfig};
use crate::stages::HostTarget;

/// Sysctl settings kube-proxy and canal need
pub const BRIDGE_NETFILTER: [&str; 2] = [
    "net.bridge.bridge-nf-call-ip6tables=1",
    "net.bridge.bridge-nf-call-iptables=1",
];

/// Placeholders in the upstream canal manifest
const CANAL_POD_CIDR: &str = "192.168.0.0/16";
const CANAL_ETCD_IP: &str = "10.96.232.136";

/// Cluster-wide binding that grants every group cluster-admin
pub const RBAC_OVERRIDE: &str = "\
apiVersion: rbac.authorization.k8s.io/v1alpha1
kind: ClusterRoleBinding
metadata:
  name: cluster-admin
roleRef:
  apiGroup: rbac.authorization.k8s.io
  kind: ClusterRole
  name: cluster-admin
subjects:
- kind: Group
  name: system:masters
- kind: Group
  name: system:authenticated
- kind: Group
  name: system:unauthenticated
";

/// Appended to /etc/kolla/globals.yml for a Kubernetes-orchestrated deployment
pub const GLOBALS_EXTENSION: &str = r#"kolla_install_type: "source"
tempest_image_alt_id: "{{ tempest_image_id }}"
tempest_flavor_ref_alt_id: "{{ tempest_flavor_ref_id }}"

neutron_plugin_agent: "openvswitch"
api_interface_address: 0.0.0.0
tunnel_interface_address: 0.0.0.0
orchestration_engine: KUBERNETES
memcached_servers: "memcached"
keystone_admin_url: "http://keystone-admin:35357/v3"
keystone_internal_url: "http://keystone-internal:5000/v3"
keystone_public_url: "http://keystone-public:5000/v3"
glance_registry_host: "glance-registry"
neutron_host: "neutron"
keystone_database_address: "mariadb"
glance_database_address: "mariadb"
nova_database_address: "mariadb"
nova_api_database_address: "mariadb"
neutron_database_address: "mariadb"
cinder_database_address: "mariadb"
ironic_database_address: "mariadb"
placement_database_address: "mariadb"
rabbitmq_servers: "rabbitmq"
openstack_logging_debug: "True"
enable_haproxy: "no"
enable_heat: "no"
enable_cinder: "yes"
enable_cinder_backend_lvm: "yes"
enable_cinder_backend_iscsi: "yes"
enable_cinder_backend_rbd: "no"
enable_ceph: "no"
enable_elasticsearch: "no"
enable_kibana: "no"
glance_backend_ceph: "no"
cinder_backend_ceph: "no"
nova_backend_ceph: "no"
"#;

/// nova.conf override for hosts without nested virtualization
pub const NOVA_QEMU: &str = "\
[libvirt]
virt_type = qemu
cpu_mode = none
";

/// Yum repository definition for the Kubernetes packages
pub fn kubernetes_repo(urls: &UrlConfig) -> String {
    let mut repo = format!(
        "[kubernetes]\nname=Kubernetes\nbaseurl={}\nenabled=1\ngpgcheck=0\nrepo_gpgcheck=1\n",
        urls.kubernetes_repo
    );
    for (i, key) in urls.kubernetes_gpg_keys.iter().enumerate() {
        if i == 0 {
            repo.push_str(&format!("gpgkey={}\n", key));
        } else {
            repo.push_str(&format!("       {}\n", key));
        }
    }
    repo
}

/// Lines of [`BRIDGE_NETFILTER`] not already present in a sysctl.conf
pub fn missing_sysctl_lines(contents: &str) -> Vec<&'static str> {
    BRIDGE_NETFILTER
        .iter()
        .copied()
        .filter(|setting| !contents.lines().any(|line| line.trim() == *setting))
        .collect()
}

/// Append `lines` to `contents`, keeping one setting per line
pub fn append_lines(contents: &str, lines: &[&str]) -> String {
    let mut out = contents.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Point the canal manifest at our pod network and etcd service address
pub fn rewrite_canal_manifest(manifest: &str, config: &DeployConfig) -> String {
    manifest
        .replace(CANAL_POD_CIDR, &config.network.pod_cidr)
        .replace(CANAL_ETCD_IP, &config.network.canal_etcd_ip)
}

/// Helm values for the kolla service charts
pub fn cloud_values(config: &DeployConfig, target: &HostTarget) -> String {
    format!(
        r#"global:
   kolla:
     all:
       image_tag: "{image_tag}"
       kube_logger: false
       external_vip: "{ip}"
       base_distro: "centos"
       install_type: "source"
       tunnel_interface: "{mgmt_int}"
       resolve_conf_net_host_workaround: true
     keystone:
       all:
         admin_port_external: "true"
         dns_name: "{ip}"
       public:
         all:
           port_external: "true"
     rabbitmq:
       all:
         cookie: 67
     glance:
       api:
         all:
           port_external: "true"
     cinder:
       api:
         all:
           port_external: "true"
       volume_lvm:
         all:
           element_name: cinder-volume
         daemonset:
           lvm_backends:
           - '{ip}': 'cinder-volumes'
     ironic:
       conductor:
         daemonset:
           selector_key: "kolla_conductor"
     nova:
       placement_api:
         all:
           port_external: true
       novncproxy:
         all:
           port: 6080
           port_external: true
     openvwswitch:
       all:
         add_port: true
         ext_bridge_name: br-ex
         ext_interface_name: {neutron_int}
         setup_bridge: true
     horizon:
       all:
         port_external: true
"#,
        image_tag = config.versions.kolla_image_tag,
        ip = target.mgmt_ip,
        mgmt_int = target.mgmt_int,
        neutron_int = target.neutron_int,
    )
}
