//! Command-line interface

pub mod output;

use crate::core::config::{DeployConfig, RuntimeSettings};
use crate::stages::{HostTarget, PipelineOptions};
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Build a single-node Kubernetes cluster and deploy Kolla on it
#[derive(Debug, Parser, Clone)]
#[command(name = "kolla-aio")]
#[command(version)]
#[command(
    about = "Deploy Kubernetes and a Kolla OpenStack control plane on one host",
    long_about = None
)]
#[command(after_help = "E.g.: kolla-aio eth0 10.192.16.32 eth1")]
pub struct Cli {
    /// Management interface, e.g. eth0
    #[arg(value_name = "MGMT_INT")]
    pub mgmt_int: String,

    /// Management interface IP address, e.g. 10.240.83.111
    #[arg(value_name = "MGMT_IP")]
    pub mgmt_ip: String,

    /// Neutron interface, e.g. eth1
    #[arg(value_name = "NEUTRON_INT")]
    pub neutron_int: String,

    /// Helm version to install [default: 2.2.3]
    #[arg(long, value_name = "VERSION")]
    pub helm_version: Option<String>,

    /// Tear down an existing cluster before creating a new one
    #[arg(short, long)]
    pub cleanup: bool,

    /// Stop after bringing up Kubernetes
    #[arg(short, long)]
    pub kubernetes_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Path to a YAML deployment configuration
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory for downloads, clones and generated files
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Pause for a manual DNS check once Kubernetes is up
    #[arg(long)]
    pub pause: bool,

    /// Print the steps that would run and exit
    #[arg(long)]
    pub plan: bool,

    /// Print the plan as JSON
    #[arg(long, requires = "plan")]
    pub json: bool,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    pub fn target(&self) -> HostTarget {
        HostTarget {
            mgmt_int: self.mgmt_int.clone(),
            mgmt_ip: self.mgmt_ip.clone(),
            neutron_int: self.neutron_int.clone(),
        }
    }

    pub fn options(&self) -> PipelineOptions {
        PipelineOptions {
            cleanup: self.cleanup,
            kubernetes_only: self.kubernetes_only,
            pause: self.pause,
        }
    }

    pub fn settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            verbose: self.verbose,
        }
    }

    /// Apply flag overrides on top of the file configuration
    pub fn apply_overrides(&self, config: &mut DeployConfig) {
        if let Some(version) = &self.helm_version {
            config.versions.helm = version.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.paths.work_dir = dir.clone();
        }
    }
}
