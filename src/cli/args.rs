// file: src/cli/args.rs
// version: 1.1.0
// guid: f2a84c61-0d97-4e35-b1c6-58e0d3a92f74

//! Command line argument definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "kubei")]
#[command(about = "Bootstrap highly available Kubernetes clusters over SSH")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a Kubernetes cluster onto the given hosts
    Init {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Kubernetes version to install on the nodes
        #[arg(long, default_value = "1.29.0")]
        kubernetes_version: String,

        /// Container engine version, the repository's latest when empty
        #[arg(long, default_value = "")]
        container_engine_version: String,

        /// Stable apiserver endpoint as domain:port
        #[arg(long, default_value = "apiserver.k8s.local:6443")]
        control_plane_endpoint: String,

        /// Registry for the control plane images
        #[arg(long, default_value = "registry.k8s.io")]
        image_repository: String,

        /// Pod network CIDR
        #[arg(long, default_value = "10.244.0.0/16")]
        pod_network_cidr: String,

        /// Service network CIDR
        #[arg(long, default_value = "10.96.0.0/12")]
        service_cidr: String,

        /// Pod network plugin to install
        #[arg(long, default_value = "flannel")]
        network_plugin: String,

        /// Offline package bundle; enables air-gapped installation
        #[arg(long)]
        offline_file: Option<PathBuf>,
    },

    /// Tear the cluster down on the given hosts
    Reset {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Also remove kubelet, kubeadm and kubectl
        #[arg(long)]
        remove_kubernetes_component: bool,

        /// Also remove the container engine and its state
        #[arg(long)]
        remove_container_engine: bool,

        /// Apiserver endpoint whose /etc/hosts pin should be removed
        #[arg(long, default_value = "apiserver.k8s.local:6443")]
        control_plane_endpoint: String,
    },
}

/// SSH connection settings shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct ConnectionArgs {
    /// Master node addresses
    #[arg(short, long, value_delimiter = ',')]
    pub masters: Vec<String>,

    /// Worker node addresses
    #[arg(short, long, value_delimiter = ',')]
    pub workers: Vec<String>,

    /// SSH login user
    #[arg(short, long, default_value = "root")]
    pub user: String,

    /// SSH password; key or agent auth is tried when empty
    #[arg(short, long, default_value = "")]
    pub password: String,

    /// SSH port
    #[arg(long, default_value_t = 22)]
    pub port: u16,

    /// SSH private key path
    #[arg(short, long)]
    pub key: Option<PathBuf>,

    /// Bastion relaying all node connections, as
    /// "host=ADDR,port=22,user=root,password=...,key=..."
    #[arg(long)]
    pub jump_server: Option<String>,
}
