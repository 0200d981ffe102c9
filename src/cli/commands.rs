// file: src/cli/commands.rs
// version: 1.2.0
// guid: 8d16b9f4-3e72-4c05-a8d1-f60c24e97b38

//! Command implementations for the CLI

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use tracing::info;

use crate::cli::args::ConnectionArgs;
use crate::config::{
    nodes_from_hosts, parse_jump_server, Cluster, InstallMode, JumpServer, KubeadmConfig,
    Networking, NodeAuth,
};
use crate::{phases, preflight, KubeiError, Result};

/// Assemble the runtime cluster from flag values
pub fn build_cluster(
    connection: &ConnectionArgs,
    kubeadm: KubeadmConfig,
    container_engine_version: String,
    network_plugin: String,
    offline_file: Option<PathBuf>,
) -> Result<Cluster> {
    let auth = NodeAuth {
        user: connection.user.clone(),
        password: connection.password.clone(),
        port: connection.port,
        key_path: connection.key.clone(),
    };
    let jump = match &connection.jump_server {
        Some(value) => Some(parse_jump_server(value)?),
        None => None,
    };
    let install_mode = if offline_file.is_some() {
        InstallMode::Offline
    } else {
        InstallMode::Online
    };

    Ok(Cluster {
        jump_server: Arc::new(JumpServer::new(jump)),
        masters: nodes_from_hosts(&connection.masters, &auth, install_mode),
        workers: nodes_from_hosts(&connection.workers, &auth, install_mode),
        kubeadm,
        container_engine_version,
        network_plugin,
        offline_file,
    })
}

/// Deploy a Kubernetes cluster onto the given hosts
#[allow(clippy::too_many_arguments)]
pub async fn init_command(
    connection: ConnectionArgs,
    kubernetes_version: String,
    container_engine_version: String,
    control_plane_endpoint: String,
    image_repository: String,
    pod_network_cidr: String,
    service_cidr: String,
    network_plugin: String,
    offline_file: Option<PathBuf>,
) -> Result<()> {
    if let Some(file) = &offline_file {
        if !file.exists() {
            return Err(KubeiError::config(format!(
                "offline file {} does not exist",
                file.display()
            )));
        }
    }

    let kubeadm = KubeadmConfig {
        version: kubernetes_version,
        control_plane_endpoint,
        image_repository,
        networking: Networking {
            pod_subnet: pod_network_cidr,
            service_subnet: service_cidr,
        },
    };
    let cluster = build_cluster(
        &connection,
        kubeadm,
        container_engine_version,
        network_plugin,
        offline_file,
    )?;

    info!(
        "bootstrapping {} master(s) and {} worker(s)",
        cluster.masters.len(),
        cluster.workers.len()
    );
    let result = phases::bootstrap(&cluster).await;
    cluster.close_ssh().await;
    let report = result?;

    println!("{}", "Kubernetes cluster is up 🎉".bright_green());
    println!(
        "control plane endpoint: https://{}",
        cluster.kubeadm.control_plane_endpoint
    );
    println!(
        "masters: {}, workers: {}, took {:.0?}",
        report.masters, report.workers, report.elapsed
    );
    if !report.ready {
        println!(
            "{}",
            "some nodes are not Ready yet, check `kubectl get nodes` on a master"
                .bright_yellow()
        );
    }
    Ok(())
}

/// Tear the cluster down on the given hosts
pub async fn reset_command(
    connection: ConnectionArgs,
    remove_kubernetes_component: bool,
    remove_container_engine: bool,
    control_plane_endpoint: String,
) -> Result<()> {
    let kubeadm = KubeadmConfig {
        control_plane_endpoint,
        ..KubeadmConfig::default()
    };
    let cluster = build_cluster(
        &connection,
        kubeadm,
        String::new(),
        "flannel".to_string(),
        None,
    )?;
    if cluster.all_nodes().is_empty() {
        return Err(KubeiError::config(
            "at least one node is required (--masters/--workers)",
        ));
    }

    info!("resetting {} node(s)", cluster.all_nodes().len());
    let result = async {
        preflight::check(&cluster).await?;
        phases::teardown(&cluster, remove_kubernetes_component, remove_container_engine).await
    }
    .await;
    cluster.close_ssh().await;
    result
}
