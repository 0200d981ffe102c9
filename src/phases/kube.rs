// file: src/phases/kube.rs
// version: 1.0.0
// guid: c5a8e2d9-4b17-4f60-8e3a-29d6b0f417c2

//! Container engine and Kubernetes component installation

use colored::Colorize;
use tracing::info;

use crate::config::{Cluster, SharedNode};
use crate::fleet;
use crate::phases::system;
use crate::tmpl::{ContainerEngineText, KubeText};
use crate::Result;

/// Install containerd on every node and switch it to the systemd cgroup
/// driver
pub async fn install_container_engine(cluster: &Cluster) -> Result<()> {
    println!("{}", "Installing container engine 🐳".bright_blue());
    let version = cluster.container_engine_version.clone();
    let mode = cluster.install_mode();
    cluster
        .run_on_all_nodes(move |node| {
            let version = version.clone();
            async move {
                let node = node.lock().await;
                info!("[{}] installing containerd", node.host());
                let text = ContainerEngineText::new(node.package_manager);
                node.run(&text.install(&version, mode)?).await?;
                system::restart_and_enable(&node, "containerd").await
            }
        })
        .await?;
    println!("{}", "done✅️".bright_green());
    Ok(())
}

/// Install kubelet, kubeadm and kubectl on every node
pub async fn install_kubernetes_component(cluster: &Cluster) -> Result<()> {
    println!("{}", "Installing Kubernetes component ☸️".bright_blue());
    let version = cluster.kubeadm.version.clone();
    let mode = cluster.install_mode();
    cluster
        .run_on_all_nodes(move |node| {
            let version = version.clone();
            async move {
                let node = node.lock().await;
                info!("[{}] installing kubernetes component", node.host());
                let text = KubeText::new(node.package_manager);
                node.run(&text.install(&version, mode)?).await?;
                system::restart_and_enable(&node, "kubelet").await
            }
        })
        .await?;
    println!("{}", "done✅️".bright_green());
    Ok(())
}

/// Remove kubelet, kubeadm and kubectl from the given nodes
pub async fn remove_kubernetes_component(nodes: &[SharedNode]) -> Result<()> {
    info!("removing kubernetes component from {} node(s)", nodes.len());
    fleet::run_on_nodes(nodes, fleet::DEFAULT_MAX_PARALLELISM, |node| async move {
        let node = node.lock().await;
        let text = KubeText::new(node.package_manager);
        node.run(&text.remove()?).await
    })
    .await
}

/// Remove containerd and its on-disk state from the given nodes
pub async fn remove_container_engine(nodes: &[SharedNode]) -> Result<()> {
    info!("removing container engine from {} node(s)", nodes.len());
    fleet::run_on_nodes(nodes, fleet::DEFAULT_MAX_PARALLELISM, |node| async move {
        let node = node.lock().await;
        let text = ContainerEngineText::new(node.package_manager);
        node.run(&text.remove()?).await
    })
    .await
}
