// file: src/phases/network.rs
// version: 1.0.0
// guid: 7e01c4d8-62b9-4af3-95d0-3c8a1f6e2b47

//! Pod network plugin installation

use colored::Colorize;
use tracing::info;

use crate::config::Cluster;
use crate::tmpl;
use crate::tmpl::flannel::{
    DEFAULT_FLANNEL_BACKEND, DEFAULT_FLANNEL_CNI_PLUGIN_IMAGE, DEFAULT_FLANNEL_IMAGE,
};
use crate::{KubeiError, Result};

/// Install the configured pod network plugin through the first master
pub async fn install_network_plugin(cluster: &Cluster) -> Result<()> {
    match cluster.network_plugin.as_str() {
        // Flannel is the only plugin shipped; an empty flag keeps the default.
        "" | "flannel" => install_flannel(cluster).await,
        other => Err(KubeiError::config(format!(
            "unsupported network plugin '{}' (supported: flannel)",
            other
        ))),
    }
}

async fn install_flannel(cluster: &Cluster) -> Result<()> {
    println!("{}", "Installing network plugin 🌐".bright_blue());
    let manifest = tmpl::flannel_manifest(
        &cluster.kubeadm.networking.pod_subnet,
        DEFAULT_FLANNEL_IMAGE,
        DEFAULT_FLANNEL_CNI_PLUGIN_IMAGE,
        DEFAULT_FLANNEL_BACKEND,
    );

    let master = cluster
        .masters
        .first()
        .ok_or_else(|| KubeiError::config("at least one master node is required"))?;
    let master = master.lock().await;
    info!("[{}] applying flannel manifest", master.host());
    master.run(&tmpl::apply_manifest(&manifest)).await?;
    println!("{}", "done✅️".bright_green());
    Ok(())
}
