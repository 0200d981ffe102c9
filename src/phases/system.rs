// file: src/phases/system.rs
// version: 1.0.0
// guid: 9d24f6b1-83c7-4a05-bd62-4ef90c17a538

//! Host preparation: swap, kernel modules, systemd units

use tracing::{debug, info};

use crate::config::{Cluster, Node};
use crate::tmpl;
use crate::Result;

/// Bring every node to the state kubeadm preflight expects: swap off and
/// bridge netfilter loaded, both persisted across reboots
pub async fn prepare(cluster: &Cluster) -> Result<()> {
    info!(
        "preparing system settings on {} node(s)",
        cluster.all_nodes().len()
    );
    cluster
        .run_on_all_nodes(|node| async move {
            let node = node.lock().await;
            debug!("[{}] disabling swap", node.host());
            node.run(&tmpl::disable_swap()).await?;
            debug!("[{}] enabling bridge netfilter", node.host());
            node.run(&tmpl::enable_bridge_netfilter()).await?;
            Ok(())
        })
        .await
}

/// Restart a systemd unit and enable it at boot
pub async fn restart_and_enable(node: &Node, unit: &str) -> Result<()> {
    debug!("[{}] restarting {}", node.host(), unit);
    node.run(&format!(
        "systemctl restart {} && systemctl enable {}",
        unit, unit
    ))
    .await
}
