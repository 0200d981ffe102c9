// file: src/phases/cert.rs
// version: 1.0.0
// guid: b3e6f821-7c50-49ad-8f14-62d9a0c5e7b8

//! Certificate generation and distribution for HA control planes
//!
//! Every master receives the same three CAs and its own leaf set before
//! `kubeadm init` runs, so kubeadm adopts the pre-seeded authorities instead
//! of minting per-node ones. Written files land where kubeadm looks for
//! them: `/etc/kubernetes/pki` for certificate pairs, `/etc/kubernetes` for
//! kubeconfig files.

use colored::Colorize;
use tracing::{debug, info};

use crate::config::{Cluster, Node};
use crate::pki::{self, CertPair};
use crate::tmpl;
use crate::Result;

const KUBE_DIR: &str = "/etc/kubernetes";
const PKI_DIR: &str = "/etc/kubernetes/pki";

/// Generate the shared CAs and one certificate tree per master
pub async fn generate(cluster: &Cluster) -> Result<()> {
    info!(
        "generating certificates for {} master(s)",
        cluster.masters.len()
    );
    let ca = pki::new_cluster_ca()?;
    for master in &cluster.masters {
        let mut node = master.lock().await;
        let tree = pki::node_certificate_tree(&ca, &cluster.kubeadm, node.host())?;
        debug!("[{}] certificate tree generated", node.host());
        node.certificate_tree = tree;
    }
    Ok(())
}

/// Write each master's tree out to the node, CAs ahead of the leaves they
/// signed, and drop the local key material once it has landed
pub async fn send(cluster: &Cluster) -> Result<()> {
    println!("{}", "Sending certificates 🔏".bright_blue());
    cluster
        .run_on_masters(|node| async move {
            let mut node = node.lock().await;
            if node.certificate_tree.is_empty() {
                debug!("[{}] no certificate tree to send", node.host());
                return Ok(());
            }
            send_node_tree(&node).await?;
            node.certificate_tree.clear();
            info!("[{}] certificates sent", node.host());
            Ok(())
        })
        .await?;
    println!("{}", "done✅️".bright_green());
    Ok(())
}

async fn send_node_tree(node: &Node) -> Result<()> {
    node.run(&format!("mkdir -p {}/etcd", PKI_DIR)).await?;
    for (ca, leaves) in node.certificate_tree.groups() {
        send_pair(node, ca).await?;
        for leaf in leaves {
            send_pair(node, leaf).await?;
        }
    }
    Ok(())
}

async fn send_pair(node: &Node, pair: &CertPair) -> Result<()> {
    if let Some(kubeconfig) = &pair.kubeconfig {
        let path = format!("{}/{}", KUBE_DIR, pair.base_name);
        debug!("[{}] writing {}", node.host(), path);
        node.run(&tmpl::write_file_base64(
            kubeconfig.encode()?.as_bytes(),
            &path,
        ))
        .await?;
        if pair.name == "admin" {
            node.run(&tmpl::copy_admin_config()).await?;
        }
        return Ok(());
    }

    let cert_path = format!("{}/{}.crt", PKI_DIR, pair.base_name);
    debug!("[{}] writing {}", node.host(), cert_path);
    node.run(&tmpl::write_file_base64(pair.cert_pem.as_bytes(), &cert_path))
        .await?;
    node.run(&tmpl::write_file_base64(
        pair.key_pem.as_bytes(),
        &format!("{}/{}.key", PKI_DIR, pair.base_name),
    ))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::testing::scripted_cluster;

    #[tokio::test]
    async fn test_generate_builds_trees_for_masters_only() {
        // Arrange
        let (cluster, _shells) = scripted_cluster(&["10.0.0.1", "10.0.0.2"], &["10.0.0.10"]);

        // Act
        generate(&cluster).await.unwrap();

        // Assert
        assert!(!cluster.masters[0].lock().await.certificate_tree.is_empty());
        assert!(!cluster.masters[1].lock().await.certificate_tree.is_empty());
        assert!(cluster.workers[0].lock().await.certificate_tree.is_empty());
    }

    #[tokio::test]
    async fn test_send_writes_cas_before_leaves_and_clears_tree() {
        // Arrange
        let (cluster, shells) = scripted_cluster(&["10.0.0.1", "10.0.0.2"], &[]);
        generate(&cluster).await.unwrap();

        // Act
        send(&cluster).await.unwrap();

        // Assert
        for shell in &shells {
            let commands = shell.commands();
            assert!(commands[0].starts_with("mkdir -p /etc/kubernetes/pki/etcd"));

            let pos = |suffix: &str| {
                commands
                    .iter()
                    .position(|c| c.ends_with(suffix))
                    .unwrap_or_else(|| panic!("no command ends with {}", suffix))
            };
            assert!(pos("> /etc/kubernetes/pki/ca.crt") < pos("> /etc/kubernetes/pki/apiserver.crt"));
            assert!(
                pos("> /etc/kubernetes/pki/etcd/ca.crt")
                    < pos("> /etc/kubernetes/pki/etcd/server.crt")
            );
            assert!(commands.iter().any(|c| c.ends_with("> /etc/kubernetes/admin.conf")));
            assert!(commands
                .iter()
                .any(|c| c.ends_with("> /etc/kubernetes/controller-manager.conf")));
        }
        assert!(cluster.masters[0].lock().await.certificate_tree.is_empty());
        assert!(cluster.masters[1].lock().await.certificate_tree.is_empty());
    }

    #[tokio::test]
    async fn test_kubeconfig_leaves_are_not_written_into_pki_dir() {
        // Arrange
        let (cluster, shells) = scripted_cluster(&["10.0.0.1"], &[]);
        generate(&cluster).await.unwrap();

        // Act
        send(&cluster).await.unwrap();

        // Assert: admin/scheduler/controller-manager exist only as conf files
        let commands = shells[0].commands();
        assert!(!commands.iter().any(|c| c.contains("pki/admin")));
        assert!(!commands.iter().any(|c| c.contains("pki/scheduler")));
    }

    #[tokio::test]
    async fn test_admin_config_copied_into_home() {
        let (cluster, shells) = scripted_cluster(&["10.0.0.1"], &[]);
        generate(&cluster).await.unwrap();
        send(&cluster).await.unwrap();
        assert!(shells[0]
            .commands()
            .iter()
            .any(|c| c.contains("cp /etc/kubernetes/admin.conf $HOME/.kube/config")));
    }

    #[tokio::test]
    async fn test_send_without_tree_issues_no_commands() {
        // Arrange: generate never ran
        let (cluster, shells) = scripted_cluster(&["10.0.0.1"], &[]);

        // Act
        send(&cluster).await.unwrap();

        // Assert
        assert!(shells[0].commands().is_empty());
    }
}
