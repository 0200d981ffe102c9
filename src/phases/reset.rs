// file: src/phases/reset.rs
// version: 1.0.0
// guid: d82a60c3-1e97-4b54-a6f8-07c3d9e5b216

//! Cluster teardown

use colored::Colorize;
use tracing::info;

use crate::config::Cluster;
use crate::fleet::{self, TaskGroup};
use crate::phases::kube;
use crate::tmpl;
use crate::Result;

/// Reset every node's kubeadm state, optionally removing the installed
/// packages as well
///
/// The reset and the two removals run as concurrent branches; each branch
/// covers all nodes, and the first failing branch decides the returned
/// error while the others run to completion.
pub async fn teardown(cluster: &Cluster, remove_kube: bool, remove_engine: bool) -> Result<()> {
    println!("{}", "Resetting cluster nodes ♻️".bright_blue());
    let nodes = cluster.all_nodes();
    let domain = cluster.kubeadm.api_domain().to_string();

    let mut group = TaskGroup::new();

    {
        let nodes = nodes.clone();
        group.spawn("kubeadm reset", async move {
            fleet::run_on_nodes(&nodes, fleet::DEFAULT_MAX_PARALLELISM, move |node| {
                let domain = domain.clone();
                async move {
                    let node = node.lock().await;
                    info!("[{}] resetting kubeadm state", node.host());
                    node.run(&tmpl::kubeadm_reset()).await?;
                    node.run(&tmpl::reset_hosts(&domain)).await
                }
            })
            .await
        });
    }

    if remove_kube {
        let nodes = nodes.clone();
        group.spawn("remove kubernetes component", async move {
            kube::remove_kubernetes_component(&nodes).await
        });
    }

    if remove_engine {
        let nodes = nodes.clone();
        group.spawn("remove container engine", async move {
            kube::remove_container_engine(&nodes).await
        });
    }

    group.wait().await?;
    println!("{}", "done✅️".bright_green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackageManager;
    use crate::phases::testing::scripted_cluster;
    use crate::ssh::testing::ScriptedShell;
    use crate::ssh::RemoteShell;

    #[tokio::test]
    async fn test_teardown_resets_kubeadm_and_hosts_on_every_node() {
        // Arrange
        let (cluster, shells) = scripted_cluster(&["10.0.0.1"], &["10.0.0.10"]);

        // Act
        teardown(&cluster, false, false).await.unwrap();

        // Assert
        for shell in &shells {
            assert_eq!(
                shell.commands(),
                vec![
                    "yes | kubeadm reset".to_string(),
                    "sed -i '/apiserver.k8s.local/d' /etc/hosts".to_string(),
                ]
            );
        }
    }

    #[tokio::test]
    async fn test_teardown_removals_follow_flags() {
        // Arrange
        let (cluster, shells) = scripted_cluster(&["10.0.0.1"], &[]);
        cluster.masters[0].lock().await.package_manager = PackageManager::Apt;

        // Act
        teardown(&cluster, true, true).await.unwrap();

        // Assert: branches interleave, so check membership rather than order
        let commands = shells[0].commands();
        assert_eq!(commands.len(), 4);
        assert!(commands.iter().any(|c| c == "yes | kubeadm reset"));
        assert!(commands.iter().any(|c| c.contains("purge -y kubelet")));
        assert!(commands.iter().any(|c| c.contains("purge -y containerd.io")));
    }

    #[tokio::test]
    async fn test_teardown_surfaces_first_branch_failure() {
        // Arrange
        let (cluster, _shells) = scripted_cluster(&["10.0.0.1", "10.0.0.2"], &[]);
        {
            let mut node = cluster.masters[1].lock().await;
            let failing = std::sync::Arc::new(
                ScriptedShell::new("10.0.0.2").fail_on("kubeadm reset"),
            );
            node.shell = Some(failing as std::sync::Arc<dyn RemoteShell>);
        }

        // Act
        let err = teardown(&cluster, false, false).await.unwrap_err();

        // Assert
        assert_eq!(err.host(), Some("10.0.0.2"));
    }
}
