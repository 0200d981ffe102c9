// file: src/preflight/mod.rs
// version: 1.0.0
// guid: 7a1c94e5-2d68-4b3f-a0e7-58c1f3d92b64

//! Pre-bootstrap node preparation
//!
//! Runs over every node of the cluster before any Kubernetes work starts:
//! establishes the SSH session, classifies the host's package manager from
//! its kernel banner, and in offline mode stages the package bundle onto the
//! node. Every step is idempotent, so a failed bootstrap can be re-run
//! without re-uploading bundles to nodes that already hold them.

use std::path::Path;

use tracing::{debug, info};

use crate::config::{Cluster, InstallMode, Node, PackageManager, STAGING_DIR};
use crate::ssh;
use crate::tmpl;
use crate::{KubeiError, Result};

/// Connect, classify, and (offline mode) stage every node of the cluster
pub async fn check(cluster: &Cluster) -> Result<()> {
    info!(
        "Running preflight on {} node(s)",
        cluster.all_nodes().len()
    );

    let jump = cluster.jump_server.clone();
    let mode = cluster.install_mode();
    // Offline mode implies the path is set; online mode never reads it.
    let offline_file = cluster
        .offline_file
        .as_deref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    cluster
        .run_on_all_nodes(move |node| {
            let jump = jump.clone();
            let offline_file = offline_file.clone();
            async move {
                let mut node = node.lock().await;
                ssh::connect(&mut node, &jump).await?;
                detect_package_manager(&mut node).await?;
                if mode == InstallMode::Offline {
                    stage_bundle(&mut node, &offline_file).await?;
                }
                Ok(())
            }
        })
        .await?;

    info!("Preflight passed on all nodes");
    Ok(())
}

/// Classify a node by its kernel banner, keeping an existing classification
async fn detect_package_manager(node: &mut Node) -> Result<()> {
    if node.package_manager != PackageManager::Unknown {
        return Ok(());
    }

    let banner = node.run_capture("cat /proc/version").await?;
    match classify_package_manager(&banner) {
        Some(pm) => {
            debug!("[{}] package manager: {}", node.host(), pm.as_str());
            node.package_manager = pm;
            Ok(())
        }
        None => Err(KubeiError::unsupported_system(
            node.host(),
            banner.trim().to_string(),
        )),
    }
}

/// Map a kernel banner to the package manager family it implies
pub fn classify_package_manager(banner: &str) -> Option<PackageManager> {
    if banner.contains("Debian") || banner.contains("Ubuntu") {
        Some(PackageManager::Apt)
    } else if banner.contains("Red") {
        Some(PackageManager::Yum)
    } else {
        None
    }
}

/// Upload and unpack the offline bundle, at most once per node
async fn stage_bundle(node: &mut Node, offline_file: &str) -> Result<()> {
    if node.staged {
        debug!("[{}] offline bundle already staged", node.host());
        return Ok(());
    }

    let file_name = Path::new(offline_file)
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            KubeiError::config(format!("invalid offline bundle path: {}", offline_file))
        })?;
    let remote_path = format!("{}/{}", STAGING_DIR, file_name);
    let host = node.host().to_string();

    info!("[{}] staging offline bundle {}", host, file_name);
    node.run(&format!("mkdir -p {}", STAGING_DIR))
        .await
        .map_err(|e| KubeiError::staging(&host, e.reason()))?;
    node.send_file(&remote_path, Path::new(offline_file))
        .await
        .map_err(|e| KubeiError::staging(&host, e.reason()))?;
    node.run(&tmpl::extract(&remote_path, STAGING_DIR))
        .await
        .map_err(|e| KubeiError::staging(&host, e.reason()))?;

    node.staged = true;
    Ok(())
}
