// file: src/phases/kubeadm.rs
// version: 1.0.0
// guid: a94d72e6-0c85-4f31-b7d9-5e16c8a3f024

//! Control plane initialization and node joins
//!
//! `init_master` bootstraps the first master and parses the join credentials
//! out of the kubeadm output; `join_nodes` then fans the remaining
//! control-plane nodes and workers out concurrently. The apiserver endpoint
//! domain is pinned in each node's `/etc/hosts`: joining nodes resolve it to
//! the first master, and every control-plane node is repointed to itself
//! once it serves the endpoint too.

use std::time::Duration;

use colored::Colorize;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::{Cluster, JoinParameters, KubeadmConfig, SharedNode};
use crate::fleet::{self, TaskGroup};
use crate::tmpl::{self, KubeadmPhase};
use crate::{KubeiError, Result};

/// How often the readiness poll asks the apiserver for node states
pub const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// How long the readiness poll waits before giving up
pub const READY_TIMEOUT: Duration = Duration::from_secs(360);

/// Initialize the first master and return the join credentials advertised in
/// the kubeadm output
pub async fn init_master(cluster: &Cluster) -> Result<JoinParameters> {
    let master = cluster
        .masters
        .first()
        .ok_or_else(|| KubeiError::config("at least one master node is required"))?;
    let node = master.lock().await;

    println!("{}", "Initializing control plane ☸️".bright_blue());
    node.run(&tmpl::set_hosts(node.host(), cluster.kubeadm.api_domain()))
        .await?;

    let command = tmpl::kubeadm(
        KubeadmPhase::Init,
        node.host(),
        &cluster.kubeadm,
        &JoinParameters::default(),
    );
    info!("[{}] running kubeadm init", node.host());
    let output = node.run_capture(&command).await?;
    debug!("[{}] kubeadm init output:\n{}", node.host(), output);

    node.run(&tmpl::copy_admin_config()).await?;
    node.run(&tmpl::chown_admin_config()).await?;

    let join = parse_join_parameters(&output, node.host())?;
    println!("{}", "done✅️".bright_green());
    Ok(join)
}

/// Join the remaining control-plane nodes and the workers concurrently
///
/// The two fan-outs run as branches of one task group sharing a cancellation
/// token, so a failure on either side stops nodes that have not started yet
/// on both.
pub async fn join_nodes(cluster: &Cluster, join: &JoinParameters) -> Result<()> {
    let control_plane: Vec<SharedNode> = cluster.masters.iter().skip(1).cloned().collect();
    if control_plane.is_empty() && cluster.workers.is_empty() {
        return Ok(());
    }

    let apiserver_ip = {
        let first = cluster
            .masters
            .first()
            .ok_or_else(|| KubeiError::config("at least one master node is required"))?;
        first.lock().await.host().to_string()
    };

    println!("{}", "Joining remaining nodes 🔗".bright_blue());
    let mut group = TaskGroup::new();

    if !control_plane.is_empty() {
        let cancel = group.cancel_token();
        let op = join_op(
            KubeadmPhase::JoinControlPlane,
            apiserver_ip.clone(),
            cluster.kubeadm.clone(),
            join.clone(),
        );
        group.spawn("control-plane join", async move {
            fleet::run_on_nodes_with_cancel(
                &control_plane,
                fleet::DEFAULT_MAX_PARALLELISM,
                &cancel,
                op,
            )
            .await
        });
    }

    if !cluster.workers.is_empty() {
        let workers = cluster.workers.clone();
        let cancel = group.cancel_token();
        let op = join_op(
            KubeadmPhase::JoinNode,
            apiserver_ip,
            cluster.kubeadm.clone(),
            join.clone(),
        );
        group.spawn("worker join", async move {
            fleet::run_on_nodes_with_cancel(&workers, fleet::DEFAULT_MAX_PARALLELISM, &cancel, op)
                .await
        });
    }

    group.wait().await?;
    println!("{}", "done✅️".bright_green());
    Ok(())
}

/// Fleet operation joining one node in the given phase
fn join_op(
    phase: KubeadmPhase,
    apiserver_ip: String,
    cfg: KubeadmConfig,
    join: JoinParameters,
) -> impl Fn(SharedNode) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>
       + Clone
       + Send
       + 'static {
    move |node| {
        let apiserver_ip = apiserver_ip.clone();
        let cfg = cfg.clone();
        let join = join.clone();
        Box::pin(async move {
            let node = node.lock().await;
            node.run(&tmpl::set_hosts(&apiserver_ip, cfg.api_domain()))
                .await?;

            info!("[{}] joining cluster", node.host());
            node.run(&tmpl::kubeadm(phase, node.host(), &cfg, &join))
                .await?;

            if phase == KubeadmPhase::JoinControlPlane {
                // This node serves the endpoint itself from now on.
                node.run(&tmpl::set_hosts(node.host(), cfg.api_domain()))
                    .await?;
                node.run(&tmpl::copy_admin_config()).await?;
            }
            info!("[{}] joined", node.host());
            Ok(())
        })
    }
}

/// Poll `kubectl get nodes` through the first master until every node
/// reports Ready
///
/// Returns `Ok(false)` on timeout rather than failing: the cluster is up at
/// this point and nodes may simply still be pulling images.
pub async fn check_nodes_ready(
    cluster: &Cluster,
    interval: Duration,
    timeout: Duration,
) -> Result<bool> {
    let expected = cluster.masters.len() + cluster.workers.len();
    let master = cluster
        .masters
        .first()
        .ok_or_else(|| KubeiError::config("at least one master node is required"))?;
    let node = master.lock().await;

    println!("{}", "Waiting for all nodes to become ready ⏳".bright_blue());
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        match node
            .run_capture("KUBECONFIG=/etc/kubernetes/admin.conf kubectl get nodes --no-headers")
            .await
        {
            Ok(output) => {
                let ready = count_ready(&output);
                if ready >= expected {
                    println!("{}", "done✅️".bright_green());
                    return Ok(true);
                }
                debug!("[{}] {}/{} node(s) ready", node.host(), ready, expected);
            }
            Err(e) => debug!("[{}] node state not yet reportable: {}", node.host(), e),
        }

        if tokio::time::Instant::now() >= deadline {
            warn!(
                "nodes not ready after {}s, continuing anyway",
                timeout.as_secs()
            );
            println!(
                "{}",
                "timed out waiting for nodes to become ready ⚠️".bright_yellow()
            );
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Number of lines whose STATUS column reads Ready
fn count_ready(output: &str) -> usize {
    output
        .lines()
        .filter(|line| line.split_whitespace().nth(1) == Some("Ready"))
        .count()
}

fn parse_join_parameters(output: &str, host: &str) -> Result<JoinParameters> {
    let token = capture(output, r"--token\s+(\S+)").ok_or_else(|| {
        KubeiError::command(host, "kubeadm init output did not contain a join token")
    })?;
    let ca_cert_hash = capture(output, r"sha256:([0-9a-f]+)").ok_or_else(|| {
        KubeiError::command(host, "kubeadm init output did not contain a CA cert hash")
    })?;
    // Only advertised with --upload-certs; empty is fine for single-master
    // clusters.
    let certificate_key = capture(output, r"--certificate-key\s+([0-9a-f]+)").unwrap_or_default();

    Ok(JoinParameters {
        token,
        ca_cert_hash,
        certificate_key,
    })
}

fn capture(output: &str, pattern: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(output)?
        .get(1)
        .map(|m| m.as_str().to_string())
}
