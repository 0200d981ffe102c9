// file: src/phases/init.rs
// version: 1.0.0
// guid: 58c1f9a2-b4d6-4e73-80a5-9f21d7c4e6b0

//! Full bootstrap orchestration
//!
//! Order matters: packages must be installed everywhere before the first
//! `kubeadm init`, certificates must be on the masters before kubeadm can
//! adopt them, the network plugin must exist before joined nodes can become
//! Ready.

use std::time::{Duration, Instant};

use tracing::info;

use crate::config::Cluster;
use crate::phases::{cert, kube, kubeadm, network, system};
use crate::preflight;
use crate::Result;

/// Outcome of a completed bootstrap
#[derive(Debug)]
pub struct BootstrapReport {
    pub masters: usize,
    pub workers: usize,
    /// False when the readiness poll timed out; the control plane is up
    /// either way
    pub ready: bool,
    pub elapsed: Duration,
}

/// Bring the whole cluster up
pub async fn bootstrap(cluster: &Cluster) -> Result<BootstrapReport> {
    let started = Instant::now();
    cluster.validate()?;

    preflight::check(cluster).await?;
    system::prepare(cluster).await?;
    kube::install_container_engine(cluster).await?;
    kube::install_kubernetes_component(cluster).await?;

    if cluster.is_ha() {
        cert::generate(cluster).await?;
        cert::send(cluster).await?;
    }

    let join = kubeadm::init_master(cluster).await?;
    network::install_network_plugin(cluster).await?;
    kubeadm::join_nodes(cluster, &join).await?;

    let ready = kubeadm::check_nodes_ready(
        cluster,
        kubeadm::READY_POLL_INTERVAL,
        kubeadm::READY_TIMEOUT,
    )
    .await?;

    let report = BootstrapReport {
        masters: cluster.masters.len(),
        workers: cluster.workers.len(),
        ready,
        elapsed: started.elapsed(),
    };
    info!(
        "bootstrap finished in {:.0?}: {} master(s), {} worker(s), ready={}",
        report.elapsed, report.masters, report.workers, report.ready
    );
    Ok(report)
}
