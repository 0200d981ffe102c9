// file: src/config/cluster.rs
// version: 1.0.0
// guid: e8b3d470-1f59-4c82-a6d3-7b90e5c2f164

//! Runtime cluster records: hosts, nodes, jump server
//!
//! A [`Node`] is mutated in place as the run progresses (session handle,
//! package manager, staged flag, certificate tree). Nodes are shared with
//! concurrent fleet tasks as [`SharedNode`]; the fleet executor dispatches at
//! most one task per node, so the lock is never contended in practice.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{InstallMode, KubeadmConfig, PackageManager};
use crate::pki::CertificateTree;
use crate::ssh::{RemoteShell, SshSession};
use crate::Result;

/// A remote SSH endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    /// Host address (IP or resolvable name)
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Login user
    pub user: String,
    /// Password (empty when key or agent auth is used)
    pub password: String,
    /// Private key path
    pub key_path: Option<PathBuf>,
}

/// Connection settings shared by every node built from the flag set
#[derive(Debug, Clone)]
pub struct NodeAuth {
    pub user: String,
    pub password: String,
    pub port: u16,
    pub key_path: Option<PathBuf>,
}

impl HostInfo {
    /// Build the endpoint record for one node address using the shared
    /// connection settings
    pub fn with_auth(host: impl Into<String>, auth: &NodeAuth) -> Self {
        Self {
            host: host.into(),
            port: auth.port,
            user: auth.user.clone(),
            password: auth.password.clone(),
            key_path: auth.key_path.clone(),
        }
    }
}

/// A node is shared with fleet tasks behind an async mutex
pub type SharedNode = Arc<tokio::sync::Mutex<Node>>;

/// One remote host taking part in the cluster
pub struct Node {
    pub host_info: HostInfo,
    pub install_mode: InstallMode,
    pub package_manager: PackageManager,
    /// Live shell session, None until preflight connects
    pub shell: Option<Arc<dyn RemoteShell>>,
    /// True once the offline bundle has been transferred and extracted
    pub staged: bool,
    pub certificate_tree: CertificateTree,
}

impl Node {
    pub fn new(host_info: HostInfo, install_mode: InstallMode) -> Self {
        Self {
            host_info,
            install_mode,
            package_manager: PackageManager::Unknown,
            shell: None,
            staged: false,
            certificate_tree: CertificateTree::default(),
        }
    }

    pub fn new_shared(host_info: HostInfo, install_mode: InstallMode) -> SharedNode {
        Arc::new(tokio::sync::Mutex::new(Self::new(host_info, install_mode)))
    }

    /// Host address, also used as the node name in kubeadm commands
    pub fn host(&self) -> &str {
        &self.host_info.host
    }

    fn shell_handle(&self) -> Result<Arc<dyn RemoteShell>> {
        self.shell.clone().ok_or_else(|| {
            crate::KubeiError::connect(&self.host_info.host, "no active shell session")
        })
    }

    /// Run a remote command, requiring a zero exit status
    pub async fn run(&self, command: &str) -> Result<()> {
        self.shell_handle()?.run(command).await
    }

    /// Run a remote command and capture its stdout
    pub async fn run_capture(&self, command: &str) -> Result<String> {
        self.shell_handle()?.run_capture(command).await
    }

    /// Copy a local file to the node
    pub async fn send_file(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        self.shell_handle()?.send_file(remote_path, local_path).await
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("host", &self.host_info.host)
            .field("install_mode", &self.install_mode)
            .field("package_manager", &self.package_manager)
            .field("connected", &self.shell.is_some())
            .field("staged", &self.staged)
            .finish()
    }
}

/// Optional bastion relaying node connections
///
/// When enabled, its own session is established at most once and shared as
/// the tunnel for every node connection.
pub struct JumpServer {
    pub host_info: HostInfo,
    session: tokio::sync::OnceCell<SshSession>,
}

impl JumpServer {
    pub fn new(host_info: Option<HostInfo>) -> Self {
        Self {
            host_info: host_info.unwrap_or(HostInfo {
                host: String::new(),
                port: 22,
                user: String::new(),
                password: String::new(),
                key_path: None,
            }),
            session: tokio::sync::OnceCell::new(),
        }
    }

    /// A jump server with an empty host is not in use and nodes dial directly
    pub fn is_enabled(&self) -> bool {
        !self.host_info.host.is_empty()
    }

    /// The shared bastion session, dialed on first use
    ///
    /// Concurrent first callers are serialized by the cell so the bastion is
    /// never dialed twice.
    pub async fn session(&self) -> Result<&SshSession> {
        self.session
            .get_or_try_init(|| SshSession::connect_tunnel_host(&self.host_info))
            .await
    }
}

impl fmt::Debug for JumpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JumpServer")
            .field("host", &self.host_info.host)
            .field("connected", &self.session.initialized())
            .finish()
    }
}

/// The whole run: nodes, jump server, and cluster-level settings
#[derive(Debug)]
pub struct Cluster {
    pub jump_server: Arc<JumpServer>,
    pub masters: Vec<SharedNode>,
    pub workers: Vec<SharedNode>,
    pub kubeadm: KubeadmConfig,
    pub container_engine_version: String,
    pub network_plugin: String,
    pub offline_file: Option<PathBuf>,
}

impl Cluster {
    /// More than one master means the control plane is joined in HA mode
    pub fn is_ha(&self) -> bool {
        self.masters.len() > 1
    }

    pub fn install_mode(&self) -> InstallMode {
        if self.offline_file.is_some() {
            InstallMode::Offline
        } else {
            InstallMode::Online
        }
    }

    /// Masters then workers, as independently cloneable handles
    pub fn all_nodes(&self) -> Vec<SharedNode> {
        self.masters
            .iter()
            .chain(self.workers.iter())
            .cloned()
            .collect()
    }

    /// Require a bootstrappable configuration before any network activity
    pub fn validate(&self) -> Result<()> {
        if self.masters.is_empty() {
            return Err(crate::KubeiError::config(
                "at least one master node is required (--masters)",
            ));
        }
        Ok(())
    }

    /// Run an operation concurrently over the master nodes
    pub async fn run_on_masters<F, Fut>(&self, op: F) -> Result<()>
    where
        F: Fn(SharedNode) -> Fut + Clone + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        crate::fleet::run_on_nodes(&self.masters, crate::fleet::DEFAULT_MAX_PARALLELISM, op).await
    }

    /// Run an operation concurrently over every node
    pub async fn run_on_all_nodes<F, Fut>(&self, op: F) -> Result<()>
    where
        F: Fn(SharedNode) -> Fut + Clone + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        crate::fleet::run_on_nodes(&self.all_nodes(), crate::fleet::DEFAULT_MAX_PARALLELISM, op)
            .await
    }

    /// Close every node session exactly once
    pub async fn close_ssh(&self) {
        for node in self.all_nodes() {
            let (host, shell) = {
                let mut node = node.lock().await;
                (node.host().to_string(), node.shell.take())
            };
            if let Some(shell) = shell {
                if let Err(e) = shell.close().await {
                    debug!("[{}] error closing SSH session: {}", host, e);
                }
            }
        }
    }
}

/// Build shared nodes for a list of host addresses
pub fn nodes_from_hosts(
    hosts: &[String],
    auth: &NodeAuth,
    install_mode: InstallMode,
) -> Vec<SharedNode> {
    hosts
        .iter()
        .filter(|h| !h.trim().is_empty())
        .map(|h| Node::new_shared(HostInfo::with_auth(h.trim(), auth), install_mode))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> NodeAuth {
        NodeAuth {
            user: "root".to_string(),
            password: "pw".to_string(),
            port: 22,
            key_path: None,
        }
    }

    fn cluster_with(masters: &[&str], workers: &[&str]) -> Cluster {
        let auth = auth();
        Cluster {
            jump_server: Arc::new(JumpServer::new(None)),
            masters: nodes_from_hosts(
                &masters.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
                &auth,
                InstallMode::Online,
            ),
            workers: nodes_from_hosts(
                &workers.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
                &auth,
                InstallMode::Online,
            ),
            kubeadm: KubeadmConfig::default(),
            container_engine_version: String::new(),
            network_plugin: "flannel".to_string(),
            offline_file: None,
        }
    }

    #[test]
    fn test_validate_requires_master() {
        let cluster = cluster_with(&[], &["10.0.0.10"]);
        assert!(matches!(
            cluster.validate(),
            Err(crate::KubeiError::Config(_))
        ));

        let cluster = cluster_with(&["10.0.0.1"], &[]);
        assert!(cluster.validate().is_ok());
    }

    #[test]
    fn test_ha_flag_derived_from_master_count() {
        assert!(!cluster_with(&["10.0.0.1"], &[]).is_ha());
        assert!(cluster_with(&["10.0.0.1", "10.0.0.2"], &[]).is_ha());
    }

    #[test]
    fn test_all_nodes_orders_masters_first() {
        let cluster = cluster_with(&["10.0.0.1"], &["10.0.0.10", "10.0.0.11"]);
        let hosts: Vec<String> = cluster
            .all_nodes()
            .iter()
            .map(|n| n.try_lock().unwrap().host().to_string())
            .collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.10", "10.0.0.11"]);
    }

    #[test]
    fn test_nodes_from_hosts_skips_blank_entries() {
        let hosts = vec!["10.0.0.1".to_string(), " ".to_string(), String::new()];
        assert_eq!(nodes_from_hosts(&hosts, &auth(), InstallMode::Online).len(), 1);
    }

    #[test]
    fn test_jump_server_disabled_when_unset() {
        assert!(!JumpServer::new(None).is_enabled());
        let info = HostInfo::with_auth("10.9.0.1", &auth());
        assert!(JumpServer::new(Some(info)).is_enabled());
    }

    #[tokio::test]
    async fn test_node_run_without_session_is_a_connect_error() {
        let node = Node::new(HostInfo::with_auth("10.0.0.1", &auth()), InstallMode::Online);
        let err = node.run("true").await.unwrap_err();
        assert!(matches!(err, crate::KubeiError::Connect { .. }));
        assert_eq!(err.host(), Some("10.0.0.1"));
    }
}
