// file: src/config/mod.rs
// version: 1.0.0
// guid: d5a2c791-8e43-4b06-9f18-3c64b2a0e857

//! Configuration module for the cluster bootstrapper
//!
//! Holds the runtime records describing the cluster (nodes, jump server,
//! kubeadm settings) and the parsing helpers that build them from flags.

pub mod cluster;
pub mod kubeadm;

pub use cluster::{nodes_from_hosts, Cluster, HostInfo, JumpServer, Node, NodeAuth, SharedNode};
pub use kubeadm::{JoinParameters, KubeadmConfig, Networking};

use serde::{Deserialize, Serialize};

/// Remote directory offline bundles are staged into
pub const STAGING_DIR: &str = "/tmp/.kubei";

/// Package manager family detected on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PackageManager {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "apt")]
    Apt,
    #[serde(rename = "yum")]
    Yum,
}

impl PackageManager {
    /// Get the package manager as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Unknown => "unknown",
            PackageManager::Apt => "apt",
            PackageManager::Yum => "yum",
        }
    }
}

/// How packages reach a node: from its configured repositories or from a
/// staged offline bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InstallMode {
    #[default]
    #[serde(rename = "online")]
    Online,
    #[serde(rename = "offline")]
    Offline,
}

impl InstallMode {
    /// Get the install mode as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallMode::Online => "online",
            InstallMode::Offline => "offline",
        }
    }
}

/// Parse a jump server flag of the form
/// `host=10.0.0.1,port=22,user=root,password=secret,key=/path/id_rsa`.
///
/// `host` is required; `port` defaults to 22 and `user` to root, matching the
/// per-node connection defaults.
pub fn parse_jump_server(value: &str) -> crate::Result<HostInfo> {
    let mut host = String::new();
    let mut port: u16 = 22;
    let mut user = String::from("root");
    let mut password = String::new();
    let mut key_path = None;

    for pair in value.split(',').filter(|p| !p.trim().is_empty()) {
        let (k, v) = pair.split_once('=').ok_or_else(|| {
            crate::KubeiError::config(format!("invalid jump server entry '{}'", pair))
        })?;
        match k.trim() {
            "host" => host = v.trim().to_string(),
            "port" => {
                port = v.trim().parse().map_err(|_| {
                    crate::KubeiError::config(format!("invalid jump server port '{}'", v))
                })?
            }
            "user" => user = v.trim().to_string(),
            "password" => password = v.trim().to_string(),
            "key" => key_path = Some(std::path::PathBuf::from(v.trim())),
            other => {
                return Err(crate::KubeiError::config(format!(
                    "unknown jump server field '{}'",
                    other
                )))
            }
        }
    }

    if host.is_empty() {
        return Err(crate::KubeiError::config(
            "jump server requires a host field",
        ));
    }

    Ok(HostInfo {
        host,
        port,
        user,
        password,
        key_path,
    })
}
