// file: src/config/kubeadm.rs
// version: 1.0.0
// guid: f1c6a385-9d27-4e50-b8a4-6e03d7f92c18

//! kubeadm-facing cluster settings

use serde::{Deserialize, Serialize};

/// Values substituted into kubeadm init/join command templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KubeadmConfig {
    /// Kubernetes version installed on the nodes (e.g. "1.28.2")
    pub version: String,
    /// Stable apiserver endpoint, `domain:port`
    pub control_plane_endpoint: String,
    /// Container image registry for control plane images
    pub image_repository: String,
    /// Cluster networking CIDRs
    pub networking: Networking,
}

/// Pod and service network ranges
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Networking {
    pub pod_subnet: String,
    pub service_subnet: String,
}

/// Join credentials parsed from `kubeadm init` output
///
/// `certificate_key` is only present when certs were uploaded, and is only
/// consumed by control-plane joins.
#[derive(Debug, Clone, Default)]
pub struct JoinParameters {
    pub token: String,
    pub ca_cert_hash: String,
    pub certificate_key: String,
}

impl Default for KubeadmConfig {
    fn default() -> Self {
        Self {
            version: String::new(),
            control_plane_endpoint: "apiserver.k8s.local:6443".to_string(),
            image_repository: "registry.k8s.io".to_string(),
            networking: Networking {
                pod_subnet: "10.244.0.0/16".to_string(),
                service_subnet: "10.96.0.0/12".to_string(),
            },
        }
    }
}

impl KubeadmConfig {
    /// Domain part of the control plane endpoint
    pub fn api_domain(&self) -> &str {
        match self.control_plane_endpoint.split_once(':') {
            Some((domain, _)) => domain,
            None => &self.control_plane_endpoint,
        }
    }

    /// Port part of the control plane endpoint, 6443 when unspecified
    pub fn bind_port(&self) -> u16 {
        self.control_plane_endpoint
            .split_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or(6443)
    }
}
