// file: src/tmpl/kubeadm.rs
// version: 1.0.0
// guid: 84f0b6d9-17e3-4c52-a8b1-f96d20c4e73a

//! kubeadm init/join command rendering

use crate::config::{JoinParameters, KubeadmConfig};

/// Which kubeadm invocation to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KubeadmPhase {
    /// Bootstrap the first control-plane node
    Init,
    /// Join a worker
    JoinNode,
    /// Join an additional control-plane node
    JoinControlPlane,
}

/// Render the kubeadm command for a phase
///
/// `join` is only read by the join phases; pass a default for `Init`. The
/// init command pins the cluster version to whatever kubeadm binary the
/// package phase installed, so the two can never drift apart.
pub fn kubeadm(
    phase: KubeadmPhase,
    node_name: &str,
    cfg: &KubeadmConfig,
    join: &JoinParameters,
) -> String {
    match phase {
        KubeadmPhase::Init => format!(
            "kubeadm init \\\n  --kubernetes-version $(kubeadm version -o short) \\\n  --image-repository {} \\\n  --pod-network-cidr {} \\\n  --service-cidr {} \\\n  --upload-certs \\\n  --control-plane-endpoint {} \\\n  --node-name {}",
            cfg.image_repository,
            cfg.networking.pod_subnet,
            cfg.networking.service_subnet,
            cfg.control_plane_endpoint,
            node_name
        ),
        KubeadmPhase::JoinNode => format!(
            "kubeadm join {} --token {} \\\n  --discovery-token-ca-cert-hash sha256:{} \\\n  --node-name {} \\\n  --ignore-preflight-errors=DirAvailable--etc-kubernetes-manifests",
            cfg.control_plane_endpoint, join.token, join.ca_cert_hash, node_name
        ),
        KubeadmPhase::JoinControlPlane => format!(
            "kubeadm join {} \\\n  --token {} \\\n  --discovery-token-ca-cert-hash sha256:{} \\\n  --certificate-key {} \\\n  --control-plane \\\n  --node-name {}",
            cfg.control_plane_endpoint,
            join.token,
            join.ca_cert_hash,
            join.certificate_key,
            node_name
        ),
    }
}

/// Tear a node's kubeadm state down, answering the confirmation prompt
pub fn kubeadm_reset() -> String {
    "yes | kubeadm reset".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn join_params() -> JoinParameters {
        JoinParameters {
            token: "abcdef.0123456789abcdef".to_string(),
            ca_cert_hash: "1b3b9502a13d8e47e4e65ec52c66c09c1f1e0c7b6e3a7e4dc62eb867a9c0a5d1"
                .to_string(),
            certificate_key: "f8902e114ef118304e561c3ecd4d0b543adc226b7a07f675f56564185ffe0c07"
                .to_string(),
        }
    }

    #[test]
    fn test_init_command_flags() {
        // Arrange
        let cfg = KubeadmConfig::default();

        // Act
        let cmd = kubeadm(
            KubeadmPhase::Init,
            "192.168.10.3",
            &cfg,
            &JoinParameters::default(),
        );

        // Assert
        assert!(cmd.starts_with("kubeadm init"));
        assert!(cmd.contains("--kubernetes-version $(kubeadm version -o short)"));
        assert!(cmd.contains("--image-repository registry.k8s.io"));
        assert!(cmd.contains("--pod-network-cidr 10.244.0.0/16"));
        assert!(cmd.contains("--service-cidr 10.96.0.0/12"));
        assert!(cmd.contains("--upload-certs"));
        assert!(cmd.contains("--control-plane-endpoint apiserver.k8s.local:6443"));
        assert!(cmd.contains("--node-name 192.168.10.3"));
        assert!(!cmd.contains("--token"));
    }

    #[test]
    fn test_join_node_command_flags() {
        // Arrange
        let cfg = KubeadmConfig::default();

        // Act
        let cmd = kubeadm(KubeadmPhase::JoinNode, "192.168.10.20", &cfg, &join_params());

        // Assert
        assert!(cmd.starts_with("kubeadm join apiserver.k8s.local:6443"));
        assert!(cmd.contains("--token abcdef.0123456789abcdef"));
        assert!(cmd.contains(
            "--discovery-token-ca-cert-hash sha256:1b3b9502a13d8e47e4e65ec52c66c09c1f1e0c7b6e3a7e4dc62eb867a9c0a5d1"
        ));
        assert!(cmd.contains("--ignore-preflight-errors=DirAvailable--etc-kubernetes-manifests"));
        assert!(!cmd.contains("--control-plane"));
        assert!(!cmd.contains("--certificate-key"));
    }

    #[test]
    fn test_join_control_plane_command_flags() {
        // Arrange
        let cfg = KubeadmConfig::default();

        // Act
        let cmd = kubeadm(
            KubeadmPhase::JoinControlPlane,
            "192.168.10.4",
            &cfg,
            &join_params(),
        );

        // Assert
        assert!(cmd.contains("--control-plane"));
        assert!(cmd.contains(
            "--certificate-key f8902e114ef118304e561c3ecd4d0b543adc226b7a07f675f56564185ffe0c07"
        ));
        assert!(cmd.contains("--node-name 192.168.10.4"));
    }

    #[test]
    fn test_reset_answers_prompt() {
        assert_eq!(kubeadm_reset(), "yes | kubeadm reset");
    }
}
