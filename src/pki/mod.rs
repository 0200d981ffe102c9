// file: src/pki/mod.rs
// version: 1.0.0
// guid: 6b591e04-dc37-48f2-a1c9-05e84d72f6b3

//! Cluster PKI generation
//!
//! Builds the certificate material kubeadm expects to find under
//! `/etc/kubernetes`: three certificate authorities (cluster, front-proxy,
//! etcd) shared by every control-plane node, and per-node leaf certificates
//! whose SANs embed that node's address. Kubeconfig-bearing leaves (admin,
//! controller-manager, scheduler) additionally carry a rendered kubeconfig
//! document.
//!
//! Everything here is pure generation; distribution to nodes lives in the
//! cert phase.

pub mod kubeconfig;

pub use kubeconfig::KubeConfig;

use std::net::Ipv4Addr;

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    IsCa, KeyPair, KeyUsagePurpose,
};
use time::{Duration, OffsetDateTime};

use crate::config::KubeadmConfig;
use crate::{KubeiError, Result};

const CA_VALIDITY_DAYS: i64 = 3650;
const LEAF_VALIDITY_DAYS: i64 = 365;

/// One certificate with its private key
#[derive(Debug, Clone)]
pub struct CertPair {
    /// Logical name, e.g. "apiserver" or "admin"
    pub name: String,
    /// File base under /etc/kubernetes/pki (may contain a subdirectory,
    /// e.g. "etcd/server"), or the conf file name for kubeconfig leaves
    pub base_name: String,
    pub cert_pem: String,
    pub key_pem: String,
    /// Present on leaves that are materialized as kubeconfig files
    pub kubeconfig: Option<KubeConfig>,
}

impl CertPair {
    pub fn is_kubeconfig(&self) -> bool {
        self.kubeconfig.is_some()
    }
}

/// Certificate groups in distribution order: each CA ahead of the leaves it
/// signed
#[derive(Debug, Clone, Default)]
pub struct CertificateTree(Vec<(CertPair, Vec<CertPair>)>);

impl CertificateTree {
    pub fn groups(&self) -> &[(CertPair, Vec<CertPair>)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop the key material once it has been distributed
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// A CA certificate able to sign leaves
struct CertAuthority {
    cert: rcgen::Certificate,
    key: KeyPair,
    pair: CertPair,
}

/// The three cluster CAs, generated once and shared by all masters
pub struct ClusterCa {
    kubernetes: CertAuthority,
    front_proxy: CertAuthority,
    etcd: CertAuthority,
}

/// Generate the cluster's certificate authorities
pub fn new_cluster_ca() -> Result<ClusterCa> {
    Ok(ClusterCa {
        kubernetes: new_ca("kubernetes", "ca", "ca")?,
        front_proxy: new_ca("front-proxy-ca", "front-proxy-ca", "front-proxy-ca")?,
        etcd: new_ca("etcd-ca", "etcd-ca", "etcd/ca")?,
    })
}

/// Build a master's full certificate tree
///
/// The CA pairs are shared across masters; the leaves are freshly issued so
/// their SANs can name this node's address.
pub fn node_certificate_tree(
    ca: &ClusterCa,
    cfg: &KubeadmConfig,
    node_ip: &str,
) -> Result<CertificateTree> {
    let vip = service_vip(&cfg.networking.service_subnet)?;

    let apiserver_sans = vec![
        "kubernetes".to_string(),
        "kubernetes.default".to_string(),
        "kubernetes.default.svc".to_string(),
        "kubernetes.default.svc.cluster.local".to_string(),
        cfg.api_domain().to_string(),
        vip.to_string(),
        node_ip.to_string(),
        "127.0.0.1".to_string(),
    ];
    let etcd_sans = vec![
        "localhost".to_string(),
        node_ip.to_string(),
        "127.0.0.1".to_string(),
        "::1".to_string(),
    ];

    let kubernetes_leaves = vec![
        issue_leaf(
            &ca.kubernetes,
            LeafProfile {
                name: "apiserver",
                base_name: "apiserver",
                common_name: "kube-apiserver",
                organization: None,
                sans: apiserver_sans,
                server_auth: true,
                client_auth: false,
            },
        )?,
        issue_leaf(
            &ca.kubernetes,
            LeafProfile {
                name: "apiserver-kubelet-client",
                base_name: "apiserver-kubelet-client",
                common_name: "kube-apiserver-kubelet-client",
                organization: Some("system:masters"),
                sans: Vec::new(),
                server_auth: false,
                client_auth: true,
            },
        )?,
        issue_kubeconfig_leaf(
            &ca.kubernetes,
            cfg,
            "admin",
            "kubernetes-admin",
            Some("system:masters"),
        )?,
        issue_kubeconfig_leaf(
            &ca.kubernetes,
            cfg,
            "controller-manager",
            "system:kube-controller-manager",
            None,
        )?,
        issue_kubeconfig_leaf(&ca.kubernetes, cfg, "scheduler", "system:kube-scheduler", None)?,
    ];

    let front_proxy_leaves = vec![issue_leaf(
        &ca.front_proxy,
        LeafProfile {
            name: "front-proxy-client",
            base_name: "front-proxy-client",
            common_name: "front-proxy-client",
            organization: None,
            sans: Vec::new(),
            server_auth: false,
            client_auth: true,
        },
    )?];

    let etcd_leaves = vec![
        issue_leaf(
            &ca.etcd,
            LeafProfile {
                name: "etcd-server",
                base_name: "etcd/server",
                common_name: node_ip,
                organization: None,
                sans: etcd_sans.clone(),
                server_auth: true,
                client_auth: true,
            },
        )?,
        issue_leaf(
            &ca.etcd,
            LeafProfile {
                name: "etcd-peer",
                base_name: "etcd/peer",
                common_name: node_ip,
                organization: None,
                sans: etcd_sans,
                server_auth: true,
                client_auth: true,
            },
        )?,
        issue_leaf(
            &ca.etcd,
            LeafProfile {
                name: "etcd-healthcheck-client",
                base_name: "etcd/healthcheck-client",
                common_name: "kube-etcd-healthcheck-client",
                organization: Some("system:masters"),
                sans: Vec::new(),
                server_auth: false,
                client_auth: true,
            },
        )?,
        issue_leaf(
            &ca.etcd,
            LeafProfile {
                name: "apiserver-etcd-client",
                base_name: "apiserver-etcd-client",
                common_name: "kube-apiserver-etcd-client",
                organization: Some("system:masters"),
                sans: Vec::new(),
                server_auth: false,
                client_auth: true,
            },
        )?,
    ];

    Ok(CertificateTree(vec![
        (ca.kubernetes.pair.clone(), kubernetes_leaves),
        (ca.front_proxy.pair.clone(), front_proxy_leaves),
        (ca.etcd.pair.clone(), etcd_leaves),
    ]))
}

/// First usable address of the service CIDR, the in-cluster apiserver VIP
pub fn service_vip(service_cidr: &str) -> Result<Ipv4Addr> {
    let base = service_cidr.split('/').next().unwrap_or_default();
    let addr: Ipv4Addr = base.trim().parse().map_err(|_| {
        KubeiError::config(format!("invalid service CIDR '{}'", service_cidr))
    })?;
    Ok(Ipv4Addr::from(u32::from(addr) + 1))
}

struct LeafProfile<'a> {
    name: &'a str,
    base_name: &'a str,
    common_name: &'a str,
    organization: Option<&'a str>,
    sans: Vec<String>,
    server_auth: bool,
    client_auth: bool,
}

fn new_ca(common_name: &str, name: &str, base_name: &str) -> Result<CertAuthority> {
    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;

    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::days(1);
    params.not_after = now + Duration::days(CA_VALIDITY_DAYS);

    let key = KeyPair::generate()
        .map_err(|e| KubeiError::certificate(format!("failed to generate {} CA key: {}", name, e)))?;
    let cert = params
        .self_signed(&key)
        .map_err(|e| KubeiError::certificate(format!("failed to create {} CA: {}", name, e)))?;

    let pair = CertPair {
        name: name.to_string(),
        base_name: base_name.to_string(),
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        kubeconfig: None,
    };

    Ok(CertAuthority { cert, key, pair })
}

fn issue_leaf(ca: &CertAuthority, profile: LeafProfile<'_>) -> Result<CertPair> {
    let mut params = CertificateParams::new(profile.sans).map_err(|e| {
        KubeiError::certificate(format!("invalid SANs for {}: {}", profile.name, e))
    })?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, profile.common_name);
    if let Some(org) = profile.organization {
        dn.push(DnType::OrganizationName, org);
    }
    params.distinguished_name = dn;

    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
    ];
    let mut ekus = Vec::new();
    if profile.server_auth {
        ekus.push(ExtendedKeyUsagePurpose::ServerAuth);
    }
    if profile.client_auth {
        ekus.push(ExtendedKeyUsagePurpose::ClientAuth);
    }
    params.extended_key_usages = ekus;

    let now = OffsetDateTime::now_utc();
    params.not_before = now - Duration::days(1);
    params.not_after = now + Duration::days(LEAF_VALIDITY_DAYS);

    let key = KeyPair::generate().map_err(|e| {
        KubeiError::certificate(format!("failed to generate key for {}: {}", profile.name, e))
    })?;
    let cert = params.signed_by(&key, &ca.cert, &ca.key).map_err(|e| {
        KubeiError::certificate(format!("failed to sign {}: {}", profile.name, e))
    })?;

    Ok(CertPair {
        name: profile.name.to_string(),
        base_name: profile.base_name.to_string(),
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
        kubeconfig: None,
    })
}

fn issue_kubeconfig_leaf(
    ca: &CertAuthority,
    cfg: &KubeadmConfig,
    name: &str,
    user: &str,
    organization: Option<&str>,
) -> Result<CertPair> {
    let base_name = format!("{}.conf", name);
    let mut pair = issue_leaf(
        ca,
        LeafProfile {
            name,
            base_name: &base_name,
            common_name: user,
            organization,
            sans: Vec::new(),
            server_auth: false,
            client_auth: true,
        },
    )?;

    let server = format!("https://{}", cfg.control_plane_endpoint);
    pair.kubeconfig = Some(KubeConfig::build(
        &server,
        user,
        &ca.pair.cert_pem,
        &pair.cert_pem,
        &pair.key_pem,
    ));
    Ok(pair)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_for(node_ip: &str) -> CertificateTree {
        let ca = new_cluster_ca().unwrap();
        node_certificate_tree(&ca, &KubeadmConfig::default(), node_ip).unwrap()
    }

    fn leaf_names(group: &(CertPair, Vec<CertPair>)) -> Vec<&str> {
        group.1.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_tree_groups_each_ca_before_its_leaves() {
        // Arrange / Act
        let tree = tree_for("192.168.10.3");

        // Assert
        let groups = tree.groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].0.name, "ca");
        assert_eq!(groups[1].0.name, "front-proxy-ca");
        assert_eq!(groups[2].0.name, "etcd-ca");
        assert_eq!(groups[2].0.base_name, "etcd/ca");

        assert_eq!(
            leaf_names(&groups[0]),
            vec![
                "apiserver",
                "apiserver-kubelet-client",
                "admin",
                "controller-manager",
                "scheduler"
            ]
        );
        assert_eq!(leaf_names(&groups[1]), vec!["front-proxy-client"]);
        assert_eq!(
            leaf_names(&groups[2]),
            vec![
                "etcd-server",
                "etcd-peer",
                "etcd-healthcheck-client",
                "apiserver-etcd-client"
            ]
        );
    }

    #[test]
    fn test_every_pair_carries_pem_material() {
        let tree = tree_for("192.168.10.3");
        for (ca, leaves) in tree.groups() {
            assert!(ca.cert_pem.contains("BEGIN CERTIFICATE"));
            assert!(ca.key_pem.contains("PRIVATE KEY"));
            for leaf in leaves {
                assert!(leaf.cert_pem.contains("BEGIN CERTIFICATE"), "{}", leaf.name);
                assert!(leaf.key_pem.contains("PRIVATE KEY"), "{}", leaf.name);
            }
        }
    }

    #[test]
    fn test_kubeconfig_only_on_conf_leaves() {
        // Arrange
        let tree = tree_for("192.168.10.3");
        let kubernetes = &tree.groups()[0];

        // Act / Assert
        for leaf in &kubernetes.1 {
            match leaf.name.as_str() {
                "admin" | "controller-manager" | "scheduler" => {
                    assert!(leaf.is_kubeconfig(), "{}", leaf.name);
                    assert!(leaf.base_name.ends_with(".conf"));
                }
                _ => assert!(!leaf.is_kubeconfig(), "{}", leaf.name),
            }
        }
        let admin = kubernetes.1.iter().find(|c| c.name == "admin").unwrap();
        let yaml = admin.kubeconfig.as_ref().unwrap().encode().unwrap();
        assert!(yaml.contains("server: https://apiserver.k8s.local:6443"));
        assert!(yaml.contains("kubernetes-admin"));
    }

    #[test]
    fn test_masters_share_cas_but_not_leaves() {
        // Arrange
        let ca = new_cluster_ca().unwrap();
        let cfg = KubeadmConfig::default();

        // Act
        let first = node_certificate_tree(&ca, &cfg, "192.168.10.3").unwrap();
        let second = node_certificate_tree(&ca, &cfg, "192.168.10.4").unwrap();

        // Assert: same CA certificate, different apiserver leaves
        assert_eq!(
            first.groups()[0].0.cert_pem,
            second.groups()[0].0.cert_pem
        );
        assert_ne!(
            first.groups()[0].1[0].cert_pem,
            second.groups()[0].1[0].cert_pem
        );
    }

    #[test]
    fn test_service_vip_is_first_address() {
        assert_eq!(
            service_vip("10.96.0.0/12").unwrap(),
            "10.96.0.1".parse::<Ipv4Addr>().unwrap()
        );
        assert_eq!(
            service_vip("10.32.0.0/24").unwrap(),
            "10.32.0.1".parse::<Ipv4Addr>().unwrap()
        );
        assert!(service_vip("not-a-cidr").is_err());
    }

    #[test]
    fn test_clear_empties_the_tree() {
        let mut tree = tree_for("192.168.10.3");
        assert!(!tree.is_empty());
        tree.clear();
        assert!(tree.is_empty());
    }
}
