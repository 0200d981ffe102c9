// file: src/tmpl/mod.rs
// version: 1.0.0
// guid: 5e92d1c7-30a8-44fb-9276-bde41f08a3c5

//! Remote command templates
//!
//! Pure string builders: every function renders a shell command from cluster
//! values without touching the network, so the exact commands a bootstrap
//! will issue can be asserted in tests.

pub mod flannel;
pub mod kubeadm;
pub mod pkg;

pub use flannel::flannel_manifest;
pub use kubeadm::{kubeadm, kubeadm_reset, KubeadmPhase};
pub use pkg::{ContainerEngineText, KubeText};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

/// Unpack a staged archive into `dest`
pub fn extract(archive: &str, dest: &str) -> String {
    format!("tar xf {} -C {}", archive, dest)
}

/// Write bytes to a remote path through a base64 pipe
///
/// Keeps arbitrary content (PEM blocks, YAML) out of shell quoting entirely.
pub fn write_file_base64(content: &[u8], path: &str) -> String {
    format!("echo {} | base64 -d > {}", BASE64.encode(content), path)
}

/// Apply a manifest through the admin kubeconfig on a master
pub fn apply_manifest(manifest: &str) -> String {
    format!(
        "echo {} | base64 -d | kubectl --kubeconfig /etc/kubernetes/admin.conf apply -f -",
        BASE64.encode(manifest)
    )
}

/// Pin the apiserver domain to an address in /etc/hosts
///
/// Deletes any previous entry for the domain first, so repointing a node is a
/// rewrite rather than an append.
pub fn set_hosts(ip: &str, domain: &str) -> String {
    format!(
        "sed -i '/{}/d' /etc/hosts && echo '{} {}' >> /etc/hosts",
        domain, ip, domain
    )
}

/// Drop the apiserver domain entry from /etc/hosts
pub fn reset_hosts(domain: &str) -> String {
    format!("sed -i '/{}/d' /etc/hosts", domain)
}

/// Copy the admin kubeconfig into the login user's home
pub fn copy_admin_config() -> String {
    "mkdir -p $HOME/.kube && yes | cp /etc/kubernetes/admin.conf $HOME/.kube/config".to_string()
}

/// Hand ownership of the copied kubeconfig to the login user
pub fn chown_admin_config() -> String {
    "chown $(id -u):$(id -g) $HOME/.kube/config".to_string()
}

/// Turn swap off now and keep it off across reboots
pub fn disable_swap() -> String {
    "swapoff -a && sed -i '/ swap / s/^#*/#/' /etc/fstab".to_string()
}

/// Load the bridge netfilter module and the sysctls kubeadm preflight expects
pub fn enable_bridge_netfilter() -> String {
    [
        "modprobe overlay",
        "modprobe br_netfilter",
        "printf 'overlay\\nbr_netfilter\\n' > /etc/modules-load.d/k8s.conf",
        "printf 'net.bridge.bridge-nf-call-iptables = 1\\nnet.bridge.bridge-nf-call-ip6tables = 1\\nnet.ipv4.ip_forward = 1\\n' > /etc/sysctl.d/k8s.conf",
        "sysctl --system",
    ]
    .join(" && ")
}
