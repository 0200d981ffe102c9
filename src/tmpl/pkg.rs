// file: src/tmpl/pkg.rs
// version: 1.0.0
// guid: 2c7f5a18-e9d4-4b63-90a2-d18c4f76eb05

//! Package install and removal commands per package manager
//!
//! Online installs pull from the upstream pkgs.k8s.io and download.docker.com
//! repositories; offline installs consume the bundle staged under
//! `/tmp/.kubei`, which is expected to carry `kube/` and `containerd/`
//! package directories.

use crate::config::{InstallMode, PackageManager, STAGING_DIR};
use crate::{KubeiError, Result};

/// kubelet/kubeadm/kubectl install commands
pub struct KubeText {
    pm: PackageManager,
}

impl KubeText {
    pub fn new(pm: PackageManager) -> Self {
        Self { pm }
    }

    /// Install the Kubernetes node components at the given version
    pub fn install(&self, version: &str, mode: InstallMode) -> Result<String> {
        if mode == InstallMode::Online && version.is_empty() {
            return Err(KubeiError::config(
                "a kubernetes version is required for online installs",
            ));
        }
        match (self.pm, mode) {
            (PackageManager::Apt, InstallMode::Online) => Ok(apt_online_kube(version)),
            (PackageManager::Apt, InstallMode::Offline) => Ok(format!(
                "dpkg -i {}/kube/*.deb && apt-mark hold kubelet kubeadm kubectl",
                STAGING_DIR
            )),
            (PackageManager::Yum, InstallMode::Online) => Ok(yum_online_kube(version)),
            (PackageManager::Yum, InstallMode::Offline) => Ok(format!(
                "rpm -Uvh --force --nodeps {}/kube/*.rpm",
                STAGING_DIR
            )),
            (PackageManager::Unknown, _) => Err(unclassified()),
        }
    }

    /// Remove the Kubernetes node components
    pub fn remove(&self) -> Result<String> {
        match self.pm {
            PackageManager::Apt => Ok([
                "apt-mark unhold kubelet kubeadm kubectl",
                "apt-get purge -y kubelet kubeadm kubectl",
                "apt-get autoremove -y",
            ]
            .join(" && ")),
            PackageManager::Yum => Ok("yum remove -y kubelet kubeadm kubectl".to_string()),
            PackageManager::Unknown => Err(unclassified()),
        }
    }
}

/// Container engine (containerd) install commands
pub struct ContainerEngineText {
    pm: PackageManager,
}

impl ContainerEngineText {
    pub fn new(pm: PackageManager) -> Self {
        Self { pm }
    }

    /// Install containerd, then rewrite its config for the systemd cgroup
    /// driver kubeadm expects. An empty version installs the repository's
    /// latest build.
    pub fn install(&self, version: &str, mode: InstallMode) -> Result<String> {
        let install = match (self.pm, mode) {
            (PackageManager::Apt, InstallMode::Online) => apt_online_containerd(version),
            (PackageManager::Apt, InstallMode::Offline) => {
                format!("dpkg -i {}/containerd/*.deb", STAGING_DIR)
            }
            (PackageManager::Yum, InstallMode::Online) => yum_online_containerd(version),
            (PackageManager::Yum, InstallMode::Offline) => {
                format!("rpm -Uvh --force --nodeps {}/containerd/*.rpm", STAGING_DIR)
            }
            (PackageManager::Unknown, _) => return Err(unclassified()),
        };
        Ok(format!("{} && {}", install, containerd_config()))
    }

    /// Remove containerd and its state
    pub fn remove(&self) -> Result<String> {
        match self.pm {
            PackageManager::Apt => {
                Ok("apt-get purge -y containerd.io && rm -rf /var/lib/containerd".to_string())
            }
            PackageManager::Yum => {
                Ok("yum remove -y containerd.io && rm -rf /var/lib/containerd".to_string())
            }
            PackageManager::Unknown => Err(unclassified()),
        }
    }
}

fn unclassified() -> KubeiError {
    KubeiError::config("cannot render package commands for an unclassified package manager")
}

/// Version channel for the pkgs.k8s.io repositories, e.g. "1.29.3" -> "v1.29"
fn minor_channel(version: &str) -> String {
    let trimmed = version.trim_start_matches('v');
    let mut parts = trimmed.splitn(3, '.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor)) => format!("v{}.{}", major, minor),
        _ => format!("v{}", trimmed),
    }
}

fn apt_online_kube(version: &str) -> String {
    let channel = minor_channel(version);
    [
        "apt-get update".to_string(),
        "apt-get install -y apt-transport-https ca-certificates curl gpg".to_string(),
        "mkdir -p /etc/apt/keyrings".to_string(),
        format!(
            "curl -fsSL https://pkgs.k8s.io/core:/stable:/{}/deb/Release.key | gpg --dearmor --yes -o /etc/apt/keyrings/kubernetes-apt-keyring.gpg",
            channel
        ),
        format!(
            "echo 'deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] https://pkgs.k8s.io/core:/stable:/{}/deb/ /' > /etc/apt/sources.list.d/kubernetes.list",
            channel
        ),
        "apt-get update".to_string(),
        format!(
            "apt-get install -y --allow-downgrades kubelet={v}-* kubeadm={v}-* kubectl={v}-*",
            v = version
        ),
        "apt-mark hold kubelet kubeadm kubectl".to_string(),
    ]
    .join(" && ")
}

fn yum_online_kube(version: &str) -> String {
    let channel = minor_channel(version);
    [
        format!(
            "printf '[kubernetes]\\nname=Kubernetes\\nbaseurl=https://pkgs.k8s.io/core:/stable:/{ch}/rpm/\\nenabled=1\\ngpgcheck=1\\ngpgkey=https://pkgs.k8s.io/core:/stable:/{ch}/rpm/repodata/repomd.xml.key\\n' > /etc/yum.repos.d/kubernetes.repo",
            ch = channel
        ),
        format!(
            "yum install -y kubelet-{v} kubeadm-{v} kubectl-{v} --disableexcludes=kubernetes",
            v = version
        ),
    ]
    .join(" && ")
}

fn apt_online_containerd(version: &str) -> String {
    let pin = if version.is_empty() {
        String::new()
    } else {
        format!("={}-*", version)
    };
    [
        "apt-get update".to_string(),
        "apt-get install -y ca-certificates curl".to_string(),
        "install -m 0755 -d /etc/apt/keyrings".to_string(),
        "curl -fsSL https://download.docker.com/linux/ubuntu/gpg -o /etc/apt/keyrings/docker.asc"
            .to_string(),
        r#"echo "deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.asc] https://download.docker.com/linux/ubuntu $(. /etc/os-release && echo $VERSION_CODENAME) stable" > /etc/apt/sources.list.d/docker.list"#
            .to_string(),
        "apt-get update".to_string(),
        format!("apt-get install -y containerd.io{}", pin),
    ]
    .join(" && ")
}

fn yum_online_containerd(version: &str) -> String {
    let pin = if version.is_empty() {
        String::new()
    } else {
        format!("-{}", version)
    };
    [
        "yum install -y yum-utils".to_string(),
        "yum-config-manager --add-repo https://download.docker.com/linux/centos/docker-ce.repo"
            .to_string(),
        format!("yum install -y containerd.io{}", pin),
    ]
    .join(" && ")
}

fn containerd_config() -> String {
    [
        "mkdir -p /etc/containerd",
        "containerd config default > /etc/containerd/config.toml",
        "sed -i 's/SystemdCgroup = false/SystemdCgroup = true/' /etc/containerd/config.toml",
    ]
    .join(" && ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_channel() {
        assert_eq!(minor_channel("1.29.3"), "v1.29");
        assert_eq!(minor_channel("v1.30.0"), "v1.30");
        assert_eq!(minor_channel("1.28"), "v1.28");
    }

    #[test]
    fn test_apt_online_kube_pins_version_and_channel() {
        // Arrange / Act
        let cmd = KubeText::new(PackageManager::Apt)
            .install("1.29.0", InstallMode::Online)
            .unwrap();

        // Assert
        assert!(cmd.contains("https://pkgs.k8s.io/core:/stable:/v1.29/deb/"));
        assert!(cmd.contains("kubelet=1.29.0-* kubeadm=1.29.0-* kubectl=1.29.0-*"));
        assert!(cmd.ends_with("apt-mark hold kubelet kubeadm kubectl"));
    }

    #[test]
    fn test_yum_online_kube_writes_repo_then_installs() {
        let cmd = KubeText::new(PackageManager::Yum)
            .install("1.29.0", InstallMode::Online)
            .unwrap();
        assert!(cmd.contains("/etc/yum.repos.d/kubernetes.repo"));
        assert!(cmd.contains("baseurl=https://pkgs.k8s.io/core:/stable:/v1.29/rpm/"));
        assert!(cmd.contains("kubelet-1.29.0 kubeadm-1.29.0 kubectl-1.29.0"));
    }

    #[test]
    fn test_offline_installs_use_staged_bundle() {
        let apt = KubeText::new(PackageManager::Apt)
            .install("", InstallMode::Offline)
            .unwrap();
        assert!(apt.starts_with("dpkg -i /tmp/.kubei/kube/*.deb"));

        let yum = KubeText::new(PackageManager::Yum)
            .install("", InstallMode::Offline)
            .unwrap();
        assert_eq!(yum, "rpm -Uvh --force --nodeps /tmp/.kubei/kube/*.rpm");
    }

    #[test]
    fn test_online_kube_requires_version() {
        let result = KubeText::new(PackageManager::Apt).install("", InstallMode::Online);
        assert!(result.is_err());
    }

    #[test]
    fn test_unclassified_package_manager_is_rejected() {
        assert!(KubeText::new(PackageManager::Unknown)
            .install("1.29.0", InstallMode::Online)
            .is_err());
        assert!(ContainerEngineText::new(PackageManager::Unknown)
            .remove()
            .is_err());
    }

    #[test]
    fn test_containerd_install_switches_to_systemd_cgroups() {
        let cmd = ContainerEngineText::new(PackageManager::Apt)
            .install("1.6.28", InstallMode::Online)
            .unwrap();
        assert!(cmd.contains("containerd.io=1.6.28-*"));
        assert!(cmd.contains("sed -i 's/SystemdCgroup = false/SystemdCgroup = true/'"));
    }

    #[test]
    fn test_containerd_unpinned_when_version_empty() {
        let cmd = ContainerEngineText::new(PackageManager::Yum)
            .install("", InstallMode::Online)
            .unwrap();
        assert!(cmd.contains("yum install -y containerd.io &&"));
    }

    #[test]
    fn test_remove_commands() {
        let kube = KubeText::new(PackageManager::Apt).remove().unwrap();
        assert!(kube.contains("apt-get purge -y kubelet kubeadm kubectl"));

        let engine = ContainerEngineText::new(PackageManager::Yum).remove().unwrap();
        assert_eq!(
            engine,
            "yum remove -y containerd.io && rm -rf /var/lib/containerd"
        );
    }
}
