// file: src/error.rs
// version: 1.0.0
// guid: 3f8c2a71-94d5-4e0b-8a27-c1d6e9f04b52

use thiserror::Error;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, KubeiError>;

/// Error types for the cluster bootstrapper
#[derive(Error, Debug)]
pub enum KubeiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("[{host}] connection failed: {reason}")]
    Connect { host: String, reason: String },

    #[error("[{host}] unsupported system, cannot classify package manager from: {banner}")]
    UnsupportedSystem { host: String, banner: String },

    #[error("[{host}] offline staging failed: {reason}")]
    Staging { host: String, reason: String },

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("[{host}] remote command failed: {reason}")]
    Command { host: String, reason: String },

    #[error("[{host}] {source}")]
    Node {
        host: String,
        #[source]
        source: Box<KubeiError>,
    },

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl KubeiError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new connection error for a host
    pub fn connect(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connect {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Create a new unsupported-system error for a host
    pub fn unsupported_system(host: impl Into<String>, banner: impl Into<String>) -> Self {
        Self::UnsupportedSystem {
            host: host.into(),
            banner: banner.into(),
        }
    }

    /// Create a new staging error for a host
    pub fn staging(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Staging {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Create a new certificate error
    pub fn certificate(msg: impl Into<String>) -> Self {
        Self::Certificate(msg.into())
    }

    /// Create a new remote command error for a host
    pub fn command(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Command {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an error with the host it occurred on
    pub fn node(host: impl Into<String>, source: KubeiError) -> Self {
        Self::Node {
            host: host.into(),
            source: Box::new(source),
        }
    }

    /// The host this error is scoped to, if any
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Connect { host, .. }
            | Self::UnsupportedSystem { host, .. }
            | Self::Staging { host, .. }
            | Self::Command { host, .. }
            | Self::Node { host, .. } => Some(host),
            _ => None,
        }
    }

    /// The error message without the `[host]` prefix, for re-wrapping under
    /// another host-scoped variant
    pub fn reason(&self) -> String {
        match self {
            Self::Connect { reason, .. } => format!("connection failed: {}", reason),
            Self::UnsupportedSystem { banner, .. } => {
                format!("unsupported system: {}", banner)
            }
            Self::Staging { reason, .. } => format!("offline staging failed: {}", reason),
            Self::Command { reason, .. } => format!("remote command failed: {}", reason),
            Self::Node { source, .. } => source.reason(),
            other => other.to_string(),
        }
    }
}
