// file: src/lib.rs
// version: 1.0.0
// guid: a1c9e4d2-5b38-4f61-9e07-2d84c6b5f310

//! # kubei
//!
//! Bootstrap a highly available Kubernetes cluster over SSH with kubeadm.
//!
//! The crate drives remote hosts through a small remote-shell capability:
//! preflight and offline package staging across a fleet of nodes (optionally
//! reached through a jump server), certificate generation and distribution
//! for HA control planes, and the init / join / readiness orchestration
//! sequence, with fail-fast concurrency across nodes.

pub mod cli;
pub mod config;
pub mod error;
pub mod fleet;
pub mod logging;
pub mod phases;
pub mod pki;
pub mod preflight;
pub mod ssh;
pub mod tmpl;

pub use error::{KubeiError, Result};

/// Version information for the binary
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
