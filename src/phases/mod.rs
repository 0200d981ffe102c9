// file: src/phases/mod.rs
// version: 1.0.0
// guid: 2f7c9b14-5a68-4e0d-9c3b-81d4f6a2e590

//! Bootstrap and teardown phases
//!
//! Each submodule is one stage of the cluster lifecycle. [`init::bootstrap`]
//! strings the stages together in order; [`reset::teardown`] unwinds them.
//! Phases talk to nodes exclusively through [`crate::config::Node`] shell
//! handles, so every phase can be exercised against scripted sessions.

pub mod cert;
pub mod init;
pub mod kube;
pub mod kubeadm;
pub mod network;
pub mod reset;
pub mod system;

pub use init::{bootstrap, BootstrapReport};
pub use reset::teardown;
