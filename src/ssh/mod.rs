// file: src/ssh/mod.rs
// version: 1.0.0
// guid: a9f4c217-6b83-4d50-92e1-8c5f0a3d7b64

//! SSH connection management
//!
//! Opens one shell session per node, either directly or tunneled through a
//! shared jump server session, and exposes the remote-shell capability the
//! rest of the crate is written against.

pub mod session;
pub mod tunnel;

pub use session::SshSession;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{JumpServer, Node};
use crate::Result;

/// The remote-shell capability: run commands, copy files, close
///
/// Phases depend on this trait rather than on the SSH transport, so tests can
/// substitute recording shells.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run a command, requiring a zero exit status
    async fn run(&self, command: &str) -> Result<()>;

    /// Run a command and capture its stdout
    async fn run_capture(&self, command: &str) -> Result<String>;

    /// Copy a local file to the remote path
    async fn send_file(&self, remote_path: &str, local_path: &Path) -> Result<()>;

    /// Close the session
    async fn close(&self) -> Result<()>;
}

/// Connect a node's shell session
///
/// No-op when the node already holds a live session. When the jump server is
/// enabled, its shared session is established first (at most once across all
/// nodes) and the node connection is tunneled through it. Transport and auth
/// failures surface as connection errors for this node's host; no retry is
/// applied here.
pub async fn connect(node: &mut Node, jump: &JumpServer) -> Result<()> {
    if node.shell.is_some() {
        return Ok(());
    }

    let session = if jump.is_enabled() {
        let bastion = jump.session().await?;
        info!(
            "[{}] [preflight] Connecting through jump server {}",
            node.host(),
            jump.host_info.host
        );
        SshSession::connect_via_tunnel(&node.host_info, bastion).await?
    } else {
        SshSession::connect(&node.host_info).await?
    };

    node.shell = Some(Arc::new(session));
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording shells for unit tests

    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::RemoteShell;
    use crate::Result;

    /// Records every command and file transfer; replies to `run_capture`
    /// from a FIFO script of canned outputs.
    pub(crate) struct ScriptedShell {
        pub host: String,
        pub log: Mutex<Vec<String>>,
        pub sent_files: Mutex<Vec<String>>,
        pub outputs: Mutex<VecDeque<String>>,
        pub fail_command_containing: Option<String>,
    }

    impl ScriptedShell {
        pub fn new(host: &str) -> Self {
            Self {
                host: host.to_string(),
                log: Mutex::new(Vec::new()),
                sent_files: Mutex::new(Vec::new()),
                outputs: Mutex::new(VecDeque::new()),
                fail_command_containing: None,
            }
        }

        pub fn with_outputs(host: &str, outputs: &[&str]) -> Self {
            let shell = Self::new(host);
            shell
                .outputs
                .lock()
                .unwrap()
                .extend(outputs.iter().map(|s| s.to_string()));
            shell
        }

        /// Fail any command containing `needle` with a scripted command error
        pub fn fail_on(mut self, needle: &str) -> Self {
            self.fail_command_containing = Some(needle.to_string());
            self
        }

        pub fn commands(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        pub fn sent_files(&self) -> Vec<String> {
            self.sent_files.lock().unwrap().clone()
        }

        fn check_fail(&self, command: &str) -> Result<()> {
            if let Some(pattern) = &self.fail_command_containing {
                if command.contains(pattern.as_str()) {
                    return Err(crate::KubeiError::command(&self.host, "scripted failure"));
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteShell for ScriptedShell {
        async fn run(&self, command: &str) -> Result<()> {
            self.log.lock().unwrap().push(command.to_string());
            self.check_fail(command)
        }

        async fn run_capture(&self, command: &str) -> Result<String> {
            self.log.lock().unwrap().push(command.to_string());
            self.check_fail(command)?;
            Ok(self
                .outputs
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        async fn send_file(&self, remote_path: &str, _local_path: &Path) -> Result<()> {
            self.sent_files.lock().unwrap().push(remote_path.to_string());
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }
}
