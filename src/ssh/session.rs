// file: src/ssh/session.rs
// version: 1.0.0
// guid: b2d8e541-7a96-4c03-8f72-1e64a9c5d380

//! Blocking libssh2 session behind an async facade
//!
//! libssh2 calls block, so every operation runs on the blocking thread pool.
//! The session handle is cheaply cloneable and internally synchronized, which
//! lets the tunnel relay and concurrent channel opens share one bastion
//! session.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use ssh2::Session;
use tracing::{debug, error, info};

use super::{tunnel, RemoteShell};
use crate::config::HostInfo;
use crate::{KubeiError, Result};

/// TCP dial timeout for SSH endpoints
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// libssh2 session timeout applied during handshake and auth only; cleared
/// afterwards so long-running remote commands are not cut off
const HANDSHAKE_TIMEOUT_MS: u32 = 15_000;

/// One node's SSH session
#[derive(Clone)]
pub struct SshSession {
    session: Session,
    host: String,
}

impl SshSession {
    /// Open a direct session to the host
    pub async fn connect(info: &HostInfo) -> Result<Self> {
        let info = info.clone();
        tokio::task::spawn_blocking(move || {
            let tcp = Self::dial(&info)?;
            Self::establish(tcp, &info)
        })
        .await?
    }

    /// Open the jump server's own session and switch it to non-blocking mode
    /// for channel multiplexing
    ///
    /// The bastion session only carries direct-tcpip tunnel channels, never
    /// commands. Non-blocking mode keeps one relay from starving the others
    /// of the session lock.
    pub async fn connect_tunnel_host(info: &HostInfo) -> Result<Self> {
        let info = info.clone();
        tokio::task::spawn_blocking(move || {
            let tcp = Self::dial(&info)?;
            let session = Self::establish(tcp, &info)?;
            session.session.set_blocking(false);
            Ok(session)
        })
        .await?
    }

    /// Open a session to the host tunneled through the bastion session
    pub async fn connect_via_tunnel(info: &HostInfo, bastion: &SshSession) -> Result<Self> {
        let info = info.clone();
        let bastion_session = bastion.session.clone();
        let bastion_host = bastion.host.clone();
        tokio::task::spawn_blocking(move || {
            let local_addr =
                tunnel::open(&bastion_session, &bastion_host, &info.host, info.port)?;
            let tcp = TcpStream::connect(local_addr).map_err(|e| {
                KubeiError::connect(&info.host, format!("tunnel endpoint refused: {}", e))
            })?;
            Self::establish(tcp, &info)
        })
        .await?
    }

    fn dial(info: &HostInfo) -> Result<TcpStream> {
        debug!("Connecting to {}:{} as {}", info.host, info.port, info.user);

        let addr = (info.host.as_str(), info.port)
            .to_socket_addrs()
            .map_err(|e| KubeiError::connect(&info.host, format!("address lookup failed: {}", e)))?
            .next()
            .ok_or_else(|| KubeiError::connect(&info.host, "address resolved to nothing"))?;

        TcpStream::connect_timeout(&addr, TCP_CONNECT_TIMEOUT)
            .map_err(|e| KubeiError::connect(&info.host, format!("tcp connect failed: {}", e)))
    }

    fn establish(tcp: TcpStream, info: &HostInfo) -> Result<Self> {
        let mut session = Session::new()
            .map_err(|e| KubeiError::connect(&info.host, format!("session init failed: {}", e)))?;

        session.set_tcp_stream(tcp);
        session.set_timeout(HANDSHAKE_TIMEOUT_MS);
        session
            .handshake()
            .map_err(|e| KubeiError::connect(&info.host, format!("handshake failed: {}", e)))?;

        Self::authenticate(&session, info)?;
        session.set_timeout(0);

        info!("[{}] SSH session established", info.host);
        Ok(Self {
            session,
            host: info.host.clone(),
        })
    }

    /// Password first, then key file, then agent
    fn authenticate(session: &Session, info: &HostInfo) -> Result<()> {
        if !info.password.is_empty() {
            session
                .userauth_password(&info.user, &info.password)
                .map_err(|e| {
                    KubeiError::connect(&info.host, format!("password auth failed: {}", e))
                })?;
        } else if let Some(key_path) = &info.key_path {
            session
                .userauth_pubkey_file(&info.user, None, key_path, None)
                .map_err(|e| {
                    KubeiError::connect(&info.host, format!("key auth failed: {}", e))
                })?;
        } else if let Err(e) = session.userauth_agent(&info.user) {
            return Err(KubeiError::connect(
                &info.host,
                format!("agent auth failed and no password or key configured: {}", e),
            ));
        }

        if !session.authenticated() {
            return Err(KubeiError::connect(&info.host, "authentication failed"));
        }
        Ok(())
    }

    async fn exec(&self, command: &str) -> Result<(i32, String, String)> {
        let session = self.session.clone();
        let host = self.host.clone();
        let command = command.to_string();

        tokio::task::spawn_blocking(move || {
            let mut channel = session.channel_session().map_err(|e| {
                KubeiError::command(&host, format!("failed to open channel: {}", e))
            })?;

            channel
                .exec(&command)
                .map_err(|e| KubeiError::command(&host, format!("exec failed: {}", e)))?;

            let mut stdout = String::new();
            let mut stderr = String::new();
            channel
                .read_to_string(&mut stdout)
                .map_err(|e| KubeiError::command(&host, format!("failed to read stdout: {}", e)))?;
            channel
                .stderr()
                .read_to_string(&mut stderr)
                .map_err(|e| KubeiError::command(&host, format!("failed to read stderr: {}", e)))?;

            channel
                .wait_close()
                .map_err(|e| KubeiError::command(&host, format!("failed to close channel: {}", e)))?;
            let exit_status = channel.exit_status().map_err(|e| {
                KubeiError::command(&host, format!("failed to get exit status: {}", e))
            })?;

            Ok((exit_status, stdout, stderr))
        })
        .await?
    }

    fn non_zero_exit(&self, command: &str, status: i32, stdout: &str, stderr: &str) -> KubeiError {
        error!(
            "[{}] command exited with status {}: {}",
            self.host,
            status,
            summarize(command)
        );
        if !stdout.trim().is_empty() {
            error!("[{}] STDOUT: {}", self.host, stdout.trim());
        }
        if !stderr.trim().is_empty() {
            error!("[{}] STDERR: {}", self.host, stderr.trim());
        }

        let detail = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        let mut reason = format!("'{}' exited with status {}", summarize(command), status);
        if !detail.is_empty() {
            reason.push_str(": ");
            reason.push_str(&truncate(detail, 240));
        }
        KubeiError::command(&self.host, reason)
    }
}

#[async_trait]
impl RemoteShell for SshSession {
    async fn run(&self, command: &str) -> Result<()> {
        debug!("[{}] $ {}", self.host, summarize(command));
        let (status, stdout, stderr) = self.exec(command).await?;
        if status != 0 {
            return Err(self.non_zero_exit(command, status, &stdout, &stderr));
        }
        Ok(())
    }

    async fn run_capture(&self, command: &str) -> Result<String> {
        debug!("[{}] $ {}", self.host, summarize(command));
        let (status, stdout, stderr) = self.exec(command).await?;
        if status != 0 {
            return Err(self.non_zero_exit(command, status, &stdout, &stderr));
        }
        Ok(stdout)
    }

    /// Copy a local file to the node over SCP. The remote parent directory
    /// must already exist.
    async fn send_file(&self, remote_path: &str, local_path: &Path) -> Result<()> {
        info!(
            "[{}] [send] {} -> {}",
            self.host,
            local_path.display(),
            remote_path
        );

        let session = self.session.clone();
        let host = self.host.clone();
        let remote_path = remote_path.to_string();
        let local_path = local_path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let size = std::fs::metadata(&local_path)?.len();
            let mut local = std::fs::File::open(&local_path)?;

            let mut remote = session
                .scp_send(Path::new(&remote_path), 0o644, size, None)
                .map_err(|e| {
                    KubeiError::command(&host, format!("scp to {} failed: {}", remote_path, e))
                })?;

            let mut buf = [0u8; 64 * 1024];
            loop {
                let n = local.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                remote.write_all(&buf[..n]).map_err(|e| {
                    KubeiError::command(&host, format!("scp write failed: {}", e))
                })?;
            }

            remote
                .send_eof()
                .and_then(|_| remote.wait_eof())
                .and_then(|_| remote.close())
                .and_then(|_| remote.wait_close())
                .map_err(|e| KubeiError::command(&host, format!("scp finish failed: {}", e)))?;

            Ok(())
        })
        .await?
    }

    async fn close(&self) -> Result<()> {
        let session = self.session.clone();
        let host = self.host.clone();
        tokio::task::spawn_blocking(move || {
            session
                .disconnect(None, "closing session", None)
                .map_err(|e| KubeiError::connect(&host, format!("disconnect failed: {}", e)))
        })
        .await?
    }
}

/// First line of a command, shortened for logs and error messages
fn summarize(command: &str) -> String {
    let first = command.trim().lines().next().unwrap_or("").trim();
    truncate(first, 96)
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(limit).collect();
        out.push_str("...");
        out
    }
}
