// file: src/ssh/tunnel.rs
// version: 1.0.0
// guid: c7a1f983-4e25-4b60-a1d9-5f38c2e7b046

//! Loopback relay for connections tunneled through the jump server
//!
//! libssh2 direct-tcpip channels are not sockets, so a node session cannot
//! hand one to its own transport directly. Instead each tunneled connection
//! gets a loopback listener: the node session dials it, and a relay thread
//! pumps bytes between the accepted stream and the bastion channel. The
//! bastion session runs in non-blocking mode, so concurrent relays and
//! channel opens interleave on the shared session instead of blocking each
//! other.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::time::{Duration, Instant};

use ssh2::{Channel, ErrorCode, Session};
use tracing::{debug, trace};

use crate::{KubeiError, Result};

/// Deadline for opening a direct-tcpip channel on the bastion
const CHANNEL_OPEN_DEADLINE: Duration = Duration::from_secs(30);

/// Poll interval while the non-blocking session reports EAGAIN
const RELAY_TICK: Duration = Duration::from_millis(10);

/// libssh2's EAGAIN result code, surfaced while the session is non-blocking
const LIBSSH2_ERROR_EAGAIN: i32 = -37;

/// Open a tunnel to `target_host:target_port` through the bastion session
/// and return the loopback address the caller should dial.
pub fn open(
    bastion: &Session,
    bastion_host: &str,
    target_host: &str,
    target_port: u16,
) -> Result<SocketAddr> {
    let channel = open_channel(bastion, bastion_host, target_host, target_port)?;

    let listener = TcpListener::bind(("127.0.0.1", 0))
        .map_err(|e| KubeiError::connect(target_host, format!("tunnel listener failed: {}", e)))?;
    let addr = listener.local_addr().map_err(|e| {
        KubeiError::connect(target_host, format!("tunnel listener address failed: {}", e))
    })?;

    let target = target_host.to_string();
    std::thread::Builder::new()
        .name(format!("ssh-tunnel-{}", target_host))
        .spawn(move || relay(listener, channel, &target))
        .map_err(|e| {
            KubeiError::connect(target_host, format!("tunnel relay thread failed: {}", e))
        })?;

    debug!(
        "Tunnel to {}:{} through {} listening on {}",
        target_host, target_port, bastion_host, addr
    );
    Ok(addr)
}

fn open_channel(
    bastion: &Session,
    bastion_host: &str,
    target_host: &str,
    target_port: u16,
) -> Result<Channel> {
    let deadline = Instant::now() + CHANNEL_OPEN_DEADLINE;
    loop {
        match bastion.channel_direct_tcpip(target_host, target_port, None) {
            Ok(channel) => return Ok(channel),
            Err(e) if is_again(&e) => {
                if Instant::now() >= deadline {
                    return Err(KubeiError::connect(
                        target_host,
                        format!("timed out opening tunnel channel through {}", bastion_host),
                    ));
                }
                std::thread::sleep(RELAY_TICK);
            }
            Err(e) => {
                return Err(KubeiError::connect(
                    target_host,
                    format!("tunnel channel through {} failed: {}", bastion_host, e),
                ))
            }
        }
    }
}

/// Pump bytes both ways until either side closes
///
/// The accepted stream uses a short read timeout as pacing; the channel side
/// reports EAGAIN immediately because its session is non-blocking.
fn relay(listener: TcpListener, mut channel: Channel, target: &str) {
    let local = match listener.accept() {
        Ok((stream, _)) => stream,
        Err(e) => {
            debug!("Tunnel to {} never accepted: {}", target, e);
            let _ = channel.close();
            return;
        }
    };
    drop(listener);

    let mut local = local;
    if local.set_read_timeout(Some(RELAY_TICK)).is_err() {
        let _ = channel.close();
        return;
    }

    let mut buf = [0u8; 16 * 1024];
    loop {
        // local -> bastion channel
        loop {
            match local.read(&mut buf) {
                Ok(0) => {
                    trace!("Tunnel to {} closed by local side", target);
                    let _ = channel.close();
                    return;
                }
                Ok(n) => {
                    if write_full(&mut channel, &buf[..n]).is_err() {
                        return;
                    }
                }
                Err(e) if is_would_block(&e) => break,
                Err(e) => {
                    debug!("Tunnel to {} local read error: {}", target, e);
                    let _ = channel.close();
                    return;
                }
            }
        }

        // bastion channel -> local
        loop {
            match channel.read(&mut buf) {
                Ok(0) => {
                    trace!("Tunnel to {} closed by remote side", target);
                    return;
                }
                Ok(n) => {
                    if local.write_all(&buf[..n]).is_err() {
                        let _ = channel.close();
                        return;
                    }
                }
                Err(e) if is_would_block(&e) => break,
                Err(e) => {
                    debug!("Tunnel to {} channel read error: {}", target, e);
                    return;
                }
            }
        }

        if channel.eof() {
            return;
        }
    }
}

fn write_full(channel: &mut Channel, mut buf: &[u8]) -> std::io::Result<()> {
    while !buf.is_empty() {
        match channel.write(buf) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    ErrorKind::WriteZero,
                    "channel write returned zero",
                ))
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if is_would_block(&e) => std::thread::sleep(RELAY_TICK),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn is_again(e: &ssh2::Error) -> bool {
    matches!(e.code(), ErrorCode::Session(LIBSSH2_ERROR_EAGAIN))
}

fn is_would_block(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
