// file: src/fleet/mod.rs
// version: 1.0.0
// guid: d3b7e092-5c41-4a86-b2f0-9e17d4a6c853

//! Concurrent fan-out over node sets with fail-fast cancellation
//!
//! One task per node, bounded by a semaphore. The first failure cancels a
//! shared token: tasks that have not yet started observe it right after
//! acquiring their permit and return without doing work, while tasks already
//! running finish their current remote command. The aggregate result is the
//! first error by completion order, wrapped with the offending node's host;
//! later failures are logged only.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::SharedNode;
use crate::{KubeiError, Result};

/// Upper bound on concurrently running node tasks, capping the number of
/// simultaneously open SSH sessions on the controller side
pub const DEFAULT_MAX_PARALLELISM: usize = 16;

/// Run `op` once per node, at most `limit` at a time, failing fast
pub async fn run_on_nodes<F, Fut>(nodes: &[SharedNode], limit: usize, op: F) -> Result<()>
where
    F: Fn(SharedNode) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    run_on_nodes_with_cancel(nodes, limit, &CancellationToken::new(), op).await
}

/// Like [`run_on_nodes`], sharing an external cancellation token so several
/// fan-outs can fail fast together
pub async fn run_on_nodes_with_cancel<F, Fut>(
    nodes: &[SharedNode],
    limit: usize,
    cancel: &CancellationToken,
    op: F,
) -> Result<()>
where
    F: Fn(SharedNode) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut tasks: JoinSet<Result<()>> = JoinSet::new();

    for node in nodes {
        let node = node.clone();
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();
        let op = op.clone();

        tasks.spawn(async move {
            // The semaphore is never closed while tasks hold the Arc.
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("node semaphore closed");

            if cancel.is_cancelled() {
                return Ok(());
            }

            let host = { node.lock().await.host().to_string() };
            match op(node).await {
                Ok(()) => Ok(()),
                Err(err) => {
                    cancel.cancel();
                    if err.host().is_some() {
                        Err(err)
                    } else {
                        Err(KubeiError::node(host, err))
                    }
                }
            }
        });
    }

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(join_err) => {
                cancel.cancel();
                Err(KubeiError::from(join_err))
            }
        };
        if let Err(err) = result {
            if first_error.is_none() {
                first_error = Some(err);
            } else {
                warn!("Additional node failure after fail-fast: {}", err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Named concurrent branches sharing one cancellation scope
///
/// Used for the heterogeneous join fan-out: the control-plane branch and the
/// worker branch each run their own bounded fan-out, both wired to this
/// group's token so either branch's failure stops the other from starting
/// more nodes.
#[derive(Default)]
pub struct TaskGroup {
    cancel: CancellationToken,
    tasks: JoinSet<(String, Result<()>)>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token to thread into the branches' own fan-outs
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register a named branch
    pub fn spawn<F>(&mut self, name: &str, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.to_string();
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            let result = fut.await;
            if result.is_err() {
                cancel.cancel();
            }
            (name, result)
        });
    }

    /// Wait for every branch; return the first error by completion order
    pub async fn wait(mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            let (name, result) = match joined {
                Ok(entry) => entry,
                Err(join_err) => {
                    self.cancel.cancel();
                    ("task".to_string(), Err(KubeiError::from(join_err)))
                }
            };
            if let Err(err) = result {
                warn!("{} failed: {}", name, err);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HostInfo, InstallMode, Node};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_nodes(count: usize) -> Vec<SharedNode> {
        (0..count)
            .map(|i| {
                Node::new_shared(
                    HostInfo {
                        host: format!("10.0.0.{}", i + 1),
                        port: 22,
                        user: "root".to_string(),
                        password: String::new(),
                        key_path: None,
                    },
                    InstallMode::Online,
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_all_nodes_run_on_success() {
        // Arrange
        let nodes = test_nodes(4);
        let started = Arc::new(AtomicUsize::new(0));

        // Act
        let counter = started.clone();
        let result = run_on_nodes(&nodes, DEFAULT_MAX_PARALLELISM, move |_node| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(started.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fail_fast_skips_not_yet_started_nodes() {
        // Arrange: single worker makes dispatch order deterministic; node 3
        // of 5 fails, so nodes 4 and 5 must never start.
        let nodes = test_nodes(5);
        let started = Arc::new(AtomicUsize::new(0));

        // Act
        let counter = started.clone();
        let result = run_on_nodes(&nodes, 1, move |node| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                let host = { node.lock().await.host().to_string() };
                if host == "10.0.0.3" {
                    return Err(KubeiError::command(&host, "scripted failure"));
                }
                Ok(())
            }
        })
        .await;

        // Assert
        let err = result.unwrap_err();
        assert_eq!(err.host(), Some("10.0.0.3"));
        assert_eq!(started.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_error_without_host_is_wrapped_with_node_host() {
        // Arrange
        let nodes = test_nodes(1);

        // Act
        let result = run_on_nodes(&nodes, 1, |_node| async {
            Err(KubeiError::config("not host scoped"))
        })
        .await;

        // Assert
        let err = result.unwrap_err();
        assert_eq!(err.host(), Some("10.0.0.1"));
        assert!(matches!(err, KubeiError::Node { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_stays_under_limit() {
        // Arrange
        let nodes = test_nodes(6);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        // Act
        let current_c = current.clone();
        let peak_c = peak.clone();
        let result = run_on_nodes(&nodes, 2, move |_node| {
            let current = current_c.clone();
            let peak = peak_c.clone();
            async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        // Assert
        assert!(result.is_ok());
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_task_group_surfaces_first_error_and_cancels() {
        // Arrange
        let mut group = TaskGroup::new();
        let token = group.cancel_token();

        // Act
        group.spawn("failing-branch", async {
            Err(KubeiError::command("10.0.0.9", "scripted failure"))
        });
        let observer = token.clone();
        group.spawn("waiting-branch", async move {
            observer.cancelled().await;
            Ok(())
        });
        let result = group.wait().await;

        // Assert
        let err = result.unwrap_err();
        assert_eq!(err.host(), Some("10.0.0.9"));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_external_token_stops_second_fanout() {
        // Arrange: a pre-cancelled token means no node op starts at all.
        let nodes = test_nodes(3);
        let token = CancellationToken::new();
        token.cancel();
        let started = Arc::new(AtomicUsize::new(0));

        // Act
        let counter = started.clone();
        let result = run_on_nodes_with_cancel(&nodes, 2, &token, move |_node| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }
}
