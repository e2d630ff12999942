//! Node transport: the one seam between "here" and "somewhere else".
//!
//! A [`Node`] accepts commands and produces replies. The local node executes
//! them inline through a bounded worker pool; a remote node ships them over a
//! framed TCP session. The router and the service layer never know which one
//! they are holding.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, trace};

use coffer_core::{ErrorMessage, OperatorRegistry, Store};
use coffer_protocol::{read_frame, write_frame, Command, Reply};

use crate::dispatch::{execute_on_store, StoreContext};
use crate::error::ProcessingError;
use crate::membership::LocalMembership;

/// A transport endpoint commands can be sent to.
#[async_trait]
pub trait Node: Send + Sync {
    /// Stable node name; uniqueness scope is the owning cluster.
    fn name(&self) -> &str;

    /// Opens the transport session. Failures propagate to the caller.
    async fn connect(&self) -> Result<(), ProcessingError>;

    /// Sends one command and awaits its reply.
    async fn send(&self, command: Command) -> Result<Reply, ProcessingError>;

    /// Tears the session down. Idempotent; swallows transport errors.
    async fn disconnect(&self);
}

impl std::fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("name", &self.name()).finish()
    }
}

/// The distinguished local node: no transport, commands execute straight
/// against the local store through a bounded worker pool.
pub struct LocalNode {
    name: String,
    context: StoreContext,
    workers: Semaphore,
}

impl LocalNode {
    pub fn new(
        name: impl Into<String>,
        store: Store,
        operators: Arc<OperatorRegistry>,
        membership: Arc<LocalMembership>,
        worker_permits: usize,
    ) -> Self {
        Self {
            name: name.into(),
            context: StoreContext::new(store, operators, membership),
            workers: Semaphore::new(worker_permits.max(1)),
        }
    }

    /// The execution context, shared with the node server loop.
    pub fn context(&self) -> &StoreContext {
        &self.context
    }
}

#[async_trait]
impl Node for LocalNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), ProcessingError> {
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<Reply, ProcessingError> {
        let _permit = self.workers.acquire().await.map_err(|_| {
            ProcessingError(ErrorMessage::internal("local worker pool closed"))
        })?;
        trace!(node = %self.name, command = command.kind(), "executing locally");
        execute_on_store(command, &self.context).await.map_err(ProcessingError::from)
    }

    async fn disconnect(&self) {}
}

impl std::fmt::Debug for LocalNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalNode").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A remote node: one framed TCP session, one in-flight request at a time.
pub struct RemoteNode {
    name: String,
    host: String,
    port: u16,
    reply_timeout: Duration,
    session: Mutex<Option<TcpStream>>,
}

impl RemoteNode {
    pub fn new(host: impl Into<String>, port: u16, name: impl Into<String>, reply_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port,
            reply_timeout,
            session: Mutex::new(None),
        }
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> ProcessingError {
        ProcessingError(ErrorMessage::unavailable(format!(
            "node {} ({}:{}): {reason}",
            self.name, self.host, self.port
        )))
    }
}

#[async_trait]
impl Node for RemoteNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<(), ProcessingError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| self.unavailable(format_args!("connect failed: {e}")))?;
        stream.set_nodelay(true).ok();
        debug!(node = %self.name, host = %self.host, port = self.port, "connected");
        *session = Some(stream);
        Ok(())
    }

    async fn send(&self, command: Command) -> Result<Reply, ProcessingError> {
        let mut session = self.session.lock().await;
        let stream = session
            .as_mut()
            .ok_or_else(|| self.unavailable("not connected"))?;

        let exchange = async {
            write_frame(stream, &command.encode()).await?;
            match read_frame(stream).await? {
                Some(body) => Reply::decode(&body),
                None => Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "peer closed before replying",
                )),
            }
        };
        let timed = tokio::time::timeout(self.reply_timeout, exchange).await;

        let outcome = match timed {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(io_error)) => {
                // the session is in an unknown state; drop it
                *session = None;
                return Err(self.unavailable(format_args!("{} failed: {io_error}", command.kind())));
            }
            Err(_elapsed) => {
                *session = None;
                return Err(self.unavailable(format_args!(
                    "{} timed out after {:?}",
                    command.kind(),
                    self.reply_timeout
                )));
            }
        };

        outcome.map_err(ProcessingError)
    }

    async fn disconnect(&self) {
        let mut session = self.session.lock().await;
        if let Some(mut stream) = session.take() {
            // best-effort teardown
            let _ = stream.shutdown().await;
            debug!(node = %self.name, "disconnected");
        }
    }
}

impl std::fmt::Debug for RemoteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteNode")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Builds nodes for members found by discovery. A seam so membership logic
/// can be exercised without real sockets.
pub trait RemoteNodeFactory: Send + Sync {
    fn make_node(&self, host: &str, port: u16, name: &str) -> Arc<dyn Node>;
}

/// The production factory: plain TCP remote nodes.
#[derive(Debug, Clone)]
pub struct TcpNodeFactory {
    pub reply_timeout: Duration,
}

impl Default for TcpNodeFactory {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(10),
        }
    }
}

impl RemoteNodeFactory for TcpNodeFactory {
    fn make_node(&self, host: &str, port: u16, name: &str) -> Arc<dyn Node> {
        Arc::new(RemoteNode::new(host, port, name, self.reply_timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_core::ErrorCode;

    fn remote() -> RemoteNode {
        // nothing listens on this port in tests
        RemoteNode::new("127.0.0.1", 1, "n1", Duration::from_millis(200))
    }

    #[tokio::test]
    async fn send_on_disconnected_node_fails() {
        let node = remote();
        let err = node.send(Command::GetBuckets).await.unwrap_err();
        assert_eq!(err.message().code, ErrorCode::Unavailable);
    }

    #[tokio::test]
    async fn connect_failure_propagates() {
        let node = remote();
        let err = node.connect().await.unwrap_err();
        assert_eq!(err.message().code, ErrorCode::Unavailable);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let node = remote();
        node.disconnect().await;
        node.disconnect().await;
    }
}
