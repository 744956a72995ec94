//! One request/response exchange with the task-store backend.
//!
//! Each call opens a fresh TCP connection to the director's active endpoint,
//! writes the encoded request, half-closes the write side to signal
//! completion, then reads until the peer closes and decodes the response.
//! Connect failures and timeouts against the primary trigger exactly one
//! failover retry through [`FailoverDirector::fail_over`]; protocol errors
//! never do.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use taskboard_proto::codec::{self, CodecError, MutationVerdict};
use taskboard_proto::task::{OpType, TaskRecord};

use crate::failover::{FailoverDirector, Role};

/// Default bound on one backend exchange, connect included.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced by a backend exchange.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Connecting, writing, or reading the backend socket failed.
    #[error("backend connection failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The whole exchange did not complete within the configured bound.
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),

    /// The response bytes did not decode as a valid protocol message.
    #[error("backend protocol error: {0}")]
    Protocol(#[from] CodecError),
}

impl BackendError {
    /// Whether this failure should trigger the one-shot failover retry.
    const fn triggers_failover(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }
}

/// Executes backend operations over per-call throwaway connections.
///
/// Sessions are cheap to clone; all of them share the process-wide
/// [`FailoverDirector`].
#[derive(Clone)]
pub struct BackendSession {
    director: Arc<FailoverDirector>,
    timeout: Duration,
}

impl BackendSession {
    /// Creates a session with the default 5-second call bound.
    #[must_use]
    pub fn new(director: Arc<FailoverDirector>) -> Self {
        Self::with_timeout(director, DEFAULT_CALL_TIMEOUT)
    }

    /// Creates a session with a custom call bound.
    #[must_use]
    pub const fn with_timeout(director: Arc<FailoverDirector>, timeout: Duration) -> Self {
        Self { director, timeout }
    }

    /// Returns the shared failover director.
    #[must_use]
    pub fn director(&self) -> &Arc<FailoverDirector> {
        &self.director
    }

    /// Executes one mutation and decodes the backend's verdict.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the exchange fails after the (at most
    /// one) failover retry, or if the response is malformed.
    pub async fn execute(
        &self,
        op: OpType,
        record: &TaskRecord,
    ) -> Result<MutationVerdict, BackendError> {
        let bytes = self.exchange(op, record).await?;
        Ok(codec::decode_mutation_response(&bytes)?)
    }

    /// Executes a list operation and decodes the board snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] as for [`Self::execute`].
    pub async fn list(&self, record: &TaskRecord) -> Result<Vec<TaskRecord>, BackendError> {
        let bytes = self.exchange(OpType::List, record).await?;
        Ok(codec::decode_board_response(&bytes)?)
    }

    /// Runs one exchange against the active endpoint, retrying exactly once
    /// against the standby if this call wins the failover race.
    async fn exchange(&self, op: OpType, record: &TaskRecord) -> Result<Vec<u8>, BackendError> {
        let (addr, role) = self.director.active();
        match self.attempt(&addr, op, record).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.triggers_failover() && role == Role::Primary => {
                let Some(standby) = self.director.fail_over() else {
                    // Another caller already flipped; propagate unmodified.
                    return Err(err);
                };
                tracing::info!(op = ?op, standby = %standby, "retrying call against standby");
                self.attempt(&standby, op, record).await
            }
            Err(err) => Err(err),
        }
    }

    /// One connection lifecycle: connect, write, half-close, read to EOF.
    async fn attempt(
        &self,
        addr: &str,
        op: OpType,
        record: &TaskRecord,
    ) -> Result<Vec<u8>, BackendError> {
        let frame = codec::encode_request(op, record);
        let io = async {
            let mut stream = TcpStream::connect(addr).await.map_err(BackendError::Connect)?;
            stream
                .write_all(&frame)
                .await
                .map_err(BackendError::Connect)?;
            // Half-close the write side so the backend sees end-of-request.
            stream.shutdown().await.map_err(BackendError::Connect)?;

            let mut response = Vec::new();
            stream
                .read_to_end(&mut response)
                .await
                .map_err(BackendError::Connect)?;
            tracing::debug!(op = ?op, addr = %addr, response_len = response.len(), "backend exchange complete");
            Ok(response)
        };

        tokio::time::timeout(self.timeout, io)
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))?
    }
}
