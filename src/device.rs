//! Collaborator contracts for the printer side of a transfer.
//!
//! The wire-level binary transfer protocol, its retry logic, the printer
//! connection manager, and the host's file manager all live outside this
//! crate. These traits are the seams the orchestrator drives them through;
//! implementations wrap blocking device I/O, so every operation is async.

use crate::errors::TransferError;
use crate::logger::BftLogger;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Serial connection parameters for one printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub port: String,
    pub baud_rate: u32,
    pub profile: Option<String>,
}

/// Factory for transport sessions.
/// Real implementation: the wire protocol stack. Test double: a recording
/// transport in the integration tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a transport session on the given serial parameters.
    /// `comm_timeout_ms` bounds each device command round-trip.
    async fn open(
        &self,
        params: &ConnectionParams,
        comm_timeout_ms: i64,
        logger: BftLogger,
    ) -> Result<Arc<dyn TransportSession>, TransferError>;
}

/// One open transport session, exclusively owned by the run that created
/// it and torn down unconditionally at run end.
#[async_trait]
pub trait TransportSession: Send + Sync {
    async fn connect(&self) -> Result<(), TransferError>;

    async fn disconnect(&self) -> Result<(), TransferError>;

    /// Unconditional teardown; must succeed on an already-closed session.
    async fn shutdown(&self);

    /// Send a device command and wait for acknowledgement. Fails with
    /// `TransferError::ProtocolFatal` when the internal retry budget
    /// exhausts.
    async fn send_status_text(&self, text: &str) -> Result<(), TransferError>;

    /// Send a device command without waiting for acknowledgement.
    async fn send_status_text_no_wait(&self, text: &str) -> Result<(), TransferError>;

    /// Wait for the session's background command worker to drain.
    async fn wait_worker_idle(&self);

    /// The file-copy operation bound to this session.
    fn file_transfer(&self, logger: BftLogger) -> Arc<dyn FileTransfer>;
}

/// The external file-copy operation over an open session.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    /// Copy the file at `disk_path` to `remote_name` on the printer's
    /// flash storage. Fails with `TransferError::Cancelled` on a
    /// user-interrupt and `TransferError::ProtocolFatal` when retries
    /// exhaust.
    async fn copy(
        &self,
        disk_path: &Path,
        remote_name: &str,
        overwrite: bool,
        verify: bool,
    ) -> Result<(), TransferError>;

    /// Abort an in-flight copy. Only valid mid-copy.
    async fn abort(&self);
}

/// The host's printer connection manager.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn disconnect(&self);

    async fn connect(&self, params: &ConnectionParams);

    /// The connection parameters currently configured on the host.
    fn current(&self) -> ConnectionParams;
}

/// The host's file manager.
pub trait FileManager: Send + Sync {
    /// Resolve a logical upload path to an absolute path on disk.
    fn disk_path(&self, location: &str, path: &str) -> anyhow::Result<PathBuf>;

    /// Remove an uploaded file.
    fn remove_file(&self, location: &str, path: &str) -> anyhow::Result<()>;
}

/// The storage location uploads are resolved against.
pub const LOCAL_STORAGE: &str = "local";
