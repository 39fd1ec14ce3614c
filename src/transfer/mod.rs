//! Remote transfer capability
//!
//! The engine only needs four things from the remote side: connect, list the working
//! directory, tell whether a name is a directory, and stream one entry into a local
//! sink. [`TransferClient`] and [`TransferSession`] capture exactly that, so the engine
//! is tested against an in-memory client and run against [`FtpClient`].
//!
//! Sessions are not shared: every download task connects its own and disconnects it
//! when the task ends.

mod ftp;
#[cfg(any(test, feature = "test-utils"))]
mod memory;

pub use ftp::{FtpClient, FtpSession};
#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryTransferClient;

use crate::error::TransferError;
use crate::types::RemoteEntry;
use std::io::Write;

/// Byte sink a fetch writes into
pub type Sink = Box<dyn Write + Send>;

/// Factory for transfer sessions
#[async_trait::async_trait]
pub trait TransferClient: Send + Sync {
    /// Open, authenticate and position a new session in the remote directory
    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError>;

    /// `host:port` (or equivalent) for logs
    fn endpoint(&self) -> String;
}

/// One authenticated connection, positioned in the remote directory
#[async_trait::async_trait]
pub trait TransferSession: Send {
    /// Enumerate the current directory once
    async fn list_entries(&mut self) -> Result<Vec<RemoteEntry>, TransferError>;

    /// Whether `name` is a directory.
    ///
    /// Implementations without type metadata probe by changing into `name` and back.
    /// A refused change means "not a directory"; the working directory is unchanged
    /// afterwards either way.
    async fn is_directory(&mut self, name: &str) -> Result<bool, TransferError>;

    /// Stream entry `name` into `sink`, returning the number of bytes written
    async fn fetch(&mut self, name: &str, sink: Sink) -> Result<u64, TransferError>;

    /// Close the session politely. Dropping a session closes the connection too.
    async fn disconnect(self: Box<Self>) -> Result<(), TransferError>;
}
