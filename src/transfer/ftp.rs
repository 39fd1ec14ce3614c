//! FTP implementation of the transfer capability, backed by `suppaftp`.
//!
//! `suppaftp`'s blocking stream is moved onto the tokio blocking pool for each command
//! and handed back afterwards, so a session never blocks a runtime worker.

use crate::config::TransferConfig;
use crate::error::TransferError;
use crate::types::RemoteEntry;
use std::io::Write;
use std::net::ToSocketAddrs;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};
use tokio::task::spawn_blocking;
use tracing::debug;

use super::{Sink, TransferClient, TransferSession};

/// Connects FTP sessions to the configured endpoint
#[derive(Clone, Debug)]
pub struct FtpClient {
    host: String,
    port: u16,
    user: String,
    pass: String,
    remote_dir: String,
    connect_timeout: Duration,
}

impl FtpClient {
    /// Client for the `[transfer]` section
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            pass: config.pass.clone(),
            remote_dir: config.remote_dir.clone(),
            connect_timeout: config.connect_timeout,
        }
    }

    fn open(&self) -> Result<FtpStream, TransferError> {
        let endpoint = self.endpoint();
        let connection = |reason: String, transient: bool| TransferError::Connection {
            endpoint: endpoint.clone(),
            reason,
            transient,
        };

        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| connection(format!("cannot resolve host: {e}"), true))?
            .next()
            .ok_or_else(|| connection("host resolved to no address".to_string(), false))?;

        let mut stream = FtpStream::connect_timeout(addr, self.connect_timeout)
            .map_err(|e| connection(e.to_string(), is_connection_failure(&e)))?;
        stream
            .login(self.user.as_str(), self.pass.as_str())
            .map_err(|e| connection(format!("login rejected: {e}"), is_connection_failure(&e)))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| connection(format!("cannot switch to binary: {e}"), false))?;
        if !self.remote_dir.is_empty() {
            stream.cwd(&self.remote_dir).map_err(|e| {
                connection(
                    format!("cannot enter {}: {e}", self.remote_dir),
                    is_connection_failure(&e),
                )
            })?;
        }
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl TransferClient for FtpClient {
    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError> {
        let client = self.clone();
        let endpoint = self.endpoint();
        let stream = spawn_blocking(move || client.open())
            .await
            .map_err(|e| TransferError::Connection {
                endpoint: endpoint.clone(),
                reason: format!("connect task failed: {e}"),
                transient: false,
            })??;
        debug!(endpoint = %endpoint, "ftp session opened");
        Ok(Box::new(FtpSession {
            stream: Some(stream),
            endpoint,
        }))
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One logged-in FTP control connection
pub struct FtpSession {
    stream: Option<FtpStream>,
    endpoint: String,
}

impl FtpSession {
    /// Run a blocking command against the stream on the blocking pool.
    ///
    /// If the blocking task dies the stream is lost and later commands fail with
    /// [`TransferError::SessionClosed`].
    async fn with_stream<T, F>(&mut self, operation: &'static str, f: F) -> Result<T, TransferError>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T, TransferError> + Send + 'static,
    {
        let mut stream = self.stream.take().ok_or(TransferError::SessionClosed)?;
        let (stream, result) = spawn_blocking(move || {
            let result = f(&mut stream);
            (stream, result)
        })
        .await
        .map_err(|e| TransferError::Protocol {
            operation,
            reason: format!("blocking task failed: {e}"),
        })?;
        self.stream = Some(stream);
        result
    }
}

#[async_trait::async_trait]
impl TransferSession for FtpSession {
    async fn list_entries(&mut self) -> Result<Vec<RemoteEntry>, TransferError> {
        let names = self
            .with_stream("list", |s| s.nlst(None).map_err(|e| command_error("list", e)))
            .await?;
        // NLST carries no type information; directories are found by probing
        Ok(names
            .iter()
            .filter_map(|raw| entry_name(raw))
            .map(RemoteEntry::file)
            .collect())
    }

    async fn is_directory(&mut self, name: &str) -> Result<bool, TransferError> {
        let name = name.to_string();
        self.with_stream("cwd", move |s| {
            let previous = s.pwd().map_err(|e| command_error("pwd", e))?;
            match s.cwd(&name) {
                Ok(()) => {
                    s.cwd(&previous).map_err(|e| command_error("cwd", e))?;
                    Ok(true)
                }
                // The server refused the change: a plain file (or nothing at all)
                Err(FtpError::UnexpectedResponse(_)) => Ok(false),
                Err(e) => Err(command_error("cwd", e)),
            }
        })
        .await
    }

    async fn fetch(&mut self, name: &str, sink: Sink) -> Result<u64, TransferError> {
        let name = name.to_string();
        self.with_stream("retr", move |s| {
            let mut sink = sink;
            let bytes = s
                .retr(&name, |reader| {
                    std::io::copy(reader, &mut sink).map_err(FtpError::ConnectionError)
                })
                .map_err(|e| TransferError::Fetch {
                    name: name.clone(),
                    transient: is_connection_failure(&e),
                    reason: e.to_string(),
                })?;
            sink.flush()?;
            Ok(bytes)
        })
        .await
    }

    async fn disconnect(mut self: Box<Self>) -> Result<(), TransferError> {
        let endpoint = self.endpoint.clone();
        self.with_stream("quit", |s| s.quit().map_err(|e| command_error("quit", e)))
            .await?;
        debug!(endpoint = %endpoint, "ftp session closed");
        Ok(())
    }
}

/// Network-level failure, as opposed to a reply the server chose to send
fn is_connection_failure(e: &FtpError) -> bool {
    matches!(e, FtpError::ConnectionError(_))
}

fn command_error(operation: &'static str, e: FtpError) -> TransferError {
    match e {
        FtpError::ConnectionError(io) => TransferError::Io(io),
        other => TransferError::Protocol {
            operation,
            reason: other.to_string(),
        },
    }
}

/// Last path component of an NLST line, skipping `.` and `..`
fn entry_name(raw: &str) -> Option<&str> {
    let name = raw.trim_end_matches(['\r', '\n']);
    let name = name.rsplit('/').next().unwrap_or(name);
    match name {
        "" | "." | ".." => None,
        other => Some(other),
    }
}
