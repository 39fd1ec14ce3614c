//! In-memory transfer client
//!
//! Serves a fixed set of files and directories from memory for the test suites. It
//! counts connections and fetches so tests can check what the engine actually did.
//! Only built for unit tests or with the `test-utils` feature.

use crate::error::TransferError;
use crate::types::RemoteEntry;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Sink, TransferClient, TransferSession};

#[derive(Default)]
struct State {
    /// Listing order
    order: Vec<String>,
    files: HashMap<String, Vec<u8>>,
    directories: HashSet<String>,
    /// Directories the listing already marks as such
    typed_directories: HashSet<String>,
    failing_fetches: HashSet<String>,
    panicking_fetches: HashSet<String>,
    fetched: Vec<String>,
}

/// Transfer client backed by in-memory content
#[derive(Clone, Default)]
pub struct MemoryTransferClient {
    state: Arc<Mutex<State>>,
    refuse_connect: Arc<AtomicBool>,
    fail_listing: Arc<AtomicBool>,
    fetch_delay: Arc<Mutex<Option<Duration>>>,
    connections: Arc<AtomicUsize>,
    open_sessions: Arc<AtomicUsize>,
}

impl MemoryTransferClient {
    /// Empty remote directory
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // The state holds plain data, a poisoned lock is still consistent
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add a file
    pub fn with_file(self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        {
            let name = name.into();
            let mut state = self.state();
            state.order.push(name.clone());
            state.files.insert(name, content.into());
        }
        self
    }

    /// Add a directory that is only detectable by probing
    pub fn with_directory(self, name: impl Into<String>) -> Self {
        {
            let name = name.into();
            let mut state = self.state();
            state.order.push(name.clone());
            state.directories.insert(name);
        }
        self
    }

    /// Add a directory the listing itself reports as a directory
    pub fn with_listed_directory(self, name: impl Into<String>) -> Self {
        {
            let name = name.into();
            let mut state = self.state();
            state.order.push(name.clone());
            state.directories.insert(name.clone());
            state.typed_directories.insert(name);
        }
        self
    }

    /// Make every fetch of `name` fail with a permanent error
    pub fn with_failing_fetch(self, name: impl Into<String>) -> Self {
        self.state().failing_fetches.insert(name.into());
        self
    }

    /// Make every fetch of `name` panic inside the session
    pub fn with_panicking_fetch(self, name: impl Into<String>) -> Self {
        self.state().panicking_fetches.insert(name.into());
        self
    }

    /// Delay every fetch, to keep tasks in flight
    pub fn with_fetch_delay(self, delay: Duration) -> Self {
        *self
            .fetch_delay
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(delay);
        self
    }

    /// Refuse all connections
    pub fn refuse_connections(self) -> Self {
        self.refuse_connect.store(true, Ordering::SeqCst);
        self
    }

    /// Fail every listing with a protocol error
    pub fn fail_listing(self) -> Self {
        self.fail_listing.store(true, Ordering::SeqCst);
        self
    }

    /// Names fetched so far, in completion order (failed attempts included)
    pub fn fetched(&self) -> Vec<String> {
        self.state().fetched.clone()
    }

    /// Sessions opened so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Sessions opened and not yet disconnected or dropped
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TransferClient for MemoryTransferClient {
    async fn connect(&self) -> Result<Box<dyn TransferSession>, TransferError> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransferError::Connection {
                endpoint: self.endpoint(),
                reason: "connection refused".to_string(),
                transient: false,
            });
        }
        self.connections.fetch_add(1, Ordering::SeqCst);
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            client: self.clone(),
        }))
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

struct MemorySession {
    client: MemoryTransferClient,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.client.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl TransferSession for MemorySession {
    async fn list_entries(&mut self) -> Result<Vec<RemoteEntry>, TransferError> {
        if self.client.fail_listing.load(Ordering::SeqCst) {
            return Err(TransferError::Protocol {
                operation: "list",
                reason: "425 can't open data connection".to_string(),
            });
        }
        let state = self.client.state();
        Ok(state
            .order
            .iter()
            .map(|name| RemoteEntry {
                name: name.clone(),
                is_directory: state.typed_directories.contains(name),
            })
            .collect())
    }

    async fn is_directory(&mut self, name: &str) -> Result<bool, TransferError> {
        Ok(self.client.state().directories.contains(name))
    }

    async fn fetch(&mut self, name: &str, mut sink: Sink) -> Result<u64, TransferError> {
        let delay = *self
            .client
            .fetch_delay
            .lock()
            .unwrap_or_else(|p| p.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let (content, fails, panics) = {
            let mut state = self.client.state();
            state.fetched.push(name.to_string());
            (
                state.files.get(name).cloned(),
                state.failing_fetches.contains(name),
                state.panicking_fetches.contains(name),
            )
        };

        if panics {
            panic!("simulated transfer panic for {name}");
        }
        if fails {
            // leave something behind so callers must clean up partial output
            sink.write_all(b"partial")?;
            return Err(TransferError::Fetch {
                name: name.to_string(),
                reason: "451 transfer aborted".to_string(),
                transient: false,
            });
        }
        let content = content.ok_or_else(|| TransferError::Fetch {
            name: name.to_string(),
            reason: "550 no such file".to_string(),
            transient: false,
        })?;
        sink.write_all(&content)?;
        sink.flush()?;
        Ok(content.len() as u64)
    }

    async fn disconnect(self: Box<Self>) -> Result<(), TransferError> {
        Ok(())
    }
}
