use std::collections::HashMap;

use thiserror::Error;
use tracing::warn;

/// Replication status of the durable store's remote counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Offline,
    Syncing,
    Synced,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Offline => "offline",
            ConnectionState::Syncing => "syncing",
            ConnectionState::Synced => "synced",
            ConnectionState::Error => "error",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// String key-value storage. The client backs this with localStorage and
/// sessionStorage; tests and native callers use `MemoryStore`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One queued replication payload for the remote table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteWrite {
    pub key: String,
    pub payload: String,
}

/// Durable key-value persistence with best-effort remote replication.
///
/// `set` writes the local store before returning; a local failure is the
/// caller's error. The remote side is a single coalescing pending slot: the
/// driver (the client's async pump) takes at most one write at a time via
/// `take_remote_write`, pushes it, and reports back through
/// `complete_remote_write`. Overlapping saves collapse into the latest
/// snapshot instead of queueing. Remote failures never propagate; they only
/// flip the connection state.
pub struct PersistenceAdapter<L: KeyValueStore> {
    local: L,
    remote_enabled: bool,
    state: ConnectionState,
    pending: Option<RemoteWrite>,
    in_flight: bool,
    observers: Vec<Box<dyn FnMut(ConnectionState)>>,
}

impl<L: KeyValueStore> PersistenceAdapter<L> {
    pub fn new(local: L, remote_enabled: bool) -> Self {
        Self {
            local,
            remote_enabled,
            state: ConnectionState::Offline,
            pending: None,
            in_flight: false,
            observers: Vec::new(),
        }
    }

    pub fn local(&self) -> &L {
        &self.local
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.local.get(key)
    }

    /// Local write first, guaranteed before return. Remote replication is
    /// queued (latest snapshot wins) and dispatched by the driver.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.local.set(key, value)?;
        if self.remote_enabled {
            self.pending = Some(RemoteWrite {
                key: key.to_string(),
                payload: value.to_string(),
            });
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.local.remove(key)
    }

    pub fn has_pending_remote(&self) -> bool {
        self.pending.is_some()
    }

    /// Hand the driver the next replication payload, if one is due and no
    /// other push is in flight.
    pub fn take_remote_write(&mut self) -> Option<RemoteWrite> {
        if self.in_flight {
            return None;
        }
        let write = self.pending.take()?;
        self.in_flight = true;
        self.transition(ConnectionState::Syncing);
        Some(write)
    }

    /// Driver callback for a finished push. Failures are swallowed into the
    /// `Error` state; a snapshot queued while the push ran keeps the state
    /// at `Syncing` until the driver picks it up.
    pub fn complete_remote_write(&mut self, result: Result<(), String>) {
        self.in_flight = false;
        match result {
            Ok(()) => {
                if self.pending.is_none() {
                    self.transition(ConnectionState::Synced);
                }
            }
            Err(e) => {
                warn!(error = %e, "remote replication failed");
                self.transition(ConnectionState::Error);
            }
        }
    }

    /// Push-model state observation: one immediate callback with the current
    /// state, then at most one callback per transition.
    pub fn subscribe(&mut self, mut callback: impl FnMut(ConnectionState) + 'static) {
        callback(self.state);
        self.observers.push(Box::new(callback));
    }

    fn transition(&mut self, next: ConnectionState) {
        if next == self.state {
            return;
        }
        self.state = next;
        for observer in &mut self.observers {
            observer(next);
        }
    }
}
