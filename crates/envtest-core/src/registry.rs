use dashmap::DashMap;
use envtest_runtime::{ControlPlane, RuntimeError};
use envtest_schema::{compute_short_id, ContextName, ShortId};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A registered environment, locked for the duration of a stop.
pub type SharedHandle = Arc<Mutex<EnvironmentHandle>>;

static GLOBAL: Lazy<Arc<EnvironmentRegistry>> = Lazy::new(|| Arc::new(EnvironmentRegistry::new()));

/// Server-side record of one running environment.
pub struct EnvironmentHandle {
    short_id: ShortId,
    server: String,
    context: ContextName,
    created_at: String,
    control_plane: Box<dyn ControlPlane>,
    stopped: bool,
}

impl EnvironmentHandle {
    pub fn new(document: &str, control_plane: Box<dyn ControlPlane>) -> Self {
        let credentials = control_plane.credentials();
        Self {
            short_id: compute_short_id(document),
            server: credentials.server.clone(),
            context: credentials.context_name(),
            created_at: chrono::Utc::now().to_rfc3339(),
            control_plane,
            stopped: false,
        }
    }

    pub fn short_id(&self) -> &ShortId {
        &self.short_id
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn summary(&self) -> EnvironmentSummary {
        EnvironmentSummary {
            short_id: self.short_id.clone(),
            server: self.server.clone(),
            context: self.context.clone(),
            created_at: self.created_at.clone(),
        }
    }

    /// Stop the control plane. Only a successful stop marks the handle
    /// stopped; after a failure the stop may be attempted again.
    pub(crate) fn stop(&mut self) -> Result<(), RuntimeError> {
        self.control_plane.stop()?;
        self.stopped = true;
        Ok(())
    }
}

impl fmt::Debug for EnvironmentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvironmentHandle")
            .field("short_id", &self.short_id)
            .field("server", &self.server)
            .field("context", &self.context)
            .field("created_at", &self.created_at)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

/// Secret-free view of a running environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentSummary {
    pub short_id: ShortId,
    pub server: String,
    pub context: ContextName,
    pub created_at: String,
}

struct Entry {
    summary: EnvironmentSummary,
    handle: SharedHandle,
}

/// Credential document -> running environment.
///
/// Lookups clone the handle out of the map, so stopping one environment never
/// holds a map shard lock and never blocks work on other keys. Listings read
/// the summary recorded at registration and never take a handle lock, so they
/// do not wait on a destroy that is stopping a slow control plane.
#[derive(Default)]
pub struct EnvironmentRegistry {
    entries: DashMap<String, Entry>,
}

impl EnvironmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by every `Manager::new`.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL)
    }

    /// Register `handle` under `key`, replacing any previous entry.
    pub fn store(&self, key: String, handle: EnvironmentHandle) -> SharedHandle {
        let summary = handle.summary();
        let shared = Arc::new(Mutex::new(handle));
        self.entries.insert(
            key,
            Entry {
                summary,
                handle: Arc::clone(&shared),
            },
        );
        shared
    }

    pub fn load(&self, key: &str) -> Option<SharedHandle> {
        if key.is_empty() {
            return None;
        }
        self.entries
            .get(key)
            .map(|entry| Arc::clone(&entry.value().handle))
    }

    pub fn contains(&self, key: &str) -> bool {
        !key.is_empty() && self.entries.contains_key(key)
    }

    /// Drop `key` if it still maps to `handle`.
    pub(crate) fn remove(&self, key: &str, handle: &SharedHandle) -> bool {
        self.entries
            .remove_if(key, |_, current| Arc::ptr_eq(&current.handle, handle))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summaries of every registered environment, oldest first.
    ///
    /// An environment whose destroy is in progress is still listed until the
    /// stop succeeds and its entry is removed.
    pub fn summaries(&self) -> Vec<EnvironmentSummary> {
        let mut summaries: Vec<EnvironmentSummary> = self
            .entries
            .iter()
            .map(|entry| entry.value().summary.clone())
            .collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.short_id.cmp(&b.short_id))
        });
        summaries
    }
}
