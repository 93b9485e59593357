use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::time::Instant;

use crate::handle::McpClientHandle;

/// At-most-one-restart-in-flight flag for a single server.
#[derive(Debug, Default)]
pub(crate) struct RestartGuard {
    restarting: AtomicBool,
}

impl RestartGuard {
    pub(crate) fn is_restarting(&self) -> bool {
        self.restarting.load(Ordering::Acquire)
    }

    /// Returns `None` when a restart is already in flight.
    pub(crate) fn try_acquire(self: &Arc<Self>) -> Option<RestartTicket> {
        self.restarting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RestartTicket {
                guard: Arc::clone(self),
            })
    }
}

/// Held for the duration of a restart cycle; releases the guard on drop.
#[derive(Debug)]
pub(crate) struct RestartTicket {
    guard: Arc<RestartGuard>,
}

impl Drop for RestartTicket {
    fn drop(&mut self) {
        self.guard.restarting.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub(crate) struct ClientEntry {
    pub(crate) name: String,
    pub(crate) client: Arc<dyn McpClientHandle>,
    pub(crate) extension_name: String,
    pub(crate) guard: Arc<RestartGuard>,
    pub(crate) last_healthy: Instant,
}

impl std::fmt::Debug for ClientEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEntry")
            .field("name", &self.name)
            .field("extension_name", &self.extension_name)
            .field("restarting", &self.guard.is_restarting())
            .field("status", &self.client.status())
            .finish_non_exhaustive()
    }
}

/// Server name to client mapping, in registration order.
#[derive(Debug, Default)]
pub(crate) struct ClientRegistry {
    entries: RwLock<Vec<ClientEntry>>,
}

impl ClientRegistry {
    fn read(&self) -> RwLockReadGuard<'_, Vec<ClientEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ClientEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `client` under `name`, returning the client it replaced.
    ///
    /// A replaced entry keeps its position and restart guard.
    pub(crate) fn insert(
        &self,
        name: &str,
        client: Arc<dyn McpClientHandle>,
        extension_name: &str,
    ) -> Option<Arc<dyn McpClientHandle>> {
        let mut entries = self.write();
        if let Some(entry) = entries.iter_mut().find(|e| e.name == name) {
            entry.extension_name = extension_name.to_owned();
            entry.last_healthy = Instant::now();
            return Some(std::mem::replace(&mut entry.client, client));
        }
        entries.push(ClientEntry {
            name: name.to_owned(),
            client,
            extension_name: extension_name.to_owned(),
            guard: Arc::new(RestartGuard::default()),
            last_healthy: Instant::now(),
        });
        None
    }

    /// Swap in `client` for `name`, but only while the entry registered there
    /// is still the one protected by `guard`.
    ///
    /// Returns `false` when the entry was removed (or removed and registered
    /// again) since the guard was taken.
    pub(crate) fn replace_guarded(
        &self,
        name: &str,
        guard: &Arc<RestartGuard>,
        client: Arc<dyn McpClientHandle>,
    ) -> bool {
        let mut entries = self.write();
        let Some(entry) = entries
            .iter_mut()
            .find(|e| e.name == name && Arc::ptr_eq(&e.guard, guard))
        else {
            return false;
        };
        entry.client = client;
        entry.last_healthy = Instant::now();
        true
    }

    /// Whether `client` is the one currently registered under `name`.
    pub(crate) fn is_current(&self, name: &str, client: &Arc<dyn McpClientHandle>) -> bool {
        self.read()
            .iter()
            .any(|e| e.name == name && Arc::ptr_eq(&e.client, client))
    }

    pub(crate) fn get(&self, name: &str) -> Option<ClientEntry> {
        self.read().iter().find(|e| e.name == name).cloned()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.read().iter().any(|e| e.name == name)
    }

    pub(crate) fn entries(&self) -> Vec<ClientEntry> {
        self.read().clone()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.read().iter().map(|e| e.name.clone()).collect()
    }

    pub(crate) fn mark_healthy(&self, name: &str, at: Instant) {
        if let Some(entry) = self.write().iter_mut().find(|e| e.name == name) {
            entry.last_healthy = at;
        }
    }

    pub(crate) fn remove_extension(&self, extension_name: &str) -> Vec<ClientEntry> {
        let mut entries = self.write();
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *entries)
            .into_iter()
            .partition(|e| e.extension_name == extension_name);
        *entries = kept;
        removed
    }

    pub(crate) fn drain(&self) -> Vec<ClientEntry> {
        std::mem::take(&mut *self.write())
    }

    pub(crate) fn len(&self) -> usize {
        self.read().len()
    }
}
