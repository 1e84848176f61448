//! In-process provider state store
//!
//! The map lock is only held long enough to find or insert a provider's
//! entry. All mutation happens under that provider's own mutex through
//! [`ProviderStateStore::update`], which makes per-provider updates
//! linearizable without serializing unrelated providers.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use super::types::ProviderRuntimeState;
use crate::registry::ProviderId;

/// Shared reference to ProviderStateStore
pub type SharedProviderStateStore = Arc<ProviderStateStore>;

type Entry = Arc<Mutex<ProviderRuntimeState>>;

/// Per-provider runtime state, created lazily on first reference.
#[derive(Debug, Default)]
pub struct ProviderStateStore {
    providers: RwLock<HashMap<ProviderId, Entry>>,
}

// State is plain counters and timestamps; poisoned locks are recovered.
fn lock(entry: &Entry) -> MutexGuard<'_, ProviderRuntimeState> {
    entry.lock().unwrap_or_else(|e| e.into_inner())
}

impl ProviderStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> SharedProviderStateStore {
        Arc::new(self)
    }

    fn entry(&self, provider: &str) -> Entry {
        {
            let map = self.providers.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = map.get(provider) {
                return Arc::clone(entry);
            }
        }
        let mut map = self.providers.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(map.entry(provider.to_string()).or_default())
    }

    /// Run `f` against the provider's state while holding its lock.
    pub fn update<R>(&self, provider: &str, f: impl FnOnce(&mut ProviderRuntimeState) -> R) -> R {
        let entry = self.entry(provider);
        let mut state = lock(&entry);
        f(&mut state)
    }

    /// Copy of the provider's current state.
    pub fn snapshot(&self, provider: &str) -> ProviderRuntimeState {
        self.update(provider, |state| state.clone())
    }

    /// Copy of every provider referenced so far, ordered by id.
    pub fn snapshot_all(&self) -> BTreeMap<ProviderId, ProviderRuntimeState> {
        let entries: Vec<(ProviderId, Entry)> = {
            let map = self.providers.read().unwrap_or_else(|e| e.into_inner());
            map.iter()
                .map(|(id, entry)| (id.clone(), Arc::clone(entry)))
                .collect()
        };
        entries
            .into_iter()
            .map(|(id, entry)| {
                let state = lock(&entry).clone();
                (id, state)
            })
            .collect()
    }

    /// Clear one provider back to a fresh CLOSED state.
    pub fn reset(&self, provider: &str) {
        self.update(provider, |state| *state = ProviderRuntimeState::default());
        tracing::info!(provider, "Provider state reset");
    }

    pub fn reset_all(&self) {
        let entries: Vec<Entry> = {
            let map = self.providers.read().unwrap_or_else(|e| e.into_inner());
            map.values().cloned().collect()
        };
        for entry in entries {
            *lock(&entry) = ProviderRuntimeState::default();
        }
        tracing::info!("All provider state reset");
    }

    /// Number of providers referenced so far.
    pub fn len(&self) -> usize {
        self.providers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
