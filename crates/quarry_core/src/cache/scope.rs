//! Unit-of-work scopes and cache isolation.
//!
//! # Responsibility
//! - Define the scope boundary with its declared cache isolation level.
//! - Buffer scoped cache writes and merge or discard them on completion.
//! - Resolve which cache store a repository targets under a given scope.
//!
//! # Invariants
//! - Within one scope a write is visible to subsequent reads of that scope.
//! - Nothing a scoped cache buffers becomes globally visible before
//!   `complete()`.
//! - A rolled-back or dropped-incomplete scope leaves the global store
//!   untouched.

use crate::cache::store::{CacheAccess, CacheEntry, EntityCache, NullCache};
use log::debug;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// How a scope's cache operations target the global store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheIsolation {
    /// Operate on the global cache directly.
    Default,
    /// Buffer writes in a scope-local cache; merge on commit, drop on
    /// rollback.
    Scoped,
    /// Bypass caching entirely for the duration of the scope.
    None,
}

/// Completion hook registered by scope-local caches.
pub trait ScopeParticipant: Send + Sync {
    /// Applies buffered writes to the global store.
    fn commit(&self);

    /// Discards buffered writes.
    fn rollback(&self);
}

/// A unit-of-work boundary with commit/rollback semantics.
pub struct Scope {
    isolation: CacheIsolation,
    participants: Mutex<Vec<Arc<dyn ScopeParticipant>>>,
    finished: AtomicBool,
}

impl Scope {
    pub fn new(isolation: CacheIsolation) -> Self {
        Self {
            isolation,
            participants: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }
    }

    pub fn isolation(&self) -> CacheIsolation {
        self.isolation
    }

    pub(crate) fn register(&self, participant: Arc<dyn ScopeParticipant>) {
        self.participants
            .lock()
            .expect("scope mutex poisoned")
            .push(participant);
    }

    /// Commits the scope, merging buffered cache writes into the global
    /// store.
    pub fn complete(self) {
        let participants = self.take_participants();
        for participant in &participants {
            participant.commit();
        }
        self.finished.store(true, Ordering::SeqCst);
        debug!(
            "event=scope_complete module=cache status=ok participants={}",
            participants.len()
        );
    }

    /// Rolls the scope back, discarding buffered cache writes.
    pub fn rollback(self) {
        let participants = self.take_participants();
        for participant in &participants {
            participant.rollback();
        }
        self.finished.store(true, Ordering::SeqCst);
        debug!(
            "event=scope_rollback module=cache status=ok participants={}",
            participants.len()
        );
    }

    fn take_participants(&self) -> Vec<Arc<dyn ScopeParticipant>> {
        std::mem::take(&mut *self.participants.lock().expect("scope mutex poisoned"))
    }
}

impl Drop for Scope {
    // An incomplete scope rolls back.
    fn drop(&mut self) {
        if self.finished.load(Ordering::SeqCst) {
            return;
        }
        let participants = self.take_participants();
        if participants.is_empty() {
            return;
        }
        for participant in &participants {
            participant.rollback();
        }
        debug!(
            "event=scope_rollback module=cache status=implicit participants={}",
            participants.len()
        );
    }
}

enum ScopedSlot<E> {
    Set(CacheEntry<E>),
    Cleared,
}

struct ScopedState<E> {
    slots: HashMap<String, ScopedSlot<E>>,
    cleared_prefixes: Vec<String>,
}

/// Scope-local cache shadowing a global store.
///
/// Reads fall through to the global store unless the scope has a local
/// decision for the key (a buffered write or a clear tombstone).
pub struct ScopedCache<E> {
    global: Arc<EntityCache<E>>,
    state: Mutex<ScopedState<E>>,
}

impl<E> ScopedCache<E> {
    pub fn new(global: Arc<EntityCache<E>>) -> Self {
        Self {
            global,
            state: Mutex::new(ScopedState {
                slots: HashMap::new(),
                cleared_prefixes: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScopedState<E>> {
        self.state.lock().expect("scoped cache mutex poisoned")
    }
}

impl<E: Clone + Send> CacheAccess<E> for ScopedCache<E> {
    fn get(&self, key: &str) -> Option<CacheEntry<E>> {
        let state = self.lock();
        match state.slots.get(key) {
            Some(ScopedSlot::Set(entry)) => return Some(entry.clone()),
            Some(ScopedSlot::Cleared) => return None,
            None => {}
        }
        if state
            .cleared_prefixes
            .iter()
            .any(|prefix| key.starts_with(prefix))
        {
            return None;
        }
        self.global.get(key)
    }

    fn set(&self, key: &str, entry: CacheEntry<E>) {
        self.lock()
            .slots
            .insert(key.to_string(), ScopedSlot::Set(entry));
    }

    fn clear(&self, key: &str) {
        self.lock()
            .slots
            .insert(key.to_string(), ScopedSlot::Cleared);
    }

    fn clear_prefix(&self, prefix: &str) {
        let mut state = self.lock();
        for (key, slot) in state.slots.iter_mut() {
            if key.starts_with(prefix) {
                *slot = ScopedSlot::Cleared;
            }
        }
        state.cleared_prefixes.push(prefix.to_string());
    }

    fn hits_with_prefix(&self, prefix: &str) -> Vec<(String, E)> {
        let state = self.lock();
        let mut merged: BTreeMap<String, E> = BTreeMap::new();
        for (key, value) in self.global.hits_with_prefix(prefix) {
            if state.slots.contains_key(&key) {
                continue;
            }
            if state
                .cleared_prefixes
                .iter()
                .any(|cleared| key.starts_with(cleared))
            {
                continue;
            }
            merged.insert(key, value);
        }
        for (key, slot) in &state.slots {
            if !key.starts_with(prefix) {
                continue;
            }
            if let ScopedSlot::Set(CacheEntry::Hit(value)) = slot {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged.into_iter().collect()
    }
}

impl<E: Clone + Send + 'static> ScopeParticipant for ScopedCache<E> {
    fn commit(&self) {
        let mut state = self.lock();
        // Prefix tombstones first, so locally re-set keys survive the clear.
        for prefix in state.cleared_prefixes.drain(..) {
            self.global.clear_prefix(&prefix);
        }
        for (key, slot) in state.slots.drain() {
            match slot {
                ScopedSlot::Set(entry) => self.global.set(&key, entry),
                ScopedSlot::Cleared => self.global.clear(&key),
            }
        }
    }

    fn rollback(&self) {
        let mut state = self.lock();
        state.slots.clear();
        state.cleared_prefixes.clear();
    }
}

/// Resolves the cache store a repository should use under a scope.
pub struct CacheIsolationProvider;

impl CacheIsolationProvider {
    /// Matches the scope's declared isolation level exhaustively, once, at
    /// repository construction time.
    pub fn resolve<E>(scope: &Scope, global: Arc<EntityCache<E>>) -> Arc<dyn CacheAccess<E>>
    where
        E: Clone + Send + Sync + 'static,
    {
        match scope.isolation() {
            CacheIsolation::Default => global,
            CacheIsolation::Scoped => {
                let scoped = Arc::new(ScopedCache::new(global));
                scope.register(scoped.clone());
                scoped
            }
            CacheIsolation::None => Arc::new(NullCache),
        }
    }
}
