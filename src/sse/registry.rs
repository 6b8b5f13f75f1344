use crate::sse::models::{ChannelHandle, ConnectionId};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The set of currently open viewer streams.
///
/// Cheap to clone; every clone shares the same membership. All operations are short
/// in-memory bookkeeping and never fail.
#[derive(Clone, Default)]
pub struct Registry {
    handles: Arc<DashMap<ConnectionId, ChannelHandle>>,
    closed: Arc<AtomicBool>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handle. Returns `false` if it was already present or the registry has
    /// been closed.
    pub fn add(&self, handle: ChannelHandle) -> bool {
        if self.is_closed() {
            return false;
        }

        let id = handle.id();
        let mut inserted = false;
        self.handles.entry(id).or_insert_with(|| {
            inserted = true;
            handle
        });

        // close_all may have cleared the map between the check and the insert
        if inserted && self.is_closed() {
            self.handles.remove(&id);
            return false;
        }
        inserted
    }

    /// Deregisters a handle. Returns `false` if it was not present.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.handles.remove(&id).is_some()
    }

    #[cfg(test)]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Copies the current members out so callers never hold a shard lock while doing I/O.
    pub fn snapshot(&self) -> Vec<ChannelHandle> {
        self.handles.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Applies `f` once to every member of a snapshot taken at call time.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&ChannelHandle),
    {
        for handle in self.snapshot() {
            f(&handle);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Drops every handle, ending all open streams, and refuses later registrations.
    /// Used on shutdown.
    pub fn close_all(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let count = self.handles.len();
        self.handles.clear();
        count
    }
}
