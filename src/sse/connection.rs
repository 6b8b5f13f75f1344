use crate::sse::models::{ChannelHandle, ChannelReceiver, ConnectionId, ConnectionState};
use crate::sse::registry::Registry;
use tracing::{info, warn};

/// Lifecycle owner of one viewer stream.
///
/// Dropping it deregisters the handle, whichever way the stream ended.
pub struct LiveConnection {
    id: Option<ConnectionId>,
    registry: Registry,
    state: ConnectionState,
}

impl LiveConnection {
    pub fn accept(registry: Registry) -> Self {
        LiveConnection {
            id: None,
            registry,
            state: ConnectionState::Connecting,
        }
    }

    /// Registers a new handle and moves to `Open`. Returns `None`, and moves straight to
    /// `Closed`, when the registry is shutting down.
    pub fn open(&mut self, capacity: usize) -> Option<(ChannelHandle, ChannelReceiver)> {
        debug_assert_eq!(self.state, ConnectionState::Connecting);

        let (handle, rx) = ChannelHandle::new(capacity);
        if !self.registry.add(handle.clone()) {
            warn!(connection = %handle.id(), "registry closed, refusing viewer");
            self.state = ConnectionState::Closed;
            return None;
        }
        self.id = Some(handle.id());
        self.state = ConnectionState::Open;

        info!(connection = %handle.id(), connections = self.registry.size(), "viewer connected");
        Some((handle, rx))
    }

    #[cfg(test)]
    pub fn id(&self) -> Option<ConnectionId> {
        self.id
    }

    #[cfg(test)]
    pub fn state(&self) -> ConnectionState {
        self.state
    }
}

impl Drop for LiveConnection {
    fn drop(&mut self) {
        if let Some(id) = self.id {
            self.registry.remove(id);
            info!(connection = %id, connections = self.registry.size(), "viewer disconnected");
        }
        self.state = ConnectionState::Closed;
    }
}
