use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::SessionHandle;

/// Identifier of a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tracks concurrently running sessions.
///
/// Sessions are independent of each other (own sink, own resolved pid);
/// the registry only provides lookup and bulk-stop over whatever is
/// currently alive.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a running session and returns its id.
    pub fn register(&self, handle: SessionHandle) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.sessions.insert(id, handle);
        id
    }

    /// Removes a session from the registry, handing back its handle.
    pub fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    /// Requests a stop on every registered session. Does not wait.
    pub fn request_stop_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().request_stop();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
