//! Append-only listener collections with snapshot iteration.
//!
//! Used for a session's on-connect / pre-disconnect / post-disconnect
//! collections. Registration only ever appends; firing takes a cheap `Arc`
//! clone of the current member list so callbacks can run without holding
//! the registration lock (a callback registering another listener of the
//! same kind must not deadlock).

use std::sync::Arc;

use parking_lot::Mutex;

pub(crate) struct ListenerSet<F: ?Sized> {
    members: Mutex<Vec<Arc<F>>>,
}

impl<F: ?Sized> ListenerSet<F> {
    pub fn new() -> Self {
        Self { members: Mutex::new(Vec::new()) }
    }

    /// Appends a listener. Registration order is preserved and is the order
    /// listeners are later invoked in.
    pub fn register(&self, listener: Arc<F>) {
        self.members.lock().push(listener);
    }

    /// A snapshot of the members registered at the time of the call.
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.members.lock().clone()
    }
}

impl<F: ?Sized> Default for ListenerSet<F> {
    fn default() -> Self {
        Self::new()
    }
}
