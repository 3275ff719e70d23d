//! Worker pool: the reactor threads that drive session I/O.
//!
//! Grounded on `flux-network`'s `TcpConnector`/`ConnectionManager`, which
//! owns one `mio::Poll`, an `Events` buffer, and a token -> connection table,
//! and dispatches each readiness event to the matching connection (see
//! `examples/gattaca-com-flux/crates/flux-network/src/tcp/connector.rs`).
//! That type is driven by an external caller invoking `poll_with` in its own
//! loop; here each `Worker` instead owns its OS thread and drives itself, so
//! that a bound acceptor (or a connecting initiator) is usable without the
//! embedding application running an event loop of its own. An acceptor owns
//! a pool of `max(1, cpus - 2)` such workers by default, each servicing any
//! number of sessions.
//!
//! A session is assigned to exactly one worker for its lifetime (round-robin
//! at connect/accept time): `mio::Poll::poll` must be driven from a single
//! thread, so once a session's socket is registered with a worker's
//! `Registry` every event for it arrives on that worker's thread. This
//! honors the weaker promise that no session is *pinned* ahead of time to a
//! dedicated thread of its own, without requiring events for one socket to
//! hop between OS threads (`DESIGN.md` has the full note).

use std::{
    collections::HashMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use mio::{Events, Poll, Registry, Token};
use tracing::{debug, warn};

/// Implemented by whatever a worker dispatches readiness events to
/// (`Session`'s inner type). Kept separate from `crate::session` so this
/// module has no upward dependency.
pub(crate) trait EventTarget: Send + Sync {
    fn on_event(&self, readable: bool, writable: bool);
}

enum Inbound {
    Attach { token: Token, target: Arc<dyn EventTarget> },
    Detach { token: Token },
    Shutdown,
}

/// One reactor thread: a `mio::Poll`, its `Registry` (cloneable, handed out
/// so callers can register sockets before attaching them), and the set of
/// targets currently assigned to it.
pub(crate) struct Worker {
    registry: Registry,
    inbox: mpsc::Sender<Inbound>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn spawn(name: String) -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let (tx, rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || worker_loop(poll, rx))
            .expect("failed to spawn worker thread");

        Ok(Self { registry, inbox: tx, handle: Some(handle) })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Begins dispatching readiness events for `token` to `target`. The
    /// caller must have already registered the corresponding source with
    /// `self.registry()`.
    pub fn attach(&self, token: Token, target: Arc<dyn EventTarget>) {
        let _ = self.inbox.send(Inbound::Attach { token, target });
    }

    pub fn detach(&self, token: Token) {
        let _ = self.inbox.send(Inbound::Detach { token });
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.inbox.send(Inbound::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop(mut poll: Poll, inbox: mpsc::Receiver<Inbound>) {
    let mut targets: HashMap<Token, Arc<dyn EventTarget>> = HashMap::new();
    let mut events = Events::with_capacity(256);

    'outer: loop {
        match poll.poll(&mut events, Some(Duration::from_millis(100))) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(?e, "worker: poll failed");
                break;
            }
        }

        for event in events.iter() {
            if let Some(target) = targets.get(&event.token()) {
                target.on_event(event.is_readable(), event.is_writable());
            }
        }

        loop {
            match inbox.try_recv() {
                Ok(Inbound::Attach { token, target }) => {
                    targets.insert(token, target);
                }
                Ok(Inbound::Detach { token }) => {
                    targets.remove(&token);
                }
                Ok(Inbound::Shutdown) => break 'outer,
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => break 'outer,
            }
        }
    }
    debug!("worker: shut down, {} targets abandoned", targets.len());
}

/// A set of workers plus a round-robin cursor, owned by an `Acceptor` (many
/// workers) or by a lone `connect()`ed `Session` (exactly one worker, for
/// that session's driver callbacks).
pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
    next: AtomicUsize,
}

impl WorkerPool {
    pub fn new(count: usize, name_prefix: &str) -> io::Result<Self> {
        let count = count.max(1);
        let workers = (0..count)
            .map(|i| Worker::spawn(format!("{name_prefix}-{i}")))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self { workers, next: AtomicUsize::new(0) })
    }

    /// The default worker count for an acceptor: `max(1, cpus - 2)`.
    pub fn default_acceptor_workers() -> usize {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1).saturating_sub(2).max(1)
    }

    /// Round-robin pick; sessions are assigned once at connect/accept time
    /// and stay with that worker for their lifetime (see module docs).
    pub fn next_worker(&self) -> &Worker {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        &self.workers[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct Flag(Arc<AtomicBool>);
    impl EventTarget for Flag {
        fn on_event(&self, _readable: bool, _writable: bool) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn round_robin_cycles_through_workers() {
        let pool = WorkerPool::new(3, "test").unwrap();
        let picks: Vec<usize> = (0..6)
            .map(|_| {
                let w = pool.next_worker() as *const Worker as usize;
                pool.workers.iter().position(|x| x as *const Worker as usize == w).unwrap()
            })
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn default_acceptor_workers_is_at_least_one() {
        assert!(WorkerPool::default_acceptor_workers() >= 1);
    }
}
