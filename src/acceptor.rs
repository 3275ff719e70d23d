//! Acceptor.
//!
//! Binds a local endpoint, produces a [`Session`] per accepted peer, and
//! offers broadcast helpers over the "connected sessions" set. Grounded on
//! `flux-network`'s `ConnectionManager::listen_at` / `handle_event`'s
//! `Listener` arm (`examples/gattaca-com-flux/crates/flux-network/src/tcp/
//! connector.rs`): register the listener for readable events, and on each
//! readiness event `accept()` in a loop until `WouldBlock`, handing every
//! accepted socket off as a new connection. Generalized from
//! `flux-network`'s externally-polled `mio::Poll` to the self-driving
//! [`WorkerPool`]: the
//! listener is just another [`EventTarget`] attached to one of the pool's
//! workers, so accepting a connection costs nothing beyond ordinary event
//! dispatch — no dedicated accept thread or busy loop.
//!
//! The acceptor owns the "connected" set; a session holds no back-pointer to
//! its acceptor, avoiding a cyclic reference. Removal happens through a
//! post-disconnect listener registered at accept time, so a session that
//! disconnects on its own removes itself without the acceptor polling for
//! liveness.

use std::{collections::HashMap, io, net::SocketAddr, sync::Arc};

use dashmap::DashSet;
use mio::{Interest, Token};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::{
    error::BindError,
    listener::ListenerSet,
    packet::Packet,
    session::Session,
    worker::{EventTarget, WorkerPool},
};

type ConnectListener = dyn Fn(&Session) + Send + Sync;

/// Identity key for the "connected sessions" set: the `mio::Token` assigned
/// to a session at accept time. Distinct sessions never share a token
/// (`crate::session` hands them out from a single monotonic counter), so
/// token identity stands in for session identity in the connected-set map;
/// broadcast exclusion itself compares `Session` handles directly by `Arc`
/// identity, not equality.
type SessionKey = Token;

struct AcceptorInner {
    connected: DashSet<SessionKey>,
    sessions: Mutex<HashMap<SessionKey, Session>>,
    on_connect: ListenerSet<ConnectListener>,
    pool: WorkerPool,
    capacity: usize,
}

/// A listening endpoint that produces sessions.
#[derive(Clone)]
pub struct Acceptor {
    inner: Arc<AcceptorInner>,
}

struct ListenerTarget {
    listener: Mutex<mio::net::TcpListener>,
    acceptor: Acceptor,
}

impl Acceptor {
    /// Binds `addr` and starts accepting connections. `worker_count = 0`
    /// selects the default worker count, `max(1, cpus - 2)`.
    ///
    /// Each accepted socket gets `TCP_NODELAY = true` and
    /// `SO_RCVBUF = SO_SNDBUF = capacity`, is added to the connected set,
    /// and fires `on_connect` listeners before the next `accept` is
    /// attempted.
    pub fn bind(addr: SocketAddr, capacity: usize, worker_count: usize) -> Result<Self, BindError> {
        if addr.port() == 0 {
            return Err(BindError::InvalidArgument);
        }
        let worker_count =
            if worker_count == 0 { WorkerPool::default_acceptor_workers() } else { worker_count };
        let pool = WorkerPool::new(worker_count, "packetline-acceptor").map_err(BindError::Io)?;

        let mut listener = mio::net::TcpListener::bind(addr).map_err(BindError::Io)?;
        let accept_worker = pool.next_worker();
        let listener_token = next_listener_token();
        accept_worker
            .registry()
            .register(&mut listener, listener_token, Interest::READABLE)
            .map_err(BindError::Io)?;

        let acceptor = Acceptor {
            inner: Arc::new(AcceptorInner {
                connected: DashSet::new(),
                sessions: Mutex::new(HashMap::new()),
                on_connect: ListenerSet::new(),
                pool,
                capacity,
            }),
        };

        accept_worker.attach(
            listener_token,
            Arc::new(ListenerTarget { listener: Mutex::new(listener), acceptor: acceptor.clone() }),
        );

        info!(?addr, "acceptor: bound");
        Ok(acceptor)
    }

    pub fn on_connect(&self, cb: impl Fn(&Session) + Send + Sync + 'static) {
        self.inner.on_connect.register(Arc::new(cb));
    }

    /// A snapshot of the sessions currently in the connected set: a session
    /// added or removed after this call returns is not reflected in it.
    pub fn connected_sessions(&self) -> Vec<Session> {
        self.inner.sessions.lock().values().cloned().collect()
    }

    /// Queues `packet` on every connected session except `excluded`.
    pub fn queue_to_all_except(&self, packet: &Packet, excluded: &[&Session]) {
        for session in self.connected_sessions() {
            if !is_excluded(&session, excluded) {
                session.queue(packet.clone());
            }
        }
    }

    pub fn flush_to_all_except(&self, excluded: &[&Session]) {
        for session in self.connected_sessions() {
            if !is_excluded(&session, excluded) {
                session.flush();
            }
        }
    }

    pub fn queue_and_flush_to_all_except(&self, packet: &Packet, excluded: &[&Session]) {
        for session in self.connected_sessions() {
            if !is_excluded(&session, excluded) {
                session.queue_and_flush(packet.clone());
            }
        }
    }

    fn accept_one(&self, stream: mio::net::TcpStream, peer_addr: SocketAddr) {
        let worker = self.inner.pool.next_worker();
        match Session::from_accepted(stream, peer_addr, self.inner.capacity, worker) {
            Ok(session) => {
                let token = session.token();
                self.inner.connected.insert(token);
                self.inner.sessions.lock().insert(token, session.clone());

                let acceptor_for_removal = self.clone();
                session.on_post_disconnect(move |session, _reason| {
                    let token = session.token();
                    acceptor_for_removal.inner.connected.remove(&token);
                    acceptor_for_removal.inner.sessions.lock().remove(&token);
                });

                for cb in self.inner.on_connect.snapshot() {
                    cb(&session);
                }
            }
            Err(e) => warn!(?e, "acceptor: failed to set up accepted connection"),
        }
    }
}

impl EventTarget for ListenerTarget {
    fn on_event(&self, readable: bool, _writable: bool) {
        if !readable {
            return;
        }
        loop {
            let accepted = self.listener.lock().accept();
            match accepted {
                Ok((stream, peer_addr)) => self.acceptor.accept_one(stream, peer_addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!(?e, "acceptor: accept failed");
                    break;
                }
            }
        }
    }
}

fn is_excluded(session: &Session, excluded: &[&Session]) -> bool {
    excluded.iter().any(|&other| session.is_same_connection(other))
}

static NEXT_LISTENER_TOKEN: std::sync::atomic::AtomicUsize =
    std::sync::atomic::AtomicUsize::new(usize::MAX / 2);

/// Listener tokens are drawn from a disjoint range above the session-token
/// counter (`crate::session`'s `NEXT_TOKEN` starts at 0) so the two can
/// never collide within one worker's target table.
fn next_listener_token() -> Token {
    Token(NEXT_LISTENER_TOKEN.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        net::{IpAddr, Ipv4Addr},
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    #[test]
    fn bind_rejects_port_zero() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        assert!(matches!(Acceptor::bind(addr, 4096, 1), Err(BindError::InvalidArgument)));
    }

    #[test]
    fn accepted_sessions_are_tracked_and_removed_on_disconnect() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 24_801);
        let acceptor = Acceptor::bind(addr, 4096, 1).unwrap();
        let connected = Arc::new(AtomicUsize::new(0));
        let counted = connected.clone();
        acceptor.on_connect(move |_s| {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        let client = std::net::TcpStream::connect(addr).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while connected.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(connected.load(Ordering::SeqCst), 1);
        assert_eq!(acceptor.connected_sessions().len(), 1);

        drop(client);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !acceptor.connected_sessions().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(acceptor.connected_sessions().is_empty());
    }
}
