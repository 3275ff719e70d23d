//! The session reader, writer, and lifecycle — the heart of the
//! library.
//!
//! Grounded on `flux-network`'s `TcpStream`/`TcpConnector`
//! (`examples/gattaca-com-flux/crates/flux-network/src/tcp/{stream,connector}.rs`):
//! the edge-triggered read loop (`read` until `WouldBlock`), the
//! arm/disarm-on-writable-interest dance around a backlog FIFO, and the
//! disconnect signal that tears the connection down are all in that idiom,
//! generalized from its fixed 4-byte-length-prefixed frame to
//! arbitrary exact-byte-count reads, and from its synchronous
//! externally-polled `TcpConnector` to a self-contained reactor thread
//! (`crate::worker`).

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    net::SocketAddr,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use mio::{Interest, Registry, Token};
use parking_lot::Mutex;
use tracing::warn;

use crate::{
    cipher::CipherAdapter,
    error::{ConnectError, DisconnectReason},
    listener::ListenerSet,
    packet::Packet,
    pool::{self, Buffer},
    reader::{Predicate, PushOutcome, ReadOrder, ReadState},
    worker::{EventTarget, Worker, WorkerPool},
};

type ConnectListener = dyn Fn(&Session) + Send + Sync;
type PreDisconnectListener = dyn Fn(&Session) + Send + Sync;
type PostDisconnectListener = dyn Fn(&Session, &DisconnectReason) + Send + Sync;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

fn next_token() -> Token {
    Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed) as usize)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Connected,
    Closed,
}

struct IoHandle {
    socket: Mutex<mio::net::TcpStream>,
    registry: Registry,
    token: Token,
}

struct WriteState {
    outbound: VecDeque<Packet>,
    /// Serialized buffers awaiting the kernel, in submission order: the
    /// "to-flush" FIFO collapsed with the in-flight buffer, so the front
    /// entry is the one partially written, if any. Each entry tracks how
    /// many of its bytes have already been written.
    ready: VecDeque<(Buffer, usize)>,
    /// True once the kernel has refused to take a full buffer (`WouldBlock`
    /// or a short write) and WRITABLE interest has been armed to find out
    /// when it can take more.
    in_flight: bool,
}

impl WriteState {
    fn new() -> Self {
        Self { outbound: VecDeque::new(), ready: VecDeque::new(), in_flight: false }
    }
}

/// An owned TCP endpoint: a fixed-size read buffer and
/// request queue (`read`), an outbound packet FIFO and serialized-buffer
/// FIFO (`write`), optional cipher adapters, and the three listener
/// collections. Cheap to clone: a `Session` is a thin handle around a
/// shared, reference-counted inner state, the way a socket handle is
/// cheaply shared between the thread that drives it and the application
/// code that calls into it.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    cap: usize,
    /// Lets a method that only has `&SessionInner` (the `EventTarget` the
    /// worker thread calls into) hand itself back out as a `Session`, to
    /// run connect/listener callbacks that take one. Set once, immediately
    /// after the surrounding `Arc` is created.
    self_weak: Mutex<Weak<SessionInner>>,
    peer_addr: Mutex<Option<SocketAddr>>,
    phase: Mutex<Phase>,
    closing: AtomicBool,
    io: Mutex<Option<IoHandle>>,
    /// Set only for a session created via [`Session::connect`], which owns
    /// a dedicated single-worker pool for the lifetime of the connection,
    /// driving its callbacks. `None` for an acceptor-created session, which
    /// shares the acceptor's pool instead.
    owned_pool: Mutex<Option<WorkerPool>>,

    read: Mutex<ReadState>,
    decrypt: Mutex<Option<CipherAdapter>>,

    write: Mutex<WriteState>,
    encrypt: Mutex<Option<CipherAdapter>>,

    /// Set by a predicate's decrypt wrapper when a cipher adapter fails;
    /// drained and acted on once the read lock held by the dispatch loop
    /// that invoked the predicate is released, to avoid closing the
    /// session (which re-acquires that same lock) while it is still held.
    pending_failure: Mutex<Option<DisconnectReason>>,

    on_connect: ListenerSet<ConnectListener>,
    on_pre_disconnect: ListenerSet<PreDisconnectListener>,
    on_post_disconnect: ListenerSet<PostDisconnectListener>,
}

impl Session {
    /// Default read/write buffer capacity: 8 KiB.
    pub const DEFAULT_CAPACITY: usize = 8192;

    /// Creates an idle session with no socket. Register listeners and call
    /// [`Session::connect`] to establish the connection; a session produced
    /// by [`crate::acceptor::Acceptor`] is already connected and does not
    /// go through this constructor.
    pub fn new(capacity: usize) -> Session {
        let inner = Arc::new(SessionInner {
            cap: capacity,
            self_weak: Mutex::new(Weak::new()),
            peer_addr: Mutex::new(None),
            phase: Mutex::new(Phase::Idle),
            closing: AtomicBool::new(false),
            io: Mutex::new(None),
            owned_pool: Mutex::new(None),
            read: Mutex::new(ReadState::new(capacity)),
            decrypt: Mutex::new(None),
            write: Mutex::new(WriteState::new()),
            encrypt: Mutex::new(None),
            pending_failure: Mutex::new(None),
            on_connect: ListenerSet::new(),
            on_pre_disconnect: ListenerSet::new(),
            on_post_disconnect: ListenerSet::new(),
        });
        *inner.self_weak.lock() = Arc::downgrade(&inner);
        Session { inner }
    }

    pub(crate) fn from_accepted(
        mut stream: mio::net::TcpStream,
        peer_addr: SocketAddr,
        capacity: usize,
        worker: &Worker,
    ) -> io::Result<Session> {
        stream.set_nodelay(true)?;
        crate::sockopt::set_socket_buf_size(&stream, capacity);
        crate::sockopt::set_keepalive(&stream, false);
        let token = next_token();
        worker.registry().register(&mut stream, token, Interest::READABLE)?;
        let registry = worker.registry().try_clone()?;

        let inner = Arc::new(SessionInner {
            cap: capacity,
            self_weak: Mutex::new(Weak::new()),
            peer_addr: Mutex::new(Some(peer_addr)),
            phase: Mutex::new(Phase::Connected),
            closing: AtomicBool::new(false),
            io: Mutex::new(Some(IoHandle { socket: Mutex::new(stream), registry, token })),
            owned_pool: Mutex::new(None),
            read: Mutex::new(ReadState::new(capacity)),
            decrypt: Mutex::new(None),
            write: Mutex::new(WriteState::new()),
            encrypt: Mutex::new(None),
            pending_failure: Mutex::new(None),
            on_connect: ListenerSet::new(),
            on_pre_disconnect: ListenerSet::new(),
            on_post_disconnect: ListenerSet::new(),
        });
        *inner.self_weak.lock() = Arc::downgrade(&inner);
        let session = Session { inner };
        worker.attach(token, session.inner.clone());

        for cb in session.inner.on_connect.snapshot() {
            cb(&session);
        }
        session.poll_read();
        Ok(session)
    }

    pub fn on_connect(&self, cb: impl Fn(&Session) + Send + Sync + 'static) {
        self.inner.on_connect.register(Arc::new(cb));
    }

    pub fn on_pre_disconnect(&self, cb: impl Fn(&Session) + Send + Sync + 'static) {
        self.inner.on_pre_disconnect.register(Arc::new(cb));
    }

    pub fn on_post_disconnect(&self, cb: impl Fn(&Session, &DisconnectReason) + Send + Sync + 'static) {
        self.inner.on_post_disconnect.register(Arc::new(cb));
    }

    /// Token identity, used by [`crate::acceptor::Acceptor`] to key its
    /// connected-sessions map. Only meaningful once connected.
    pub(crate) fn token(&self) -> Token {
        self.inner.io.lock().as_ref().map(|h| h.token).unwrap_or(Token(usize::MAX))
    }

    /// Identity comparison, not equality: two `Session` handles refer to the
    /// same connection iff they share the same underlying `Arc`.
    pub fn is_same_connection(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Initiates an outbound connection. Returns as soon as the
    /// synchronous pre-flight checks pass; the handshake itself runs on a
    /// helper thread so a slow or unreachable peer never blocks the caller.
    /// On success, connect listeners fire on the session's own worker
    /// thread, same as for every other completion event. On timeout,
    /// `on_timeout` runs (on the helper thread) before the session closes.
    pub fn connect(
        &self,
        addr: SocketAddr,
        timeout: Duration,
        on_timeout: impl FnOnce() + Send + 'static,
    ) -> Result<(), ConnectError> {
        if addr.port() == 0 {
            return Err(ConnectError::InvalidArgument);
        }
        {
            let mut phase = self.inner.phase.lock();
            if *phase != Phase::Idle {
                return Err(ConnectError::AlreadyConnected);
            }
            *phase = Phase::Connecting;
        }

        let session = self.clone();
        thread::Builder::new()
            .name("packetline-connect".into())
            .spawn(move || match std::net::TcpStream::connect_timeout(&addr, timeout) {
                Ok(std_stream) => session.finish_connect(std_stream, addr),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                    on_timeout();
                    session.fail_before_connected(DisconnectReason::ConnectTimeout);
                }
                Err(e) => session.fail_before_connected(DisconnectReason::Io(e)),
            })
            .expect("failed to spawn connect thread");
        Ok(())
    }

    fn finish_connect(&self, std_stream: std::net::TcpStream, addr: SocketAddr) {
        if let Err(e) = std_stream.set_nonblocking(true) {
            return self.fail_before_connected(DisconnectReason::Io(e));
        }
        if let Err(e) = std_stream.set_nodelay(true) {
            return self.fail_before_connected(DisconnectReason::Io(e));
        }
        let mut mio_stream = mio::net::TcpStream::from_std(std_stream);
        crate::sockopt::set_socket_buf_size(&mio_stream, self.inner.cap);
        crate::sockopt::set_keepalive(&mio_stream, false);

        let pool = match WorkerPool::new(1, "packetline-initiator") {
            Ok(p) => p,
            Err(e) => return self.fail_before_connected(DisconnectReason::Io(e)),
        };
        let worker = pool.next_worker();
        let token = next_token();
        if let Err(e) = worker.registry().register(&mut mio_stream, token, Interest::READABLE) {
            return self.fail_before_connected(DisconnectReason::Io(e));
        }
        let registry = match worker.registry().try_clone() {
            Ok(r) => r,
            Err(e) => return self.fail_before_connected(DisconnectReason::Io(e)),
        };

        *self.inner.peer_addr.lock() = Some(addr);
        *self.inner.io.lock() = Some(IoHandle { socket: Mutex::new(mio_stream), registry, token });
        worker.attach(token, self.inner.clone());
        *self.inner.phase.lock() = Phase::Connected;
        *self.inner.owned_pool.lock() = Some(pool);

        for cb in self.inner.on_connect.snapshot() {
            cb(self);
        }
        self.poll_read();
    }

    /// A connect attempt failed before a session ever came into being on a
    /// worker: there is no read/write state to unwind, only the listeners
    /// the caller may have registered on this still-idle handle.
    fn fail_before_connected(&self, reason: DisconnectReason) {
        *self.inner.phase.lock() = Phase::Closed;
        for cb in self.inner.on_post_disconnect.snapshot() {
            cb(self, &reason);
        }
    }

    pub fn set_encrypt(&self, adapter: CipherAdapter) {
        *self.inner.encrypt.lock() = Some(adapter);
    }

    pub fn set_decrypt(&self, adapter: CipherAdapter) {
        *self.inner.decrypt.lock() = Some(adapter);
    }

    /// Registers a read request. `predicate` is
    /// invoked with exactly `n` decrypted bytes; returning `true` keeps it
    /// at the head to receive the next `n` bytes, `false` removes it.
    pub fn read_until(
        &self,
        n: usize,
        mut predicate: impl FnMut(&[u8]) -> bool + Send + 'static,
        order: ReadOrder,
    ) {
        assert!(n >= 1, "read_until: n must be at least 1");
        let requested = n;
        let rounded = {
            let decrypt = self.inner.decrypt.lock();
            decrypt.as_ref().map_or(n, |a| a.rounded_len(n))
        };

        let mut read = self.inner.read.lock();

        if read.in_callback() {
            // Pushed from inside a running predicate.
            let wrapped = wrap_predicate(self.clone(), requested, predicate);
            read.push(rounded, wrapped, order);
            return;
        }

        // Fast path: while enough decrypted bytes are already buffered and
        // nothing else is queued, deliver synchronously without ever
        // touching the kernel or the request queue.
        while read.queue_and_nested_empty() && read.unread() >= rounded {
            let slice = read.peek_slice(rounded).to_vec();
            read.advance(rounded);
            drop(read);
            let decrypted = match self.decrypt_and_truncate(&slice, requested) {
                Some(d) => d,
                None => {
                    self.act_on_pending_failure();
                    return;
                }
            };
            let keep = predicate(&decrypted);
            if !keep {
                return;
            }
            read = self.inner.read.lock();
        }

        let wrapped = wrap_predicate(self.clone(), requested, predicate);
        let outcome = read.push(rounded, wrapped, order);
        drop(read);
        if matches!(outcome, PushOutcome::NeedsKernelRead) {
            self.poll_read();
        }
    }

    fn decrypt_and_truncate(&self, raw: &[u8], requested: usize) -> Option<Vec<u8>> {
        let mut decrypt = self.inner.decrypt.lock();
        match decrypt.as_mut() {
            Some(adapter) => match adapter.apply(raw) {
                Ok(mut plain) => {
                    plain.truncate(requested);
                    Some(plain)
                }
                Err(err) => {
                    *self.inner.pending_failure.lock() = Some(DisconnectReason::Cipher(err));
                    None
                }
            },
            None => Some(raw.to_vec()),
        }
    }

    fn act_on_pending_failure(&self) {
        if let Some(reason) = self.inner.pending_failure.lock().take() {
            self.close_with_reason(reason);
        }
    }

    /// Drives at most one round of kernel reads: never blocks, and
    /// `read_until` itself always returns after at most one fast-path
    /// delivery. This is the kernel-completion half, entered either from
    /// `read_until`'s "initiate a kernel read" step or from a
    /// readable-readiness event. Loops `read()` until `WouldBlock`,
    /// dispatching to the request queue after every successful read,
    /// mirroring `flux-network`'s `TcpStream::read_frame` loop.
    fn poll_read(&self) {
        loop {
            let got_bytes = {
                let mut read = self.inner.read.lock();
                read.read_in_flight = true;
                let target = read.kernel_read_target();
                if target.is_empty() {
                    // Buffer is full and nothing has been dispatched out of
                    // it yet; wait for the next dispatch to make room.
                    false
                } else {
                    match self.inner.with_socket(|sock| sock.read(target)) {
                        None => {
                            read.read_in_flight = false;
                            return;
                        }
                        Some(Ok(0)) => {
                            drop(read);
                            self.close_with_reason(DisconnectReason::EndOfStream);
                            return;
                        }
                        Some(Ok(n)) => {
                            read.on_kernel_delivered(n);
                            true
                        }
                        Some(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                            read.read_in_flight = false;
                            false
                        }
                        Some(Err(e)) => {
                            drop(read);
                            self.close_with_reason(DisconnectReason::Io(e));
                            return;
                        }
                    }
                }
            };

            if !got_bytes {
                return;
            }
            self.dispatch();
            if self.inner.read.lock().queue_is_empty() {
                self.inner.read.lock().read_in_flight = false;
                return;
            }
        }
    }

    /// Runs the dispatch burst following a kernel read completion: while
    /// the queue head is satisfiable from buffered bytes, slice it out,
    /// decrypt, invoke the predicate with the read lock released (so a
    /// predicate may itself call `read_until` without deadlocking), then
    /// requeue/drain the nested stack.
    ///
    /// A panic inside a predicate is caught, logged, and closes only this
    /// session — it must not corrupt the shared buffer, queue, nested
    /// stack, or `in_callback` flag, and must never infect peer sessions;
    /// it is never allowed to unwind onto the shared worker thread that may
    /// be driving other sessions.
    fn dispatch(&self) {
        let mut read = self.inner.read.lock();
        read.begin_dispatch();
        let mut panicked = false;
        loop {
            match read.queue_front_n() {
                Some(n) if n <= read.unread() => {
                    let (n, bytes, mut predicate) = read.take_front().expect("front checked above");
                    drop(read);
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| predicate(&bytes)));
                    read = self.inner.read.lock();
                    match outcome {
                        Ok(keep) => read.finish_front(n, predicate, keep),
                        Err(_) => {
                            tracing::error!("read_until predicate panicked; closing session");
                            read.finish_front(n, predicate, false);
                            panicked = true;
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
        read.end_dispatch();
        drop(read);
        if panicked {
            self.close_with_reason(DisconnectReason::Io(io::Error::other("read_until predicate panicked")));
        }
    }

    /// Enqueues `packet` for sending without writing yet.
    pub fn queue(&self, packet: Packet) {
        self.inner.write.lock().outbound.push_back(packet);
    }

    pub fn queue_and_flush(&self, packet: Packet) {
        self.queue(packet);
        self.flush();
    }

    /// Drains the outbound packet FIFO into kernel-sized writes. Never
    /// blocks; submits ready buffers to the kernel until one is refused,
    /// with any remainder queued for the writable-readiness event.
    pub fn flush(&self) {
        let reason = {
            let mut write = self.inner.write.lock();
            self.accumulate(&mut write).or_else(|| self.pump(&mut write))
        };
        if let Some(reason) = reason {
            self.close_with_reason(reason);
        }
    }

    /// Batches queued packets into kernel-sized ciphertext/plaintext
    /// buffers. Returns the reason to close the session on an unrecoverable
    /// failure (a cipher rejecting a buffer); the caller must drop its
    /// `write` guard before acting on it, since closing re-locks `write`.
    fn accumulate(&self, write: &mut WriteState) -> Option<DisconnectReason> {
        while let Some(front) = write.outbound.front() {
            let mut acc = 0usize;
            let mut batch = Vec::new();
            loop {
                let Some(next) = write.outbound.front() else { break };
                if acc > 0 && acc + next.size() > self.inner.cap {
                    break;
                }
                let packet = write.outbound.pop_front().expect("front checked above");
                acc += packet.size();
                let solo_oversized = batch.is_empty() && acc > self.inner.cap;
                batch.push(packet);
                if solo_oversized {
                    break;
                }
            }
            if batch.is_empty() {
                debug_assert!(front.size() == 0, "non-empty packet failed to batch");
                write.outbound.pop_front();
                continue;
            }

            let mut raw = Vec::with_capacity(acc);
            for packet in &batch {
                packet.emit_into(&mut raw);
            }
            debug_assert_eq!(raw.len(), acc);

            let payload = match self.inner.encrypt.lock().as_mut() {
                Some(adapter) => match adapter.apply(&raw) {
                    Ok(encrypted) => encrypted,
                    Err(err) => {
                        self.discard_writes(write);
                        return Some(DisconnectReason::Cipher(err));
                    }
                },
                None => raw,
            };

            let mut buffer = pool::take(payload.len());
            buffer.as_mut_slice().copy_from_slice(&payload);
            write.ready.push_back((buffer, 0));
        }
        None
    }

    fn discard_writes(&self, write: &mut WriteState) {
        write.outbound.clear();
        while let Some((buf, _)) = write.ready.pop_front() {
            pool::give(buf);
        }
        if write.in_flight {
            write.in_flight = false;
            self.set_writable_interest(false);
        }
    }

    /// Submits ready buffers to the kernel until the front would block, is
    /// only partially written, or the FIFO is empty. The kernel-write-
    /// completion loop, entered both from `flush` and from a
    /// writable-readiness event.
    ///
    /// Returns the reason to close the session on an unrecoverable I/O
    /// failure; the caller must drop its `write` guard before acting on it,
    /// since closing re-locks `write`.
    fn pump(&self, write: &mut WriteState) -> Option<DisconnectReason> {
        loop {
            if write.ready.is_empty() {
                if write.in_flight {
                    write.in_flight = false;
                    self.set_writable_interest(false);
                }
                return None;
            }
            let offset = write.ready[0].1;
            let result = {
                let buf = &write.ready[0].0;
                self.inner.with_socket(|sock| sock.write(&buf.as_slice()[offset..]))
            };
            match result {
                None => return None,
                Some(Ok(0)) => {
                    self.discard_writes(write);
                    return Some(DisconnectReason::Io(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "peer closed while writing",
                    )));
                }
                Some(Ok(n)) => {
                    let buf_len = write.ready[0].0.len();
                    if offset + n >= buf_len {
                        let (buf, _) = write.ready.pop_front().expect("front checked above");
                        pool::give(buf);
                        // loop: try the next buffer immediately, still
                        // within this one `pump` call, until the outbound
                        // FIFO is empty.
                    } else {
                        write.ready[0].1 = offset + n;
                        if !write.in_flight {
                            write.in_flight = true;
                            self.set_writable_interest(true);
                        }
                        return None;
                    }
                }
                Some(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !write.in_flight {
                        write.in_flight = true;
                        self.set_writable_interest(true);
                    }
                    return None;
                }
                Some(Err(e)) => {
                    self.discard_writes(write);
                    return Some(DisconnectReason::Io(e));
                }
            }
        }
    }

    fn set_writable_interest(&self, enabled: bool) {
        let guard = self.inner.io.lock();
        let Some(io) = guard.as_ref() else { return };
        let mut sock = io.socket.lock();
        let interest = if enabled { Interest::READABLE | Interest::WRITABLE } else { Interest::READABLE };
        if let Err(e) = io.registry.reregister(&mut *sock, io.token, interest) {
            warn!(?e, "session: failed to reregister socket interest");
        }
    }

    /// Orderly close. Idempotent: a second call returns immediately.
    pub fn close(&self) {
        self.close_with_reason(DisconnectReason::ClosedByUser);
    }

    fn close_with_reason(&self, reason: DisconnectReason) {
        if self.inner.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        for cb in self.inner.on_pre_disconnect.snapshot() {
            cb(self);
        }
        self.flush();
        while self.inner.write.lock().in_flight {
            thread::yield_now();
        }
        if let Some(io) = self.inner.io.lock().take() {
            let mut sock = io.socket.lock();
            let _ = io.registry.deregister(&mut *sock);
            let _ = sock.shutdown(std::net::Shutdown::Both);
        }
        self.inner.read.lock().clear();
        {
            let mut write = self.inner.write.lock();
            write.outbound.clear();
            while let Some((buf, _)) = write.ready.pop_front() {
                pool::give(buf);
            }
        }
        *self.inner.phase.lock() = Phase::Closed;
        for cb in self.inner.on_post_disconnect.snapshot() {
            cb(self, &reason);
        }
        // Dropping `owned_pool` joins its worker thread. If `close()` was
        // invoked from *within* a callback running on that very thread
        // (legal: listeners run inline on the dispatch thread), joining here
        // would deadlock the thread against itself, so the drop happens on a
        // throwaway thread instead.
        if let Some(pool) = self.inner.owned_pool.lock().take() {
            let _ = thread::Builder::new().name("packetline-teardown".into()).spawn(move || drop(pool));
        }
    }
}

impl SessionInner {
    fn with_socket<T>(&self, f: impl FnOnce(&mut mio::net::TcpStream) -> T) -> Option<T> {
        let io = self.io.lock();
        let io = io.as_ref()?;
        let mut sock = io.socket.lock();
        Some(f(&mut sock))
    }

    fn handle(&self) -> Option<Session> {
        self.self_weak.lock().upgrade().map(|inner| Session { inner })
    }
}

fn wrap_predicate(
    session: Session,
    requested: usize,
    mut user_predicate: impl FnMut(&[u8]) -> bool + Send + 'static,
) -> Predicate {
    Box::new(move |raw: &[u8]| match session.decrypt_and_truncate(raw, requested) {
        Some(decrypted) => user_predicate(&decrypted),
        None => {
            session.act_on_pending_failure();
            false
        }
    })
}

impl EventTarget for SessionInner {
    fn on_event(&self, readable: bool, writable: bool) {
        let Some(session) = self.handle() else { return };
        if writable {
            let reason = {
                let mut write = session.inner.write.lock();
                session.pump(&mut write)
            };
            if let Some(reason) = reason {
                session.close_with_reason(reason);
            }
        }
        if readable {
            session.poll_read();
        }
    }
}
