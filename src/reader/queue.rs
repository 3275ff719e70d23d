//! Read-request queue and the session's read-side buffer bookkeeping.
//!
//! This module owns the read-side data structures — the fixed read buffer,
//! the unread-byte count, the ordered request queue `Q`, and the nested
//! "push-during-callback" stack `S` — plus the primitives that keep their
//! invariants. It does not perform kernel I/O or invoke predicates: that
//! dispatch loop lives in `crate::session`, which is where decryption and
//! the predicate calls happen. Splitting it this way keeps this module a
//! pure buffer/queue manager.

use std::collections::VecDeque;

/// A predicate invoked with an exact-size slice. Returning `true` keeps it
/// at the queue head to receive the next `n` bytes (the "always" idiom);
/// returning `false` removes it.
pub type Predicate = Box<dyn FnMut(&[u8]) -> bool + Send>;

/// Controls whether a request issued while a predicate is running jumps the
/// queue (the default, nested-precedence idiom) or is appended to the tail
/// of `Q` like a request issued from outside a callback.
///
/// `Nested` reproduces the documented default behavior of nested reads
/// taking precedence; `Tail` is an escape hatch for a background/keepalive
/// read that should never preempt an already-queued application read. See
/// DESIGN.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOrder {
    Nested,
    Tail,
}

pub(crate) struct ReadRequest {
    pub n: usize,
    pub predicate: Predicate,
}

/// What the caller (the session reader) must do after a `push` call.
pub(crate) enum PushOutcome {
    /// Queued behind others, or onto the nested stack; nothing else to do.
    Queued,
    /// No read is in flight and the queue now has a head: the caller must
    /// initiate a kernel read.
    NeedsKernelRead,
    /// A read is already in flight; nothing else to do.
    ReadAlreadyInFlight,
}

/// The per-session read-side state: fixed buffer, unread-byte count,
/// request queue `Q`, nested stack `S`, and the `in_callback` /
/// `read_in_flight` flags.
pub(crate) struct ReadState {
    buf: Vec<u8>,
    cap: usize,
    /// Index of the first unread byte in `buf`.
    head: usize,
    /// Count of unread bytes starting at `head`.
    len: usize,
    queue: VecDeque<ReadRequest>,
    nested: Vec<ReadRequest>,
    in_callback: bool,
    pub read_in_flight: bool,
}

impl ReadState {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: vec![0u8; cap],
            cap,
            head: 0,
            len: 0,
            queue: VecDeque::new(),
            nested: Vec::new(),
            in_callback: false,
            read_in_flight: false,
        }
    }

    #[inline]
    pub fn in_callback(&self) -> bool {
        self.in_callback
    }

    #[inline]
    pub fn unread(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn queue_front_n(&self) -> Option<usize> {
        self.queue.front().map(|r| r.n)
    }

    #[inline]
    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Precondition for the synchronous fast path: while enough unread
    /// bytes are already buffered and both `Q` and `S` are empty.
    #[inline]
    pub fn queue_and_nested_empty(&self) -> bool {
        self.queue.is_empty() && self.nested.is_empty()
    }

    /// Borrows the next `n` unread bytes without consuming them. Only
    /// meaningful when `unread() >= n`.
    #[inline]
    pub fn peek_slice(&self, n: usize) -> &[u8] {
        &self.buf[self.head..self.head + n]
    }

    /// Consumes `n` bytes from the head (used by the fast path, which never
    /// touches `Q` while it stays empty).
    #[inline]
    pub fn advance(&mut self, n: usize) {
        self.head += n;
        self.len -= n;
    }

    /// Registers a new read request. The caller is responsible for cipher
    /// rounding, lock acquisition, and the synchronous fast path.
    pub fn push(&mut self, n: usize, predicate: Predicate, order: ReadOrder) -> PushOutcome {
        let request = ReadRequest { n, predicate };

        if self.in_callback && order == ReadOrder::Nested {
            // Pushed from inside a running predicate: goes on the nested
            // stack, drained onto the queue head (in issue order) once the
            // predicate returns. Never triggers a kernel read directly.
            self.nested.push(request);
            return PushOutcome::Queued;
        }

        // Ordinary top-level enqueue: always the tail, to preserve FIFO
        // enqueue order when other top-level reads are already pending.
        self.queue.push_back(request);
        if self.read_in_flight {
            PushOutcome::ReadAlreadyInFlight
        } else {
            PushOutcome::NeedsKernelRead
        }
    }

    /// Slot kernel bytes should be read into: everything past the current
    /// unread region. Compacts first if the unread region runs to the end
    /// of the buffer.
    pub fn kernel_read_target(&mut self) -> &mut [u8] {
        if self.head + self.len >= self.cap {
            self.compact();
        }
        &mut self.buf[self.head + self.len..]
    }

    /// Records that `delivered` bytes were appended by a completed kernel
    /// read.
    pub fn on_kernel_delivered(&mut self, delivered: usize) {
        self.len += delivered;
        debug_assert!(self.head + self.len <= self.cap);
    }

    /// Enters the dispatch burst following a kernel read completion.
    pub fn begin_dispatch(&mut self) {
        self.in_callback = true;
    }

    /// If the queue head's request is satisfiable by buffered bytes, slices
    /// those bytes out (copying them, since the predicate must run with the
    /// lock that guards this buffer released — see `crate::session`'s
    /// dispatch loop) and pops the request, returning its size and
    /// predicate. Returns `None` when `Q` is empty or the head wants more
    /// bytes than are currently buffered.
    pub fn take_front(&mut self) -> Option<(usize, Vec<u8>, Predicate)> {
        let n = self.queue.front()?.n;
        if self.len < n {
            return None;
        }
        let bytes = self.buf[self.head..self.head + n].to_vec();
        self.head += n;
        self.len -= n;
        let request = self.queue.pop_front().expect("front checked above");
        Some((n, bytes, request.predicate))
    }

    /// Completes a request taken via `take_front`: re-queues it at the head
    /// to receive the next `n` bytes if the predicate returned `true`, then
    /// drains the nested stack onto the head (in issue order), so any
    /// request issued by that predicate runs before this one's next chunk —
    /// nested reads take precedence.
    pub fn finish_front(&mut self, n: usize, predicate: Predicate, keep: bool) {
        if keep {
            self.queue.push_front(ReadRequest { n, predicate });
        }
        self.drain_nested_to_front();
    }

    /// Moves every request pushed to the nested stack during the last
    /// predicate invocation onto the front of `Q`, preserving the order in
    /// which they were issued — the LIFO-to-FIFO transfer that makes nested
    /// reads take precedence in order.
    fn drain_nested_to_front(&mut self) {
        // `nested` is a LIFO: the most recently pushed request is last.
        // Popping from the back yields requests in reverse issue order;
        // pushing each to the front of `Q` in that reverse order leaves `Q`
        // with the requests in their original issue order at the head.
        while let Some(request) = self.nested.pop() {
            self.queue.push_front(request);
        }
    }

    /// Ends the dispatch burst: clears `in_callback`, compacts the buffer,
    /// and reports whether another kernel read should be issued.
    pub fn end_dispatch(&mut self) -> bool {
        self.in_callback = false;
        if self.len > 0 {
            self.compact();
        } else {
            self.head = 0;
        }
        !self.queue.is_empty()
    }

    fn compact(&mut self) {
        if self.head == 0 {
            return;
        }
        self.buf.copy_within(self.head..self.head + self.len, 0);
        self.head = 0;
    }

    /// Drops all pending requests (used when the session closes).
    pub fn clear(&mut self) {
        self.queue.clear();
        self.nested.clear();
        self.in_callback = false;
        self.read_in_flight = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn fast_path_precondition_requires_empty_queue_and_nested() {
        let mut state = ReadState::new(64);
        assert!(state.queue_and_nested_empty());
        state.push(4, Box::new(|_| true), ReadOrder::Nested);
        assert!(!state.queue_and_nested_empty());
    }

    #[test]
    fn nested_requests_drain_in_issue_order() {
        let mut state = ReadState::new(64);
        state.begin_dispatch();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in [3usize, 5, 7] {
            let order = order.clone();
            state.push(
                n,
                Box::new(move |s: &[u8]| {
                    order.lock().unwrap().push(s.len());
                    true
                }),
                ReadOrder::Nested,
            );
        }
        state.drain_nested_to_front();
        let ns: Vec<usize> = state.queue.iter().map(|r| r.n).collect();
        assert_eq!(ns, vec![3, 5, 7]);
    }

    #[test]
    fn tail_order_does_not_jump_queue_even_mid_callback() {
        let mut state = ReadState::new(64);
        state.push(1, Box::new(|_| true), ReadOrder::Tail);
        state.begin_dispatch();
        state.push(2, Box::new(|_| true), ReadOrder::Tail);
        // Tail-ordered push during callback goes to the queue tail, not
        // the nested stack.
        assert!(state.nested_is_empty_for_test());
        let ns: Vec<usize> = state.queue.iter().map(|r| r.n).collect();
        assert_eq!(ns, vec![1, 2]);
    }

    impl ReadState {
        fn nested_is_empty_for_test(&self) -> bool {
            self.nested.is_empty()
        }
    }

    #[test]
    fn compact_after_end_dispatch_resets_head() {
        let mut state = ReadState::new(8);
        state.kernel_read_target()[..4].copy_from_slice(&[1, 2, 3, 4]);
        state.on_kernel_delivered(4);
        state.push(2, Box::new(|_| false), ReadOrder::Nested);
        state.begin_dispatch();
        let (n, bytes, mut predicate) = state.take_front().expect("2 bytes buffered");
        let keep = predicate(&bytes);
        state.finish_front(n, predicate, keep);
        assert!(state.end_dispatch());
        assert_eq!(state.unread(), 2);
    }

    #[test]
    fn take_front_returns_none_when_data_insufficient() {
        let mut state = ReadState::new(8);
        state.push(4, Box::new(|_| true), ReadOrder::Nested);
        assert!(state.take_front().is_none());
    }

    #[test]
    fn finish_front_requeues_kept_request_at_head() {
        let mut state = ReadState::new(8);
        state.kernel_read_target()[..2].copy_from_slice(&[9, 9]);
        state.on_kernel_delivered(2);
        state.push(2, Box::new(|_| true), ReadOrder::Nested);
        let (n, bytes, mut predicate) = state.take_front().unwrap();
        let keep = predicate(&bytes);
        state.finish_front(n, predicate, keep);
        assert_eq!(state.queue_front_n(), Some(2));
    }
}
