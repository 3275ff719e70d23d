//! Process-wide buffer pool.
//!
//! Lends zeroed, reusable byte buffers of at least a requested capacity and
//! reclaims them on return, amortizing allocation on the session read/write
//! hot path. The pool is a lazily initialized singleton, with explicit
//! shutdown semantics used only in tests, bucketed by the next power-of-two
//! capacity so buffers of similar size are reused instead of each `take`
//! forcing a fresh `Vec`.

use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::safe_panic;

const MIN_BUCKET_SHIFT: u32 = 10; // 1 KiB
// Bucket `i` holds buffers of capacity `1 KiB << i`, so `NUM_BUCKETS` buckets
// cover up to `1 KiB << (NUM_BUCKETS - 1)` == 1 KiB << 16 == 64 MiB. A
// capacity above that ceiling has no bucket at all and falls back to an
// unpooled allocation in `take`/`give`.
const NUM_BUCKETS: usize = 17;
const MAX_POOLED_CAPACITY: usize = 1 << (MIN_BUCKET_SHIFT as usize + NUM_BUCKETS - 1);

struct Buckets {
    free: [Mutex<Vec<Vec<u8>>>; NUM_BUCKETS],
}

impl Buckets {
    fn new() -> Self {
        Self { free: std::array::from_fn(|_| Mutex::new(Vec::new())) }
    }

    /// Returns `None` for a capacity too large to bucket; the caller falls
    /// back to an unpooled allocation instead of indexing past `free`.
    fn bucket_for(capacity: usize) -> Option<usize> {
        if capacity > MAX_POOLED_CAPACITY {
            return None;
        }
        let shift = (usize::BITS - capacity.max(1).leading_zeros()).max(MIN_BUCKET_SHIFT);
        Some((shift - MIN_BUCKET_SHIFT) as usize)
    }
}

fn pool() -> &'static Buckets {
    static POOL: OnceLock<Buckets> = OnceLock::new();
    POOL.get_or_init(Buckets::new)
}

/// A zeroed, reusable byte buffer on loan from the process-wide pool.
///
/// Must be returned via [`give`] exactly once. A buffer dropped without
/// being returned is not unsound (ordinary `Vec` drop glue runs) but is a
/// programmer error: in debug builds it panics, in release it logs.
pub struct Buffer {
    data: Vec<u8>,
    /// `None` for a capacity above the pool's bucketing ceiling: `give`
    /// drops such a buffer instead of returning it to a free list.
    bucket: Option<usize>,
    returned: bool,
}

impl Buffer {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    #[inline]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}

impl std::ops::Deref for Buffer {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl std::ops::DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if !self.returned {
            safe_panic!("buffer of {} bytes dropped without being returned to the pool", self.data.len());
        }
    }
}

/// Never returns a buffer smaller than `n`. Allocation failures propagate as
/// a process abort via the global allocator, treated as fatal. A request
/// above the pool's 64 MiB bucketing ceiling is allocated directly and not
/// pooled on return.
pub fn take(n: usize) -> Buffer {
    let bucket = Buckets::bucket_for(n);
    let mut data = match bucket {
        Some(bucket) => pool().free[bucket].lock().pop().unwrap_or_default(),
        None => Vec::new(),
    };
    data.clear();
    data.resize(n, 0);
    Buffer { data, bucket, returned: false }
}

/// Returns a buffer to the pool. Must be called exactly once per [`take`].
pub fn give(mut buffer: Buffer) {
    if buffer.returned {
        safe_panic!("double-give of buffer to the pool");
        return;
    }
    buffer.returned = true;
    let Some(bucket) = buffer.bucket else {
        return; // oversized, unpooled buffer: just drop it
    };
    let data = std::mem::take(&mut buffer.data);
    pool().free[bucket].lock().push(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_never_smaller_than_requested() {
        let buf = take(37);
        assert!(buf.len() >= 37);
        give(buf);
    }

    #[test]
    fn reused_buffer_is_zeroed() {
        let mut buf = take(64);
        buf.as_mut_slice().fill(0xAA);
        give(buf);

        let buf = take(64);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
        give(buf);
    }

    #[test]
    fn capacity_at_the_bucketing_ceiling_is_pooled() {
        assert_eq!(Buckets::bucket_for(MAX_POOLED_CAPACITY), Some(NUM_BUCKETS - 1));
        assert_eq!(Buckets::bucket_for(MAX_POOLED_CAPACITY + 1), None);
    }

    #[test]
    fn oversized_request_falls_back_to_an_unpooled_buffer() {
        let buf = take(MAX_POOLED_CAPACITY + 1);
        assert_eq!(buf.len(), MAX_POOLED_CAPACITY + 1);
        give(buf);
    }

    #[test]
    #[should_panic(expected = "double-give")]
    fn double_give_is_a_programmer_error() {
        // Ordinary move semantics already make a literal double-`give` a
        // compile error; this simulates the defect the check guards against
        // (e.g. a buffer handle reconstructed from a stored index) by
        // marking the loan as already returned before calling `give` again.
        let mut buf = take(8);
        buf.returned = true;
        give(buf);
    }
}
