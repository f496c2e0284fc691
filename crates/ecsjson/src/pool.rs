//! Per-thread reusable `String` buffers.
//!
//! Each pool is a `thread_local!` slot holding at most one idle buffer. A
//! [`PooledString`] takes the buffer out of the slot on acquisition, leaving an
//! empty (non-allocating) `String` behind, and puts it back when dropped. A
//! nested acquisition on the same thread therefore never observes a buffer
//! that is still in use; it simply starts from an empty one.
use core::{
    cell::Cell,
    mem,
    ops::{Deref, DerefMut},
};
use std::thread::LocalKey;

/// Thread-local slot holding one idle buffer.
pub(crate) type Slot = LocalKey<Cell<String>>;

#[derive(Debug)]
pub(crate) struct PooledString {
    slot: &'static Slot,
    buf: String,
    max_retained: usize,
}

impl PooledString {
    /// Takes the calling thread's buffer out of `slot`, reserving at least
    /// `min_capacity` bytes. The buffer is always empty on acquisition.
    pub(crate) fn acquire(slot: &'static Slot, min_capacity: usize, max_retained: usize) -> Self {
        // `try_with` fails only while the thread is being torn down.
        let mut buf = slot.try_with(Cell::take).unwrap_or_default();
        buf.clear();
        buf.reserve(min_capacity);
        Self {
            slot,
            buf,
            max_retained,
        }
    }
}

impl Deref for PooledString {
    type Target = String;

    fn deref(&self) -> &String {
        &self.buf
    }
}

impl DerefMut for PooledString {
    fn deref_mut(&mut self) -> &mut String {
        &mut self.buf
    }
}

impl Drop for PooledString {
    fn drop(&mut self) {
        let mut buf = mem::take(&mut self.buf);
        buf.clear();
        if buf.capacity() > self.max_retained {
            buf.shrink_to(self.max_retained);
        }
        let _ = self.slot.try_with(|slot| slot.set(buf));
    }
}

/// Returns `(len, capacity)` of the idle buffer parked in `slot`.
#[cfg(test)]
pub(crate) fn idle_buffer(slot: &'static Slot) -> (usize, usize) {
    slot.with(|slot| {
        let buf = slot.take();
        let stats = (buf.len(), buf.capacity());
        slot.set(buf);
        stats
    })
}
