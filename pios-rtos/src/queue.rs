//! Bounded FIFO queue built from a kernel pool and a kernel mailbox.
//!
//! # Pattern Overview
//!
//! ```text
//!            send                                     receive
//! element ──copy──► pool slot ──post addr──► mailbox ──fetch addr──► copy out, free slot
//! ```
//!
//! The pool holds `capacity + QUEUE_MAX_WAITERS` slots and the mailbox
//! `capacity` addresses. The spare slot lets an interrupt-context send find
//! storage the instant a task send has filled the mailbox; the mailbox still
//! bounds what is queued to `capacity`.
//!
//! All storage (control block, slots, mailbox buffer) is drawn from the
//! kernel heap once, at creation, and never released.
//!
//! # Example
//!
//! ```no_run
//! use pios_rtos::{Queue, Timeout};
//!
//! let q: Queue<u32> = Queue::create(8).expect("heap exhausted");
//! q.send(&42, Timeout::Millis(5)).expect("queue full");
//! assert_eq!(q.receive(Timeout::Infinite), Ok(42));
//! ```

use core::fmt;
use core::marker::PhantomData;
use core::mem::{self, MaybeUninit};
use core::ptr::{self, NonNull};

use crate::config::QUEUE_MAX_WAITERS;
use crate::critical;
use crate::error::QueueError;
use crate::heap;
use crate::kernel::{DefaultKernel, IsrContext, Msg, SyncKernel, TickTimeout};
use crate::time::Timeout;

/// Untyped queue of fixed-size byte elements.
pub struct RawQueue<K: SyncKernel = DefaultKernel> {
    pool: K::Pool,
    mailbox: K::Mailbox,
    capacity: usize,
    element_size: usize,
}

impl<K: SyncKernel> RawQueue<K> {
    /// Allocates a queue of `capacity` elements of `element_size` bytes.
    ///
    /// Returns `None` if the kernel heap cannot supply the storage.
    pub fn create(capacity: usize, element_size: usize) -> Option<&'static Self> {
        pios_assert!(capacity > 0, "queue capacity must be non-zero");
        let slots = capacity + QUEUE_MAX_WAITERS;

        let this = heap::allocate_uninit::<K, Self>()?.as_mut_ptr();
        let pool_storage = heap::allocate_layout::<K>(K::pool_layout(element_size, slots)?)?;
        let mailbox_storage = heap::allocate_layout::<K>(K::mailbox_layout(capacity)?)?;

        // SAFETY: all three blocks are fresh, 'static and sized by the
        // kernel's own layout functions; every field is written before the
        // reference is formed.
        unsafe {
            K::pool_init(ptr::addr_of_mut!((*this).pool), pool_storage, element_size, slots);
            K::mailbox_init(ptr::addr_of_mut!((*this).mailbox), mailbox_storage, capacity);
            ptr::addr_of_mut!((*this).capacity).write(capacity);
            ptr::addr_of_mut!((*this).element_size).write(element_size);
            log::trace!(
                "queue created at {:p}: {} x {} bytes",
                this,
                capacity,
                element_size
            );
            Some(&*this)
        }
    }

    /// Maximum number of queued elements.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of every element, in bytes.
    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Elements currently queued. A snapshot; may be stale on return.
    pub fn len(&self) -> usize {
        K::mailbox_len(&self.mailbox)
    }

    /// Whether nothing is queued. A snapshot; may be stale on return.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_len(&self, len: usize) {
        pios_assert!(
            len == self.element_size,
            "element of {} bytes on a queue of {}-byte elements",
            len,
            self.element_size
        );
    }

    /// # Safety
    ///
    /// `src` is readable for `element_size` bytes.
    unsafe fn send_from(&self, src: *const u8, timeout: TickTimeout) -> Result<(), QueueError> {
        let slot = K::pool_alloc(&self.pool).ok_or(QueueError::Full)?;
        // SAFETY: the slot holds `element_size` bytes and is ours until
        // posted; `src` per caller contract.
        unsafe { ptr::copy_nonoverlapping(src, slot.as_ptr(), self.element_size) };

        if K::mailbox_post(&self.mailbox, slot.as_ptr() as Msg, timeout) {
            Ok(())
        } else {
            // SAFETY: never posted, so nobody else saw the slot.
            unsafe { K::pool_free(&self.pool, slot) };
            Err(QueueError::Full)
        }
    }

    /// # Safety
    ///
    /// `dst` is writable for `element_size` bytes.
    unsafe fn receive_into(&self, dst: *mut u8, timeout: TickTimeout) -> Result<(), QueueError> {
        let msg = K::mailbox_fetch(&self.mailbox, timeout).ok_or(QueueError::Empty)?;
        let Some(slot) = NonNull::new(msg as *mut u8) else {
            pios_assert!(false, "null slot fetched from queue mailbox");
            return Err(QueueError::Empty);
        };
        // SAFETY: the mailbox only carries slots posted by a send, which
        // hold a full element; the fetch made the slot ours.
        unsafe {
            ptr::copy_nonoverlapping(slot.as_ptr(), dst, self.element_size);
            K::pool_free(&self.pool, slot);
        }
        Ok(())
    }

    /// # Safety
    ///
    /// `src` is readable for `element_size` bytes.
    unsafe fn isr_send_from(&self, cx: &IsrContext<'_>, src: *const u8, woken: &mut bool) -> bool {
        critical::with::<K, _>(|| {
            let Some(slot) = K::pool_alloc_i(&self.pool, cx) else {
                return false;
            };
            // SAFETY: as in `send_from`.
            unsafe { ptr::copy_nonoverlapping(src, slot.as_ptr(), self.element_size) };

            let outcome = K::mailbox_post_i(&self.mailbox, slot.as_ptr() as Msg, cx);
            if !outcome.accepted {
                // SAFETY: never posted.
                unsafe { K::pool_free_i(&self.pool, slot, cx) };
            }
            outcome.accumulate(woken)
        })
    }

    /// Copies `element` to the back of the queue, waiting at most `timeout`
    /// for room.
    ///
    /// Fails with [`QueueError::Full`] at once if no storage slot is free.
    pub fn send(&self, element: &[u8], timeout: Timeout) -> Result<(), QueueError> {
        self.send_ticks(element, timeout.ticks::<K>())
    }

    /// [`send`](Self::send) with the timeout already in ticks.
    pub fn send_ticks(&self, element: &[u8], timeout: TickTimeout) -> Result<(), QueueError> {
        self.check_len(element.len());
        // SAFETY: `element` is exactly one element long.
        unsafe { self.send_from(element.as_ptr(), timeout) }
    }

    /// Copies the front element into `out`, waiting at most `timeout`.
    ///
    /// On [`QueueError::Empty`] `out` is left untouched.
    pub fn receive(&self, out: &mut [u8], timeout: Timeout) -> Result<(), QueueError> {
        self.receive_ticks(out, timeout.ticks::<K>())
    }

    /// [`receive`](Self::receive) with the timeout already in ticks.
    pub fn receive_ticks(&self, out: &mut [u8], timeout: TickTimeout) -> Result<(), QueueError> {
        self.check_len(out.len());
        // SAFETY: `out` is exactly one element long.
        unsafe { self.receive_into(out.as_mut_ptr(), timeout) }
    }

    /// Copies `element` to the back of the queue from interrupt context.
    ///
    /// Never waits. `woken` is set if a receiver became ready; it is never
    /// cleared.
    pub fn send_from_isr(&self, cx: &IsrContext<'_>, element: &[u8], woken: &mut bool) -> bool {
        self.check_len(element.len());
        // SAFETY: `element` is exactly one element long.
        unsafe { self.isr_send_from(cx, element.as_ptr(), woken) }
    }
}

impl<K: SyncKernel> fmt::Debug for RawQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawQueue")
            .field("capacity", &self.capacity)
            .field("element_size", &self.element_size)
            .field("len", &self.len())
            .finish()
    }
}

/// Typed handle to a queue of `T` values.
pub struct Queue<T: Copy, K: SyncKernel = DefaultKernel> {
    raw: &'static RawQueue<K>,
    _elem: PhantomData<T>,
}

impl<T: Copy, K: SyncKernel> Clone for Queue<T, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Copy, K: SyncKernel> Copy for Queue<T, K> {}

impl<T: Copy, K: SyncKernel> Queue<T, K> {
    /// Allocates a queue holding up to `capacity` values.
    pub fn create(capacity: usize) -> Option<Self> {
        let raw = RawQueue::create(capacity, mem::size_of::<T>())?;
        Some(Self {
            raw,
            _elem: PhantomData,
        })
    }

    /// The untyped queue underneath.
    #[inline]
    pub fn raw(&self) -> &'static RawQueue<K> {
        self.raw
    }

    /// Copies `value` to the back of the queue.
    pub fn send(&self, value: &T, timeout: Timeout) -> Result<(), QueueError> {
        // SAFETY: `value` is one element of `size_of::<T>()` bytes.
        unsafe {
            self.raw
                .send_from((value as *const T).cast(), timeout.ticks::<K>())
        }
    }

    /// Takes the front value.
    pub fn receive(&self, timeout: Timeout) -> Result<T, QueueError> {
        let mut out = MaybeUninit::<T>::uninit();
        // SAFETY: `out` has room for one element; on success every byte of
        // it was copied from a `T` sent through this queue.
        unsafe {
            self.raw
                .receive_into(out.as_mut_ptr().cast(), timeout.ticks::<K>())?;
            Ok(out.assume_init())
        }
    }

    /// Copies `value` to the back of the queue from interrupt context.
    pub fn send_from_isr(&self, cx: &IsrContext<'_>, value: &T, woken: &mut bool) -> bool {
        // SAFETY: as in `send`.
        unsafe { self.raw.isr_send_from(cx, (value as *const T).cast(), woken) }
    }

    /// Values currently queued.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Maximum number of queued values.
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }
}

impl<T: Copy, K: SyncKernel> fmt::Debug for Queue<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Queue").field(self.raw).finish()
    }
}

#[cfg(all(test, feature = "hosted"))]
mod tests {
    use super::*;
    use crate::kernel::hosted::HostedKernel;

    #[test]
    fn test_raw_roundtrip_and_empty() {
        let q = RawQueue::<HostedKernel>::create(2, 3).unwrap();
        assert_eq!(q.capacity(), 2);
        assert_eq!(q.element_size(), 3);
        assert!(q.is_empty());

        q.send(&[1, 2, 3], Timeout::NO_WAIT).unwrap();
        assert_eq!(q.len(), 1);

        let mut out = [0u8; 3];
        q.receive(&mut out, Timeout::NO_WAIT).unwrap();
        assert_eq!(out, [1, 2, 3]);

        let mut untouched = [9u8; 3];
        assert_eq!(
            q.receive(&mut untouched, Timeout::Millis(2)),
            Err(QueueError::Empty)
        );
        assert_eq!(untouched, [9, 9, 9]);
    }

    #[test]
    #[should_panic(expected = "element of 2 bytes")]
    fn test_wrong_element_size_asserts() {
        let q = RawQueue::<HostedKernel>::create(2, 4).unwrap();
        let _ = q.send(&[0, 0], Timeout::NO_WAIT);
    }

    #[test]
    fn test_typed_struct_elements() {
        #[derive(Clone, Copy, Debug, PartialEq)]
        struct Sample {
            id: u8,
            value: f64,
        }

        let q = Queue::<Sample, HostedKernel>::create(3).unwrap();
        q.send(&Sample { id: 1, value: 0.5 }, Timeout::NO_WAIT).unwrap();
        q.send(&Sample { id: 2, value: -1.0 }, Timeout::NO_WAIT).unwrap();
        assert_eq!(q.receive(Timeout::NO_WAIT), Ok(Sample { id: 1, value: 0.5 }));
        assert_eq!(q.receive(Timeout::NO_WAIT), Ok(Sample { id: 2, value: -1.0 }));
    }
}
