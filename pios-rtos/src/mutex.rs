//! Mutex and recursive mutex primitives.
//!
//! # Pattern Overview
//!
//! ```text
//! heap::allocate_uninit (storage, never freed)
//!       │
//!       │ Mutex::create() / RecursiveMutex::create()
//!       ▼
//! &'static Mutex (kernel lock initialized in place)
//!       │
//!       │ lock(timeout) / unlock()         unpaired, C-style
//!       │ guard(timeout)                   RAII
//!       │ lock_from_isr(cx, &mut woken)    interrupt context
//!       ▼
//! MutexGuard (releases on drop, !Send)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use pios_rtos::{Mutex, Timeout};
//!
//! let mutex: &'static Mutex = Mutex::create().expect("heap exhausted");
//! {
//!     let _guard = mutex.guard(Timeout::Millis(10)).expect("lock timed out");
//!     // ... exclusive section ...
//! }
//! ```

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ptr;

use crate::critical;
use crate::error::{LockError, UnlockError};
use crate::heap;
use crate::kernel::{DefaultKernel, IsrContext, SyncKernel};
use crate::time::Timeout;

/// Binary lock with timeout and interrupt-context variants.
///
/// Handles are `&'static`: mutexes are never destroyed.
pub struct Mutex<K: SyncKernel = DefaultKernel> {
    raw: K::Mutex,
}

impl<K: SyncKernel> Mutex<K> {
    /// Allocates a mutex from the kernel heap.
    ///
    /// Returns `None` if the heap is exhausted.
    pub fn create() -> Option<&'static Self> {
        let slot = heap::allocate_uninit::<K, Self>()?;
        let mutex = slot.as_mut_ptr();
        // SAFETY: `slot` is fresh, 'static storage for a `Mutex`, and
        // `raw` is its only field.
        unsafe {
            K::mutex_init(ptr::addr_of_mut!((*mutex).raw));
            log::trace!("mutex created at {:p}", mutex);
            Some(&*mutex)
        }
    }

    /// Acquires the mutex, waiting at most `timeout`.
    pub fn lock(&self, timeout: Timeout) -> Result<(), LockError> {
        if K::mutex_lock(&self.raw, timeout.ticks::<K>()) {
            Ok(())
        } else {
            Err(LockError::Timeout)
        }
    }

    /// Releases a mutex acquired with [`lock`](Self::lock).
    pub fn unlock(&self) -> Result<(), UnlockError> {
        if K::mutex_unlock(&self.raw) {
            Ok(())
        } else {
            Err(UnlockError::Rejected)
        }
    }

    /// Acquires the mutex and returns a guard that releases it on drop.
    pub fn guard(&self, timeout: Timeout) -> Result<MutexGuard<'_, K>, LockError> {
        self.lock(timeout)?;
        Ok(MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        })
    }

    /// Takes the mutex from interrupt context, never waiting.
    ///
    /// `woken` is set if a task must be rescheduled on exit from the
    /// interrupt; it is never cleared.
    pub fn lock_from_isr(&self, cx: &IsrContext<'_>, woken: &mut bool) -> bool {
        K::mutex_try_lock_i(&self.raw, cx).accumulate(woken)
    }

    /// Releases the mutex from interrupt context.
    pub fn unlock_from_isr(&self, cx: &IsrContext<'_>, woken: &mut bool) -> bool {
        K::mutex_unlock_i(&self.raw, cx).accumulate(woken)
    }
}

impl<K: SyncKernel> fmt::Debug for Mutex<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex").finish_non_exhaustive()
    }
}

/// RAII guard for a locked [`Mutex`].
///
/// `!Send`: kernel mutexes are owned by the thread that locked them.
#[must_use = "if unused, the mutex will immediately unlock"]
pub struct MutexGuard<'a, K: SyncKernel = DefaultKernel> {
    mutex: &'a Mutex<K>,
    _not_send: PhantomData<*const ()>,
}

impl<K: SyncKernel> Drop for MutexGuard<'_, K> {
    fn drop(&mut self) {
        if self.mutex.unlock().is_err() {
            log::warn!("mutex release refused by the kernel");
        }
    }
}

/// Mutex that its owner may lock again without blocking.
///
/// Each [`lock`](Self::lock) by the owner must be matched by one
/// [`unlock`](Self::unlock); the kernel lock is released on the last one.
/// Not usable from interrupt context.
pub struct RecursiveMutex<K: SyncKernel = DefaultKernel> {
    raw: K::Mutex,
    /// Owner and depth, only touched inside the critical section.
    state: UnsafeCell<Ownership<K::ThreadId>>,
}

#[derive(Clone, Copy)]
struct Ownership<T> {
    owner: Option<T>,
    depth: u32,
}

// SAFETY: `state` is only accessed with the kernel's critical section held,
// and `raw` is a kernel object built for sharing.
unsafe impl<K: SyncKernel> Sync for RecursiveMutex<K> {}
unsafe impl<K: SyncKernel> Send for RecursiveMutex<K> {}

impl<K: SyncKernel> RecursiveMutex<K> {
    /// Allocates a recursive mutex from the kernel heap.
    ///
    /// Returns `None` if the heap is exhausted.
    pub fn create() -> Option<&'static Self> {
        let slot = heap::allocate_uninit::<K, Self>()?;
        let mutex = slot.as_mut_ptr();
        // SAFETY: fresh, 'static storage; every field is written before the
        // reference is formed.
        unsafe {
            K::mutex_init(ptr::addr_of_mut!((*mutex).raw));
            ptr::addr_of_mut!((*mutex).state).write(UnsafeCell::new(Ownership {
                owner: None,
                depth: 0,
            }));
            log::trace!("recursive mutex created at {:p}", mutex);
            Some(&*mutex)
        }
    }

    /// Runs `f` on the ownership record inside the critical section.
    fn with_state<R>(&self, f: impl FnOnce(&mut Ownership<K::ThreadId>) -> R) -> R {
        // SAFETY: the critical section serializes every access to `state`.
        critical::with::<K, _>(|| f(unsafe { &mut *self.state.get() }))
    }

    /// Acquires the mutex.
    ///
    /// The owner re-enters immediately, whatever the timeout. Anyone else
    /// waits at most `timeout`.
    pub fn lock(&self, timeout: Timeout) -> Result<(), LockError> {
        let me = K::current_thread();
        let reentered = self.with_state(|s| {
            if s.owner == Some(me) {
                s.depth += 1;
                true
            } else {
                false
            }
        });
        if reentered {
            return Ok(());
        }

        if !K::mutex_lock(&self.raw, timeout.ticks::<K>()) {
            return Err(LockError::Timeout);
        }
        self.with_state(|s| {
            s.owner = Some(me);
            s.depth = 1;
        });
        Ok(())
    }

    /// Drops one level of ownership, releasing the kernel lock on the last.
    pub fn unlock(&self) -> Result<(), UnlockError> {
        let me = K::current_thread();
        let release = self.with_state(|s| {
            if s.owner != Some(me) || s.depth == 0 {
                return Err(UnlockError::NotOwner);
            }
            s.depth -= 1;
            if s.depth == 0 {
                s.owner = None;
            }
            Ok(s.depth == 0)
        })?;

        if release && !K::mutex_unlock(&self.raw) {
            return Err(UnlockError::Rejected);
        }
        Ok(())
    }

    /// Current nesting depth. Zero when unlocked.
    pub fn depth(&self) -> u32 {
        self.with_state(|s| s.depth)
    }

    /// Not supported: ownership by "the current thread" has no meaning in
    /// interrupt context. Always fails the hard assertion.
    pub fn lock_from_isr(&self, _cx: &IsrContext<'_>, _woken: &mut bool) -> bool {
        pios_assert!(false, "recursive mutex locked from interrupt context");
        false
    }

    /// Not supported. Always fails the hard assertion.
    pub fn unlock_from_isr(&self, _cx: &IsrContext<'_>, _woken: &mut bool) -> bool {
        pios_assert!(false, "recursive mutex unlocked from interrupt context");
        false
    }
}

impl<K: SyncKernel> fmt::Debug for RecursiveMutex<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursiveMutex")
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}
