//! Critical-section bridge.
//!
//! "Enter critical section" and "suspend the scheduler" both map onto the
//! kernel's global lock. Nothing here blocks; code inside a critical section
//! must not block either.
//!
//! Prefer the scoped forms ([`with`], [`lock`]) in Rust code. The unpaired
//! [`enter`]/[`leave`] calls exist for the C surface.

use core::marker::PhantomData;

use crate::kernel::{DefaultKernel, SyncKernel};

/// Enters the critical section. Nests.
#[inline]
pub fn enter<K: SyncKernel>() {
    K::sys_lock();
}

/// Leaves one level of the critical section.
#[inline]
pub fn leave<K: SyncKernel>() {
    K::sys_unlock();
}

/// Stops the scheduler from switching tasks.
///
/// The kernel lock already excludes every other task, so this is the same
/// as [`enter`].
#[inline]
pub fn suspend_all<K: SyncKernel>() {
    K::sys_lock();
}

/// Undoes one [`suspend_all`].
#[inline]
pub fn resume_all<K: SyncKernel>() {
    K::sys_unlock();
}

/// RAII critical section, left when dropped.
///
/// `!Send`: the section belongs to the context that entered it.
#[must_use = "if unused, the critical section is left immediately"]
pub struct CriticalGuard<K: SyncKernel = DefaultKernel> {
    _kernel: PhantomData<K>,
    _not_send: PhantomData<*const ()>,
}

impl<K: SyncKernel> Drop for CriticalGuard<K> {
    fn drop(&mut self) {
        K::sys_unlock();
    }
}

/// Enters the critical section until the returned guard is dropped.
pub fn lock<K: SyncKernel>() -> CriticalGuard<K> {
    K::sys_lock();
    CriticalGuard {
        _kernel: PhantomData,
        _not_send: PhantomData,
    }
}

/// Runs `f` inside the critical section.
///
/// The section is left even if `f` panics.
#[inline]
pub fn with<K: SyncKernel, R>(f: impl FnOnce() -> R) -> R {
    let _guard = lock::<K>();
    f()
}

/// Routes the `critical-section` crate onto a kernel's global lock.
///
/// Invoke once, in the firmware binary:
///
/// ```ignore
/// pios_rtos::bind_critical_section!(pios_rtos::kernel::threadx::ThreadxKernel);
/// ```
///
/// Host builds get their implementation from `critical-section/std` and must
/// not use this macro.
#[macro_export]
macro_rules! bind_critical_section {
    ($kernel:ty) => {
        struct PiosCriticalSection;
        $crate::__private::critical_section::set_impl!(PiosCriticalSection);

        unsafe impl $crate::__private::critical_section::Impl for PiosCriticalSection {
            unsafe fn acquire() -> $crate::__private::critical_section::RawRestoreState {
                <$kernel as $crate::kernel::SyncKernel>::sys_lock();
                core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::Acquire);
            }

            unsafe fn release(_restore: $crate::__private::critical_section::RawRestoreState) {
                core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::Release);
                <$kernel as $crate::kernel::SyncKernel>::sys_unlock();
            }
        }
    };
}

#[cfg(all(test, feature = "hosted"))]
mod tests {
    use super::*;
    use crate::kernel::hosted::HostedKernel;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_with_excludes_other_threads() {
        let counter = Arc::new(AtomicU32::new(0));
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        with::<HostedKernel, _>(|| {
                            // Non-atomic read-modify-write, safe only under the lock.
                            let v = counter.load(Ordering::Relaxed);
                            thread::yield_now();
                            counter.store(v + 1, Ordering::Relaxed);
                        });
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 800);
    }

    #[test]
    fn test_enter_leave_nest() {
        enter::<HostedKernel>();
        suspend_all::<HostedKernel>();
        let inner = with::<HostedKernel, _>(|| 7);
        resume_all::<HostedKernel>();
        leave::<HostedKernel>();
        assert_eq!(inner, 7);
    }

    #[test]
    fn test_guard_released_on_panic() {
        let result = std::panic::catch_unwind(|| {
            with::<HostedKernel, _>(|| panic!("inside critical section"));
        });
        assert!(result.is_err());
        // Another thread can still get in.
        thread::spawn(|| with::<HostedKernel, _>(|| ()))
            .join()
            .unwrap();
    }
}
