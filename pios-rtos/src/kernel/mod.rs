//! The host-kernel surface the adapters are written against.
//!
//! # Pattern Overview
//!
//! ```text
//! SyncKernel (trait, consumed interface)
//!       │
//!       ├── hosted::HostedKernel   (std threads, tests)
//!       └── threadx::ThreadxKernel (Azure RTOS ThreadX)
//!       │
//!       ▼
//! DefaultKernel (picked once, here, by cargo feature)
//! ```
//!
//! Kernel objects (mutexes, pools, mailboxes) are initialized in place inside
//! storage the adapters draw from the heap adapter, the same way a ChibiOS
//! `chMtxInit(&obj->mtx)` or a ThreadX `tx_mutex_create(&obj->mtx, ..)`
//! initializes a control block that lives inside a larger object. The
//! storage never moves and is never freed.

use core::alloc::Layout;
use core::fmt;
use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::time::Ticks;

#[cfg(feature = "hosted")]
pub mod hosted;
#[cfg(feature = "threadx")]
pub mod threadx;

/// The kernel every primitive uses unless told otherwise.
#[cfg(feature = "threadx")]
pub type DefaultKernel = threadx::ThreadxKernel;

/// The kernel every primitive uses unless told otherwise.
#[cfg(all(feature = "hosted", not(feature = "threadx")))]
pub type DefaultKernel = hosted::HostedKernel;

/// Task priority. Larger is more urgent, [`SyncKernel::IDLE_PRIORITY`] is the
/// floor.
pub type Priority = u32;

/// Message word carried by a mailbox.
pub type Msg = usize;

/// How long a kernel wait may last, already in ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickTimeout {
    /// Give up after this many ticks. `Ticks(0)` never waits.
    Ticks(Ticks),
    /// Wait until the resource is available.
    Infinite,
}

impl TickTimeout {
    /// A wait that fails immediately if it would block.
    pub const IMMEDIATE: Self = TickTimeout::Ticks(0);
}

/// Result of a non-blocking operation performed from interrupt context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IsrOutcome {
    /// The operation took effect.
    pub accepted: bool,
    /// A waiting thread was made ready and a reschedule is due on ISR exit.
    pub woken: bool,
}

impl IsrOutcome {
    /// Outcome of an operation that could not be performed.
    pub const REJECTED: Self = IsrOutcome {
        accepted: false,
        woken: false,
    };

    /// Folds the woken flag into the caller's accumulator and returns whether
    /// the operation took effect.
    ///
    /// The accumulator is only ever set, never cleared.
    #[inline]
    pub fn accumulate(self, woken: &mut bool) -> bool {
        *woken |= self.woken;
        self.accepted
    }
}

/// Proof that the caller runs in interrupt context.
///
/// Only the from-ISR operations take this token, so blocking calls cannot be
/// reached with it and ISR-only calls cannot be reached without it. The
/// token is `!Send` and cannot leave the handler that created it.
pub struct IsrContext<'a> {
    _not_send: PhantomData<*const ()>,
    _scope: PhantomData<&'a ()>,
}

impl IsrContext<'_> {
    /// Runs `f` with an interrupt-context token.
    ///
    /// # Safety
    ///
    /// Must be called from an interrupt handler (or, for the hosted kernel,
    /// from inside [`hosted::HostedKernel::interrupt`]). The closure must
    /// not call any blocking operation.
    pub unsafe fn enter<R>(f: impl FnOnce(&IsrContext<'_>) -> R) -> R {
        let cx = IsrContext {
            _not_send: PhantomData,
            _scope: PhantomData,
        };
        f(&cx)
    }
}

impl fmt::Debug for IsrContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IsrContext")
    }
}

/// Everything a kernel needs to start a thread.
#[derive(Clone, Copy)]
pub struct ThreadSpec {
    /// Thread name (kernels may truncate it).
    pub name: &'static str,
    /// Stack size in bytes, drawn from the kernel heap.
    pub stack_bytes: usize,
    /// Priority, larger is more urgent.
    pub priority: Priority,
    /// Entry point, called once on the new thread.
    pub entry: fn(usize),
    /// Argument passed to `entry`.
    pub arg: usize,
}

impl fmt::Debug for ThreadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadSpec")
            .field("name", &self.name)
            .field("stack_bytes", &self.stack_bytes)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// The primitives this layer consumes from the kernel underneath.
///
/// # Safety
///
/// Implementations must provide real mutual exclusion from
/// [`sys_lock`](Self::sys_lock), FIFO mailboxes, and pools that never hand
/// out the same slot twice. The adapters build memory safety on top of
/// these guarantees.
pub unsafe trait SyncKernel: Sized + 'static {
    /// Identity of an execution context, compared for recursive ownership.
    type ThreadId: Copy + Eq + fmt::Debug + Send + Sync;
    /// Kernel lock object.
    type Mutex: Send + Sync;
    /// Kernel fixed-size block pool.
    type Pool: Send + Sync;
    /// Kernel FIFO of [`Msg`] words.
    type Mailbox: Send + Sync;
    /// Handle to a kernel thread.
    type Thread: Clone + Send + Sync;

    /// Tick frequency in Hz.
    const TICK_HZ: u32;
    /// Lowest task priority.
    const IDLE_PRIORITY: Priority;
    /// Highest task priority.
    const MAX_PRIORITY: Priority;
    /// Word found in stack memory that was never touched.
    const STACK_FILL_WORD: u32;

    /// Enters the global critical section. Nests.
    fn sys_lock();
    /// Leaves one level of the global critical section.
    fn sys_unlock();

    /// Current value of the monotonic (wrapping) tick counter.
    fn now() -> Ticks;
    /// Suspends the calling thread for `ticks` ticks.
    fn sleep(ticks: Ticks);
    /// Identity of the calling execution context.
    fn current_thread() -> Self::ThreadId;

    /// Allocates from the kernel heap. Returns `None` when exhausted.
    fn core_alloc(layout: Layout) -> Option<NonNull<u8>>;
    /// Kernel-defined indication of remaining heap.
    fn core_status() -> usize;

    /// Initializes a mutex in place.
    ///
    /// # Safety
    ///
    /// `mutex` points to writable storage that never moves or is freed.
    unsafe fn mutex_init(mutex: *mut Self::Mutex);
    /// Locks, waiting at most `timeout`. Returns `true` once acquired.
    fn mutex_lock(mutex: &Self::Mutex, timeout: TickTimeout) -> bool;
    /// Unlocks. Returns `false` if the kernel refused.
    fn mutex_unlock(mutex: &Self::Mutex) -> bool;
    /// Locks without waiting, from interrupt context.
    fn mutex_try_lock_i(mutex: &Self::Mutex, cx: &IsrContext<'_>) -> IsrOutcome;
    /// Unlocks from interrupt context.
    fn mutex_unlock_i(mutex: &Self::Mutex, cx: &IsrContext<'_>) -> IsrOutcome;

    /// Storage a pool of `count` objects of `object_size` bytes needs.
    fn pool_layout(object_size: usize, count: usize) -> Option<Layout>;
    /// Initializes a pool in place and loads it with every slot of `storage`.
    ///
    /// # Safety
    ///
    /// `pool` points to writable storage that never moves or is freed;
    /// `storage` was allocated with [`pool_layout`](Self::pool_layout) for the
    /// same arguments and is used by nothing else.
    unsafe fn pool_init(
        pool: *mut Self::Pool,
        storage: NonNull<u8>,
        object_size: usize,
        count: usize,
    );
    /// Takes a free slot without waiting.
    fn pool_alloc(pool: &Self::Pool) -> Option<NonNull<u8>>;
    /// Takes a free slot from interrupt context.
    fn pool_alloc_i(pool: &Self::Pool, cx: &IsrContext<'_>) -> Option<NonNull<u8>>;
    /// Returns a slot.
    ///
    /// # Safety
    ///
    /// `slot` came from this pool and is not used afterwards.
    unsafe fn pool_free(pool: &Self::Pool, slot: NonNull<u8>);
    /// Returns a slot from interrupt context.
    ///
    /// # Safety
    ///
    /// As [`pool_free`](Self::pool_free).
    unsafe fn pool_free_i(pool: &Self::Pool, slot: NonNull<u8>, cx: &IsrContext<'_>);

    /// Storage a mailbox of `capacity` messages needs.
    fn mailbox_layout(capacity: usize) -> Option<Layout>;
    /// Initializes a mailbox in place over `storage`.
    ///
    /// # Safety
    ///
    /// As [`pool_init`](Self::pool_init), with
    /// [`mailbox_layout`](Self::mailbox_layout).
    unsafe fn mailbox_init(mailbox: *mut Self::Mailbox, storage: NonNull<u8>, capacity: usize);
    /// Posts at the back, waiting at most `timeout` for room.
    fn mailbox_post(mailbox: &Self::Mailbox, msg: Msg, timeout: TickTimeout) -> bool;
    /// Posts at the back from interrupt context, only if there is room.
    fn mailbox_post_i(mailbox: &Self::Mailbox, msg: Msg, cx: &IsrContext<'_>) -> IsrOutcome;
    /// Fetches from the front, waiting at most `timeout` for a message.
    fn mailbox_fetch(mailbox: &Self::Mailbox, timeout: TickTimeout) -> Option<Msg>;
    /// Messages currently queued.
    fn mailbox_len(mailbox: &Self::Mailbox) -> usize;

    /// Creates and starts a thread whose control block and stack come from
    /// the kernel heap.
    fn thread_create(spec: ThreadSpec) -> Option<Self::Thread>;
    /// The calling thread, if it was created through
    /// [`thread_create`](Self::thread_create).
    fn thread_current() -> Option<Self::Thread>;
    /// Identity of `thread`, comparable with [`current_thread`](Self::current_thread).
    fn thread_id(thread: &Self::Thread) -> Self::ThreadId;
    /// Asks `thread` to terminate.
    fn thread_terminate(thread: &Self::Thread);
    /// Whether the calling thread has been asked to terminate.
    fn thread_should_terminate() -> bool;
    /// Waits until `thread` has fully exited.
    fn thread_wait(thread: Self::Thread);
    /// Returns and clears the run time accumulated by `thread`.
    ///
    /// Called with the critical section held.
    fn thread_take_ticks(thread: &Self::Thread) -> Ticks;
    /// The thread's stack region as (lowest word, length in words).
    fn thread_stack(thread: &Self::Thread) -> Option<(NonNull<u32>, usize)>;
}
