//! Kernel simulation on host threads.
//!
//! Every [`SyncKernel`] primitive is backed by `std` so the adapters can be
//! exercised by ordinary `cargo test` runs:
//!
//! | Kernel concept | Simulation |
//! |----------------|------------|
//! | global lock | reentrant lock owned by one host thread |
//! | tick counter | milliseconds since first use, plus a settable offset |
//! | kernel heap | `embedded_alloc::LlffHeap` over a static region |
//! | mutex | owner + condition variable |
//! | pool | intrusive free list |
//! | mailbox | ring buffer + two condition variables |
//! | thread | host thread with a simulated, pre-filled stack region |
//!
//! Interrupt context is simulated with [`HostedKernel::interrupt`], which
//! runs a closure on the calling thread with the global lock held, the way a
//! real interrupt preempts whatever thread was running.
//!
//! Task termination is cooperative: [`SyncKernel::thread_terminate`] only
//! raises a flag the task polls through
//! [`task::should_terminate`](crate::task::should_terminate).

use core::alloc::{GlobalAlloc, Layout};
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use std::cell::RefCell;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex as StdMutex, MutexGuard as StdGuard, Once, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use embedded_alloc::LlffHeap;
use static_cell::StaticCell;

use super::{IsrContext, IsrOutcome, Msg, Priority, SyncKernel, ThreadSpec, TickTimeout};
use crate::config::hosted::{HEAP_SIZE, HOST_STACK_SIZE, TICK_HZ};
use crate::config::{HEAP_ALIGN, STACK_FILL_WORD};
use crate::time::{ticks_to_ms, Ticks};

/// Words a real port pushes onto a fresh stack as the initial context frame.
const INITIAL_FRAME_WORDS: usize = 16;

/// The host-thread kernel.
#[derive(Debug)]
pub enum HostedKernel {}

/// Locks a host mutex, ignoring poisoning: a panicking task must not take
/// the whole simulated kernel down with it.
fn host_lock<T>(m: &StdMutex<T>) -> StdGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn ticks_to_duration(ticks: Ticks) -> Duration {
    Duration::from_millis(u64::from(ticks_to_ms(ticks, TICK_HZ)))
}

fn deadline(timeout: TickTimeout) -> Option<Instant> {
    match timeout {
        TickTimeout::Ticks(t) => Some(Instant::now() + ticks_to_duration(t)),
        TickTimeout::Infinite => None,
    }
}

/// Waits on `cv` until `ready` holds or `deadline` passes.
///
/// Returns the guard and whether `ready` holds.
fn wait_until<'a, T>(
    cv: &Condvar,
    mut guard: StdGuard<'a, T>,
    deadline: Option<Instant>,
    mut ready: impl FnMut(&T) -> bool,
) -> (StdGuard<'a, T>, bool) {
    loop {
        if ready(&guard) {
            return (guard, true);
        }
        match deadline {
            None => guard = cv.wait(guard).unwrap_or_else(PoisonError::into_inner),
            Some(at) => {
                let now = Instant::now();
                if now >= at {
                    return (guard, false);
                }
                guard = cv
                    .wait_timeout(guard, at - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Global lock

struct SysState {
    owner: Option<thread::ThreadId>,
    depth: usize,
}

static SYS_STATE: StdMutex<SysState> = StdMutex::new(SysState {
    owner: None,
    depth: 0,
});
static SYS_RELEASED: Condvar = Condvar::new();

// ---------------------------------------------------------------------------
// Ticks

static ORIGIN: OnceLock<Instant> = OnceLock::new();
static TICK_OFFSET: AtomicU32 = AtomicU32::new(0);

fn elapsed_ticks() -> Ticks {
    let origin = ORIGIN.get_or_init(Instant::now);
    let ms = origin.elapsed().as_millis() as u64;
    (ms * u64::from(TICK_HZ) / 1000) as Ticks
}

// ---------------------------------------------------------------------------
// Kernel heap

static CORE_HEAP: LlffHeap = LlffHeap::empty();
static CORE_HEAP_INIT: Once = Once::new();
static CORE_HEAP_REGION: StaticCell<[MaybeUninit<u8>; HEAP_SIZE]> = StaticCell::new();

fn core_heap() -> &'static LlffHeap {
    CORE_HEAP_INIT.call_once(|| {
        let region = CORE_HEAP_REGION.uninit();
        // SAFETY: the region is 'static, used by nothing else, and this runs
        // exactly once.
        unsafe { CORE_HEAP.init(region.as_mut_ptr() as usize, HEAP_SIZE) }
    });
    &CORE_HEAP
}

// ---------------------------------------------------------------------------
// Mutex

/// Simulated kernel mutex.
pub struct RawMutex {
    state: StdMutex<MutexState>,
    released: Condvar,
}

struct MutexState {
    owner: Option<thread::ThreadId>,
    waiters: usize,
}

impl RawMutex {
    const fn new() -> Self {
        Self {
            state: StdMutex::new(MutexState {
                owner: None,
                waiters: 0,
            }),
            released: Condvar::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Pool

/// Simulated fixed-size block pool.
pub struct Pool {
    free: spin::Mutex<FreeList>,
}

struct FreeSlot {
    next: *mut FreeSlot,
}

struct FreeList {
    head: *mut FreeSlot,
}

// SAFETY: the list links slots of storage owned by the pool; it is only
// touched under the spin lock.
unsafe impl Send for FreeList {}

impl FreeList {
    fn pop(&mut self) -> Option<NonNull<u8>> {
        let slot = NonNull::new(self.head)?;
        // SAFETY: every slot on the list was pushed by `push` and is unused.
        self.head = unsafe { slot.as_ref().next };
        Some(slot.cast())
    }

    /// # Safety
    ///
    /// `slot` is a pool slot, suitably aligned, not on the list and unused.
    unsafe fn push(&mut self, slot: NonNull<u8>) {
        let slot = slot.cast::<FreeSlot>().as_ptr();
        // SAFETY: caller contract.
        unsafe { slot.write(FreeSlot { next: self.head }) };
        self.head = slot;
    }
}

fn pool_slot_size(object_size: usize) -> usize {
    let align = core::mem::align_of::<FreeSlot>().max(HEAP_ALIGN);
    let size = object_size.max(core::mem::size_of::<FreeSlot>());
    (size + align - 1) & !(align - 1)
}

// ---------------------------------------------------------------------------
// Mailbox

/// Simulated mailbox of message words.
pub struct Mailbox {
    ring: StdMutex<Ring>,
    not_empty: Condvar,
    not_full: Condvar,
}

struct Ring {
    buf: *mut Msg,
    capacity: usize,
    head: usize,
    len: usize,
    receivers: usize,
}

// SAFETY: `buf` is owned by the mailbox and only touched under its lock.
unsafe impl Send for Ring {}

impl Ring {
    fn is_full(&self) -> bool {
        self.len == self.capacity
    }

    fn push(&mut self, msg: Msg) {
        let tail = (self.head + self.len) % self.capacity;
        // SAFETY: `tail < capacity` and the buffer holds `capacity` words.
        unsafe { self.buf.add(tail).write(msg) };
        self.len += 1;
    }

    fn pop(&mut self) -> Msg {
        // SAFETY: `head < capacity` and holds a message since `len > 0`.
        let msg = unsafe { self.buf.add(self.head).read() };
        self.head = (self.head + 1) % self.capacity;
        self.len -= 1;
        msg
    }
}

// ---------------------------------------------------------------------------
// Threads

/// Control block of a simulated thread.
pub struct Tcb {
    id: thread::ThreadId,
    name: &'static str,
    terminate: AtomicBool,
    stack_base: usize,
    stack_words: usize,
    clock: StdMutex<RunClock>,
    join: StdMutex<Option<JoinHandle<()>>>,
}

/// Time a thread spent running, as opposed to waiting in the kernel.
struct RunClock {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl RunClock {
    fn settle(&mut self) {
        if let Some(since) = self.running_since {
            let now = Instant::now();
            self.accumulated += now - since;
            self.running_since = Some(now);
        }
    }
}

impl Tcb {
    fn start_running(&self) {
        host_lock(&self.clock).running_since = Some(Instant::now());
    }

    fn stop_running(&self) {
        let mut clock = host_lock(&self.clock);
        clock.settle();
        clock.running_since = None;
    }
}

/// Handle to a simulated thread.
pub type Thread = Arc<Tcb>;

thread_local! {
    static CURRENT: RefCell<Option<Thread>> = const { RefCell::new(None) };
}

/// Stops the run clock of the calling task while it waits in the kernel.
struct Blocked(Option<Thread>);

impl Blocked {
    fn enter() -> Self {
        let tcb = CURRENT.with(|c| c.borrow().clone());
        if let Some(tcb) = &tcb {
            tcb.stop_running();
        }
        Blocked(tcb)
    }
}

impl Drop for Blocked {
    fn drop(&mut self) {
        if let Some(tcb) = &self.0 {
            tcb.start_running();
        }
    }
}

/// Runs on the new host thread.
fn thread_main(tcb: Thread, entry: fn(usize), arg: usize) {
    CURRENT.with(|c| *c.borrow_mut() = Some(tcb.clone()));
    tcb.start_running();
    log::trace!("task {} started", tcb.name);

    entry(arg);

    tcb.stop_running();
    log::trace!("task {} exited", tcb.name);
    CURRENT.with(|c| c.borrow_mut().take());
}

impl HostedKernel {
    /// Runs `f` as if it were an interrupt handler preempting the caller.
    ///
    /// The global lock is held for the duration, so the handler is atomic
    /// with respect to every critical section in the system.
    pub fn interrupt<R>(f: impl FnOnce(&IsrContext<'_>) -> R) -> R {
        struct Release;
        impl Drop for Release {
            fn drop(&mut self) {
                HostedKernel::sys_unlock();
            }
        }

        Self::sys_lock();
        let _release = Release;
        // SAFETY: the global lock stands in for masked interrupts and the
        // token cannot escape the closure.
        unsafe { IsrContext::enter(f) }
    }

    /// Moves the tick counter so that it reads `ticks` now.
    ///
    /// Lets tests reach the wraparound point without waiting for it.
    pub fn set_tick_count(ticks: Ticks) {
        TICK_OFFSET.store(ticks.wrapping_sub(elapsed_ticks()), Ordering::Relaxed);
    }

    /// Bytes used in the kernel heap.
    pub fn core_used() -> usize {
        core_heap().used()
    }
}

// SAFETY: the global lock is a real reentrant lock, mailboxes are FIFO ring
// buffers and the pool free list hands out each slot once.
unsafe impl SyncKernel for HostedKernel {
    type ThreadId = thread::ThreadId;
    type Mutex = RawMutex;
    type Pool = Pool;
    type Mailbox = Mailbox;
    type Thread = Thread;

    const TICK_HZ: u32 = TICK_HZ;
    const IDLE_PRIORITY: Priority = 1;
    const MAX_PRIORITY: Priority = 255;
    const STACK_FILL_WORD: u32 = STACK_FILL_WORD;

    fn sys_lock() {
        let me = thread::current().id();
        let mut state = host_lock(&SYS_STATE);
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => {
                    state = SYS_RELEASED
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn sys_unlock() {
        let me = thread::current().id();
        let mut state = host_lock(&SYS_STATE);
        pios_assert!(state.owner == Some(me), "critical section left by a non-owner");
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            SYS_RELEASED.notify_one();
        }
    }

    fn now() -> Ticks {
        elapsed_ticks().wrapping_add(TICK_OFFSET.load(Ordering::Relaxed))
    }

    fn sleep(ticks: Ticks) {
        if ticks == 0 {
            thread::yield_now();
            return;
        }
        let _blocked = Blocked::enter();
        thread::sleep(ticks_to_duration(ticks));
    }

    fn current_thread() -> Self::ThreadId {
        thread::current().id()
    }

    fn core_alloc(layout: Layout) -> Option<NonNull<u8>> {
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: non-zero size checked above.
        NonNull::new(unsafe { core_heap().alloc(layout) })
    }

    fn core_status() -> usize {
        core_heap().free()
    }

    unsafe fn mutex_init(mutex: *mut Self::Mutex) {
        // SAFETY: caller contract.
        unsafe { mutex.write(RawMutex::new()) };
    }

    fn mutex_lock(mutex: &Self::Mutex, timeout: TickTimeout) -> bool {
        let me = thread::current().id();
        let mut state = host_lock(&mutex.state);
        if state.owner.is_none() {
            state.owner = Some(me);
            return true;
        }
        if timeout == TickTimeout::IMMEDIATE {
            return false;
        }
        pios_assert!(
            !(state.owner == Some(me) && timeout == TickTimeout::Infinite),
            "mutex relocked by its owner without a timeout"
        );

        let _blocked = Blocked::enter();
        state.waiters += 1;
        let (mut state, acquired) =
            wait_until(&mutex.released, state, deadline(timeout), |s| s.owner.is_none());
        state.waiters -= 1;
        if acquired {
            state.owner = Some(me);
        }
        acquired
    }

    fn mutex_unlock(mutex: &Self::Mutex) -> bool {
        let mut state = host_lock(&mutex.state);
        if state.owner != Some(thread::current().id()) {
            return false;
        }
        state.owner = None;
        mutex.released.notify_one();
        true
    }

    fn mutex_try_lock_i(mutex: &Self::Mutex, _cx: &IsrContext<'_>) -> IsrOutcome {
        let mut state = host_lock(&mutex.state);
        if state.owner.is_some() {
            return IsrOutcome::REJECTED;
        }
        state.owner = Some(thread::current().id());
        IsrOutcome {
            accepted: true,
            woken: false,
        }
    }

    fn mutex_unlock_i(mutex: &Self::Mutex, _cx: &IsrContext<'_>) -> IsrOutcome {
        let mut state = host_lock(&mutex.state);
        if state.owner.is_none() {
            return IsrOutcome::REJECTED;
        }
        state.owner = None;
        mutex.released.notify_one();
        IsrOutcome {
            accepted: true,
            woken: state.waiters > 0,
        }
    }

    fn pool_layout(object_size: usize, count: usize) -> Option<Layout> {
        let slot = pool_slot_size(object_size);
        let align = core::mem::align_of::<FreeSlot>().max(HEAP_ALIGN);
        Layout::from_size_align(slot.checked_mul(count)?, align).ok()
    }

    unsafe fn pool_init(
        pool: *mut Self::Pool,
        storage: NonNull<u8>,
        object_size: usize,
        count: usize,
    ) {
        let slot = pool_slot_size(object_size);
        let mut free = FreeList {
            head: ptr::null_mut(),
        };
        for i in (0..count).rev() {
            // SAFETY: `storage` spans `count` slots of `slot` bytes, each
            // aligned for a free-list link.
            unsafe { free.push(NonNull::new_unchecked(storage.as_ptr().add(i * slot))) };
        }
        // SAFETY: caller contract.
        unsafe {
            pool.write(Pool {
                free: spin::Mutex::new(free),
            })
        };
    }

    fn pool_alloc(pool: &Self::Pool) -> Option<NonNull<u8>> {
        pool.free.lock().pop()
    }

    fn pool_alloc_i(pool: &Self::Pool, _cx: &IsrContext<'_>) -> Option<NonNull<u8>> {
        pool.free.lock().pop()
    }

    unsafe fn pool_free(pool: &Self::Pool, slot: NonNull<u8>) {
        // SAFETY: caller contract.
        unsafe { pool.free.lock().push(slot) };
    }

    unsafe fn pool_free_i(pool: &Self::Pool, slot: NonNull<u8>, _cx: &IsrContext<'_>) {
        // SAFETY: caller contract.
        unsafe { pool.free.lock().push(slot) };
    }

    fn mailbox_layout(capacity: usize) -> Option<Layout> {
        Layout::array::<Msg>(capacity).ok()
    }

    unsafe fn mailbox_init(mailbox: *mut Self::Mailbox, storage: NonNull<u8>, capacity: usize) {
        let ring = Ring {
            buf: storage.cast::<Msg>().as_ptr(),
            capacity,
            head: 0,
            len: 0,
            receivers: 0,
        };
        // SAFETY: caller contract.
        unsafe {
            mailbox.write(Mailbox {
                ring: StdMutex::new(ring),
                not_empty: Condvar::new(),
                not_full: Condvar::new(),
            })
        };
    }

    fn mailbox_post(mailbox: &Self::Mailbox, msg: Msg, timeout: TickTimeout) -> bool {
        let mut ring = host_lock(&mailbox.ring);
        if ring.capacity == 0 {
            return false;
        }
        if ring.is_full() {
            if timeout == TickTimeout::IMMEDIATE {
                return false;
            }
            let _blocked = Blocked::enter();
            let (guard, room) =
                wait_until(&mailbox.not_full, ring, deadline(timeout), |r| !r.is_full());
            ring = guard;
            if !room {
                return false;
            }
        }
        ring.push(msg);
        mailbox.not_empty.notify_one();
        true
    }

    fn mailbox_post_i(mailbox: &Self::Mailbox, msg: Msg, _cx: &IsrContext<'_>) -> IsrOutcome {
        let mut ring = host_lock(&mailbox.ring);
        if ring.capacity == 0 || ring.is_full() {
            return IsrOutcome::REJECTED;
        }
        ring.push(msg);
        mailbox.not_empty.notify_one();
        IsrOutcome {
            accepted: true,
            woken: ring.receivers > 0,
        }
    }

    fn mailbox_fetch(mailbox: &Self::Mailbox, timeout: TickTimeout) -> Option<Msg> {
        let mut ring = host_lock(&mailbox.ring);
        if ring.len == 0 {
            if timeout == TickTimeout::IMMEDIATE {
                return None;
            }
            let _blocked = Blocked::enter();
            ring.receivers += 1;
            let (guard, ready) =
                wait_until(&mailbox.not_empty, ring, deadline(timeout), |r| r.len > 0);
            ring = guard;
            ring.receivers -= 1;
            if !ready {
                return None;
            }
        }
        let msg = ring.pop();
        mailbox.not_full.notify_one();
        Some(msg)
    }

    fn mailbox_len(mailbox: &Self::Mailbox) -> usize {
        host_lock(&mailbox.ring).len
    }

    fn thread_create(spec: ThreadSpec) -> Option<Self::Thread> {
        let words = spec.stack_bytes / core::mem::size_of::<u32>();
        let layout = Layout::from_size_align(words * core::mem::size_of::<u32>(), HEAP_ALIGN).ok()?;
        let stack = Self::core_alloc(layout)?.cast::<u32>();
        // SAFETY: `stack` spans `words` freshly allocated words.
        unsafe {
            let region = core::slice::from_raw_parts_mut(stack.as_ptr(), words);
            region.fill(STACK_FILL_WORD);
            let frame = words.saturating_sub(INITIAL_FRAME_WORDS);
            region[frame..].fill(0);
        }

        log::debug!(
            "creating task {} ({} stack words, priority {} ignored on host)",
            spec.name,
            words,
            spec.priority
        );

        let (tx, rx) = mpsc::channel::<Thread>();
        let entry = spec.entry;
        let arg = spec.arg;
        let spawned = thread::Builder::new()
            .name(spec.name.into())
            .stack_size(HOST_STACK_SIZE)
            .spawn(move || {
                if let Ok(tcb) = rx.recv() {
                    thread_main(tcb, entry, arg);
                }
            });

        let join = match spawned {
            Ok(join) => join,
            Err(e) => {
                log::warn!("failed to spawn host thread for {}: {}", spec.name, e);
                // SAFETY: allocated above with the same layout, never shared.
                unsafe { core_heap().dealloc(stack.cast().as_ptr(), layout) };
                return None;
            }
        };

        let tcb = Arc::new(Tcb {
            id: join.thread().id(),
            name: spec.name,
            terminate: AtomicBool::new(false),
            stack_base: stack.as_ptr() as usize,
            stack_words: words,
            clock: StdMutex::new(RunClock {
                accumulated: Duration::ZERO,
                running_since: None,
            }),
            join: StdMutex::new(Some(join)),
        });
        // The receiver only goes away if the new thread died before running.
        let _ = tx.send(tcb.clone());
        Some(tcb)
    }

    fn thread_current() -> Option<Self::Thread> {
        CURRENT.with(|c| c.borrow().clone())
    }

    fn thread_id(thread: &Self::Thread) -> Self::ThreadId {
        thread.id
    }

    fn thread_terminate(thread: &Self::Thread) {
        thread.terminate.store(true, Ordering::Release);
    }

    fn thread_should_terminate() -> bool {
        CURRENT.with(|c| {
            c.borrow()
                .as_ref()
                .is_some_and(|tcb| tcb.terminate.load(Ordering::Acquire))
        })
    }

    fn thread_wait(thread: Self::Thread) {
        let join = host_lock(&thread.join).take();
        if let Some(join) = join {
            let _blocked = Blocked::enter();
            if join.join().is_err() {
                log::warn!("task {} panicked", thread.name);
            }
        }
    }

    fn thread_take_ticks(thread: &Self::Thread) -> Ticks {
        let mut clock = host_lock(&thread.clock);
        clock.settle();
        let ms = clock.accumulated.as_millis() as u64;
        clock.accumulated -= Duration::from_millis(ms);
        (ms * u64::from(TICK_HZ) / 1000) as Ticks
    }

    fn thread_stack(thread: &Self::Thread) -> Option<(NonNull<u32>, usize)> {
        let base = NonNull::new(thread.stack_base as *mut u32)?;
        Some((base, thread.stack_words))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sys_lock_nests() {
        HostedKernel::sys_lock();
        HostedKernel::sys_lock();
        HostedKernel::sys_unlock();
        HostedKernel::sys_unlock();

        // Fully released: another thread can take it.
        thread::spawn(|| {
            HostedKernel::sys_lock();
            HostedKernel::sys_unlock();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_pool_hands_out_each_slot_once() {
        let layout = HostedKernel::pool_layout(3, 4).unwrap();
        let storage = HostedKernel::core_alloc(layout).unwrap();
        let mut pool = MaybeUninit::<Pool>::uninit();
        unsafe { HostedKernel::pool_init(pool.as_mut_ptr(), storage, 3, 4) };
        let pool = unsafe { pool.assume_init_ref() };

        let slots: Vec<_> = (0..4).map(|_| HostedKernel::pool_alloc(pool).unwrap()).collect();
        assert!(HostedKernel::pool_alloc(pool).is_none());
        for (i, a) in slots.iter().enumerate() {
            assert_eq!(a.as_ptr() as usize % HEAP_ALIGN, 0);
            for b in &slots[i + 1..] {
                assert_ne!(a, b);
            }
        }

        unsafe { HostedKernel::pool_free(pool, slots[2]) };
        assert_eq!(HostedKernel::pool_alloc(pool), Some(slots[2]));
    }

    #[test]
    fn test_mailbox_is_fifo_and_bounded() {
        let layout = HostedKernel::mailbox_layout(2).unwrap();
        let storage = HostedKernel::core_alloc(layout).unwrap();
        let mut mb = MaybeUninit::<Mailbox>::uninit();
        unsafe { HostedKernel::mailbox_init(mb.as_mut_ptr(), storage, 2) };
        let mb = unsafe { mb.assume_init_ref() };

        assert!(HostedKernel::mailbox_post(mb, 1, TickTimeout::IMMEDIATE));
        assert!(HostedKernel::mailbox_post(mb, 2, TickTimeout::IMMEDIATE));
        assert!(!HostedKernel::mailbox_post(mb, 3, TickTimeout::Ticks(5)));
        assert_eq!(HostedKernel::mailbox_len(mb), 2);
        assert_eq!(HostedKernel::mailbox_fetch(mb, TickTimeout::IMMEDIATE), Some(1));
        assert!(HostedKernel::mailbox_post(mb, 3, TickTimeout::IMMEDIATE));
        assert_eq!(HostedKernel::mailbox_fetch(mb, TickTimeout::IMMEDIATE), Some(2));
        assert_eq!(HostedKernel::mailbox_fetch(mb, TickTimeout::IMMEDIATE), Some(3));
        assert_eq!(HostedKernel::mailbox_fetch(mb, TickTimeout::Ticks(5)), None);
    }

    #[test]
    fn test_mutex_timeout() {
        let mut m = MaybeUninit::<RawMutex>::uninit();
        unsafe { HostedKernel::mutex_init(m.as_mut_ptr()) };
        let m: &'static RawMutex = Box::leak(Box::new(unsafe { m.assume_init() }));

        assert!(HostedKernel::mutex_lock(m, TickTimeout::Infinite));
        let other = thread::spawn(move || {
            let start = Instant::now();
            let got = HostedKernel::mutex_lock(m, TickTimeout::Ticks(20));
            (got, start.elapsed())
        });
        let (got, waited) = other.join().unwrap();
        assert!(!got);
        assert!(waited >= Duration::from_millis(20));
        assert!(HostedKernel::mutex_unlock(m));
    }
}
