//! Azure RTOS ThreadX backend.
//!
//! | Kernel concept | ThreadX object |
//! |----------------|----------------|
//! | global lock | `tx_thread_interrupt_control`, nested |
//! | tick counter | `tx_time_get` |
//! | kernel heap | `TX_BYTE_POOL` over a region handed to [`ThreadxKernel::init`] |
//! | mutex | `TX_MUTEX` with priority inheritance |
//! | pool | `TX_BLOCK_POOL` |
//! | mailbox | `TX_QUEUE` of one-word messages |
//! | thread | `TX_THREAD` + stack, both from the byte pool |
//!
//! ThreadX priorities run 0 (most urgent) to 31; the crate's run the other
//! way, so they are mirrored. ThreadX mutexes cannot be taken or released
//! from interrupt context, so the ISR mutex operations are refused. They
//! also nest for their owner, so a relock by the owner is turned into a
//! failed wait here.
//!
//! # Start-up
//!
//! ```ignore
//! #[no_mangle]
//! extern "C" fn tx_application_define(_first_unused_memory: *mut core::ffi::c_void) {
//!     static HEAP: StaticCell<[u8; 64 * 1024]> = StaticCell::new();
//!     ThreadxKernel::init(HEAP.init([0; 64 * 1024]));
//!     // create tasks, queues, mutexes ...
//! }
//! ```

use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::ffi::c_void;
use core::mem::{self, MaybeUninit};
use core::ptr::{self, NonNull};
use core::sync::atomic::{compiler_fence, AtomicBool, AtomicPtr, AtomicU32, Ordering};

use byte_strings::c;
use static_cell::StaticCell;
use threadx_sys::{
    CHAR, TX_BLOCK_POOL, TX_BYTE_POOL, TX_COMPLETED, TX_INHERIT, TX_INT_DISABLE, TX_MUTEX,
    TX_NO_TIME_SLICE, TX_NO_WAIT, TX_QUEUE, TX_SUCCESS, TX_TERMINATED, TX_THREAD, TX_WAIT_FOREVER,
    TX_1_ULONG, UINT, ULONG,
};

use super::{IsrContext, IsrOutcome, Msg, Priority, SyncKernel, ThreadSpec, TickTimeout};
use crate::config::threadx::{LOWEST_PRIORITY, NAME_LEN, TICK_HZ};
use crate::time::Ticks;

/// Word ThreadX writes into new stacks when stack checking is enabled
/// (`TX_STACK_FILL`). Stacks are pre-filled with it here as well, so the
/// high-water mark works either way.
const TX_STACK_FILL: u32 = 0xEFEF_EFEF;

/// Marks thread records created by this backend.
const TASK_MAGIC: u32 = 0x5049_4f53;

/// Alignment `tx_byte_allocate` guarantees.
const BYTE_POOL_ALIGN: usize = mem::size_of::<ULONG>();

const _: () = assert!(mem::size_of::<Msg>() == mem::size_of::<ULONG>());

/// The ThreadX kernel.
#[derive(Debug)]
pub enum ThreadxKernel {}

static LOCK_DEPTH: AtomicU32 = AtomicU32::new(0);
static SAVED_POSTURE: AtomicU32 = AtomicU32::new(0);

static BYTE_POOL: StaticCell<TX_BYTE_POOL> = StaticCell::new();
static CORE_POOL: AtomicPtr<TX_BYTE_POOL> = AtomicPtr::new(ptr::null_mut());

fn wait_option(timeout: TickTimeout) -> ULONG {
    match timeout {
        TickTimeout::Infinite => TX_WAIT_FOREVER,
        // A finite wait must never turn into TX_WAIT_FOREVER.
        TickTimeout::Ticks(t) => t.min(TX_WAIT_FOREVER - 1),
    }
}

fn check(status: UINT, what: &str) -> bool {
    if status == TX_SUCCESS {
        true
    } else {
        log::warn!("{} failed with status {:#x}", what, status);
        false
    }
}

/// `TX_MUTEX` control block.
#[repr(transparent)]
pub struct TxMutex(UnsafeCell<TX_MUTEX>);

/// `TX_BLOCK_POOL` control block.
#[repr(transparent)]
pub struct TxPool(UnsafeCell<TX_BLOCK_POOL>);

/// `TX_QUEUE` control block.
#[repr(transparent)]
pub struct TxMailbox(UnsafeCell<TX_QUEUE>);

// SAFETY: ThreadX serializes every operation on its control blocks
// internally.
unsafe impl Send for TxMutex {}
unsafe impl Sync for TxMutex {}
unsafe impl Send for TxPool {}
unsafe impl Sync for TxPool {}
unsafe impl Send for TxMailbox {}
unsafe impl Sync for TxMailbox {}

/// Thread record: the control block first, so a `TX_THREAD` pointer from
/// `tx_thread_identify` can be turned back into the record.
#[repr(C)]
pub struct TxTask {
    tcb: TX_THREAD,
    magic: u32,
    entry: fn(usize),
    arg: usize,
    terminate: AtomicBool,
    name: heapless::Vec<u8, NAME_LEN>,
}

/// Handle to a thread created by this backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxThread(NonNull<TxTask>);

// SAFETY: records are never freed and their mutable state is either atomic
// or owned by ThreadX.
unsafe impl Send for TxThread {}
unsafe impl Sync for TxThread {}

impl TxThread {
    fn tcb(self) -> *mut TX_THREAD {
        // `tcb` is the first field of a repr(C) struct.
        self.0.as_ptr().cast()
    }

    fn task(&self) -> &TxTask {
        // SAFETY: records live forever.
        unsafe { self.0.as_ref() }
    }
}

unsafe extern "C" fn task_trampoline(input: ULONG) {
    // SAFETY: `input` is the record address passed by `thread_create`.
    let task = unsafe { &*(input as usize as *const TxTask) };
    (task.entry)(task.arg);
}

fn tx_priority(priority: Priority) -> UINT {
    LOWEST_PRIORITY - priority.min(LOWEST_PRIORITY)
}

impl ThreadxKernel {
    /// Creates the kernel heap over `region`.
    ///
    /// Call once from `tx_application_define`, before any object is created.
    pub fn init(region: &'static mut [u8]) {
        let pool = BYTE_POOL.uninit().as_mut_ptr();
        // SAFETY: `pool` is fresh static storage and `region` is ours for
        // the rest of the program.
        let status = unsafe {
            threadx_sys::_tx_byte_pool_create(
                pool,
                c!("pios-heap").as_ptr() as *mut CHAR,
                region.as_mut_ptr().cast(),
                region.len() as ULONG,
            )
        };
        pios_assert!(check(status, "tx_byte_pool_create"), "kernel heap creation failed");
        CORE_POOL.store(pool, Ordering::Release);
        log::debug!("kernel heap of {} bytes at {:p}", region.len(), region.as_ptr());
    }

    fn byte_pool() -> Option<*mut TX_BYTE_POOL> {
        let pool = CORE_POOL.load(Ordering::Acquire);
        if pool.is_null() {
            log::error!("kernel heap used before ThreadxKernel::init");
            None
        } else {
            Some(pool)
        }
    }
}

// SAFETY: interrupt masking gives mutual exclusion on the single core;
// TX_QUEUE is FIFO; TX_BLOCK_POOL hands out each block once.
unsafe impl SyncKernel for ThreadxKernel {
    type ThreadId = usize;
    type Mutex = TxMutex;
    type Pool = TxPool;
    type Mailbox = TxMailbox;
    type Thread = TxThread;

    const TICK_HZ: u32 = TICK_HZ;
    const IDLE_PRIORITY: Priority = 0;
    const MAX_PRIORITY: Priority = LOWEST_PRIORITY;
    const STACK_FILL_WORD: u32 = TX_STACK_FILL;

    fn sys_lock() {
        // SAFETY: plain interrupt-posture change.
        let previous = unsafe { threadx_sys::_tx_thread_interrupt_control(TX_INT_DISABLE) };
        // Interrupts are now off: nothing else touches the counters.
        if LOCK_DEPTH.load(Ordering::Relaxed) == 0 {
            SAVED_POSTURE.store(previous, Ordering::Relaxed);
        }
        LOCK_DEPTH.fetch_add(1, Ordering::Relaxed);
        compiler_fence(Ordering::Acquire);
    }

    fn sys_unlock() {
        compiler_fence(Ordering::Release);
        let depth = LOCK_DEPTH.load(Ordering::Relaxed);
        pios_assert!(depth > 0, "critical section left more often than entered");
        LOCK_DEPTH.store(depth - 1, Ordering::Relaxed);
        if depth == 1 {
            // SAFETY: restores the posture saved by the outermost lock.
            unsafe {
                threadx_sys::_tx_thread_interrupt_control(SAVED_POSTURE.load(Ordering::Relaxed));
            }
        }
    }

    fn now() -> Ticks {
        // SAFETY: reads the system clock.
        unsafe { threadx_sys::_tx_time_get() }
    }

    fn sleep(ticks: Ticks) {
        // SAFETY: called from thread context.
        unsafe {
            if ticks == 0 {
                threadx_sys::_tx_thread_relinquish();
            } else {
                threadx_sys::_tx_thread_sleep(ticks);
            }
        }
    }

    fn current_thread() -> Self::ThreadId {
        // SAFETY: returns null outside thread context.
        unsafe { threadx_sys::_tx_thread_identify() as usize }
    }

    fn core_alloc(layout: Layout) -> Option<NonNull<u8>> {
        let pool = Self::byte_pool()?;
        let padding = layout.align().saturating_sub(BYTE_POOL_ALIGN);
        let size = layout.size().checked_add(padding)?;
        let mut block: *mut c_void = ptr::null_mut();
        // SAFETY: `pool` was created by `init`.
        let status = unsafe {
            threadx_sys::_tx_byte_allocate(pool, &mut block, size as ULONG, TX_NO_WAIT)
        };
        if status != TX_SUCCESS {
            return None;
        }
        let addr = block as usize;
        let aligned = (addr + layout.align() - 1) & !(layout.align() - 1);
        NonNull::new(aligned as *mut u8)
    }

    fn core_status() -> usize {
        match Self::byte_pool() {
            // SAFETY: plain field read of a created pool.
            Some(pool) => unsafe { ptr::read_volatile(&(*pool).tx_byte_pool_available) as usize },
            None => 0,
        }
    }

    unsafe fn mutex_init(mutex: *mut Self::Mutex) {
        // SAFETY: caller contract.
        unsafe {
            let cb = UnsafeCell::raw_get(ptr::addr_of_mut!((*mutex).0));
            cb.write_bytes(0, 1);
            let status = threadx_sys::_tx_mutex_create(cb, c!("pios-mutex").as_ptr() as *mut CHAR, TX_INHERIT);
            pios_assert!(check(status, "tx_mutex_create"), "mutex creation failed");
        }
    }

    fn mutex_lock(mutex: &Self::Mutex, timeout: TickTimeout) -> bool {
        let cb = mutex.0.get();
        // TX_MUTEX nests for its owner; a plain mutex stays held instead.
        // SAFETY: identity query and a plain field read.
        let relock = unsafe {
            let me = threadx_sys::_tx_thread_identify();
            !me.is_null() && ptr::read_volatile(ptr::addr_of!((*cb).tx_mutex_owner)) == me
        };
        if relock {
            match timeout {
                TickTimeout::Ticks(0) => {}
                TickTimeout::Ticks(ticks) => Self::sleep(ticks),
                TickTimeout::Infinite => {
                    pios_assert!(false, "mutex relocked by its owner without a timeout")
                }
            }
            return false;
        }
        // SAFETY: created by `mutex_init`.
        unsafe { threadx_sys::_tx_mutex_get(cb, wait_option(timeout)) == TX_SUCCESS }
    }

    fn mutex_unlock(mutex: &Self::Mutex) -> bool {
        // SAFETY: created by `mutex_init`.
        unsafe { threadx_sys::_tx_mutex_put(mutex.0.get()) == TX_SUCCESS }
    }

    fn mutex_try_lock_i(_mutex: &Self::Mutex, _cx: &IsrContext<'_>) -> IsrOutcome {
        log::warn!("ThreadX mutexes cannot be taken from interrupt context");
        IsrOutcome::REJECTED
    }

    fn mutex_unlock_i(_mutex: &Self::Mutex, _cx: &IsrContext<'_>) -> IsrOutcome {
        log::warn!("ThreadX mutexes cannot be released from interrupt context");
        IsrOutcome::REJECTED
    }

    fn pool_layout(object_size: usize, count: usize) -> Option<Layout> {
        let block = (object_size.max(1) + BYTE_POOL_ALIGN - 1) & !(BYTE_POOL_ALIGN - 1);
        let per_block = block + mem::size_of::<*mut u8>();
        Layout::from_size_align(per_block.checked_mul(count)?, BYTE_POOL_ALIGN).ok()
    }

    unsafe fn pool_init(
        pool: *mut Self::Pool,
        storage: NonNull<u8>,
        object_size: usize,
        count: usize,
    ) {
        let Some(layout) = Self::pool_layout(object_size, count) else {
            pios_assert!(false, "pool layout overflow");
            return;
        };
        // SAFETY: caller contract.
        unsafe {
            let cb = UnsafeCell::raw_get(ptr::addr_of_mut!((*pool).0));
            cb.write_bytes(0, 1);
            let status = threadx_sys::_tx_block_pool_create(
                cb,
                c!("pios-pool").as_ptr() as *mut CHAR,
                object_size.max(1) as ULONG,
                storage.as_ptr().cast(),
                layout.size() as ULONG,
            );
            pios_assert!(check(status, "tx_block_pool_create"), "pool creation failed");
        }
    }

    fn pool_alloc(pool: &Self::Pool) -> Option<NonNull<u8>> {
        let mut block: *mut c_void = ptr::null_mut();
        // SAFETY: created by `pool_init`.
        let status = unsafe { threadx_sys::_tx_block_allocate(pool.0.get(), &mut block, TX_NO_WAIT) };
        if status == TX_SUCCESS {
            NonNull::new(block.cast())
        } else {
            None
        }
    }

    fn pool_alloc_i(pool: &Self::Pool, _cx: &IsrContext<'_>) -> Option<NonNull<u8>> {
        // tx_block_allocate with TX_NO_WAIT is ISR-safe.
        Self::pool_alloc(pool)
    }

    unsafe fn pool_free(_pool: &Self::Pool, slot: NonNull<u8>) {
        // SAFETY: caller contract; ThreadX finds the pool from the block
        // header.
        let status = unsafe { threadx_sys::_tx_block_release(slot.as_ptr().cast()) };
        check(status, "tx_block_release");
    }

    unsafe fn pool_free_i(pool: &Self::Pool, slot: NonNull<u8>, _cx: &IsrContext<'_>) {
        // SAFETY: caller contract.
        unsafe { Self::pool_free(pool, slot) };
    }

    fn mailbox_layout(capacity: usize) -> Option<Layout> {
        Layout::array::<ULONG>(capacity).ok()
    }

    unsafe fn mailbox_init(mailbox: *mut Self::Mailbox, storage: NonNull<u8>, capacity: usize) {
        // SAFETY: caller contract.
        unsafe {
            let cb = UnsafeCell::raw_get(ptr::addr_of_mut!((*mailbox).0));
            cb.write_bytes(0, 1);
            let status = threadx_sys::_tx_queue_create(
                cb,
                c!("pios-queue").as_ptr() as *mut CHAR,
                TX_1_ULONG,
                storage.as_ptr().cast(),
                (capacity * mem::size_of::<ULONG>()) as ULONG,
            );
            pios_assert!(check(status, "tx_queue_create"), "mailbox creation failed");
        }
    }

    fn mailbox_post(mailbox: &Self::Mailbox, msg: Msg, timeout: TickTimeout) -> bool {
        let mut word = msg as ULONG;
        // SAFETY: created by `mailbox_init`; ThreadX copies the word.
        unsafe {
            threadx_sys::_tx_queue_send(
                mailbox.0.get(),
                ptr::addr_of_mut!(word).cast(),
                wait_option(timeout),
            ) == TX_SUCCESS
        }
    }

    fn mailbox_post_i(mailbox: &Self::Mailbox, msg: Msg, _cx: &IsrContext<'_>) -> IsrOutcome {
        let cb = mailbox.0.get();
        // Receivers only suspend on an empty queue; a send hands the word
        // straight to the first of them.
        // SAFETY: field reads with interrupts masked by the caller.
        let receiver_waiting = unsafe {
            ptr::read_volatile(&(*cb).tx_queue_enqueued) == 0
                && ptr::read_volatile(&(*cb).tx_queue_suspended_count) > 0
        };
        let accepted = Self::mailbox_post(mailbox, msg, TickTimeout::IMMEDIATE);
        IsrOutcome {
            accepted,
            woken: accepted && receiver_waiting,
        }
    }

    fn mailbox_fetch(mailbox: &Self::Mailbox, timeout: TickTimeout) -> Option<Msg> {
        let mut word: ULONG = 0;
        // SAFETY: created by `mailbox_init`; the message is one word.
        let status = unsafe {
            threadx_sys::_tx_queue_receive(
                mailbox.0.get(),
                ptr::addr_of_mut!(word).cast(),
                wait_option(timeout),
            )
        };
        (status == TX_SUCCESS).then_some(word as Msg)
    }

    fn mailbox_len(mailbox: &Self::Mailbox) -> usize {
        // SAFETY: plain field read.
        unsafe { ptr::read_volatile(&(*mailbox.0.get()).tx_queue_enqueued) as usize }
    }

    fn thread_create(spec: ThreadSpec) -> Option<Self::Thread> {
        let record = Self::core_alloc(Layout::new::<TxTask>())?.cast::<MaybeUninit<TxTask>>();
        let stack_layout = Layout::from_size_align(spec.stack_bytes, 8).ok()?;
        let stack = Self::core_alloc(stack_layout)?;

        // SAFETY: `stack` spans `stack_bytes` fresh bytes, 8-aligned.
        unsafe {
            core::slice::from_raw_parts_mut(stack.as_ptr().cast::<u32>(), spec.stack_bytes / 4)
                .fill(TX_STACK_FILL);
        }

        let mut name = heapless::Vec::<u8, NAME_LEN>::new();
        for b in spec.name.bytes().take(NAME_LEN - 1) {
            // Cannot fail: at most NAME_LEN - 1 bytes are pushed.
            let _ = name.push(b);
        }
        let _ = name.push(0);

        // SAFETY: `record` is fresh storage for a `TxTask` that never moves.
        let task = unsafe {
            let task = (*record.as_ptr()).write(TxTask {
                tcb: mem::zeroed(),
                magic: TASK_MAGIC,
                entry: spec.entry,
                arg: spec.arg,
                terminate: AtomicBool::new(false),
                name,
            });
            NonNull::from(task)
        };
        let thread = TxThread(task);
        let priority = tx_priority(spec.priority);

        // SAFETY: every pointer handed over lives forever.
        let status = unsafe {
            threadx_sys::_tx_thread_create(
                thread.tcb(),
                thread.task().name.as_ptr() as *mut CHAR,
                Some(task_trampoline),
                task.as_ptr() as usize as ULONG,
                stack.as_ptr().cast(),
                spec.stack_bytes as ULONG,
                priority,
                priority,
                TX_NO_TIME_SLICE,
                threadx_sys::TX_AUTO_START,
            )
        };
        check(status, "tx_thread_create").then_some(thread)
    }

    fn thread_current() -> Option<Self::Thread> {
        // SAFETY: null outside thread context.
        let tcb = unsafe { threadx_sys::_tx_thread_identify() };
        let task = NonNull::new(tcb.cast::<TxTask>())?;
        // SAFETY: every TX_THREAD is at least as large as the record prefix
        // read here only if it carries our magic.
        let ours = unsafe { ptr::read_volatile(ptr::addr_of!((*task.as_ptr()).magic)) == TASK_MAGIC };
        ours.then_some(TxThread(task))
    }

    fn thread_id(thread: &Self::Thread) -> Self::ThreadId {
        thread.tcb() as usize
    }

    fn thread_terminate(thread: &Self::Thread) {
        thread.task().terminate.store(true, Ordering::Release);
        // SAFETY: created by `thread_create`.
        let status = unsafe { threadx_sys::_tx_thread_terminate(thread.tcb()) };
        check(status, "tx_thread_terminate");
    }

    fn thread_should_terminate() -> bool {
        Self::thread_current().is_some_and(|t| t.task().terminate.load(Ordering::Acquire))
    }

    fn thread_wait(thread: Self::Thread) {
        loop {
            // SAFETY: plain field read.
            let state = unsafe { ptr::read_volatile(&(*thread.tcb()).tx_thread_state) };
            if state == TX_COMPLETED || state == TX_TERMINATED {
                break;
            }
            Self::sleep(1);
        }
        // SAFETY: the thread has finished; its record and stack stay
        // allocated.
        let status = unsafe { threadx_sys::_tx_thread_delete(thread.tcb()) };
        check(status, "tx_thread_delete");
    }

    fn thread_take_ticks(thread: &Self::Thread) -> Ticks {
        // ThreadX keeps a schedule count rather than a tick total.
        // SAFETY: the caller holds the critical section.
        unsafe {
            let count = ptr::addr_of_mut!((*thread.tcb()).tx_thread_run_count);
            let runs = count.read_volatile();
            count.write_volatile(0);
            runs
        }
    }

    fn thread_stack(thread: &Self::Thread) -> Option<(NonNull<u32>, usize)> {
        // SAFETY: plain field reads.
        unsafe {
            let tcb = thread.tcb();
            let start = NonNull::new((*tcb).tx_thread_stack_start.cast::<u32>())?;
            Some((start, (*tcb).tx_thread_stack_size as usize / 4))
        }
    }
}
