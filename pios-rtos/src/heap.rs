//! Heap adapter over the kernel's core allocator.
//!
//! Allocation is bump-style from the caller's point of view: memory is never
//! returned, and [`deallocate`] is deliberately a no-op. Objects created by
//! this crate (mutexes, queues, task records) live for the rest of the
//! program.
//!
//! Any failed allocation latches a process-wide flag that health monitoring
//! can poll through [`heap_alloc_failed`]. The flag is diagnostic only and
//! is never cleared.

use core::alloc::{GlobalAlloc, Layout};
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::config::HEAP_ALIGN;
use crate::kernel::{DefaultKernel, SyncKernel};

static HEAP_FAILED: AtomicBool = AtomicBool::new(false);

pub(crate) fn note_failure(size: usize) {
    if !HEAP_FAILED.swap(true, Ordering::Relaxed) {
        log::warn!("kernel heap exhausted (request of {} bytes)", size);
    }
}

/// Allocates `size` bytes aligned to [`HEAP_ALIGN`].
///
/// Returns `None` and latches the failure flag when the kernel heap cannot
/// satisfy the request.
pub fn allocate<K: SyncKernel>(size: usize) -> Option<NonNull<u8>> {
    match Layout::from_size_align(size, HEAP_ALIGN) {
        Ok(layout) => allocate_layout::<K>(layout),
        Err(_) => {
            note_failure(size);
            None
        }
    }
}

/// Allocates a block for `layout`, raising its alignment to at least
/// [`HEAP_ALIGN`].
pub fn allocate_layout<K: SyncKernel>(layout: Layout) -> Option<NonNull<u8>> {
    let block = layout
        .align_to(HEAP_ALIGN)
        .ok()
        .and_then(|l| Layout::from_size_align(l.size().max(1), l.align()).ok())
        .and_then(K::core_alloc);
    if block.is_none() {
        note_failure(layout.size());
    }
    block
}

/// Allocates memory that no DMA engine needs to reach.
///
/// The kernels supported here have a single heap region, so this is the same
/// as [`allocate`].
#[inline]
pub fn allocate_no_dma<K: SyncKernel>(size: usize) -> Option<NonNull<u8>> {
    allocate::<K>(size)
}

/// Allocates uninitialized storage for one `T` that lives forever.
pub fn allocate_uninit<K: SyncKernel, T>() -> Option<&'static mut MaybeUninit<T>> {
    let layout = Layout::new::<T>();
    pios_assert!(
        layout.align() <= HEAP_ALIGN,
        "alignment {} exceeds heap alignment",
        layout.align()
    );
    let block = allocate::<K>(layout.size())?;
    // SAFETY: fresh block, big and aligned enough for `T`, never freed.
    Some(unsafe { &mut *block.cast::<MaybeUninit<T>>().as_ptr() })
}

/// Releases memory. Does nothing: the core allocator never takes memory
/// back.
#[inline]
pub fn deallocate(_block: *mut u8) {}

/// Whether any allocation has failed since boot.
#[inline]
pub fn heap_alloc_failed() -> bool {
    HEAP_FAILED.load(Ordering::Relaxed)
}

/// Kernel's indication of the memory still available, in bytes.
#[inline]
pub fn free_heap_estimate<K: SyncKernel>() -> usize {
    K::core_status()
}

/// `GlobalAlloc` over the kernel heap, for firmware that wants `alloc`
/// collections.
///
/// ```ignore
/// #[global_allocator]
/// static ALLOC: pios_rtos::heap::KernelHeap = pios_rtos::heap::KernelHeap::new();
/// ```
///
/// Freed memory is leaked, like every other allocation through this module.
pub struct KernelHeap<K: SyncKernel = DefaultKernel> {
    _kernel: PhantomData<K>,
}

impl<K: SyncKernel> KernelHeap<K> {
    /// Creates the allocator.
    pub const fn new() -> Self {
        Self {
            _kernel: PhantomData,
        }
    }
}

impl<K: SyncKernel> Default for KernelHeap<K> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: blocks come from the kernel heap with the requested layout and are
// never handed out twice.
unsafe impl<K: SyncKernel> GlobalAlloc for KernelHeap<K> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        match K::core_alloc(layout) {
            Some(block) => block.as_ptr(),
            None => {
                note_failure(layout.size());
                ptr::null_mut()
            }
        }
    }

    unsafe fn dealloc(&self, block: *mut u8, _layout: Layout) {
        deallocate(block);
    }
}
