//! Heap adapter. One test: the failure flag is process-wide and sticky.

use std::alloc::{GlobalAlloc, Layout};

use pios_rtos::heap::{self, KernelHeap};
use pios_rtos::kernel::hosted::HostedKernel;
use pios_rtos::{Mutex, Queue};

#[test]
fn test_failure_flag_latches() {
    let _ = env_logger::builder().is_test(true).try_init();

    assert!(!heap::heap_alloc_failed());
    let free_before = heap::free_heap_estimate::<HostedKernel>();

    let block = heap::allocate::<HostedKernel>(64).unwrap();
    assert_eq!(block.as_ptr() as usize % pios_rtos::config::HEAP_ALIGN, 0);
    assert!(heap::free_heap_estimate::<HostedKernel>() < free_before);
    assert!(HostedKernel::core_used() >= 64);
    heap::deallocate(block.as_ptr());
    assert!(!heap::heap_alloc_failed());

    let global = KernelHeap::<HostedKernel>::new();
    let layout = Layout::from_size_align(32, 8).unwrap();
    let p = unsafe { global.alloc(layout) };
    assert!(!p.is_null());
    assert_eq!(p as usize % 8, 0);
    unsafe { global.dealloc(p, layout) };
    assert!(!heap::heap_alloc_failed());

    let huge = Layout::from_size_align(1 << 40, 8).unwrap();
    assert!(unsafe { global.alloc(huge) }.is_null());
    assert!(heap::heap_alloc_failed());

    assert!(heap::allocate::<HostedKernel>(usize::MAX / 2).is_none());
    assert!(Queue::<[u8; 1024]>::create(1 << 20).is_none());

    // Later successes do not clear the flag.
    assert!(heap::allocate_no_dma::<HostedKernel>(16).is_some());
    assert!(Mutex::<HostedKernel>::create().is_some());
    assert!(heap::heap_alloc_failed());
}
