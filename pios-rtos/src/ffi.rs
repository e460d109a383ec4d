//! C surface with FreeRTOS and PiOS names.
//!
//! Links C flight code written against `FreeRTOS.h` / `pios_mutex.h` to the
//! primitives of this crate, bound to [`DefaultKernel`]. Handles are opaque
//! pointers to objects allocated from the kernel heap; they are never freed.
//!
//! | Group | Functions |
//! |-------|-----------|
//! | mutex | `PIOS_Mutex_*`, `PIOS_Recursive_Mutex_*` |
//! | queue | `xQueueCreate`, `xQueueSendToBack`, `xQueueSend`, `xQueueReceive`, `xQueueSendToBackFromISR`, `xQueueSendFromISR` |
//! | task | `xTaskCreate`, `vTaskDelete`, `uxTaskGetRunTime`, `uxTaskGetStackHighWaterMark` |
//! | time | `xTaskGetTickCount`, `vTaskDelay`, `vTaskDelayUntil` |
//! | critical | `vPortEnterCritical`, `vPortExitCritical`, `vTaskSuspendAll`, `xTaskResumeAll` |
//! | heap | `pvPortMalloc`, `vPortFree`, `PIOS_malloc`, `PIOS_malloc_no_dma`, `PIOS_heap_malloc_failed_p`, `xPortGetFreeHeapSize` |
//!
//! Queue and delay timeouts are in ticks, with [`PORT_MAX_DELAY`] meaning
//! "forever". Mutex timeouts are in milliseconds, with
//! [`PIOS_MUTEX_TIMEOUT_MAX`](crate::config::PIOS_MUTEX_TIMEOUT_MAX) meaning "forever".
//!
//! A null handle is a caller bug and trips the hard assertion.

#![allow(non_snake_case)]

use core::ffi::{c_char, c_ulong, c_void, CStr};
use core::ptr;

use crate::critical;
use crate::error::{status, BaseType, Status, PD_FALSE, PD_TRUE};
use crate::heap;
use crate::kernel::{DefaultKernel, IsrContext, Priority, TickTimeout};
use crate::mutex::{Mutex, RecursiveMutex};
use crate::queue::RawQueue;
use crate::task::TaskHandle;
use crate::time::{self, Ticks, Timeout};

/// `portMAX_DELAY`
pub const PORT_MAX_DELAY: Ticks = Ticks::MAX;

/// `struct pios_mutex *`
pub type PiosMutex = *const Mutex<DefaultKernel>;
/// `struct pios_recursive_mutex *`
pub type PiosRecursiveMutex = *const RecursiveMutex<DefaultKernel>;
/// `xQueueHandle`
pub type QueueHandle = *const RawQueue<DefaultKernel>;
/// `xTaskHandle`
pub type TaskHandleRef = *mut TaskHandle<DefaultKernel>;

/// C task entry point.
pub type TaskFunction = unsafe extern "C" fn(*mut c_void);

fn tick_timeout(ticks: Ticks) -> TickTimeout {
    if ticks == PORT_MAX_DELAY {
        TickTimeout::Infinite
    } else {
        TickTimeout::Ticks(ticks)
    }
}

/// # Safety
///
/// `handle` is null or came from the matching create call.
unsafe fn deref<'a, T>(handle: *const T, what: &str) -> &'a T {
    pios_assert!(!handle.is_null(), "null {} handle", what);
    // SAFETY: non-null handles come from create calls and are never freed.
    unsafe { &*handle }
}

/// Runs `f` in interrupt context and folds its woken flag into `*woken`.
///
/// # Safety
///
/// Called from an interrupt handler; `woken` is valid.
unsafe fn from_isr(woken: *mut bool, f: impl FnOnce(&IsrContext<'_>, &mut bool) -> bool) -> bool {
    pios_assert!(!woken.is_null(), "null woken flag");
    let mut w = false;
    // SAFETY: caller contract.
    let ok = unsafe { IsrContext::enter(|cx| f(cx, &mut w)) };
    if w {
        // SAFETY: checked non-null; caller contract.
        unsafe { *woken = true };
    }
    ok
}

// ---------------------------------------------------------------------------
// Mutex

/// `PIOS_Mutex_Create`. Null when the heap is exhausted.
#[no_mangle]
pub extern "C" fn PIOS_Mutex_Create() -> PiosMutex {
    Mutex::<DefaultKernel>::create().map_or(ptr::null(), |m| m as *const _)
}

/// `PIOS_Mutex_Lock`
///
/// # Safety
///
/// `mtx` came from [`PIOS_Mutex_Create`].
#[no_mangle]
pub unsafe extern "C" fn PIOS_Mutex_Lock(mtx: PiosMutex, timeout_ms: u32) -> bool {
    // SAFETY: caller contract.
    let mtx = unsafe { deref(mtx, "mutex") };
    mtx.lock(Timeout::from_ms(timeout_ms)).is_ok()
}

/// `PIOS_Mutex_Unlock`
///
/// # Safety
///
/// As [`PIOS_Mutex_Lock`].
#[no_mangle]
pub unsafe extern "C" fn PIOS_Mutex_Unlock(mtx: PiosMutex) -> bool {
    // SAFETY: caller contract.
    let mtx = unsafe { deref(mtx, "mutex") };
    mtx.unlock().is_ok()
}

/// `PIOS_Mutex_Lock_FromISR`
///
/// # Safety
///
/// Interrupt context only; `mtx` as [`PIOS_Mutex_Lock`]; `woken` valid.
#[no_mangle]
pub unsafe extern "C" fn PIOS_Mutex_Lock_FromISR(mtx: PiosMutex, woken: *mut bool) -> bool {
    // SAFETY: caller contract.
    unsafe {
        let mtx = deref(mtx, "mutex");
        from_isr(woken, |cx, w| mtx.lock_from_isr(cx, w))
    }
}

/// `PIOS_Mutex_Unlock_FromISR`
///
/// # Safety
///
/// As [`PIOS_Mutex_Lock_FromISR`].
#[no_mangle]
pub unsafe extern "C" fn PIOS_Mutex_Unlock_FromISR(mtx: PiosMutex, woken: *mut bool) -> bool {
    // SAFETY: caller contract.
    unsafe {
        let mtx = deref(mtx, "mutex");
        from_isr(woken, |cx, w| mtx.unlock_from_isr(cx, w))
    }
}

/// `PIOS_Recursive_Mutex_Create`. Null when the heap is exhausted.
#[no_mangle]
pub extern "C" fn PIOS_Recursive_Mutex_Create() -> PiosRecursiveMutex {
    RecursiveMutex::<DefaultKernel>::create().map_or(ptr::null(), |m| m as *const _)
}

/// `PIOS_Recursive_Mutex_Lock`
///
/// # Safety
///
/// `mtx` came from [`PIOS_Recursive_Mutex_Create`].
#[no_mangle]
pub unsafe extern "C" fn PIOS_Recursive_Mutex_Lock(mtx: PiosRecursiveMutex, timeout_ms: u32) -> bool {
    // SAFETY: caller contract.
    let mtx = unsafe { deref(mtx, "recursive mutex") };
    mtx.lock(Timeout::from_ms(timeout_ms)).is_ok()
}

/// `PIOS_Recursive_Mutex_Unlock`
///
/// # Safety
///
/// As [`PIOS_Recursive_Mutex_Lock`].
#[no_mangle]
pub unsafe extern "C" fn PIOS_Recursive_Mutex_Unlock(mtx: PiosRecursiveMutex) -> bool {
    // SAFETY: caller contract.
    let mtx = unsafe { deref(mtx, "recursive mutex") };
    mtx.unlock().is_ok()
}

/// `PIOS_Recursive_Mutex_Lock_FromISR`. Always fails the hard assertion.
///
/// # Safety
///
/// As [`PIOS_Mutex_Lock_FromISR`].
#[no_mangle]
pub unsafe extern "C" fn PIOS_Recursive_Mutex_Lock_FromISR(
    mtx: PiosRecursiveMutex,
    woken: *mut bool,
) -> bool {
    // SAFETY: caller contract.
    unsafe {
        let mtx = deref(mtx, "recursive mutex");
        from_isr(woken, |cx, w| mtx.lock_from_isr(cx, w))
    }
}

/// `PIOS_Recursive_Mutex_Unlock_FromISR`. Always fails the hard assertion.
///
/// # Safety
///
/// As [`PIOS_Mutex_Lock_FromISR`].
#[no_mangle]
pub unsafe extern "C" fn PIOS_Recursive_Mutex_Unlock_FromISR(
    mtx: PiosRecursiveMutex,
    woken: *mut bool,
) -> bool {
    // SAFETY: caller contract.
    unsafe {
        let mtx = deref(mtx, "recursive mutex");
        from_isr(woken, |cx, w| mtx.unlock_from_isr(cx, w))
    }
}

// ---------------------------------------------------------------------------
// Queue

/// `xQueueCreate`. Null when the heap is exhausted.
#[no_mangle]
pub extern "C" fn xQueueCreate(max_queue_size: usize, obj_size: usize) -> QueueHandle {
    RawQueue::<DefaultKernel>::create(max_queue_size, obj_size).map_or(ptr::null(), |q| q as *const _)
}

/// `xQueueSendToBack`
///
/// # Safety
///
/// `queue` came from [`xQueueCreate`]; `data` points to one element.
#[no_mangle]
pub unsafe extern "C" fn xQueueSendToBack(
    queue: QueueHandle,
    data: *const c_void,
    timeout: Ticks,
) -> BaseType {
    // SAFETY: caller contract.
    unsafe {
        let queue = deref(queue, "queue");
        pios_assert!(!data.is_null(), "null queue element");
        let element = core::slice::from_raw_parts(data.cast::<u8>(), queue.element_size());
        status(queue.send_ticks(element, tick_timeout(timeout)))
    }
}

/// `xQueueSend`, the same as [`xQueueSendToBack`].
///
/// # Safety
///
/// As [`xQueueSendToBack`].
#[no_mangle]
pub unsafe extern "C" fn xQueueSend(queue: QueueHandle, data: *const c_void, timeout: Ticks) -> BaseType {
    // SAFETY: caller contract.
    unsafe { xQueueSendToBack(queue, data, timeout) }
}

/// `xQueueReceive`
///
/// # Safety
///
/// `queue` came from [`xQueueCreate`]; `data` has room for one element.
#[no_mangle]
pub unsafe extern "C" fn xQueueReceive(queue: QueueHandle, data: *mut c_void, timeout: Ticks) -> BaseType {
    // SAFETY: caller contract.
    unsafe {
        let queue = deref(queue, "queue");
        pios_assert!(!data.is_null(), "null queue element");
        let out = core::slice::from_raw_parts_mut(data.cast::<u8>(), queue.element_size());
        status(queue.receive_ticks(out, tick_timeout(timeout)))
    }
}

/// `xQueueSendToBackFromISR`
///
/// `*woken` is set to `pdTRUE` when a receiver became ready, and never
/// cleared.
///
/// # Safety
///
/// Interrupt context only; `queue` and `data` as [`xQueueSendToBack`];
/// `woken` null or valid.
#[no_mangle]
pub unsafe extern "C" fn xQueueSendToBackFromISR(
    queue: QueueHandle,
    data: *const c_void,
    woken: *mut BaseType,
) -> BaseType {
    // SAFETY: caller contract.
    unsafe {
        let queue = deref(queue, "queue");
        pios_assert!(!data.is_null(), "null queue element");
        let element = core::slice::from_raw_parts(data.cast::<u8>(), queue.element_size());
        let mut w = false;
        let sent = IsrContext::enter(|cx| queue.send_from_isr(cx, element, &mut w));
        if w && !woken.is_null() {
            *woken = PD_TRUE;
        }
        if sent {
            PD_TRUE
        } else {
            Status::QueueFull.code()
        }
    }
}

/// `xQueueSendFromISR`, the same as [`xQueueSendToBackFromISR`].
///
/// # Safety
///
/// As [`xQueueSendToBackFromISR`].
#[no_mangle]
pub unsafe extern "C" fn xQueueSendFromISR(
    queue: QueueHandle,
    data: *const c_void,
    woken: *mut BaseType,
) -> BaseType {
    // SAFETY: caller contract.
    unsafe { xQueueSendToBackFromISR(queue, data, woken) }
}

// ---------------------------------------------------------------------------
// Task

/// What the trampoline needs to call a C entry point.
struct CTask {
    entry: TaskFunction,
    arg: *mut c_void,
}

fn c_task_trampoline(record: usize) {
    // SAFETY: `record` is the address of a `CTask` written by `xTaskCreate`
    // and never freed.
    unsafe {
        let task = &*(record as *const CTask);
        (task.entry)(task.arg);
    }
}

/// `xTaskCreate`
///
/// `size` is the stack depth in words. Returns `pdPASS`, or `pdFAIL` with the
/// heap failure flag latched.
///
/// # Safety
///
/// `name` is null or a NUL-terminated string that outlives the task;
/// `handle_p` is null or valid for a write.
#[no_mangle]
pub unsafe extern "C" fn xTaskCreate(
    pf: TaskFunction,
    name: *const c_char,
    size: usize,
    arg: *mut c_void,
    prio: Priority,
    handle_p: *mut TaskHandleRef,
) -> BaseType {
    let name: &'static str = if name.is_null() {
        "task"
    } else {
        // SAFETY: caller contract.
        unsafe { CStr::from_ptr(name) }.to_str().unwrap_or("task")
    };

    let Some(record) = heap::allocate_uninit::<DefaultKernel, CTask>() else {
        return PD_FALSE;
    };
    let record = record.write(CTask { entry: pf, arg }) as *mut CTask as usize;

    let Some(slot) = heap::allocate_uninit::<DefaultKernel, TaskHandle>() else {
        return PD_FALSE;
    };
    match TaskHandle::<DefaultKernel>::create(c_task_trampoline, name, size, record, prio) {
        Ok(handle) => {
            let handle = slot.write(handle) as *mut TaskHandle;
            if !handle_p.is_null() {
                // SAFETY: caller contract.
                unsafe { *handle_p = handle };
            }
            Status::Pass.code()
        }
        Err(e) => status::<(), _>(Err(e)),
    }
}

/// `vTaskDelete`. Deleting the calling task (null handle) is not supported.
///
/// # Safety
///
/// `task` came from [`xTaskCreate`] and is not used afterwards.
#[no_mangle]
pub unsafe extern "C" fn vTaskDelete(task: TaskHandleRef) {
    pios_assert!(!task.is_null(), "deleting the calling task is not supported");
    // SAFETY: caller contract; the slot is never read again.
    let handle = unsafe { ptr::read(task) };
    handle.delete();
}

/// `uxTaskGetRunTime`: ticks run since the previous call.
///
/// # Safety
///
/// `task` came from [`xTaskCreate`].
#[no_mangle]
pub unsafe extern "C" fn uxTaskGetRunTime(task: TaskHandleRef) -> c_ulong {
    // SAFETY: caller contract.
    let task = unsafe { deref(task, "task") };
    task.run_time() as c_ulong
}

/// `uxTaskGetStackHighWaterMark`, in words.
///
/// # Safety
///
/// `task` came from [`xTaskCreate`].
#[cfg(feature = "stack-fill")]
#[no_mangle]
pub unsafe extern "C" fn uxTaskGetStackHighWaterMark(task: TaskHandleRef) -> c_ulong {
    // SAFETY: caller contract.
    let task = unsafe { deref(task, "task") };
    task.stack_high_water_mark() as c_ulong
}

// ---------------------------------------------------------------------------
// Time

/// `xTaskGetTickCount`
#[no_mangle]
pub extern "C" fn xTaskGetTickCount() -> Ticks {
    time::tick_count::<DefaultKernel>()
}

/// `vTaskDelay`, in ticks.
#[no_mangle]
pub extern "C" fn vTaskDelay(ticks: Ticks) {
    <DefaultKernel as crate::kernel::SyncKernel>::sleep(ticks);
}

/// `vTaskDelayUntil`
///
/// # Safety
///
/// `previous_wake_time` is valid for reads and writes.
#[no_mangle]
pub unsafe extern "C" fn vTaskDelayUntil(previous_wake_time: *mut Ticks, increment: Ticks) {
    pios_assert!(!previous_wake_time.is_null(), "null wake time");
    // SAFETY: caller contract.
    let previous = unsafe { &mut *previous_wake_time };
    time::delay_until_ticks::<DefaultKernel>(previous, increment);
}

// ---------------------------------------------------------------------------
// Critical section

/// `vPortEnterCritical` / `portENTER_CRITICAL`
#[no_mangle]
pub extern "C" fn vPortEnterCritical() {
    critical::enter::<DefaultKernel>();
}

/// `vPortExitCritical` / `portEXIT_CRITICAL`
#[no_mangle]
pub extern "C" fn vPortExitCritical() {
    critical::leave::<DefaultKernel>();
}

/// `vTaskSuspendAll`
#[no_mangle]
pub extern "C" fn vTaskSuspendAll() {
    critical::suspend_all::<DefaultKernel>();
}

/// `xTaskResumeAll`. Always `pdFALSE`: no yield is performed here.
#[no_mangle]
pub extern "C" fn xTaskResumeAll() -> BaseType {
    critical::resume_all::<DefaultKernel>();
    PD_FALSE
}

// ---------------------------------------------------------------------------
// Heap

fn raw_alloc(size: usize) -> *mut c_void {
    heap::allocate::<DefaultKernel>(size).map_or(ptr::null_mut(), |p| p.as_ptr().cast())
}

/// `pvPortMalloc`. Null when the heap is exhausted.
#[no_mangle]
pub extern "C" fn pvPortMalloc(size: usize) -> *mut c_void {
    raw_alloc(size)
}

/// `vPortFree`. Memory is never returned.
#[no_mangle]
pub extern "C" fn vPortFree(block: *mut c_void) {
    heap::deallocate(block.cast());
}

/// `PIOS_malloc`
#[no_mangle]
pub extern "C" fn PIOS_malloc(size: usize) -> *mut c_void {
    raw_alloc(size)
}

/// `PIOS_malloc_no_dma`
#[no_mangle]
pub extern "C" fn PIOS_malloc_no_dma(size: usize) -> *mut c_void {
    heap::allocate_no_dma::<DefaultKernel>(size).map_or(ptr::null_mut(), |p| p.as_ptr().cast())
}

/// `PIOS_heap_malloc_failed_p`
#[no_mangle]
pub extern "C" fn PIOS_heap_malloc_failed_p() -> bool {
    heap::heap_alloc_failed()
}

/// `xPortGetFreeHeapSize`
#[no_mangle]
pub extern "C" fn xPortGetFreeHeapSize() -> usize {
    heap::free_heap_estimate::<DefaultKernel>()
}

#[cfg(all(test, feature = "hosted", not(feature = "threadx")))]
mod tests {
    use super::*;
    use crate::config::PIOS_MUTEX_TIMEOUT_MAX;
    use crate::error::{ERR_QUEUE_EMPTY, ERR_QUEUE_FULL, PD_PASS};
    use crate::kernel::hosted::HostedKernel;

    #[test]
    fn test_c_queue_roundtrip() {
        let q = xQueueCreate(2, 4);
        assert!(!q.is_null());
        unsafe {
            let a: u32 = 0xdead_beef;
            assert_eq!(xQueueSendToBack(q, (&a as *const u32).cast(), 0), PD_PASS);
            assert_eq!(xQueueSend(q, (&a as *const u32).cast(), 0), PD_PASS);
            assert_eq!(xQueueSendToBack(q, (&a as *const u32).cast(), 1), ERR_QUEUE_FULL);

            let mut out: u32 = 0;
            assert_eq!(xQueueReceive(q, (&mut out as *mut u32).cast(), 0), PD_TRUE);
            assert_eq!(out, 0xdead_beef);
            assert_eq!(xQueueReceive(q, (&mut out as *mut u32).cast(), 0), PD_TRUE);
            assert_eq!(xQueueReceive(q, (&mut out as *mut u32).cast(), 1), ERR_QUEUE_EMPTY);
        }
    }

    #[test]
    fn test_c_isr_send_leaves_woken_alone_without_receivers() {
        let q = xQueueCreate(1, 1);
        let byte = 7u8;
        let mut woken: BaseType = PD_FALSE;
        let sent = HostedKernel::interrupt(|_| unsafe {
            xQueueSendToBackFromISR(q, (&byte as *const u8).cast(), &mut woken)
        });
        assert_eq!(sent, PD_TRUE);
        assert_eq!(woken, PD_FALSE);
    }

    #[test]
    fn test_c_mutex() {
        let m = PIOS_Mutex_Create();
        unsafe {
            assert!(PIOS_Mutex_Lock(m, PIOS_MUTEX_TIMEOUT_MAX));
            assert!(PIOS_Mutex_Unlock(m));
        }
        let r = PIOS_Recursive_Mutex_Create();
        unsafe {
            assert!(PIOS_Recursive_Mutex_Lock(r, 0));
            assert!(PIOS_Recursive_Mutex_Lock(r, 0));
            assert!(PIOS_Recursive_Mutex_Unlock(r));
            assert!(PIOS_Recursive_Mutex_Unlock(r));
            assert!(!PIOS_Recursive_Mutex_Unlock(r));
        }
    }

    // The extern "C" entry points abort on a panic, so the checks are
    // exercised through the helpers they call.
    #[test]
    #[should_panic(expected = "null mutex handle")]
    fn test_null_handle_asserts() {
        let _: &Mutex<DefaultKernel> = unsafe { deref(ptr::null(), "mutex") };
    }

    #[test]
    #[should_panic(expected = "null woken flag")]
    fn test_null_woken_asserts() {
        let m = Mutex::<DefaultKernel>::create().unwrap();
        HostedKernel::interrupt(|_| unsafe {
            from_isr(ptr::null_mut(), |cx, w| m.lock_from_isr(cx, w))
        });
    }

    #[test]
    fn test_c_isr_mutex_reports_woken() {
        let m = PIOS_Mutex_Create();
        let mut woken = false;
        let locked = HostedKernel::interrupt(|_| unsafe { PIOS_Mutex_Lock_FromISR(m, &mut woken) });
        assert!(locked);
        assert!(!woken);
        let unlocked = HostedKernel::interrupt(|_| unsafe { PIOS_Mutex_Unlock_FromISR(m, &mut woken) });
        assert!(unlocked);
    }

    #[test]
    fn test_c_isr_send_alias() {
        let q = xQueueCreate(1, 2);
        let half: u16 = 0x1234;
        let mut woken: BaseType = PD_FALSE;
        let sent = HostedKernel::interrupt(|_| unsafe {
            xQueueSendFromISR(q, (&half as *const u16).cast(), &mut woken)
        });
        assert_eq!(sent, PD_TRUE);
        let again = HostedKernel::interrupt(|_| unsafe {
            xQueueSendFromISR(q, (&half as *const u16).cast(), &mut woken)
        });
        assert_eq!(again, ERR_QUEUE_FULL);

        let mut out: u16 = 0;
        assert_eq!(unsafe { xQueueReceive(q, (&mut out as *mut u16).cast(), 0) }, PD_TRUE);
        assert_eq!(out, 0x1234);
    }

    #[test]
    fn test_c_heap() {
        let p = pvPortMalloc(16);
        assert!(!p.is_null());
        assert_eq!(p as usize % crate::config::HEAP_ALIGN, 0);
        vPortFree(p);
        assert!(xPortGetFreeHeapSize() > 0);
    }

    unsafe extern "C" fn record_arg(arg: *mut c_void) {
        let flag = unsafe { &*(arg as *const core::sync::atomic::AtomicBool) };
        flag.store(true, core::sync::atomic::Ordering::SeqCst);
    }

    #[test]
    fn test_c_task_runs_and_deletes() {
        static RAN: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);
        let mut handle: TaskHandleRef = ptr::null_mut();
        let rc = unsafe {
            xTaskCreate(
                record_arg,
                c"c-task".as_ptr(),
                crate::config::MINIMAL_STACK_SIZE,
                &RAN as *const _ as *mut c_void,
                2,
                &mut handle,
            )
        };
        assert_eq!(rc, PD_PASS);
        assert!(!handle.is_null());
        unsafe { vTaskDelete(handle) };
        assert!(RAN.load(core::sync::atomic::Ordering::SeqCst));
    }
}
