//! Task lifecycle on the hosted kernel.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use pios_rtos::config::MINIMAL_STACK_SIZE;
use pios_rtos::kernel::hosted::HostedKernel;
use pios_rtos::{task, Queue, TaskHandle, Timeout};

type Task = TaskHandle<HostedKernel>;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn spin_then_wait(arg: usize) {
    // SAFETY: the test passes a leaked queue handle.
    let gate = unsafe { &*(arg as *const Queue<u8>) };
    let start = Instant::now();
    while start.elapsed() < Duration::from_millis(60) {
        std::hint::spin_loop();
    }
    let _ = gate.receive(Timeout::Infinite);
}

#[test]
fn test_run_time_is_read_and_clear() {
    init_logger();
    let gate: &'static Queue<u8> = Box::leak(Box::new(Queue::create(1).unwrap()));
    let t = Task::create(
        spin_then_wait,
        "spinner",
        MINIMAL_STACK_SIZE,
        gate as *const _ as usize,
        Task::IDLE_PRIORITY,
    )
    .unwrap();

    thread::sleep(Duration::from_millis(150));
    let first = t.run_time();
    // The task is now blocked on the queue, so nothing accumulates.
    let second = t.run_time();
    assert!(first >= 40, "ran for {} ticks", first);
    assert!(second < 5, "still accumulated {} ticks", second);

    gate.send(&1, Timeout::Infinite).unwrap();
    t.delete();
}

static STOPPED: AtomicBool = AtomicBool::new(false);

fn until_terminated(_: usize) {
    while !task::should_terminate::<HostedKernel>() {
        pios_rtos::time::delay::<HostedKernel>(2);
    }
    thread::sleep(Duration::from_millis(20));
    STOPPED.store(true, Ordering::SeqCst);
}

#[test]
fn test_delete_waits_for_exit() {
    init_logger();
    let t = Task::create(until_terminated, "stoppable", MINIMAL_STACK_SIZE, 0, 3).unwrap();
    thread::sleep(Duration::from_millis(10));
    assert!(!STOPPED.load(Ordering::SeqCst));
    t.delete();
    assert!(STOPPED.load(Ordering::SeqCst));
}

static SELF_DELETE_REFUSED: AtomicBool = AtomicBool::new(false);

fn delete_self(_: usize) {
    let refused = std::panic::catch_unwind(|| {
        if let Some(me) = Task::current() {
            me.delete();
        }
    })
    .is_err();
    SELF_DELETE_REFUSED.store(refused, Ordering::SeqCst);
}

#[test]
fn test_task_cannot_delete_itself() {
    init_logger();
    let t = Task::create(delete_self, "suicidal", MINIMAL_STACK_SIZE, 0, 2).unwrap();
    t.delete();
    assert!(SELF_DELETE_REFUSED.load(Ordering::SeqCst));
}

static ARG_SEEN: AtomicUsize = AtomicUsize::new(0);

fn record_arg(arg: usize) {
    let me = Task::current().map(|t| t.id());
    if me == Some(thread::current().id()) {
        ARG_SEEN.store(arg, Ordering::SeqCst);
    }
}

#[test]
fn test_entry_gets_arg_and_identity() {
    init_logger();
    assert!(Task::current().is_none());
    let t = Task::create(record_arg, "arg", MINIMAL_STACK_SIZE, 0xC0FFEE, Task::MAX_PRIORITY).unwrap();
    t.delete();
    assert_eq!(ARG_SEEN.load(Ordering::SeqCst), 0xC0FFEE);
}

fn idle(_: usize) {}

#[test]
fn test_stack_high_water_mark() {
    init_logger();
    let t = Task::create(idle, "idle", MINIMAL_STACK_SIZE, 0, 1).unwrap();
    let hwm = t.stack_high_water_mark();
    assert!(hwm > 0);
    assert!(hwm < MINIMAL_STACK_SIZE, "{} of {} words untouched", hwm, MINIMAL_STACK_SIZE);
    t.delete();
}

#[test]
#[should_panic(expected = "priority 0 out of range")]
fn test_priority_below_idle_asserts() {
    init_logger();
    let _ = Task::create(idle, "bad", MINIMAL_STACK_SIZE, 0, 0);
}

#[test]
#[should_panic(expected = "has an empty stack")]
fn test_empty_stack_asserts() {
    init_logger();
    let _ = Task::create(idle, "nostack", 0, 0, 1);
}
