//! Mutex and recursive mutex behavior on the hosted kernel.

use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use pios_rtos::error::{LockError, UnlockError};
use pios_rtos::kernel::hosted::HostedKernel;
use pios_rtos::{Mutex, RecursiveMutex, Timeout};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_lock_times_out_while_held() {
    init_logger();
    let m: &'static Mutex = Mutex::create().unwrap();
    m.lock(Timeout::Infinite).unwrap();

    let (got, waited) = thread::spawn(move || {
        let start = Instant::now();
        (m.lock(Timeout::Millis(30)), start.elapsed())
    })
    .join()
    .unwrap();

    assert_eq!(got, Err(LockError::Timeout));
    assert!(waited >= Duration::from_millis(30), "gave up after {:?}", waited);
    m.unlock().unwrap();
}

#[test]
fn test_waiter_acquires_after_unlock() {
    init_logger();
    let m: &'static Mutex = Mutex::create().unwrap();
    m.lock(Timeout::Infinite).unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter = thread::spawn(move || {
        m.lock(Timeout::Infinite).unwrap();
        tx.send(()).unwrap();
        m.unlock().unwrap();
    });

    assert!(rx.recv_timeout(Duration::from_millis(30)).is_err());
    m.unlock().unwrap();
    rx.recv_timeout(Duration::from_secs(5)).unwrap();
    waiter.join().unwrap();
}

#[test]
fn test_unlock_by_non_owner_is_rejected() {
    init_logger();
    let m: &'static Mutex = Mutex::create().unwrap();
    m.lock(Timeout::NO_WAIT).unwrap();
    let other = thread::spawn(move || m.unlock()).join().unwrap();
    assert_eq!(other, Err(UnlockError::Rejected));
    m.unlock().unwrap();
}

#[test]
fn test_owner_relock_times_out() {
    init_logger();
    let m: &'static Mutex = Mutex::create().unwrap();
    m.lock(Timeout::Infinite).unwrap();

    let start = Instant::now();
    assert_eq!(m.lock(Timeout::Millis(15)), Err(LockError::Timeout));
    assert!(start.elapsed() >= Duration::from_millis(15));
    assert_eq!(m.lock(Timeout::NO_WAIT), Err(LockError::Timeout));

    // Not nested: one unlock releases it.
    m.unlock().unwrap();
    thread::spawn(move || {
        m.lock(Timeout::NO_WAIT).unwrap();
        m.unlock().unwrap();
    })
    .join()
    .unwrap();
}

#[test]
#[should_panic(expected = "relocked by its owner")]
fn test_owner_relock_without_timeout_asserts() {
    init_logger();
    let m: &'static Mutex = Mutex::create().unwrap();
    m.lock(Timeout::Infinite).unwrap();
    let _ = m.lock(Timeout::Infinite);
}

#[test]
fn test_guard_is_exclusive() {
    init_logger();
    let m: &'static Mutex = Mutex::create().unwrap();
    let counter: &'static std::sync::atomic::AtomicUsize =
        Box::leak(Box::new(std::sync::atomic::AtomicUsize::new(0)));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            thread::spawn(move || {
                for _ in 0..100 {
                    let _g = m.guard(Timeout::Infinite).unwrap();
                    // Non-atomic read-modify-write: only correct under the lock.
                    let v = counter.load(std::sync::atomic::Ordering::Relaxed);
                    thread::yield_now();
                    counter.store(v + 1, std::sync::atomic::Ordering::Relaxed);
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(counter.load(std::sync::atomic::Ordering::Relaxed), 400);
}

#[test]
fn test_isr_lock_and_unlock() {
    init_logger();
    let m: &'static Mutex = Mutex::create().unwrap();

    let mut woken = false;
    assert!(HostedKernel::interrupt(|cx| m.lock_from_isr(cx, &mut woken)));
    assert!(!woken);
    // Already held: a second attempt fails without waiting.
    assert!(!HostedKernel::interrupt(|cx| m.lock_from_isr(cx, &mut woken)));
    assert!(HostedKernel::interrupt(|cx| m.unlock_from_isr(cx, &mut woken)));
    assert!(!woken);
}

#[test]
fn test_isr_unlock_wakes_waiter() {
    init_logger();
    let m: &'static Mutex = Mutex::create().unwrap();
    m.lock(Timeout::Infinite).unwrap();

    let waiter = thread::spawn(move || {
        m.lock(Timeout::Infinite).unwrap();
        m.unlock().unwrap();
    });
    thread::sleep(Duration::from_millis(50));

    let mut woken = false;
    assert!(HostedKernel::interrupt(|cx| m.unlock_from_isr(cx, &mut woken)));
    assert!(woken);
    waiter.join().unwrap();

    // The accumulator is never cleared by a later call.
    assert!(HostedKernel::interrupt(|cx| m.lock_from_isr(cx, &mut woken)));
    assert!(woken);
    assert!(HostedKernel::interrupt(|cx| m.unlock_from_isr(cx, &mut woken)));
}

#[test]
fn test_recursive_lock_is_held_until_last_unlock() {
    init_logger();
    let m: &'static RecursiveMutex = RecursiveMutex::create().unwrap();
    m.lock(Timeout::Infinite).unwrap();
    m.lock(Timeout::Infinite).unwrap();
    m.unlock().unwrap();
    assert_eq!(m.depth(), 1);

    let probe = move || thread::spawn(move || m.lock(Timeout::Millis(10))).join().unwrap();
    assert_eq!(probe(), Err(LockError::Timeout));

    m.unlock().unwrap();
    assert_eq!(m.depth(), 0);

    thread::spawn(move || {
        m.lock(Timeout::NO_WAIT).unwrap();
        m.unlock().unwrap();
    })
    .join()
    .unwrap();
}

#[test]
fn test_recursive_unlock_by_non_owner_fails() {
    init_logger();
    let m: &'static RecursiveMutex = RecursiveMutex::create().unwrap();
    m.lock(Timeout::Infinite).unwrap();

    let other = thread::spawn(move || m.unlock()).join().unwrap();
    assert_eq!(other, Err(UnlockError::NotOwner));
    assert_eq!(m.depth(), 1);
    m.unlock().unwrap();
}

#[test]
#[should_panic(expected = "recursive mutex locked from interrupt context")]
fn test_recursive_lock_from_isr_asserts() {
    init_logger();
    let m: &'static RecursiveMutex = RecursiveMutex::create().unwrap();
    let mut woken = false;
    HostedKernel::interrupt(|cx| m.lock_from_isr(cx, &mut woken));
}
