//! Tick counter and delays on the hosted kernel (1 kHz).

use std::time::{Duration, Instant};

use pios_rtos::kernel::hosted::HostedKernel;
use pios_rtos::time::{self, Ticks};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_delay_sleeps_at_least_requested() {
    init_logger();
    let start = Instant::now();
    let ticks = time::tick_count::<HostedKernel>();
    time::delay::<HostedKernel>(30);
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert!(time::tick_count::<HostedKernel>().wrapping_sub(ticks) >= 30);
}

#[test]
fn test_delay_until_keeps_period() {
    init_logger();
    let mut wake: Ticks = time::tick_count::<HostedKernel>();
    let first = wake;
    let start = Instant::now();
    for _ in 0..5 {
        time::delay_until::<HostedKernel>(&mut wake, 10);
    }
    assert_eq!(wake, first.wrapping_add(50));
    assert!(start.elapsed() >= Duration::from_millis(45));
}

#[test]
fn test_delay_until_after_overrun_does_not_sleep() {
    init_logger();
    // Keep the overrun anchor clear of the counter's start.
    time::delay::<HostedKernel>(25);
    let mut wake = time::tick_count::<HostedKernel>() - 20;
    let anchor = wake;
    let start = Instant::now();
    time::delay_until::<HostedKernel>(&mut wake, 10);
    assert!(start.elapsed() < Duration::from_millis(10));
    assert_eq!(wake, anchor.wrapping_add(10));
}
