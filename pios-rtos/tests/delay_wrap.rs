//! Periodic delays across the tick counter wraparound.
//!
//! Moves the process-wide tick counter, so it lives in its own test binary.

use std::time::{Duration, Instant};

use pios_rtos::kernel::hosted::HostedKernel;
use pios_rtos::time;

#[test]
fn test_delay_until_across_wrap() {
    let _ = env_logger::builder().is_test(true).try_init();

    HostedKernel::set_tick_count(u32::MAX - 15);
    let mut wake = time::tick_count::<HostedKernel>();
    assert!(wake >= u32::MAX - 15 || wake < 100);
    let first = wake;

    let start = Instant::now();
    for _ in 0..4 {
        time::delay_until::<HostedKernel>(&mut wake, 10);
    }
    assert!(start.elapsed() >= Duration::from_millis(35));
    assert_eq!(wake, first.wrapping_add(40));
    assert!(time::tick_count::<HostedKernel>() < 1000, "counter wrapped");
}
