//! Tick and delay adapter.
//!
//! Durations cross the API in milliseconds and are converted to kernel ticks
//! here. [`delay_until`] gives drift-free periodic loops:
//!
//! ```no_run
//! use pios_rtos::time::{self, Ticks};
//!
//! let mut last_wake: Ticks = time::tick_count::<pios_rtos::DefaultKernel>();
//! loop {
//!     // ... periodic work ...
//!     time::delay_until::<pios_rtos::DefaultKernel>(&mut last_wake, 10);
//! }
//! ```

use crate::config::PIOS_MUTEX_TIMEOUT_MAX;
use crate::critical;
use crate::kernel::{SyncKernel, TickTimeout};

/// Kernel tick count. Wraps around.
pub type Ticks = u32;

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Give up after this many milliseconds. `Millis(0)` never waits.
    Millis(u32),
    /// Wait as long as it takes.
    Infinite,
}

impl Timeout {
    /// Fail immediately instead of blocking.
    pub const NO_WAIT: Self = Timeout::Millis(0);

    /// Interprets a C-surface millisecond value, where
    /// [`PIOS_MUTEX_TIMEOUT_MAX`] means "forever".
    pub const fn from_ms(ms: u32) -> Self {
        if ms == PIOS_MUTEX_TIMEOUT_MAX {
            Timeout::Infinite
        } else {
            Timeout::Millis(ms)
        }
    }

    /// Converts to the kernel's tick unit.
    pub const fn to_ticks(self, tick_hz: u32) -> TickTimeout {
        match self {
            Timeout::Millis(ms) => TickTimeout::Ticks(ms_to_ticks(ms, tick_hz)),
            Timeout::Infinite => TickTimeout::Infinite,
        }
    }

    /// Converts to the tick unit of kernel `K`.
    #[inline]
    pub fn ticks<K: SyncKernel>(self) -> TickTimeout {
        self.to_ticks(K::TICK_HZ)
    }
}

/// Milliseconds to ticks, rounding up so a wait never ends early.
///
/// Zero stays zero.
pub const fn ms_to_ticks(ms: u32, tick_hz: u32) -> Ticks {
    if ms == 0 {
        return 0;
    }
    let ticks = ((ms as u64) * (tick_hz as u64) - 1) / 1000 + 1;
    if ticks > Ticks::MAX as u64 {
        Ticks::MAX
    } else {
        ticks as Ticks
    }
}

/// Ticks to milliseconds, rounding down.
pub const fn ticks_to_ms(ticks: Ticks, tick_hz: u32) -> u32 {
    ((ticks as u64) * 1000 / (tick_hz as u64)) as u32
}

/// Current kernel tick count.
#[inline]
pub fn tick_count<K: SyncKernel>() -> Ticks {
    K::now()
}

/// Suspends the calling task for at least `ms` milliseconds.
pub fn delay<K: SyncKernel>(ms: u32) {
    K::sleep(ms_to_ticks(ms, K::TICK_HZ));
}

/// Computes the next wake time of a periodic task.
///
/// Returns the new anchor `previous + increment` and, if `now` has not yet
/// reached it, the number of ticks to sleep. Both the tick counter and the
/// anchor may have wrapped since `previous`.
pub const fn next_wake(previous: Ticks, now: Ticks, increment: Ticks) -> (Ticks, Option<Ticks>) {
    let future = previous.wrapping_add(increment);
    let must_delay = if now < previous {
        // The tick counter wrapped since `previous`: only a wake time that
        // wrapped too, and lies ahead of `now`, is still in the future.
        now < future && future < previous
    } else {
        now < future || future < previous
    };
    if must_delay {
        (future, Some(future.wrapping_sub(now)))
    } else {
        (future, None)
    }
}

/// Sleeps until `previous + increment` ticks and advances `previous` to that
/// instant.
///
/// The anchor always advances by exactly `increment`, even when the caller
/// overran the period and no sleep happens, so repeated calls keep a
/// constant period.
pub fn delay_until_ticks<K: SyncKernel>(previous: &mut Ticks, increment: Ticks) {
    let (future, sleep) = critical::with::<K, _>(|| next_wake(*previous, K::now(), increment));
    if let Some(ticks) = sleep {
        K::sleep(ticks);
    }
    *previous = future;
}

/// [`delay_until_ticks`] with the period in milliseconds.
pub fn delay_until<K: SyncKernel>(previous: &mut Ticks, period_ms: u32) {
    delay_until_ticks::<K>(previous, ms_to_ticks(period_ms, K::TICK_HZ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_ms_to_ticks_rounds_up() {
        assert_eq!(ms_to_ticks(0, 1000), 0);
        assert_eq!(ms_to_ticks(1, 1000), 1);
        assert_eq!(ms_to_ticks(10, 1000), 10);
        assert_eq!(ms_to_ticks(1, 100), 1);
        assert_eq!(ms_to_ticks(10, 100), 1);
        assert_eq!(ms_to_ticks(11, 100), 2);
        assert_eq!(ms_to_ticks(u32::MAX, 1_000_000), Ticks::MAX);
    }

    #[test]
    fn test_ticks_to_ms() {
        assert_eq!(ticks_to_ms(5, 1000), 5);
        assert_eq!(ticks_to_ms(5, 100), 50);
    }

    #[test]
    fn test_timeout_sentinel() {
        assert_eq!(Timeout::from_ms(PIOS_MUTEX_TIMEOUT_MAX), Timeout::Infinite);
        assert_eq!(Timeout::from_ms(20), Timeout::Millis(20));
        assert_eq!(Timeout::Infinite.to_ticks(1000), TickTimeout::Infinite);
        assert_eq!(Timeout::NO_WAIT.to_ticks(100), TickTimeout::IMMEDIATE);
    }

    #[test]
    fn test_next_wake_normal_order() {
        // Not yet reached.
        assert_eq!(next_wake(100, 105, 10), (110, Some(5)));
        // Overran the period.
        assert_eq!(next_wake(100, 115, 10), (110, None));
        // Exactly on time.
        assert_eq!(next_wake(100, 110, 10), (110, None));
    }

    #[test]
    fn test_next_wake_across_wrap() {
        let prev = u32::MAX - 4;
        // Wake time wrapped, counter has not.
        assert_eq!(next_wake(prev, u32::MAX - 2, 10), (5, Some(8)));
        // Both wrapped, wake time still ahead.
        assert_eq!(next_wake(prev, 2, 10), (5, Some(3)));
        // Both wrapped, wake time passed.
        assert_eq!(next_wake(prev, 7, 10), (5, None));
    }

    /// A periodic loop whose body is shorter than the period wakes exactly on
    /// the anchor sequence, wherever the tick counter starts.
    #[quickcheck]
    fn prop_delay_until_has_no_drift(start: u32, period: u16, bodies: Vec<u16>) -> bool {
        let period = u32::from(period).max(1);
        let mut now = start;
        let mut anchor = start;
        for (k, body) in bodies.iter().enumerate() {
            now = now.wrapping_add(u32::from(*body) % period);
            let (future, sleep) = next_wake(anchor, now, period);
            if let Some(ticks) = sleep {
                now = now.wrapping_add(ticks);
            }
            anchor = future;
            let expected = start.wrapping_add(period.wrapping_mul(k as u32 + 1));
            if anchor != expected || now != anchor {
                return false;
            }
        }
        true
    }
}
