//! Compile-time configuration shared by the adapters and the kernel backends.
//!
//! | Constant | Value | Meaning |
//! |----------|-------|---------|
//! | `STACK_SCALE` | 4 | bytes per caller stack unit (32-bit words) |
//! | `STACK_FILL_BYTE` | 0x55 | pattern written into fresh stacks |
//! | `QUEUE_MAX_WAITERS` | 1 | pool slots reserved for ISR senders |
//! | `MINIMAL_STACK_SIZE` | 512 | smallest sensible task stack, in words |

/// Bytes per unit of the `stack_size` argument to task creation.
///
/// Callers size stacks in 32-bit words; the kernels want bytes.
pub const STACK_SCALE: usize = 4;

/// Smallest stack (in words) a task should be created with.
pub const MINIMAL_STACK_SIZE: usize = 512;

/// Byte the kernel writes into every word of a new stack.
pub const STACK_FILL_BYTE: u8 = 0x55;

/// [`STACK_FILL_BYTE`] replicated into a 32-bit word.
pub const STACK_FILL_WORD: u32 = u32::from_ne_bytes([STACK_FILL_BYTE; 4]);

/// Extra pool slots beyond the logical queue capacity.
///
/// A sender that filled the queue can still be followed by an ISR send that
/// finds a slot immediately.
pub const QUEUE_MAX_WAITERS: usize = 1;

/// Millisecond timeout value meaning "wait forever" at the C surface.
pub const PIOS_MUTEX_TIMEOUT_MAX: u32 = 0xFFFF_FFFF;

/// Alignment of every block handed out by the heap adapter.
pub const HEAP_ALIGN: usize = 8;

/// Hosted kernel configuration.
#[cfg(feature = "hosted")]
pub mod hosted {
    /// Size of the simulated kernel heap.
    pub const HEAP_SIZE: usize = 4 * 1024 * 1024;

    /// Tick frequency. One tick per millisecond.
    pub const TICK_HZ: u32 = 1000;

    /// Host thread stack given to each simulated task, on top of the
    /// simulated stack region drawn from the kernel heap.
    pub const HOST_STACK_SIZE: usize = 256 * 1024;
}

/// ThreadX backend configuration.
#[cfg(feature = "threadx")]
pub mod threadx {
    /// `TX_TIMER_TICKS_PER_SECOND` the port is built with.
    pub const TICK_HZ: u32 = 100;

    /// ThreadX priorities run 0 (highest) to 31 (lowest).
    pub const LOWEST_PRIORITY: u32 = 31;

    /// Longest task name kept, including the NUL terminator.
    pub const NAME_LEN: usize = 16;
}
