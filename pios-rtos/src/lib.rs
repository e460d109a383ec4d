//! FreeRTOS/PiOS-compatible synchronization and scheduling primitives.
//!
//! Flight code written against the FreeRTOS task/queue/mutex contract keeps
//! running when the kernel underneath is swapped. Every primitive here is a
//! thin translation onto a [`kernel::SyncKernel`] implementation:
//!
//! ```text
//! application ──► mutex / queue / task / time / heap / critical
//!                                   │
//!                                   ▼
//!                     SyncKernel (hosted | threadx)
//! ```
//!
//! Blocking always happens inside the kernel, never in this layer.
//!
//! # Kernel selection
//!
//! Exactly one backend is bound to [`kernel::DefaultKernel`]:
//!
//! - `hosted` (default): a simulation on `std` threads, used by the tests.
//! - `threadx`: Azure RTOS ThreadX through `threadx-sys`.
//!
//! All primitives are generic over the kernel and default to
//! [`kernel::DefaultKernel`], so call sites never name a backend.

#![cfg_attr(not(any(feature = "hosted", test)), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(not(any(feature = "hosted", feature = "threadx")))]
compile_error!("pios-rtos needs a kernel backend: enable `hosted` or `threadx`");

#[macro_use]
mod macros;

pub mod config;
pub mod critical;
pub mod error;
pub mod heap;
pub mod kernel;
pub mod mutex;
pub mod queue;
pub mod task;
pub mod time;

#[cfg(feature = "ffi")]
pub mod ffi;

pub use error::RtosError;
pub use kernel::{DefaultKernel, IsrContext, SyncKernel};
pub use mutex::{Mutex, MutexGuard, RecursiveMutex};
pub use queue::{Queue, RawQueue};
pub use task::TaskHandle;
pub use time::{Ticks, Timeout};

/// Used by [`bind_critical_section!`].
#[doc(hidden)]
pub mod __private {
    pub use critical_section;
}
