//! Task lifecycle adapter.
//!
//! Tasks are kernel threads whose control block and stack come from the
//! kernel heap. Stack sizes are given in 32-bit words, as FreeRTOS callers
//! expect, and scaled by [`STACK_SCALE`](crate::config::STACK_SCALE).
//!
//! # Example
//!
//! ```no_run
//! use pios_rtos::{task, TaskHandle};
//! use pios_rtos::config::MINIMAL_STACK_SIZE;
//!
//! fn blink(period_ms: usize) {
//!     while !task::should_terminate::<pios_rtos::DefaultKernel>() {
//!         pios_rtos::time::delay::<pios_rtos::DefaultKernel>(period_ms as u32);
//!     }
//! }
//!
//! let handle: TaskHandle =
//!     TaskHandle::create(blink, "blink", MINIMAL_STACK_SIZE, 500, 2).expect("no memory");
//! // ...
//! handle.delete();
//! ```

use core::fmt;

use crate::config::STACK_SCALE;
use crate::critical;
use crate::error::TaskError;
use crate::heap;
use crate::kernel::{DefaultKernel, Priority, SyncKernel, ThreadSpec};
use crate::time::Ticks;

/// Handle to a running task.
pub struct TaskHandle<K: SyncKernel = DefaultKernel> {
    thread: K::Thread,
}

impl<K: SyncKernel> Clone for TaskHandle<K> {
    fn clone(&self) -> Self {
        Self {
            thread: self.thread.clone(),
        }
    }
}

impl<K: SyncKernel> TaskHandle<K> {
    /// Lowest priority a task can run at.
    pub const IDLE_PRIORITY: Priority = K::IDLE_PRIORITY;
    /// Highest priority a task can run at.
    pub const MAX_PRIORITY: Priority = K::MAX_PRIORITY;

    /// Starts `entry(arg)` on a new task.
    ///
    /// `stack_size` is in 32-bit words. On failure the heap failure flag is
    /// latched and no task exists.
    pub fn create(
        entry: fn(usize),
        name: &'static str,
        stack_size: usize,
        arg: usize,
        priority: Priority,
    ) -> Result<Self, TaskError> {
        pios_assert!(
            (K::IDLE_PRIORITY..=K::MAX_PRIORITY).contains(&priority),
            "task {} priority {} out of range",
            name,
            priority
        );
        pios_assert!(stack_size > 0, "task {} has an empty stack", name);

        let Some(stack_bytes) = stack_size.checked_mul(STACK_SCALE) else {
            heap::note_failure(usize::MAX);
            return Err(TaskError::NoMemory);
        };
        let spec = ThreadSpec {
            name,
            stack_bytes,
            priority,
            entry,
            arg,
        };

        match K::thread_create(spec) {
            Some(thread) => {
                log::debug!("task {} created ({} byte stack)", name, stack_bytes);
                Ok(Self { thread })
            }
            None => {
                heap::note_failure(stack_bytes);
                Err(TaskError::NoMemory)
            }
        }
    }

    /// The calling task, if it was created through [`create`](Self::create).
    pub fn current() -> Option<Self> {
        K::thread_current().map(|thread| Self { thread })
    }

    /// Kernel identity of this task.
    pub fn id(&self) -> K::ThreadId {
        K::thread_id(&self.thread)
    }

    /// Terminates the task and waits until it has fully exited.
    ///
    /// A task cannot delete itself.
    pub fn delete(self) {
        pios_assert!(
            self.id() != K::current_thread(),
            "a task cannot delete itself"
        );
        K::thread_terminate(&self.thread);
        K::thread_wait(self.thread);
        log::debug!("task deleted");
    }

    /// Ticks the task has run since the previous call.
    ///
    /// The counter is cleared by every read.
    pub fn run_time(&self) -> Ticks {
        critical::with::<K, _>(|| K::thread_take_ticks(&self.thread))
    }

    /// Words at the base of the stack that were never written.
    ///
    /// The kernel fills new stacks with a pattern; the count of intact
    /// pattern words from the base is how close the task ever came to
    /// overflowing.
    #[cfg(feature = "stack-fill")]
    pub fn stack_high_water_mark(&self) -> usize {
        let Some((base, words)) = K::thread_stack(&self.thread) else {
            return 0;
        };
        let base = base.as_ptr();
        let mut untouched = 0;
        // SAFETY: the kernel reported `words` readable words at `base`; the
        // stack lives as long as the thread handle.
        while untouched < words
            && unsafe { base.add(untouched).read_volatile() } == K::STACK_FILL_WORD
        {
            untouched += 1;
        }
        untouched
    }
}

impl<K: SyncKernel> fmt::Debug for TaskHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id()).finish()
    }
}

/// Whether the calling task has been asked to terminate.
///
/// Long-running tasks should poll this on kernels that terminate
/// cooperatively.
pub fn should_terminate<K: SyncKernel>() -> bool {
    K::thread_should_terminate()
}
