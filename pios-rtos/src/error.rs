//! Error types and the FreeRTOS status-code mapping.
//!
//! Each primitive reports failures through its own small error enum, and all
//! of them convert into [`RtosError`]. The C surface flattens results into
//! FreeRTOS status words:
//!
//! | Code | Constant | Meaning |
//! |------|----------|---------|
//! | 1 | `pdTRUE` / `pdPASS` | operation completed |
//! | 0 | `pdFALSE` / `pdFAIL` | operation failed or timed out |
//! | 0 | `errQUEUE_FULL` | send found no room |
//! | 0 | `errQUEUE_EMPTY` | receive found nothing |
//!
//! # Usage
//!
//! ```
//! use pios_rtos::error::{status, QueueError, PD_PASS, ERR_QUEUE_FULL};
//!
//! assert_eq!(status::<(), QueueError>(Ok(())), PD_PASS);
//! assert_eq!(status::<(), _>(Err(QueueError::Full)), ERR_QUEUE_FULL);
//! ```

use core::ffi::c_long;
use core::fmt;

/// FreeRTOS `portBASE_TYPE`.
pub type BaseType = c_long;

/// `pdTRUE`
pub const PD_TRUE: BaseType = 1;
/// `pdFALSE`
pub const PD_FALSE: BaseType = 0;
/// `pdPASS`
pub const PD_PASS: BaseType = PD_TRUE;
/// `pdFAIL`
pub const PD_FAIL: BaseType = PD_FALSE;
/// `errQUEUE_FULL`
pub const ERR_QUEUE_FULL: BaseType = 0;
/// `errQUEUE_EMPTY`
pub const ERR_QUEUE_EMPTY: BaseType = 0;

/// Errors from acquiring a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    /// The timeout expired before the mutex became free.
    Timeout,
}

/// Errors from releasing a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockError {
    /// The caller does not own the mutex.
    NotOwner,
    /// The kernel refused the release.
    Rejected,
}

/// Errors from queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// No room for another element before the timeout.
    Full,
    /// No element arrived before the timeout.
    Empty,
}

/// Errors from task operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// The kernel heap could not supply the thread's control block or stack.
    NoMemory,
}

/// Any error this crate reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtosError {
    /// Out of kernel heap.
    NoMemory,
    /// A blocking wait timed out.
    Timeout,
    /// Release attempted by a context that does not own the mutex.
    NotOwner,
    /// The kernel refused the operation.
    Rejected,
    /// Queue full.
    QueueFull,
    /// Queue empty.
    QueueEmpty,
}

/// Outcome of an operation as the FreeRTOS API reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// `pdPASS` / `pdTRUE`
    Pass,
    /// `pdFAIL` / `pdFALSE`
    Fail,
    /// `errQUEUE_FULL`
    QueueFull,
    /// `errQUEUE_EMPTY`
    QueueEmpty,
}

impl Status {
    /// Maps a result onto its status.
    #[inline]
    pub fn from_result<T, E: Into<RtosError>>(result: Result<T, E>) -> Self {
        match result {
            Ok(_) => Status::Pass,
            Err(e) => e.into().status(),
        }
    }

    /// Maps a success flag onto `pdTRUE` / `pdFALSE`.
    #[inline]
    pub const fn from_bool(ok: bool) -> Self {
        if ok {
            Status::Pass
        } else {
            Status::Fail
        }
    }

    /// The raw status word.
    #[inline]
    pub const fn code(self) -> BaseType {
        match self {
            Status::Pass => PD_PASS,
            Status::Fail => PD_FAIL,
            Status::QueueFull => ERR_QUEUE_FULL,
            Status::QueueEmpty => ERR_QUEUE_EMPTY,
        }
    }

    /// Returns `true` for [`Status::Pass`].
    #[inline]
    pub const fn is_pass(self) -> bool {
        matches!(self, Status::Pass)
    }
}

impl From<Status> for BaseType {
    #[inline]
    fn from(status: Status) -> Self {
        status.code()
    }
}

impl RtosError {
    /// Status reported for this error.
    pub const fn status(self) -> Status {
        match self {
            RtosError::QueueFull => Status::QueueFull,
            RtosError::QueueEmpty => Status::QueueEmpty,
            _ => Status::Fail,
        }
    }

    /// Human-readable description.
    pub const fn description(self) -> &'static str {
        match self {
            RtosError::NoMemory => "kernel heap exhausted",
            RtosError::Timeout => "timed out",
            RtosError::NotOwner => "mutex not owned by caller",
            RtosError::Rejected => "rejected by the kernel",
            RtosError::QueueFull => "queue is full",
            RtosError::QueueEmpty => "queue is empty",
        }
    }
}

impl fmt::Display for RtosError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(feature = "hosted")]
impl std::error::Error for RtosError {}

impl From<LockError> for RtosError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Timeout => RtosError::Timeout,
        }
    }
}

impl From<UnlockError> for RtosError {
    fn from(e: UnlockError) -> Self {
        match e {
            UnlockError::NotOwner => RtosError::NotOwner,
            UnlockError::Rejected => RtosError::Rejected,
        }
    }
}

impl From<QueueError> for RtosError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Full => RtosError::QueueFull,
            QueueError::Empty => RtosError::QueueEmpty,
        }
    }
}

impl From<TaskError> for RtosError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::NoMemory => RtosError::NoMemory,
        }
    }
}

/// Flattens a result into a FreeRTOS status word.
#[inline]
pub fn status<T, E: Into<RtosError>>(result: Result<T, E>) -> BaseType {
    Status::from_result(result).code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(status::<(), LockError>(Ok(())), PD_TRUE);
        assert_eq!(status::<(), _>(Err(LockError::Timeout)), PD_FALSE);
        assert_eq!(status::<(), _>(Err(QueueError::Full)), ERR_QUEUE_FULL);
        assert_eq!(status::<(), _>(Err(QueueError::Empty)), ERR_QUEUE_EMPTY);
        assert_eq!(status::<(), _>(Err(TaskError::NoMemory)), PD_FAIL);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(RtosError::from(UnlockError::NotOwner), RtosError::NotOwner);
        assert_eq!(RtosError::from(QueueError::Full), RtosError::QueueFull);
        assert_eq!(RtosError::from(TaskError::NoMemory), RtosError::NoMemory);
        assert_eq!(RtosError::from(LockError::Timeout), RtosError::Timeout);
    }

    #[test]
    fn test_status_enum() {
        assert_eq!(Status::from_bool(true), Status::Pass);
        assert_eq!(BaseType::from(Status::from_bool(false)), PD_FALSE);
        assert_eq!(
            Status::from_result::<(), _>(Err(QueueError::Empty)),
            Status::QueueEmpty
        );
        assert!(Status::from_result::<u8, LockError>(Ok(3)).is_pass());
        assert_eq!(RtosError::Timeout.status(), Status::Fail);
    }

    #[test]
    fn test_display() {
        assert_eq!(RtosError::QueueFull.to_string(), "queue is full");
        assert_eq!(RtosError::NotOwner.to_string(), "mutex not owned by caller");
    }
}
