//! The result alphabet shared by every public entry point in this crate.

use thiserror::Error;

/// Error currency for the whole runtime. There is no `Ok` variant here:
/// success is expressed as `Result<T, Status>`'s `Ok(T)` arm.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    #[error("invalid argument")]
    InvalidArgument,
    #[error("resource exhausted")]
    ResourceExhausted,
    #[error("failed precondition")]
    FailedPrecondition,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("should wait")]
    ShouldWait,
    #[error("already exists")]
    AlreadyExists,
    #[error("busy")]
    Busy,
    #[error("cancelled")]
    Cancelled,
    #[error("out of range")]
    OutOfRange,
    #[error("unimplemented")]
    Unimplemented,
    #[error("internal error")]
    Internal,
}

impl Status {
    /// `SHOULD_WAIT` and `BUSY` are the only two results a caller is expected
    /// to retry without changing its request.
    pub fn is_retryable(self) -> bool {
        matches!(self, Status::ShouldWait | Status::Busy)
    }
}

pub type IpcResult<T> = std::result::Result<T, Status>;

/// Wraps a lock-poisoning or other "this should never happen" condition,
/// logs it, and folds it into [`Status::Internal`].
#[track_caller]
pub(crate) fn internal(msg: impl std::fmt::Display) -> Status {
    tracing::error!(%msg, "internal error");
    Status::Internal
}
