use nix::errno::Errno;
use thiserror::Error;

/// Errors raised by the activity scheduler and its collaborators.
///
/// Every variant is fatal for a measurement run. The binary reports it and
/// exits non-zero without dumping a partial log.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RattleError {
    /// The wall clock or tick counter could not be read.
    #[error("timing failure in {operation}: {cause}")]
    TimingFailure {
        /// Operation that needed the clock.
        operation: &'static str,
        /// Underlying cause.
        cause: String,
    },

    /// A blocking wait failed for a reason other than signal interruption.
    #[error("wait failed (requested {requested_us}us): {errno}")]
    WaitFailure {
        /// Requested wait in microseconds.
        requested_us: u64,
        /// Error reported by the wait primitive.
        errno: Errno,
    },

    /// The execution log is full.
    #[error("execution log overflow: capacity of {capacity} entries exhausted")]
    LogCapacityExceeded {
        /// Configured log capacity.
        capacity: usize,
    },

    /// A requested duration was negative or not finite.
    #[error("invalid duration: {0}s")]
    InvalidDuration(f64),

    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Real-time environment setup failed.
    #[error("real-time setup failed: {0}")]
    Realtime(String),
}

impl RattleError {
    /// Build a [`RattleError::TimingFailure`] from any displayable cause.
    pub fn timing(operation: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::TimingFailure {
            operation,
            cause: cause.to_string(),
        }
    }
}

/// Convenience type alias for rattle operations.
pub type RattleResult<T> = Result<T, RattleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_operation_and_cause() {
        let err = RattleError::timing("calibrate", "clock_gettime: EINVAL");
        assert_eq!(
            err.to_string(),
            "timing failure in calibrate: clock_gettime: EINVAL"
        );

        let err = RattleError::WaitFailure {
            requested_us: 1500,
            errno: Errno::EFAULT,
        };
        assert!(err.to_string().contains("1500us"));
    }
}
