// Error types for the scheduler core
// All scheduling entry points validate their arguments before touching state

/// Result type for scheduler operations
pub type TimingResult<T> = Result<T, TimingError>;

/// Errors that can occur in the scheduler core
///
/// Two failure modes from the design are deliberately *not* error values:
/// a bounded timeline prunes its oldest entries silently (warn-logged),
/// and a failed real-time driver falls back to the deferred driver
/// (warn-logged). Neither is observable through `Result`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimingError {
    /// Non-finite or out-of-range time or value passed to a scheduling call.
    /// Rejected synchronously before any mutation.
    #[error("Invalid argument: {what} was {value}")]
    InvalidArgument { what: &'static str, value: f64 },

    /// An insertion into a monotonic-append timeline arrived out of order
    #[error("Ordering violation: insert at {time} after event at {last}")]
    OrderingViolation { time: f64, last: f64 },

    /// A user callback failed during tick enumeration.
    /// Captured and returned only after the enumeration's own
    /// bookkeeping has completed.
    #[error("Callback error: {0}")]
    Callback(String),
}

impl TimingError {
    /// Validate that a value is finite, naming it on failure
    pub fn check_finite(what: &'static str, value: f64) -> TimingResult<f64> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(TimingError::InvalidArgument { what, value })
        }
    }

    /// Validate that a value is finite and non-negative
    pub fn check_non_negative(what: &'static str, value: f64) -> TimingResult<f64> {
        if value.is_finite() && value >= 0.0 {
            Ok(value)
        } else {
            Err(TimingError::InvalidArgument { what, value })
        }
    }
}
