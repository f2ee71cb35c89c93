//! Error types for the scheduler module

use std::fmt;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Interval shorter than the one-minute floor
    IntervalTooShort {
        minutes: u64,
    },

    /// Interval longer than the one-year ceiling
    IntervalTooLong {
        minutes: u64,
    },

    /// No actions configured for the daemon
    NoActions,

    /// No content areas configured for the daemon
    NoAreas,

    /// Start time could not be parsed as HH:MM
    InvalidStartTime {
        value: String,
    },

    /// Max run count present but zero
    InvalidMaxRuns,

    /// Unknown action or area name in the configuration
    UnknownName {
        field: String,
        value: String,
    },

    /// A wall-clock time could not be mapped onto the local calendar
    TimeResolution {
        reason: String,
    },
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntervalTooShort { minutes } => {
                write!(f, "Interval of {} minutes is too short. Must be at least 1", minutes)
            }
            Self::IntervalTooLong { minutes } => {
                write!(f, "Interval of {} minutes is too long. Must be at most 525600", minutes)
            }
            Self::NoActions => write!(f, "At least one action must be configured"),
            Self::NoAreas => write!(f, "At least one content area must be configured"),
            Self::InvalidStartTime { value } => {
                write!(f, "Invalid start time '{}'. Expected HH:MM", value)
            }
            Self::InvalidMaxRuns => write!(f, "max_runs must be greater than 0 when set"),
            Self::UnknownName { field, value } => {
                write!(f, "Unknown {} '{}'", field, value)
            }
            Self::TimeResolution { reason } => {
                write!(f, "Failed to resolve wall-clock time: {}", reason)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

impl SchedulerError {
    /// Create an invalid start time error
    pub fn invalid_start_time(value: impl Into<String>) -> Self {
        Self::InvalidStartTime {
            value: value.into(),
        }
    }

    /// Create an unknown name error
    pub fn unknown_name(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::UnknownName {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TimeResolution { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_error_message() {
        let err = SchedulerError::IntervalTooShort { minutes: 0 };
        assert!(err.to_string().contains("at least 1"));
    }

    #[test]
    fn test_interval_too_long_message() {
        let err = SchedulerError::IntervalTooLong { minutes: 1_000_000 };
        assert!(err.to_string().contains("1000000"));
        assert!(err.to_string().contains("at most"));
    }

    #[test]
    fn test_invalid_start_time_error() {
        let err = SchedulerError::invalid_start_time("25:99");
        assert!(err.to_string().contains("25:99"));
        assert!(err.to_string().contains("HH:MM"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(!SchedulerError::NoActions.is_recoverable());
        let err = SchedulerError::TimeResolution {
            reason: "gap".to_string(),
        };
        assert!(err.is_recoverable());
    }
}
