use thiserror::Error;

/// Failures that abort a merge. Malformed records are never reported here,
/// they are dropped by the normalizer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccumulatorError {
    #[error("max_size must be at least 1")]
    InvalidMaxSize,
    #[error("field name for {0} must not be empty")]
    EmptyFieldName(&'static str),
    #[error("selective add: no signals to distribute capacity over")]
    NoSignals,
    #[error("selective add: {signal_count} signals do not fit in max_size {max_size}")]
    TooManySignals { signal_count: usize, max_size: usize },
    #[error("selective add: no intervals left for {signal_count} signals in max_size {max_size}")]
    NoIntervals { signal_count: usize, max_size: usize },
    #[error("selective add: degenerate time range [{min}, {max}]")]
    DegenerateTimeRange { min: f64, max: f64 },
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl AccumulatorError {
    /// Short label used when reporting merge failures.
    pub fn reason(&self) -> &'static str {
        match self {
            AccumulatorError::InvalidMaxSize => "invalid_max_size",
            AccumulatorError::EmptyFieldName(_) => "empty_field_name",
            AccumulatorError::NoSignals => "no_signals",
            AccumulatorError::TooManySignals { .. } => "too_many_signals",
            AccumulatorError::NoIntervals { .. } => "no_intervals",
            AccumulatorError::DegenerateTimeRange { .. } => "degenerate_time_range",
            AccumulatorError::InvariantViolation(_) => "invariant_violation",
        }
    }
}
