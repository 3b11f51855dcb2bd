pub const RECORDS_RECEIVED: &str = "signal_accumulator_records_received";
pub const RECORDS_DROPPED: &str = "signal_accumulator_records_dropped";
pub const DUPLICATES_SKIPPED: &str = "signal_accumulator_duplicates_skipped";
pub const READINGS_ADMITTED: &str = "signal_accumulator_readings_admitted";
/// Labelled with `source`: `existing` or `incoming`.
pub const READINGS_THINNED: &str = "signal_accumulator_readings_thinned";
pub const SELECTIVE_ADDS: &str = "signal_accumulator_selective_adds";
/// Labelled with `reason`, see `AccumulatorError::reason`.
pub const MERGE_FAILURES: &str = "signal_accumulator_merge_failures";
pub const ACCUMULATOR_SIZE: &str = "signal_accumulator_size";
pub const REPLAY_LINES_SKIPPED: &str = "signal_accumulator_replay_lines_skipped";
