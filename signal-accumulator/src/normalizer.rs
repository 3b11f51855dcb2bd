use metrics::counter;
use tracing::debug;

use crate::metrics_consts::{RECORDS_DROPPED, RECORDS_RECEIVED};
use crate::types::{Meta, Reading, RecordFields};

/// Extracts a reading from every record with a non-empty string id and signal
/// and a finite numeric timestamp. Anything else is dropped, keeping input order.
pub fn normalize<R>(meta: &Meta, records: &[R]) -> Vec<Reading<R>>
where
    R: RecordFields + Clone,
{
    let readings: Vec<Reading<R>> = records
        .iter()
        .filter_map(|record| extract(meta, record))
        .collect();

    let dropped = records.len() - readings.len();
    counter!(RECORDS_RECEIVED).increment(records.len() as u64);
    if dropped > 0 {
        debug!(dropped, received = records.len(), "dropped malformed records");
        counter!(RECORDS_DROPPED).increment(dropped as u64);
    }

    readings
}

fn extract<R>(meta: &Meta, record: &R) -> Option<Reading<R>>
where
    R: RecordFields + Clone,
{
    let signal = record.text(&meta.signal_field).filter(|s| !s.is_empty())?;
    let id = record.text(&meta.id_field).filter(|s| !s.is_empty())?;
    let timestamp = record.number(&meta.time_field).filter(|t| t.is_finite())?;

    Some(Reading {
        id: id.to_string(),
        signal: signal.to_string(),
        timestamp,
        record: record.clone(),
    })
}
