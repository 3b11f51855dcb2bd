use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::AccumulatorError;
use crate::limiter::{BucketLimiter, BucketLimiterResult};
use crate::metrics_consts::{
    ACCUMULATOR_SIZE, DUPLICATES_SKIPPED, MERGE_FAILURES, READINGS_ADMITTED, READINGS_THINNED,
    SELECTIVE_ADDS,
};
use crate::normalizer::normalize;
use crate::types::{Meta, Reading, RecordFields};

/// Readings grouped by signal, capped at `meta.max_size` in total.
///
/// Values are never modified in place: [`SignalAccumulator::add`] returns a new
/// accumulator and leaves the receiver untouched. Readings and the per-signal id
/// lists that a merge doesn't change are shared with the previous value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalAccumulator<R = Value> {
    meta: Meta,
    by_id: IndexMap<String, Arc<Reading<R>>>,
    by_signal: IndexMap<String, Arc<Vec<String>>>,
    count: usize,
    // Widened by every accepted reading, never narrowed when readings are thinned.
    min_timestamp: Option<f64>,
    max_timestamp: Option<f64>,
}

impl<R> SignalAccumulator<R> {
    pub fn new(meta: Meta) -> Self {
        SignalAccumulator {
            meta,
            by_id: IndexMap::new(),
            by_signal: IndexMap::new(),
            count: 0,
            min_timestamp: None,
            max_timestamp: None,
        }
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Smallest and largest timestamp ever accepted, `None` until the first reading.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.min_timestamp.zip(self.max_timestamp)
    }

    pub fn signals(&self) -> impl Iterator<Item = &str> {
        self.by_signal.keys().map(String::as_str)
    }

    /// Ids kept for a signal, in the order they were accepted.
    pub fn signal_ids(&self, signal: &str) -> Option<&[String]> {
        self.by_signal.get(signal).map(|ids| ids.as_slice())
    }

    pub fn get(&self, id: &str) -> Option<&Reading<R>> {
        self.by_id.get(id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Every retained reading. Readings of one signal come out in acceptance order,
    /// no order is promised across signals.
    pub fn materialize(&self) -> Vec<&Reading<R>> {
        self.by_id.values().map(Arc::as_ref).collect()
    }

    /// Same as [`materialize`](Self::materialize), projected to the caller's records.
    pub fn records(&self) -> Vec<&R> {
        self.by_id.values().map(|reading| &reading.record).collect()
    }

    pub fn check_invariants(&self) -> Result<(), AccumulatorError> {
        self.meta.validate()?;

        let listed: usize = self.by_signal.values().map(|ids| ids.len()).sum();
        if listed != self.by_id.len() || self.count != self.by_id.len() {
            return Err(AccumulatorError::InvariantViolation(format!(
                "unequal sizes: count {}, by_id {}, by_signal {}",
                self.count,
                self.by_id.len(),
                listed
            )));
        }
        if self.count > self.meta.max_size {
            return Err(AccumulatorError::InvariantViolation(format!(
                "count {} exceeds max_size {}",
                self.count, self.meta.max_size
            )));
        }

        let mut seen = HashSet::with_capacity(self.count);
        for (signal, ids) in &self.by_signal {
            for id in ids.iter() {
                if !seen.insert(id.as_str()) {
                    return Err(AccumulatorError::InvariantViolation(format!(
                        "id {id} listed more than once"
                    )));
                }
                match self.by_id.get(id) {
                    Some(reading) if reading.id == *id && reading.signal == *signal => {}
                    _ => {
                        return Err(AccumulatorError::InvariantViolation(format!(
                            "id {id} listed under signal {signal} has no matching reading"
                        )))
                    }
                }
            }
        }

        if self.count > 0 {
            match self.bounds() {
                Some((min, max)) if min.is_finite() && max.is_finite() && min <= max => {}
                bounds => {
                    return Err(AccumulatorError::InvariantViolation(format!(
                        "invalid timestamp bounds {bounds:?} for {} readings",
                        self.count
                    )))
                }
            }
        }

        Ok(())
    }

    fn widen(&mut self, timestamp: f64) {
        self.min_timestamp = Some(self.min_timestamp.map_or(timestamp, |t| t.min(timestamp)));
        self.max_timestamp = Some(self.max_timestamp.map_or(timestamp, |t| t.max(timestamp)));
    }
}

impl<R> SignalAccumulator<R>
where
    R: RecordFields + Clone,
{
    /// Builds an accumulator from a first batch, as if merged into an empty one.
    pub fn from_batch(meta: Meta, records: &[R]) -> Result<Self, AccumulatorError> {
        Self::new(meta).add(records)
    }

    /// Merges a batch of records and returns the resulting accumulator.
    ///
    /// Malformed records and ids that are already present are skipped. When the
    /// batch would push the total past `max_size`, the existing readings and the
    /// batch are thinned so that each signal keeps at most one reading per time
    /// bucket; the first reading seen for a bucket wins.
    pub fn add(&self, records: &[R]) -> Result<Self, AccumulatorError> {
        match self.merge(records) {
            Ok(merged) => {
                gauge!(ACCUMULATOR_SIZE).set(merged.count as f64);
                Ok(merged)
            }
            Err(err) => {
                warn!(error = %err, max_size = self.meta.max_size, "merge aborted");
                counter!(MERGE_FAILURES, "reason" => err.reason()).increment(1);
                Err(err)
            }
        }
    }

    fn merge(&self, records: &[R]) -> Result<Self, AccumulatorError> {
        self.check_invariants()?;

        let readings = normalize(&self.meta, records);
        if readings.is_empty() {
            return Ok(self.clone());
        }

        let incoming = readings
            .iter()
            .map(|reading| reading.id.as_str())
            .filter(|id| !self.by_id.contains_key(*id))
            .collect::<HashSet<_>>()
            .len();

        let merged = if self.count + incoming <= self.meta.max_size {
            self.plain_merge(readings)
        } else {
            self.selective_add(readings)?
        };

        merged.check_invariants()?;
        Ok(merged)
    }

    fn plain_merge(&self, readings: Vec<Reading<R>>) -> Self {
        let mut next = self.clone();
        let mut duplicates = 0;

        for reading in readings {
            if next.by_id.contains_key(&reading.id) {
                duplicates += 1;
                continue;
            }
            next.insert(reading);
        }

        let admitted = next.count - self.count;
        debug!(admitted, duplicates, size = next.count, "plain merge");
        counter!(READINGS_ADMITTED).increment(admitted as u64);
        counter!(DUPLICATES_SKIPPED).increment(duplicates);

        next
    }

    fn selective_add(&self, readings: Vec<Reading<R>>) -> Result<Self, AccumulatorError> {
        // buckets span the batch too, but only admitted readings widen the stored bounds
        let mut next = Self::new(self.meta.clone());
        next.min_timestamp = self.min_timestamp;
        next.max_timestamp = self.max_timestamp;
        let (min, max) = readings.iter().fold(
            self.bounds().unwrap_or((f64::INFINITY, f64::NEG_INFINITY)),
            |(min, max), reading| (min.min(reading.timestamp), max.max(reading.timestamp)),
        );

        let signals = self
            .by_signal
            .keys()
            .map(String::as_str)
            .chain(readings.iter().map(|reading| reading.signal.as_str()));
        let mut limiter = BucketLimiter::new(signals, min, max, self.meta.max_size)?;

        info!(
            signal_count = limiter.signal_count(),
            intervals_per_signal = limiter.intervals_per_signal(),
            bucket_width = limiter.bucket_width(),
            existing = self.count,
            incoming = readings.len(),
            "capacity exceeded, downsampling"
        );
        counter!(SELECTIVE_ADDS).increment(1);

        // thin what we already hold with the new bucket layout
        let mut thinned_existing = 0;
        for (signal, ids) in &self.by_signal {
            let mut kept = Vec::with_capacity(ids.len().min(limiter.intervals_per_signal()));
            for id in ids.iter() {
                let Some(reading) = self.by_id.get(id) else {
                    return Err(AccumulatorError::InvariantViolation(format!(
                        "id {id} listed under signal {signal} has no reading"
                    )));
                };
                match limiter.check(signal, reading.timestamp) {
                    BucketLimiterResult::Admitted => {
                        kept.push(id.clone());
                        next.by_id.insert(id.clone(), Arc::clone(reading));
                    }
                    BucketLimiterResult::Limited => thinned_existing += 1,
                }
            }
            let kept = if kept.len() == ids.len() {
                Arc::clone(ids)
            } else {
                Arc::new(kept)
            };
            next.by_signal.insert(signal.clone(), kept);
        }

        // then admit the batch under the same buckets, first come first served
        let mut thinned_incoming = 0;
        let mut duplicates = 0;
        let mut admitted = 0;
        for reading in readings {
            if next.by_id.contains_key(&reading.id) {
                duplicates += 1;
                continue;
            }
            match limiter.check(&reading.signal, reading.timestamp) {
                BucketLimiterResult::Admitted => {
                    next.insert(reading);
                    admitted += 1;
                }
                BucketLimiterResult::Limited => thinned_incoming += 1,
            }
        }

        next.count = next.by_id.len();

        debug!(
            admitted,
            duplicates,
            thinned_existing,
            thinned_incoming,
            size = next.count,
            "selective add"
        );
        counter!(READINGS_ADMITTED).increment(admitted);
        counter!(DUPLICATES_SKIPPED).increment(duplicates);
        counter!(READINGS_THINNED, "source" => "existing").increment(thinned_existing);
        counter!(READINGS_THINNED, "source" => "incoming").increment(thinned_incoming);

        Ok(next)
    }

    fn insert(&mut self, reading: Reading<R>) {
        self.widen(reading.timestamp);
        Arc::make_mut(self.by_signal.entry(reading.signal.clone()).or_default())
            .push(reading.id.clone());
        self.by_id.insert(reading.id.clone(), Arc::new(reading));
        self.count += 1;
    }
}
