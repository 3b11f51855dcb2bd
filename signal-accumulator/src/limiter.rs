//! When a merge would push an accumulator past its capacity, every signal gets the
//! same quota of time buckets spread over the observed timestamp range, and at most
//! one reading per (signal, bucket) survives.
//!
//! Bucket boundaries depend on the signal count and the time range of the merge
//! they were built for, so a limiter only lives for a single merge call. Points
//! kept by one call can be evicted by the next one once the range has grown.

use std::collections::{HashMap, HashSet};

use crate::errors::AccumulatorError;

#[derive(Debug, PartialEq)]
pub enum BucketLimiterResult {
    Admitted,
    Limited,
}

#[derive(Debug)]
pub struct BucketLimiter {
    min_timestamp: f64,
    bucket_width: f64,
    intervals_per_signal: usize,
    signal_count: usize,
    used: HashMap<String, HashSet<usize>>,
}

impl BucketLimiter {
    /// `signals` may contain repeats; only distinct values count towards the quota.
    pub fn new<'a, I>(
        signals: I,
        min_timestamp: f64,
        max_timestamp: f64,
        max_size: usize,
    ) -> Result<Self, AccumulatorError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let signal_count = signals.into_iter().collect::<HashSet<_>>().len();
        if signal_count == 0 {
            return Err(AccumulatorError::NoSignals);
        }
        // TODO: drop the least recently seen signals instead of failing the merge
        if signal_count >= max_size {
            return Err(AccumulatorError::TooManySignals {
                signal_count,
                max_size,
            });
        }

        let intervals_per_signal = max_size / signal_count;
        if intervals_per_signal < 1 {
            return Err(AccumulatorError::NoIntervals {
                signal_count,
                max_size,
            });
        }

        let degenerate = AccumulatorError::DegenerateTimeRange {
            min: min_timestamp,
            max: max_timestamp,
        };
        if !min_timestamp.is_finite() || !max_timestamp.is_finite() {
            return Err(degenerate);
        }
        let bucket_width = (max_timestamp - min_timestamp) / intervals_per_signal as f64;
        if !bucket_width.is_finite() || bucket_width <= 0.0 {
            return Err(degenerate);
        }

        Ok(BucketLimiter {
            min_timestamp,
            bucket_width,
            intervals_per_signal,
            signal_count,
            used: HashMap::with_capacity(signal_count),
        })
    }

    pub fn signal_count(&self) -> usize {
        self.signal_count
    }

    pub fn intervals_per_signal(&self) -> usize {
        self.intervals_per_signal
    }

    pub fn bucket_width(&self) -> f64 {
        self.bucket_width
    }

    /// The bucket a timestamp falls in. The upper edge of the range belongs to the
    /// last bucket, so a signal never owns more than `intervals_per_signal` buckets.
    pub fn bucket(&self, timestamp: f64) -> usize {
        let index = ((timestamp - self.min_timestamp) / self.bucket_width).floor();
        // float to int casts saturate, negative offsets land in bucket 0
        (index as usize).min(self.intervals_per_signal - 1)
    }

    pub fn is_used(&self, signal: &str, timestamp: f64) -> bool {
        let bucket = self.bucket(timestamp);
        self.used
            .get(signal)
            .is_some_and(|buckets| buckets.contains(&bucket))
    }

    pub fn mark_used(&mut self, signal: &str, timestamp: f64) {
        let bucket = self.bucket(timestamp);
        match self.used.get_mut(signal) {
            Some(buckets) => {
                buckets.insert(bucket);
            }
            None => {
                self.used.insert(signal.to_string(), HashSet::from([bucket]));
            }
        }
    }

    /// Claims the bucket for the reading if nobody did before during this merge.
    pub fn check(&mut self, signal: &str, timestamp: f64) -> BucketLimiterResult {
        if self.is_used(signal, timestamp) {
            return BucketLimiterResult::Limited;
        }
        self.mark_used(signal, timestamp);
        BucketLimiterResult::Admitted
    }
}
