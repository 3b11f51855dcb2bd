//! Bounded, per-signal collection of timestamped readings.
//!
//! Batches of caller records are merged into a [`SignalAccumulator`]. Each merge
//! returns a new accumulator; once the total would exceed `max_size`, readings are
//! downsampled so every signal keeps at most one reading per time bucket.
//!
//! ```
//! use serde_json::json;
//! use signal_accumulator::{Meta, SignalAccumulator};
//!
//! let meta = Meta::new("id", "device", "ts", 1_000).unwrap();
//! let first = SignalAccumulator::from_batch(
//!     meta,
//!     &[json!({"id": "r1", "device": "d1", "ts": 1}), json!({"id": "r2", "device": "d2", "ts": 2})],
//! )
//! .unwrap();
//! let second = first.add(&[json!({"id": "r3", "device": "d1", "ts": 3})]).unwrap();
//!
//! assert_eq!(first.count(), 2);
//! assert_eq!(second.signal_ids("d1").unwrap(), ["r1", "r3"]);
//! ```

pub mod accumulator;
pub mod config;
pub mod errors;
pub mod limiter;
pub mod metrics_consts;
pub mod normalizer;
pub mod replay;
pub mod types;

pub use accumulator::SignalAccumulator;
pub use config::Config;
pub use errors::AccumulatorError;
pub use limiter::{BucketLimiter, BucketLimiterResult};
pub use normalizer::normalize;
pub use replay::{replay, ReplayError};
pub use types::{Meta, Reading, RecordFields};
