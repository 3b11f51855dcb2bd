use std::io::{self, BufRead, Write};

use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::accumulator::SignalAccumulator;
use crate::config::{Config, OutputMode};
use crate::errors::AccumulatorError;
use crate::metrics_consts::REPLAY_LINES_SKIPPED;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Config(#[from] AccumulatorError),
    #[error("merge of batch {batch} failed: {source}")]
    Merge {
        batch: usize,
        source: AccumulatorError,
    },
    #[error("failed to read input: {0}")]
    Read(#[source] io::Error),
    #[error("failed to write output: {0}")]
    Write(#[from] io::Error),
    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Merges newline delimited JSON records from `input` into one accumulator,
/// `batch_size` records per merge. Blank and unparsable lines are skipped.
pub fn replay<B: BufRead>(config: &Config, input: B) -> Result<SignalAccumulator, ReplayError> {
    let meta = config.to_meta()?;
    info!(
        max_size = meta.max_size,
        batch_size = config.batch_size(),
        "replaying records"
    );

    let mut accumulator: SignalAccumulator = SignalAccumulator::new(meta);
    let mut batch: Vec<Value> = Vec::with_capacity(config.batch_size());
    let mut batches = 0;

    for (number, line) in input.lines().enumerate() {
        let line = line.map_err(ReplayError::Read)?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => batch.push(record),
            Err(e) => {
                warn!(line = number + 1, error = %e, "skipping unparsable line");
                counter!(REPLAY_LINES_SKIPPED).increment(1);
                continue;
            }
        }

        if batch.len() >= config.batch_size() {
            accumulator = merge_batch(&accumulator, &batch, batches)?;
            batch.clear();
            batches += 1;
        }
    }
    if !batch.is_empty() {
        accumulator = merge_batch(&accumulator, &batch, batches)?;
        batches += 1;
    }

    info!(
        batches,
        size = accumulator.count(),
        signals = accumulator.signals().count(),
        "replay finished"
    );
    Ok(accumulator)
}

fn merge_batch(
    accumulator: &SignalAccumulator,
    batch: &[Value],
    index: usize,
) -> Result<SignalAccumulator, ReplayError> {
    accumulator.add(batch).map_err(|source| ReplayError::Merge {
        batch: index,
        source,
    })
}

/// Writes the replay result as a single JSON line.
pub fn write_output<W: Write>(
    mode: OutputMode,
    accumulator: &SignalAccumulator,
    mut out: W,
) -> Result<(), ReplayError> {
    match mode {
        OutputMode::Readings => serde_json::to_writer(&mut out, &accumulator.records())?,
        OutputMode::Accumulator => serde_json::to_writer(&mut out, accumulator)?,
    }
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
