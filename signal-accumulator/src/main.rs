use std::io::{self, BufWriter};

use anyhow::Context;
use envconfig::Envconfig;
use signal_accumulator::{
    config::Config,
    replay::{replay, write_output},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    // stdout carries the result, logs go to stderr
    let log_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

/// Replays newline delimited JSON records from stdin through one accumulator and
/// writes what is left once the input is exhausted.
fn main() -> anyhow::Result<()> {
    setup_tracing();

    let config = Config::init_from_env().context("invalid configuration")?;
    let accumulator = replay(&config, io::stdin().lock()).context("replay failed")?;

    let out = BufWriter::new(io::stdout().lock());
    write_output(config.output, &accumulator, out).context("failed to write output")?;

    Ok(())
}
