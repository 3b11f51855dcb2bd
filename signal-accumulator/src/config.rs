use std::str::FromStr;

use envconfig::Envconfig;

use crate::errors::AccumulatorError;
use crate::types::Meta;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(default = "id")]
    pub id_field: String,

    #[envconfig(default = "signal")]
    pub signal_field: String,

    #[envconfig(default = "timestamp")]
    pub time_field: String,

    #[envconfig(default = "1000")]
    pub max_size: usize,

    // Records merged per add call when replaying
    #[envconfig(default = "500")]
    pub batch_size: usize,

    #[envconfig(default = "readings")]
    pub output: OutputMode,
}

impl Config {
    pub fn to_meta(&self) -> Result<Meta, AccumulatorError> {
        Meta::new(
            self.id_field.clone(),
            self.signal_field.clone(),
            self.time_field.clone(),
            self.max_size,
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// The retained records, as a JSON array.
    Readings,
    /// The whole accumulator, serialized.
    Accumulator,
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "readings" => Ok(OutputMode::Readings),
            "accumulator" => Ok(OutputMode::Accumulator),
            _ => Err(format!("Unknown output mode: {s}")),
        }
    }
}
