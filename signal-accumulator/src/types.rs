use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AccumulatorError;

/// Names the record fields that carry the reading id, the signal it belongs to
/// and its timestamp, plus the total number of readings an accumulator keeps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub id_field: String,
    pub signal_field: String,
    pub time_field: String,
    pub max_size: usize,
}

impl Meta {
    pub fn new(
        id_field: impl Into<String>,
        signal_field: impl Into<String>,
        time_field: impl Into<String>,
        max_size: usize,
    ) -> Result<Self, AccumulatorError> {
        let meta = Meta {
            id_field: id_field.into(),
            signal_field: signal_field.into(),
            time_field: time_field.into(),
            max_size,
        };
        meta.validate()?;
        Ok(meta)
    }

    pub fn validate(&self) -> Result<(), AccumulatorError> {
        if self.max_size == 0 {
            return Err(AccumulatorError::InvalidMaxSize);
        }
        for (name, value) in [
            ("id", &self.id_field),
            ("signal", &self.signal_field),
            ("time", &self.time_field),
        ] {
            if value.is_empty() {
                return Err(AccumulatorError::EmptyFieldName(name));
            }
        }
        Ok(())
    }
}

/// Typed access to the fields of a caller record, by the names held in [`Meta`].
///
/// Implemented for JSON values and objects. Callers with their own record
/// structs implement it by matching on the field name.
pub trait RecordFields {
    /// The field as a string, or `None` if it is missing or not a string.
    fn text(&self, field: &str) -> Option<&str>;

    /// The field as a number, or `None` if it is missing or not numeric.
    fn number(&self, field: &str) -> Option<f64>;
}

impl RecordFields for Map<String, Value> {
    fn text(&self, field: &str) -> Option<&str> {
        self.get(field)?.as_str()
    }

    fn number(&self, field: &str) -> Option<f64> {
        self.get(field)?.as_f64()
    }
}

impl RecordFields for Value {
    fn text(&self, field: &str) -> Option<&str> {
        self.as_object()?.text(field)
    }

    fn number(&self, field: &str) -> Option<f64> {
        self.as_object()?.number(field)
    }
}

/// A validated reading, together with the record it was extracted from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading<R> {
    pub id: String,
    pub signal: String,
    pub timestamp: f64,
    pub record: R,
}
