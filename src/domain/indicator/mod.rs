//! Rolling indicators over enriched price series.
//!
//! - `IndicatorPoint`: one timestamped value, `None` during warmup
//! - `IndicatorType`: indicator identity + parameters
//! - `IndicatorSeries`: a series aligned one-to-one with its input bars

pub mod atr;
pub mod sma;

use chrono::{DateTime, FixedOffset};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<FixedOffset>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Atr(usize),
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`, `None` when out of range or still warming up.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values.get(index).and_then(|p| p.value)
    }

    /// Number of leading undefined points.
    pub fn warmup(&self) -> usize {
        self.values.iter().take_while(|p| p.value.is_none()).count()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
        }
    }
}
