//! Positioning (COT) signal: net-position ratios and the macro weight
//! derived from their period-over-period changes.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct PositioningRecord {
    pub report_date: NaiveDate,
    pub long_count: i64,
    pub short_count: i64,
}

impl PositioningRecord {
    pub fn net_ratio(&self) -> f64 {
        net_ratio(self)
    }
}

/// (long - short) / (long + short), 0.0 when there are no positions.
pub fn net_ratio(record: &PositioningRecord) -> f64 {
    let total = record.long_count + record.short_count;
    if total == 0 {
        return 0.0;
    }
    (record.long_count - record.short_count) as f64 / total as f64
}

pub fn net_ratios(records: &[PositioningRecord]) -> Vec<f64> {
    records.iter().map(net_ratio).collect()
}

/// Latest ratio minus the one before it; `None` with fewer than two records.
pub fn net_change(records: &[PositioningRecord]) -> Option<f64> {
    match records {
        [.., prev, last] => Some(net_ratio(last) - net_ratio(prev)),
        _ => None,
    }
}

/// Sum of absolute period-over-period ratio changes across the window.
pub fn aggregate_change(records: &[PositioningRecord]) -> f64 {
    net_ratios(records)
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .sum()
}

/// How a positioning history is collapsed into a single macro weight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MacroWeighting {
    /// Most recent single-step change in net ratio.
    #[default]
    LatestChange,
    /// Total positioning turbulence over the whole window.
    AggregateTurbulence,
}

impl MacroWeighting {
    /// `None` when the history is too short for a change to exist.
    pub fn weight(&self, records: &[PositioningRecord]) -> Option<f64> {
        if records.len() < 2 {
            return None;
        }
        match self {
            MacroWeighting::LatestChange => net_change(records),
            MacroWeighting::AggregateTurbulence => Some(aggregate_change(records)),
        }
    }
}

impl fmt::Display for MacroWeighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroWeighting::LatestChange => write!(f, "latest"),
            MacroWeighting::AggregateTurbulence => write!(f, "aggregate"),
        }
    }
}

impl FromStr for MacroWeighting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latest" | "latest_change" => Ok(MacroWeighting::LatestChange),
            "aggregate" | "aggregate_turbulence" => Ok(MacroWeighting::AggregateTurbulence),
            other => Err(format!(
                "unknown weighting '{other}', expected 'latest' or 'aggregate'"
            )),
        }
    }
}
