//! Average True Range.
//!
//! TR[0] = high - low (no prior close)
//! TR[i] = max(high - low, |high - close[i-1]|, |low - close[i-1]|)
//! ATR(n)[i] = SMA(n) of TR, undefined for i < n-1.

use crate::domain::enrich::EnrichedBar;
use crate::domain::indicator::sma::rolling_mean;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};

pub const DEFAULT_ATR_PERIOD: usize = 14;

pub fn true_ranges(bars: &[EnrichedBar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| match i {
            0 => bar.bar.range(),
            _ => bar.bar.true_range(bars[i - 1].bar.close),
        })
        .collect()
}

/// ATR series aligned one-to-one with `bars`.
pub fn calc_atr(bars: &[EnrichedBar], period: usize) -> IndicatorSeries {
    let averages = rolling_mean(&true_ranges(bars), period);

    let values = bars
        .iter()
        .zip(averages)
        .map(|(bar, value)| IndicatorPoint {
            timestamp: bar.bar.timestamp,
            value,
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}
