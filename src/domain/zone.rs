//! Key Liquidity zone sizing and classification.
//!
//! zone_size = ATR[anchor] * atr_multiplier * (1 + |macro_weight|)
//!
//! Bounds depend on the anchor's swing classification:
//! - swing high: [high - size/2, high + size]
//! - swing low:  [low - size, low + size/2]
//! - general:    [low - size/2, high + size/2]

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::domain::enrich::EnrichedBar;
use crate::domain::indicator::atr::{calc_atr, DEFAULT_ATR_PERIOD};
use crate::domain::ohlcv::PriceBar;
use crate::domain::swing::{find_swings, SwingKind, DEFAULT_SWING_WINDOW};

pub const DEFAULT_ATR_MULTIPLIER: f64 = 2.0;

/// Weight applied when no macro signal is available.
pub const NEUTRAL_MACRO_WEIGHT: f64 = 0.5;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ZoneError {
    #[error("anchor index {index} out of range for series of {len} bars")]
    AnchorOutOfRange { index: usize, len: usize },

    #[error("no candle at {timestamp} in price series")]
    AnchorNotFound { timestamp: String },

    #[error("ATR({period}) undefined at anchor index {index}: need at least {period} bars")]
    AtrUndefined { index: usize, period: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneType {
    SwingHigh,
    SwingLow,
    General,
}

impl From<Option<SwingKind>> for ZoneType {
    fn from(kind: Option<SwingKind>) -> Self {
        match kind {
            Some(SwingKind::High) => ZoneType::SwingHigh,
            Some(SwingKind::Low) => ZoneType::SwingLow,
            None => ZoneType::General,
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneType::SwingHigh => write!(f, "Swing High"),
            ZoneType::SwingLow => write!(f, "Swing Low"),
            ZoneType::General => write!(f, "General"),
        }
    }
}

impl FromStr for ZoneType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "swing high" | "swinghigh" => Ok(ZoneType::SwingHigh),
            "swing low" | "swinglow" => Ok(ZoneType::SwingLow),
            "general" => Ok(ZoneType::General),
            other => Err(format!("unknown zone type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneParams {
    pub atr_period: usize,
    pub atr_multiplier: f64,
    pub swing_window: usize,
}

impl Default for ZoneParams {
    fn default() -> Self {
        Self {
            atr_period: DEFAULT_ATR_PERIOD,
            atr_multiplier: DEFAULT_ATR_MULTIPLIER,
            swing_window: DEFAULT_SWING_WINDOW,
        }
    }
}

/// A computed zone. Carries every anchor value it was built from so it can
/// be displayed or persisted without the series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KlZone {
    pub anchor_index: usize,
    pub anchor_timestamp: DateTime<FixedOffset>,
    pub anchor_price: f64,
    pub zone_high: f64,
    pub zone_low: f64,
    pub atr_value: f64,
    pub atr_multiplier: f64,
    pub macro_weight: Option<f64>,
    pub zone_type: ZoneType,
    pub zone_size: f64,
}

/// |macro_weight|, or the neutral 0.5 when no usable weight was supplied.
pub fn effective_weight(macro_weight: Option<f64>) -> f64 {
    match macro_weight {
        Some(w) if w.is_finite() => w.abs(),
        _ => NEUTRAL_MACRO_WEIGHT,
    }
}

pub fn zone_size(atr_value: f64, atr_multiplier: f64, macro_weight: Option<f64>) -> f64 {
    atr_value * atr_multiplier * (1.0 + effective_weight(macro_weight))
}

/// (zone_high, zone_low) for a bar of the given type.
pub fn place_zone(bar: &PriceBar, zone_type: ZoneType, size: f64) -> (f64, f64) {
    match zone_type {
        ZoneType::SwingHigh => (bar.high + size, bar.high - 0.5 * size),
        ZoneType::SwingLow => (bar.low + 0.5 * size, bar.low - size),
        ZoneType::General => (bar.high + 0.5 * size, bar.low - 0.5 * size),
    }
}

pub fn compute_zone(
    anchor_index: usize,
    bars: &[EnrichedBar],
    macro_weight: Option<f64>,
    params: &ZoneParams,
) -> Result<KlZone, ZoneError> {
    let anchor = bars.get(anchor_index).ok_or(ZoneError::AnchorOutOfRange {
        index: anchor_index,
        len: bars.len(),
    })?;

    let atr_value = calc_atr(bars, params.atr_period)
        .value_at(anchor_index)
        .ok_or(ZoneError::AtrUndefined {
            index: anchor_index,
            period: params.atr_period,
        })?;

    let zone_type = ZoneType::from(find_swings(bars, params.swing_window).classify(anchor_index));
    let size = zone_size(atr_value, params.atr_multiplier, macro_weight);
    let (zone_high, zone_low) = place_zone(&anchor.bar, zone_type, size);

    debug!(
        anchor_index,
        %zone_type,
        atr_value,
        zone_size = size,
        "computed KL zone"
    );

    Ok(KlZone {
        anchor_index,
        anchor_timestamp: anchor.bar.timestamp,
        anchor_price: anchor.bar.close,
        zone_high,
        zone_low,
        atr_value,
        atr_multiplier: params.atr_multiplier,
        macro_weight,
        zone_type,
        zone_size: size,
    })
}

/// Index of the bar at `timestamp`, matching the exact instant first and
/// then the same minute. Never falls back to a neighbouring candle.
pub fn find_anchor(
    bars: &[EnrichedBar],
    timestamp: &DateTime<FixedOffset>,
) -> Result<usize, ZoneError> {
    let minute = |ts: &DateTime<FixedOffset>| ts.timestamp().div_euclid(60);

    bars.iter()
        .position(|b| b.bar.timestamp == *timestamp)
        .or_else(|| {
            bars.iter()
                .position(|b| minute(&b.bar.timestamp) == minute(timestamp))
        })
        .ok_or_else(|| ZoneError::AnchorNotFound {
            timestamp: timestamp.to_rfc3339(),
        })
}
