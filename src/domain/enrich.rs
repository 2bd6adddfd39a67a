//! Series enrichment: raw provider rows into analysis-ready bars.
//!
//! Pipeline: parse + normalise timestamps to the chart offset, drop rows
//! with missing prices, inverted ranges or non-positive volume, sort
//! ascending, collapse
//! duplicate timestamps, then attach trailing average volume and RVol.

use std::ops::Range;

use chrono::{FixedOffset, Offset, Utc};
use tracing::debug;

use crate::domain::indicator::sma::rolling_mean;
use crate::domain::ohlcv::{PriceBar, RawBar};
use crate::domain::time_utils::{
    fixed_offset_hours, parse_timestamp, report_week_range, DateRange,
};

pub const DEFAULT_VOLUME_WINDOW: usize = 20;
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 3;

/// RVol reported while the volume average is still warming up.
pub const NEUTRAL_RVOL: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedBar {
    pub bar: PriceBar,
    /// Trailing mean volume; `None` for the first `volume_window - 1` bars.
    pub avg_volume: Option<f64>,
    pub rvol: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichConfig {
    pub volume_window: usize,
    pub utc_offset: FixedOffset,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            volume_window: DEFAULT_VOLUME_WINDOW,
            utc_offset: fixed_offset_hours(DEFAULT_UTC_OFFSET_HOURS).unwrap_or_else(|| Utc.fix()),
        }
    }
}

/// Enrich with the default 20-bar volume window in UTC+3.
pub fn enrich(raw: &[RawBar]) -> Vec<EnrichedBar> {
    enrich_with(raw, &EnrichConfig::default())
}

/// Enrich a raw table. Never fails: malformed rows are dropped and an
/// input without usable rows yields an empty series.
pub fn enrich_with(raw: &[RawBar], config: &EnrichConfig) -> Vec<EnrichedBar> {
    let mut bars: Vec<PriceBar> = raw
        .iter()
        .filter_map(|row| normalize(row, config.utc_offset))
        .collect();

    let dropped = raw.len() - bars.len();
    if dropped > 0 {
        debug!(dropped, kept = bars.len(), "dropped unusable price rows");
    }

    // Stable sort: among equal timestamps the later input row wins below.
    bars.sort_by_key(|b| b.timestamp);
    let bars = dedup_timestamps(bars);

    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let averages = rolling_mean(&volumes, config.volume_window);

    bars.into_iter()
        .zip(averages)
        .map(|(bar, avg_volume)| {
            let rvol = avg_volume.map_or(NEUTRAL_RVOL, |avg| bar.volume / avg);
            EnrichedBar {
                bar,
                avg_volume,
                rvol,
            }
        })
        .collect()
}

fn normalize(row: &RawBar, offset: FixedOffset) -> Option<PriceBar> {
    let timestamp = parse_timestamp(&row.timestamp)?.with_timezone(&offset);
    let finite = |v: Option<f64>| v.filter(|x| x.is_finite());

    let volume = finite(row.volume).filter(|v| *v > 0.0)?;
    let bar = PriceBar {
        timestamp,
        open: finite(row.open)?,
        high: finite(row.high)?,
        low: finite(row.low)?,
        close: finite(row.close)?,
        volume,
    };
    is_consistent(&bar).then_some(bar)
}

/// High is not below low and open/close sit inside the bar's range.
fn is_consistent(bar: &PriceBar) -> bool {
    let inside = |p: f64| p >= bar.low && p <= bar.high;
    bar.high >= bar.low && inside(bar.open) && inside(bar.close)
}

fn dedup_timestamps(sorted: Vec<PriceBar>) -> Vec<PriceBar> {
    let mut unique: Vec<PriceBar> = Vec::with_capacity(sorted.len());
    for bar in sorted {
        match unique.last_mut() {
            Some(prev) if prev.timestamp == bar.timestamp => *prev = bar,
            _ => unique.push(bar),
        }
    }
    unique
}

/// Enriched history with a contiguous visible window.
///
/// Date trimming and the report-week filter only narrow `window`; the bars
/// before it stay available so ATR and swings keep their warmup.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesWindow {
    pub history: Vec<EnrichedBar>,
    pub window: Range<usize>,
}

impl SeriesWindow {
    /// Whole history visible.
    pub fn full(history: Vec<EnrichedBar>) -> Self {
        let window = 0..history.len();
        Self { history, window }
    }

    pub fn visible(&self) -> &[EnrichedBar] {
        &self.history[self.window.clone()]
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Position in `history` of the `index`-th visible bar.
    pub fn history_index(&self, index: usize) -> Option<usize> {
        (index < self.len()).then_some(self.window.start + index)
    }

    /// Narrow to bars whose chart-local date falls inside `range`.
    pub fn retain_dates(self, range: &DateRange) -> Self {
        let visible = self.visible();
        let lo = visible.partition_point(|b| b.bar.timestamp.date_naive() < range.start);
        let hi = visible
            .partition_point(|b| b.bar.timestamp.date_naive() <= range.end)
            .max(lo);
        let start = self.window.start;
        Self {
            window: start + lo..start + hi,
            history: self.history,
        }
    }

    /// Narrow to the Wednesday-to-Tuesday report week before the latest visible bar.
    pub fn report_week(self) -> Self {
        let week = self
            .visible()
            .last()
            .map(|latest| report_week_range(latest.bar.timestamp.date_naive()));
        match week {
            Some(week) => self.retain_dates(&week),
            None => self,
        }
    }
}
