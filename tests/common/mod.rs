#![allow(dead_code)]

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use klzone::domain::enrich::{enrich, EnrichedBar};
use klzone::domain::error::KlError;
pub use klzone::domain::ohlcv::RawBar;
use klzone::domain::positioning::PositioningRecord;
use klzone::domain::time_utils::DateRange;
use klzone::ports::data_port::PriceDataPort;
use klzone::ports::positioning_port::PositioningPort;
use std::collections::HashMap;

pub struct MockPriceData {
    pub data: HashMap<String, Vec<RawBar>>,
    pub errors: HashMap<String, String>,
}

impl MockPriceData {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<RawBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl PriceDataPort for MockPriceData {
    fn fetch_bars(
        &self,
        symbol: &str,
        _interval: &str,
        _range: &DateRange,
    ) -> Result<Vec<RawBar>, KlError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(KlError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).cloned().unwrap_or_default())
    }
}

pub struct MockPositioning {
    pub data: HashMap<String, Vec<PositioningRecord>>,
}

impl MockPositioning {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn with_records(mut self, asset: &str, records: Vec<PositioningRecord>) -> Self {
        self.data.insert(asset.to_string(), records);
        self
    }
}

impl PositioningPort for MockPositioning {
    fn fetch_positioning(
        &self,
        asset: &str,
        range: &DateRange,
    ) -> Result<Vec<PositioningRecord>, KlError> {
        Ok(self
            .data
            .get(asset)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| range.contains(r.report_date))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn report(y: i32, m: u32, d: u32, long: i64, short: i64) -> PositioningRecord {
    PositioningRecord {
        report_date: date(y, m, d),
        long_count: long,
        short_count: short,
    }
}

/// Hourly UTC timestamp text, `hour` hours after 2024-06-03 00:00 UTC.
pub fn hourly_ts(hour: usize) -> String {
    let start = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
    (start + Duration::hours(hour as i64)).to_rfc3339()
}

pub fn raw_bar(hour: usize, open: f64, high: f64, low: f64, close: f64, volume: f64) -> RawBar {
    RawBar {
        timestamp: hourly_ts(hour),
        open: Some(open),
        high: Some(high),
        low: Some(low),
        close: Some(close),
        volume: Some(volume),
    }
}

/// Bars with open = high = low = close = `price`.
pub fn flat_raw_bars(count: usize, price: f64) -> Vec<RawBar> {
    (0..count)
        .map(|i| raw_bar(i, price, price, price, price, 1000.0))
        .collect()
}

/// Gently trending bars with a fixed 2-point range.
pub fn trending_raw_bars(count: usize, start_price: f64) -> Vec<RawBar> {
    (0..count)
        .map(|i| {
            let p = start_price + i as f64;
            raw_bar(i, p, p + 1.0, p - 1.0, p, 1000.0 + i as f64)
        })
        .collect()
}

pub fn enriched(raw: &[RawBar]) -> Vec<EnrichedBar> {
    enrich(raw)
}
