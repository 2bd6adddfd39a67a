//! CSV file adapter for price bars and positioning reports.
//!
//! Price files live at `{price_dir}/{symbol}_{interval}.csv`; positioning
//! reports for every market share `{cot_dir}/cot.csv`. Columns are matched
//! by header name, case-insensitively, through a list of accepted aliases.

use crate::domain::error::KlError;
use crate::domain::ohlcv::RawBar;
use crate::domain::positioning::PositioningRecord;
use crate::domain::time_utils::{parse_timestamp, DateRange};
use crate::ports::data_port::PriceDataPort;
use crate::ports::positioning_port::PositioningPort;
use chrono::NaiveDate;
use csv::StringRecord;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const COT_FILE_NAME: &str = "cot.csv";

const TIMESTAMP_COLUMNS: &[&str] = &["datetime", "date", "timestamp", "time"];
const OPEN_COLUMNS: &[&str] = &["open", "o"];
const HIGH_COLUMNS: &[&str] = &["high", "h"];
const LOW_COLUMNS: &[&str] = &["low", "l"];
const CLOSE_COLUMNS: &[&str] = &["close", "c", "adj close", "price"];
const VOLUME_COLUMNS: &[&str] = &["volume", "vol", "v"];

const MARKET_COLUMNS: &[&str] = &["market_and_exchange_names", "market"];
const REPORT_DATE_COLUMNS: &[&str] = &["report_date_as_yyyy_mm_dd", "report_date", "date"];
const LONG_COLUMNS: &[&str] = &["noncomm_positions_long_all", "long"];
const SHORT_COLUMNS: &[&str] = &["noncomm_positions_short_all", "short"];

pub struct CsvAdapter {
    price_dir: PathBuf,
    cot_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(price_dir: PathBuf, cot_dir: PathBuf) -> Self {
        Self {
            price_dir,
            cot_path: cot_dir.join(COT_FILE_NAME),
        }
    }

    fn price_path(&self, symbol: &str, interval: &str) -> PathBuf {
        self.price_dir.join(format!("{}_{}.csv", symbol, interval))
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<std::fs::File>, KlError> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| KlError::DataSource {
            reason: format!("failed to read {}: {}", path.display(), e),
        })
}

fn headers(rdr: &mut csv::Reader<std::fs::File>, path: &Path) -> Result<StringRecord, KlError> {
    rdr.headers().cloned().map_err(|e| KlError::DataSource {
        reason: format!("failed to read header of {}: {}", path.display(), e),
    })
}

/// Position of the first alias present in `headers`, aliases tried in order.
fn column(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    aliases.iter().find_map(|alias| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(alias))
    })
}

fn cell_f64(record: &StringRecord, index: Option<usize>) -> Option<f64> {
    index
        .and_then(|i| record.get(i))
        .and_then(|s| s.trim().parse::<f64>().ok())
}

fn cell_count(record: &StringRecord, index: usize) -> Option<i64> {
    let raw = record.get(index)?.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))
}

fn report_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value.get(..10).unwrap_or(value), "%Y-%m-%d").ok()
}

impl PriceDataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        symbol: &str,
        interval: &str,
        range: &DateRange,
    ) -> Result<Vec<RawBar>, KlError> {
        let path = self.price_path(symbol, interval);
        let mut rdr = open_reader(&path)?;
        let headers = headers(&mut rdr, &path)?;

        let (Some(ts_col), Some(open_col), Some(high_col), Some(low_col), Some(close_col)) = (
            column(&headers, TIMESTAMP_COLUMNS),
            column(&headers, OPEN_COLUMNS),
            column(&headers, HIGH_COLUMNS),
            column(&headers, LOW_COLUMNS),
            column(&headers, CLOSE_COLUMNS),
        ) else {
            warn!(path = %path.display(), "price file lacks a timestamp or OHLC column");
            return Ok(Vec::new());
        };
        let volume_col = column(&headers, VOLUME_COLUMNS);

        // Offsets can move a bar across midnight; exact trimming happens
        // after normalisation.
        let window = range.widened(1);
        let mut bars = Vec::new();
        let mut skipped = 0usize;

        for result in rdr.records() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    skipped += 1;
                    debug!(error = %e, "skipping malformed price row");
                    continue;
                }
            };

            let timestamp = record.get(ts_col).unwrap_or_default().to_string();
            if let Some(ts) = parse_timestamp(&timestamp) {
                if !window.contains(ts.date_naive()) {
                    continue;
                }
            }

            bars.push(RawBar {
                timestamp,
                open: cell_f64(&record, Some(open_col)),
                high: cell_f64(&record, Some(high_col)),
                low: cell_f64(&record, Some(low_col)),
                close: cell_f64(&record, Some(close_col)),
                volume: cell_f64(&record, volume_col),
            });
        }

        if skipped > 0 {
            warn!(skipped, path = %path.display(), "skipped unreadable price rows");
        }
        debug!(symbol, interval, rows = bars.len(), "loaded price rows");
        Ok(bars)
    }
}

impl PositioningPort for CsvAdapter {
    fn fetch_positioning(
        &self,
        asset: &str,
        range: &DateRange,
    ) -> Result<Vec<PositioningRecord>, KlError> {
        let path = &self.cot_path;
        let mut rdr = open_reader(path)?;
        let headers = headers(&mut rdr, path)?;

        let missing = |name: &str| KlError::DataSource {
            reason: format!("{} has no {} column", path.display(), name),
        };
        let market_col = column(&headers, MARKET_COLUMNS).ok_or_else(|| missing("market"))?;
        let date_col =
            column(&headers, REPORT_DATE_COLUMNS).ok_or_else(|| missing("report date"))?;
        let long_col = column(&headers, LONG_COLUMNS).ok_or_else(|| missing("long"))?;
        let short_col = column(&headers, SHORT_COLUMNS).ok_or_else(|| missing("short"))?;

        let mut records = Vec::new();
        for result in rdr.records() {
            let Ok(row) = result else {
                debug!("skipping malformed positioning row");
                continue;
            };
            if row.get(market_col).map(str::trim) != Some(asset.trim()) {
                continue;
            }

            let parsed = row.get(date_col).and_then(report_date).and_then(|date| {
                Some(PositioningRecord {
                    report_date: date,
                    long_count: cell_count(&row, long_col)?,
                    short_count: cell_count(&row, short_col)?,
                })
            });
            match parsed {
                Some(rec) if range.contains(rec.report_date) => records.push(rec),
                Some(_) => {}
                None => debug!(asset, "skipping positioning row with unreadable fields"),
            }
        }

        records.sort_by_key(|r| r.report_date);
        debug!(asset, reports = records.len(), "loaded positioning reports");
        Ok(records)
    }
}
