//! Timestamp parsing and calendar windows.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc,
};

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"];
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Unbounded range.
    pub fn all() -> Self {
        Self {
            start: NaiveDate::MIN,
            end: NaiveDate::MAX,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Widen by `days` on both sides, saturating at the calendar bounds.
    pub fn widened(&self, days: i64) -> Self {
        Self {
            start: self
                .start
                .checked_sub_signed(Duration::days(days))
                .unwrap_or(NaiveDate::MIN),
            end: self
                .end
                .checked_add_signed(Duration::days(days))
                .unwrap_or(NaiveDate::MAX),
        }
    }
}

pub fn fixed_offset_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3600)?)
}

/// Parse a provider timestamp, treating values without an explicit offset as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    parse_timestamp_in(value, Utc.fix())
}

/// Parse a timestamp; values without an explicit offset are read as wall
/// clock time in `naive_offset`.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS±HH:MM`, naive date-times down to
/// minute precision, bare dates (midnight) and unix epoch seconds.
pub fn parse_timestamp_in(value: &str, naive_offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts);
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(value, fmt) {
            return Some(ts);
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return naive_offset.from_local_datetime(&naive).single();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return naive_offset.from_local_datetime(&naive).single();
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = value.parse().ok()?;
        return DateTime::from_timestamp(secs, 0).map(|ts| ts.fixed_offset());
    }
    None
}

/// Display label for a candle, e.g. `Wednesday, 2024-05-01 14:00`.
pub fn candle_label(ts: &DateTime<FixedOffset>) -> String {
    ts.format("%A, %Y-%m-%d %H:%M").to_string()
}

/// The most recent fully completed calendar quarter relative to `today`.
pub fn latest_calendar_quarter(today: NaiveDate) -> DateRange {
    let year = today.year();
    let (start, end) = match today.month() {
        1..=3 => ((year - 1, 10, 1), (year - 1, 12, 31)),
        4..=6 => ((year, 1, 1), (year, 3, 31)),
        7..=9 => ((year, 4, 1), (year, 6, 30)),
        _ => ((year, 7, 1), (year, 9, 30)),
    };
    // Quarter boundaries are always valid calendar dates.
    let ymd = |(y, m, d): (i32, u32, u32)| NaiveDate::from_ymd_opt(y, m, d).unwrap_or(today);
    DateRange::new(ymd(start), ymd(end))
}

/// Wednesday-to-Tuesday week preceding the week that contains `latest`.
///
/// COT reports are taken on Tuesdays, so this is the price week covered by
/// the most recent complete report cycle.
pub fn report_week_range(latest: NaiveDate) -> DateRange {
    let days_since_wednesday = (latest.weekday().num_days_from_monday() as i64 + 7 - 2) % 7;
    let last_wednesday = latest - Duration::days(days_since_wednesday);
    let prev_wednesday = last_wednesday - Duration::days(7);
    DateRange::new(prev_wednesday, prev_wednesday + Duration::days(6))
}
