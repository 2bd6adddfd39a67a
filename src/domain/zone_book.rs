//! Persistable zone records, their natural key, and an in-memory book with
//! upsert semantics.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::domain::zone::{KlZone, ZoneType};

pub const DEFAULT_PERIOD: &str = "weekly";
pub const DEFAULT_CHART_INTERVAL: &str = "1h";

/// A zone in its external form, tagged with what it was drawn on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneRecord {
    pub symbol: String,
    pub cot_asset: String,
    pub period: String,
    pub chart_interval: String,
    pub zone_type: ZoneType,
    pub zone_high: f64,
    pub zone_low: f64,
    pub zone_size: f64,
    pub atr_value: f64,
    pub atr_multiplier: f64,
    pub macro_weight: Option<f64>,
    pub anchor_price: f64,
    pub anchor_timestamp: DateTime<FixedOffset>,
    pub anchor_index: usize,
    pub session_id: Option<String>,
    pub notes: String,
}

impl ZoneRecord {
    pub fn from_zone(zone: &KlZone, symbol: &str, cot_asset: &str, period: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            cot_asset: cot_asset.to_string(),
            period: period.to_string(),
            chart_interval: DEFAULT_CHART_INTERVAL.to_string(),
            zone_type: zone.zone_type,
            zone_high: zone.zone_high,
            zone_low: zone.zone_low,
            zone_size: zone.zone_size,
            atr_value: zone.atr_value,
            atr_multiplier: zone.atr_multiplier,
            macro_weight: zone.macro_weight,
            anchor_price: zone.anchor_price,
            anchor_timestamp: zone.anchor_timestamp,
            anchor_index: zone.anchor_index,
            session_id: None,
            notes: String::new(),
        }
    }

    pub fn with_chart_interval(mut self, interval: &str) -> Self {
        self.chart_interval = interval.to_string();
        self
    }

    pub fn with_session(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = notes.to_string();
        self
    }

    pub fn key(&self) -> ZoneKey {
        ZoneKey {
            symbol: self.symbol.clone(),
            period: self.period.clone(),
            anchor: anchor_key(&self.anchor_timestamp),
        }
    }
}

/// Stable text form of an anchor candle, used as the dedup key. Rendered in
/// UTC so the same instant always maps to the same key.
pub fn anchor_key(ts: &DateTime<FixedOffset>) -> String {
    ts.with_timezone(&Utc).to_rfc3339()
}

/// Natural key: one zone per candle per (symbol, period).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneKey {
    pub symbol: String,
    pub period: String,
    pub anchor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// A record as held by a store, with its store-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredZone {
    pub id: i64,
    pub record: ZoneRecord,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneFilter {
    pub symbol: Option<String>,
    pub zone_type: Option<ZoneType>,
    pub period: Option<String>,
}

impl ZoneFilter {
    pub fn matches(&self, record: &ZoneRecord) -> bool {
        self.symbol.as_ref().is_none_or(|s| *s == record.symbol)
            && self.zone_type.is_none_or(|t| t == record.zone_type)
            && self.period.as_ref().is_none_or(|p| *p == record.period)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneStats {
    pub total_zones: usize,
    pub avg_zone_size: f64,
    /// Mean |macro weight| over zones that carried one.
    pub avg_macro_weight: Option<f64>,
    pub swing_high_count: usize,
    pub swing_low_count: usize,
    pub general_count: usize,
    pub latest_anchor: Option<DateTime<FixedOffset>>,
}

impl ZoneStats {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ZoneRecord>,
    {
        let mut stats = ZoneStats::default();
        let mut size_sum = 0.0;
        let mut weights: Vec<f64> = Vec::new();

        for record in records {
            stats.total_zones += 1;
            size_sum += record.zone_size;
            if let Some(w) = record.macro_weight {
                weights.push(w.abs());
            }
            match record.zone_type {
                ZoneType::SwingHigh => stats.swing_high_count += 1,
                ZoneType::SwingLow => stats.swing_low_count += 1,
                ZoneType::General => stats.general_count += 1,
            }
            if stats.latest_anchor.is_none_or(|t| record.anchor_timestamp > t) {
                stats.latest_anchor = Some(record.anchor_timestamp);
            }
        }

        if stats.total_zones > 0 {
            stats.avg_zone_size = size_sum / stats.total_zones as f64;
        }
        if !weights.is_empty() {
            stats.avg_macro_weight = Some(weights.iter().sum::<f64>() / weights.len() as f64);
        }
        stats
    }
}

/// Caller-owned zone collection. Replaces a session-global list: callers
/// pass it in, the book never reaches out to shared state.
#[derive(Debug, Clone, Default)]
pub struct ZoneBook {
    zones: Vec<ZoneRecord>,
    index: HashMap<ZoneKey, usize>,
}

impl ZoneBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn upsert(&mut self, record: ZoneRecord) -> UpsertOutcome {
        let key = record.key();
        match self.index.get(&key) {
            Some(&pos) => {
                self.zones[pos] = record;
                UpsertOutcome::Updated
            }
            None => {
                self.index.insert(key, self.zones.len());
                self.zones.push(record);
                UpsertOutcome::Inserted
            }
        }
    }

    pub fn remove(&mut self, key: &ZoneKey) -> Option<ZoneRecord> {
        let pos = self.index.remove(key)?;
        let removed = self.zones.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// Zones for a symbol and period, newest anchor first.
    pub fn for_symbol(&self, symbol: &str, period: &str) -> Vec<&ZoneRecord> {
        let mut out: Vec<&ZoneRecord> = self
            .zones
            .iter()
            .filter(|z| z.symbol == symbol && z.period == period)
            .collect();
        out.sort_by(|a, b| b.anchor_timestamp.cmp(&a.anchor_timestamp));
        out
    }

    pub fn search(&self, filter: &ZoneFilter) -> Vec<&ZoneRecord> {
        self.zones.iter().filter(|z| filter.matches(z)).collect()
    }

    pub fn stats(&self, symbol: &str, period: &str) -> ZoneStats {
        ZoneStats::from_records(self.for_symbol(symbol, period))
    }
}
