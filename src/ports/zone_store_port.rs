//! Zone persistence port.

use crate::domain::error::KlError;
use crate::domain::zone_book::{StoredZone, UpsertOutcome, ZoneFilter, ZoneRecord, ZoneStats};

/// Durable zone storage keyed on (symbol, period, anchor candle).
pub trait ZoneStore {
    /// Insert, or overwrite the record already holding the same natural key.
    fn upsert(&self, record: &ZoneRecord) -> Result<UpsertOutcome, KlError>;

    /// Zones for a symbol and period, newest anchor first.
    fn zones_for_symbol(&self, symbol: &str, period: &str) -> Result<Vec<StoredZone>, KlError>;

    fn search(&self, filter: &ZoneFilter) -> Result<Vec<StoredZone>, KlError>;

    /// `true` when a row was removed.
    fn delete(&self, id: i64) -> Result<bool, KlError>;

    /// Removes every zone saved under `session_id`, returning the count.
    fn delete_session(&self, session_id: &str) -> Result<usize, KlError>;

    fn stats(&self, symbol: &str, period: &str) -> Result<ZoneStats, KlError> {
        let zones = self.zones_for_symbol(symbol, period)?;
        Ok(ZoneStats::from_records(zones.iter().map(|z| &z.record)))
    }
}
