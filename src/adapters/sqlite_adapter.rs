//! SQLite zone store.

use crate::domain::error::KlError;
use crate::domain::zone::ZoneType;
use crate::domain::zone_book::{StoredZone, UpsertOutcome, ZoneFilter, ZoneRecord};
use crate::ports::config_port::ConfigPort;
use crate::ports::zone_store_port::ZoneStore;
use chrono::DateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row, ToSql};
use tracing::info;

const ZONE_COLUMNS: &str = "id, symbol, cot_asset, period, chart_interval, zone_type,
    zone_high, zone_low, zone_size, atr_value, atr_multiplier, macro_weight,
    anchor_price, anchor_timestamp, anchor_index, session_id, notes";

pub struct SqliteZoneStore {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> KlError {
    KlError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> KlError {
    KlError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn conversion_error(
    column: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, err.into())
}

fn row_to_zone(row: &Row<'_>) -> rusqlite::Result<StoredZone> {
    let zone_type: String = row.get(5)?;
    let zone_type = zone_type
        .parse::<ZoneType>()
        .map_err(|e| conversion_error(5, e))?;

    let anchor: String = row.get(13)?;
    let anchor_timestamp =
        DateTime::parse_from_rfc3339(&anchor).map_err(|e| conversion_error(13, e))?;

    let anchor_index: i64 = row.get(14)?;

    Ok(StoredZone {
        id: row.get(0)?,
        record: ZoneRecord {
            symbol: row.get(1)?,
            cot_asset: row.get(2)?,
            period: row.get(3)?,
            chart_interval: row.get(4)?,
            zone_type,
            zone_high: row.get(6)?,
            zone_low: row.get(7)?,
            zone_size: row.get(8)?,
            atr_value: row.get(9)?,
            atr_multiplier: row.get(10)?,
            macro_weight: row.get(11)?,
            anchor_price: row.get(12)?,
            anchor_timestamp,
            anchor_index: anchor_index.max(0) as usize,
            session_id: row.get(15)?,
            notes: row.get(16)?,
        },
    })
}

impl SqliteZoneStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, KlError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| KlError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Single-connection in-memory store; call [`Self::initialize_schema`] before use.
    pub fn in_memory() -> Result<Self, KlError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, KlError> {
        self.pool.get().map_err(pool_error)
    }

    pub fn initialize_schema(&self) -> Result<(), KlError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS kl_zones (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    symbol TEXT NOT NULL,
                    cot_asset TEXT NOT NULL,
                    period TEXT NOT NULL,
                    chart_interval TEXT NOT NULL,
                    zone_type TEXT NOT NULL,
                    zone_high REAL NOT NULL,
                    zone_low REAL NOT NULL,
                    zone_size REAL NOT NULL,
                    atr_value REAL NOT NULL,
                    atr_multiplier REAL NOT NULL,
                    macro_weight REAL,
                    anchor_price REAL NOT NULL,
                    anchor_timestamp TEXT NOT NULL,
                    anchor_key TEXT NOT NULL,
                    anchor_index INTEGER NOT NULL,
                    session_id TEXT,
                    notes TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                    UNIQUE (symbol, period, anchor_key)
                );
                CREATE INDEX IF NOT EXISTS idx_kl_zones_symbol_period ON kl_zones(symbol, period);
                CREATE INDEX IF NOT EXISTS idx_kl_zones_session ON kl_zones(session_id);",
            )
            .map_err(query_error)
    }
}

impl ZoneStore for SqliteZoneStore {
    fn upsert(&self, record: &ZoneRecord) -> Result<UpsertOutcome, KlError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        let key = record.key();

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM kl_zones WHERE symbol = ?1 AND period = ?2 AND anchor_key = ?3",
                params![key.symbol, key.period, key.anchor],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_error)?;

        let zone_type = record.zone_type.to_string();
        let anchor_timestamp = record.anchor_timestamp.to_rfc3339();
        let anchor_index = record.anchor_index as i64;
        let values: [&dyn ToSql; 17] = [
            &record.symbol,
            &record.cot_asset,
            &record.period,
            &record.chart_interval,
            &zone_type,
            &record.zone_high,
            &record.zone_low,
            &record.zone_size,
            &record.atr_value,
            &record.atr_multiplier,
            &record.macro_weight,
            &record.anchor_price,
            &anchor_timestamp,
            &key.anchor,
            &anchor_index,
            &record.session_id,
            &record.notes,
        ];

        let outcome = if existing.is_some() {
            tx.execute(
                "UPDATE kl_zones SET cot_asset = ?2, chart_interval = ?4, zone_type = ?5,
                    zone_high = ?6, zone_low = ?7, zone_size = ?8, atr_value = ?9,
                    atr_multiplier = ?10, macro_weight = ?11, anchor_price = ?12,
                    anchor_timestamp = ?13, anchor_index = ?15, session_id = ?16, notes = ?17
                 WHERE symbol = ?1 AND period = ?3 AND anchor_key = ?14",
                &values[..],
            )
            .map_err(query_error)?;
            UpsertOutcome::Updated
        } else {
            tx.execute(
                "INSERT INTO kl_zones (symbol, cot_asset, period, chart_interval, zone_type,
                    zone_high, zone_low, zone_size, atr_value, atr_multiplier, macro_weight,
                    anchor_price, anchor_timestamp, anchor_key, anchor_index, session_id, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                &values[..],
            )
            .map_err(query_error)?;
            UpsertOutcome::Inserted
        };

        tx.commit().map_err(query_error)?;
        info!(symbol = %record.symbol, anchor = %key.anchor, ?outcome, "saved KL zone");
        Ok(outcome)
    }

    fn zones_for_symbol(&self, symbol: &str, period: &str) -> Result<Vec<StoredZone>, KlError> {
        self.search(&ZoneFilter {
            symbol: Some(symbol.to_string()),
            zone_type: None,
            period: Some(period.to_string()),
        })
    }

    fn search(&self, filter: &ZoneFilter) -> Result<Vec<StoredZone>, KlError> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {ZONE_COLUMNS} FROM kl_zones
             WHERE (?1 IS NULL OR symbol = ?1)
               AND (?2 IS NULL OR zone_type = ?2)
               AND (?3 IS NULL OR period = ?3)
             ORDER BY anchor_key DESC, id DESC"
        );

        let mut stmt = conn.prepare(&query).map_err(query_error)?;
        let rows = stmt
            .query_map(
                params![
                    filter.symbol,
                    filter.zone_type.map(|t| t.to_string()),
                    filter.period
                ],
                row_to_zone,
            )
            .map_err(query_error)?;

        let mut zones = Vec::new();
        for row in rows {
            zones.push(row.map_err(query_error)?);
        }
        Ok(zones)
    }

    fn delete(&self, id: i64) -> Result<bool, KlError> {
        let removed = self
            .conn()?
            .execute("DELETE FROM kl_zones WHERE id = ?1", params![id])
            .map_err(query_error)?;
        info!(id, removed, "deleted KL zone");
        Ok(removed > 0)
    }

    fn delete_session(&self, session_id: &str) -> Result<usize, KlError> {
        let removed = self
            .conn()?
            .execute(
                "DELETE FROM kl_zones WHERE session_id = ?1",
                params![session_id],
            )
            .map_err(query_error)?;
        info!(session_id, removed, "deleted session zones");
        Ok(removed)
    }
}
