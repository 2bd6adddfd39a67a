//! CLI definition and dispatch.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{parse_optional_date, validate_config};
use crate::domain::enrich::{
    enrich_with, EnrichConfig, EnrichedBar, SeriesWindow, DEFAULT_UTC_OFFSET_HOURS,
    DEFAULT_VOLUME_WINDOW,
};
use crate::domain::error::KlError;
use crate::domain::indicator::atr::{calc_atr, DEFAULT_ATR_PERIOD};
use crate::domain::positioning::{aggregate_change, net_change, MacroWeighting};
use crate::domain::swing::{find_swings, SwingKind, DEFAULT_SWING_WINDOW};
use crate::domain::time_utils::{
    candle_label, fixed_offset_hours, latest_calendar_quarter, parse_timestamp_in, DateRange,
};
use crate::domain::zone::{
    compute_zone, effective_weight, find_anchor, KlZone, ZoneError, ZoneParams,
    DEFAULT_ATR_MULTIPLIER,
};
use crate::domain::zone_book::{ZoneRecord, ZoneStats, DEFAULT_CHART_INTERVAL, DEFAULT_PERIOD};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceDataPort;
use crate::ports::positioning_port::PositioningPort;
use crate::ports::zone_store_port::ZoneStore;

#[derive(Parser, Debug)]
#[command(name = "klzone", about = "Key Liquidity zone calculator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the enriched price series with ATR as CSV
    Enrich {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: String,
    },
    /// List swing highs and lows
    Swings {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long)]
        window: Option<usize>,
    },
    /// Show positioning ratios and macro weights for an asset
    Positioning {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        asset: String,
    },
    /// Compute the KL zone anchored at a candle
    Zone {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long)]
        asset: String,
        /// Anchor by position in the series
        #[arg(long, conflicts_with = "at", required_unless_present = "at")]
        index: Option<usize>,
        /// Anchor by candle timestamp (naive values are chart-local)
        #[arg(long)]
        at: Option<String>,
        #[arg(long)]
        weighting: Option<MacroWeighting>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long, default_value = "")]
        notes: String,
        /// Upsert the zone into the configured store
        #[arg(long)]
        save: bool,
    },
    /// List stored zones and their statistics
    List {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        symbol: String,
        #[arg(long)]
        period: Option<String>,
    },
    /// Delete stored zones by id or by session
    Delete {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long, conflicts_with = "session", required_unless_present = "session")]
        id: Option<i64>,
        #[arg(long)]
        session: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match execute(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn execute(command: Command) -> Result<(), KlError> {
    match command {
        Command::Enrich { config, symbol } => run_enrich(&config, &symbol),
        Command::Swings {
            config,
            symbol,
            window,
        } => run_swings(&config, &symbol, window),
        Command::Positioning { config, asset } => run_positioning(&config, &asset),
        Command::Zone {
            config,
            symbol,
            asset,
            index,
            at,
            weighting,
            session,
            notes,
            save,
        } => {
            let anchor = match (index, at) {
                (Some(i), _) => AnchorSelector::Index(i),
                (None, Some(ts)) => AnchorSelector::At(ts),
                (None, None) => {
                    return Err(ZoneError::AnchorNotFound {
                        timestamp: "<none>".into(),
                    }
                    .into())
                }
            };
            let request = ZoneRequest {
                symbol,
                asset,
                anchor,
                weighting,
                session,
                notes,
            };
            run_zone(&config, &request, save)
        }
        Command::List {
            config,
            symbol,
            period,
        } => run_list(&config, &symbol, period.as_deref()),
        Command::Delete {
            config,
            id,
            session,
        } => run_delete(&config, id, session.as_deref()),
    }
}

/// Everything a command needs from the INI file, resolved to domain types.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub price_dir: PathBuf,
    pub cot_dir: PathBuf,
    pub range: DateRange,
    pub interval: String,
    pub enrich: EnrichConfig,
    pub zone: ZoneParams,
    pub weighting: MacroWeighting,
    pub period: String,
    pub report_week: bool,
}

pub fn build_settings(config: &dyn ConfigPort, today: NaiveDate) -> Result<Settings, KlError> {
    let price_dir = config
        .get_string("data", "price_dir")
        .map(PathBuf::from)
        .ok_or_else(|| KlError::ConfigMissing {
            section: "data".into(),
            key: "price_dir".into(),
        })?;
    let cot_dir = config
        .get_string("data", "cot_dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| price_dir.clone());

    let start = parse_optional_date(config, "start_date")?;
    let end = parse_optional_date(config, "end_date")?;
    let quarter = config
        .get_string("data", "window")
        .is_some_and(|w| w.trim().eq_ignore_ascii_case("quarter"));
    let range = match (start, end) {
        (None, None) if quarter => latest_calendar_quarter(today),
        (None, None) => DateRange::all(),
        (start, end) => DateRange::new(
            start.unwrap_or(NaiveDate::MIN),
            end.unwrap_or(NaiveDate::MAX),
        ),
    };

    let offset_hours =
        config.get_int("enrich", "utc_offset_hours", DEFAULT_UTC_OFFSET_HOURS as i64);
    let utc_offset = i32::try_from(offset_hours)
        .ok()
        .and_then(fixed_offset_hours)
        .ok_or_else(|| KlError::ConfigInvalid {
            section: "enrich".into(),
            key: "utc_offset_hours".into(),
            reason: format!("{offset_hours} is not a valid UTC offset"),
        })?;

    let weighting = match config.get_string("zone", "weighting") {
        Some(s) => s.parse::<MacroWeighting>().map_err(|reason| KlError::ConfigInvalid {
            section: "zone".into(),
            key: "weighting".into(),
            reason,
        })?,
        None => MacroWeighting::default(),
    };

    Ok(Settings {
        price_dir,
        cot_dir,
        range,
        interval: config
            .get_string("data", "interval")
            .unwrap_or_else(|| DEFAULT_CHART_INTERVAL.to_string()),
        enrich: EnrichConfig {
            volume_window: positive(config.get_int(
                "enrich",
                "volume_window",
                DEFAULT_VOLUME_WINDOW as i64,
            )),
            utc_offset,
        },
        zone: ZoneParams {
            atr_period: positive(config.get_int(
                "zone",
                "atr_period",
                DEFAULT_ATR_PERIOD as i64,
            )),
            atr_multiplier: config.get_double("zone", "atr_multiplier", DEFAULT_ATR_MULTIPLIER),
            swing_window: positive(config.get_int(
                "zone",
                "swing_window",
                DEFAULT_SWING_WINDOW as i64,
            )),
        },
        weighting,
        period: config
            .get_string("zone", "period")
            .unwrap_or_else(|| DEFAULT_PERIOD.to_string()),
        report_week: config.get_bool("zone", "report_week", false),
    })
}

fn positive(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

pub fn load_settings(path: &Path) -> Result<(FileConfigAdapter, Settings), KlError> {
    info!(path = %path.display(), "loading config");
    let config = FileConfigAdapter::from_file(path)?;
    validate_config(&config)?;
    let settings = build_settings(&config, Utc::now().date_naive())?;
    Ok((config, settings))
}

/// Calendar days fetched ahead of the configured start for indicator warmup.
pub const HISTORY_LEAD_DAYS: i64 = 30;

/// Fetch and enrich a symbol's bars. The visible window is trimmed to the
/// configured dates (and report week); earlier bars stay as history.
pub fn load_series(
    prices: &dyn PriceDataPort,
    settings: &Settings,
    symbol: &str,
) -> Result<SeriesWindow, KlError> {
    let fetch_range = DateRange::new(
        settings.range.widened(HISTORY_LEAD_DAYS).start,
        settings.range.end,
    );
    let raw = prices.fetch_bars(symbol, &settings.interval, &fetch_range)?;
    let series = SeriesWindow::full(enrich_with(&raw, &settings.enrich))
        .retain_dates(&settings.range);
    let series = if settings.report_week {
        series.report_week()
    } else {
        series
    };
    info!(
        symbol,
        rows = raw.len(),
        history = series.history.len(),
        bars = series.len(),
        "loaded series"
    );
    Ok(series)
}

pub fn load_macro_weight(
    positioning: &dyn PositioningPort,
    settings: &Settings,
    asset: &str,
    weighting: MacroWeighting,
) -> Result<Option<f64>, KlError> {
    let records = positioning.fetch_positioning(asset, &settings.range)?;
    let weight = weighting.weight(&records);
    if weight.is_none() {
        warn!(
            asset,
            reports = records.len(),
            "too few positioning reports, zone uses the neutral weight"
        );
    }
    Ok(weight)
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnchorSelector {
    Index(usize),
    /// Timestamp text; values without an offset are read in the chart offset.
    At(String),
}

impl AnchorSelector {
    pub fn resolve(
        &self,
        bars: &[EnrichedBar],
        chart_offset: FixedOffset,
    ) -> Result<usize, ZoneError> {
        match self {
            AnchorSelector::Index(i) => Ok(*i),
            AnchorSelector::At(raw) => {
                let ts: DateTime<FixedOffset> = parse_timestamp_in(raw, chart_offset)
                    .ok_or_else(|| ZoneError::AnchorNotFound {
                        timestamp: raw.clone(),
                    })?;
                find_anchor(bars, &ts)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneRequest {
    pub symbol: String,
    pub asset: String,
    pub anchor: AnchorSelector,
    /// Overrides the configured weighting strategy.
    pub weighting: Option<MacroWeighting>,
    pub session: Option<String>,
    pub notes: String,
}

/// Enrich, weight and compute one zone; the returned record is ready to upsert.
pub fn compute_zone_for(
    prices: &dyn PriceDataPort,
    positioning: &dyn PositioningPort,
    settings: &Settings,
    request: &ZoneRequest,
) -> Result<(KlZone, ZoneRecord), KlError> {
    let series = load_series(prices, settings, &request.symbol)?;
    let index = request
        .anchor
        .resolve(series.visible(), settings.enrich.utc_offset)?;
    let position = series
        .history_index(index)
        .ok_or(ZoneError::AnchorOutOfRange {
            index,
            len: series.len(),
        })?;
    let weighting = request.weighting.unwrap_or(settings.weighting);
    let weight = load_macro_weight(positioning, settings, &request.asset, weighting)?;

    // ATR and swings see the whole history; the zone reports the visible index.
    let zone = match compute_zone(position, &series.history, weight, &settings.zone) {
        Ok(zone) => KlZone {
            anchor_index: index,
            ..zone
        },
        Err(ZoneError::AtrUndefined { period, .. }) => {
            return Err(ZoneError::AtrUndefined { index, period }.into())
        }
        Err(e) => return Err(e.into()),
    };
    let record = ZoneRecord::from_zone(&zone, &request.symbol, &request.asset, &settings.period)
        .with_chart_interval(&settings.interval)
        .with_session(request.session.clone())
        .with_notes(&request.notes);
    Ok((zone, record))
}

pub fn open_store(config: &dyn ConfigPort) -> Result<Box<dyn ZoneStore>, KlError> {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteZoneStore;
        Ok(Box::new(SqliteZoneStore::from_config(config)?))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config;
        Err(KlError::Database {
            reason: "sqlite feature is required for zone storage".into(),
        })
    }
}

fn csv_adapter(settings: &Settings) -> CsvAdapter {
    CsvAdapter::new(settings.price_dir.clone(), settings.cot_dir.clone())
}

#[derive(Debug, Serialize)]
struct EnrichedRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    avg_volume: Option<f64>,
    rvol: f64,
    atr: Option<f64>,
}

/// Visible bars as CSV; ATR is computed over the full history.
pub fn write_enriched<W: Write>(
    out: W,
    series: &SeriesWindow,
    atr_period: usize,
) -> Result<(), KlError> {
    let atr = calc_atr(&series.history, atr_period);
    let mut writer = csv::Writer::from_writer(out);
    let visible = series
        .history
        .iter()
        .enumerate()
        .skip(series.window.start)
        .take(series.len());
    for (i, b) in visible {
        writer
            .serialize(EnrichedRow {
                timestamp: b.bar.timestamp.to_rfc3339(),
                open: b.bar.open,
                high: b.bar.high,
                low: b.bar.low,
                close: b.bar.close,
                volume: b.bar.volume,
                avg_volume: b.avg_volume,
                rvol: b.rvol,
                atr: atr.value_at(i),
            })
            .map_err(io::Error::other)?;
    }
    writer.flush()?;
    Ok(())
}

fn run_enrich(config_path: &Path, symbol: &str) -> Result<(), KlError> {
    let (_, settings) = load_settings(config_path)?;
    let series = load_series(&csv_adapter(&settings), &settings, symbol)?;
    if series.is_empty() {
        return Err(KlError::NoData {
            symbol: symbol.to_string(),
        });
    }
    write_enriched(io::stdout().lock(), &series, settings.zone.atr_period)
}

fn run_swings(config_path: &Path, symbol: &str, window: Option<usize>) -> Result<(), KlError> {
    let (_, settings) = load_settings(config_path)?;
    let series = load_series(&csv_adapter(&settings), &settings, symbol)?;
    let swings = find_swings(&series.history, window.unwrap_or(settings.zone.swing_window));

    let mut out = io::stdout().lock();
    for (i, b) in series.visible().iter().enumerate() {
        let (kind, price) = match swings.classify(series.window.start + i) {
            Some(SwingKind::High) => ("high", b.bar.high),
            Some(SwingKind::Low) => ("low", b.bar.low),
            None => continue,
        };
        writeln!(out, "{i}\t{kind}\t{}\t{price:.4}", candle_label(&b.bar.timestamp))?;
    }
    info!(
        symbol,
        highs = swings.highs.len(),
        lows = swings.lows.len(),
        "swing detection complete"
    );
    Ok(())
}

fn run_positioning(config_path: &Path, asset: &str) -> Result<(), KlError> {
    let (_, settings) = load_settings(config_path)?;
    let records = csv_adapter(&settings).fetch_positioning(asset, &settings.range)?;

    let mut out = io::stdout().lock();
    writeln!(out, "report_date\tlong\tshort\tnet_ratio")?;
    for r in &records {
        writeln!(
            out,
            "{}\t{}\t{}\t{:.4}",
            r.report_date,
            r.long_count,
            r.short_count,
            r.net_ratio()
        )?;
    }
    match net_change(&records) {
        Some(change) => writeln!(out, "latest change:    {change:.4}")?,
        None => writeln!(out, "latest change:    n/a")?,
    }
    writeln!(out, "aggregate change: {:.4}", aggregate_change(&records))?;
    Ok(())
}

pub fn write_zone<W: Write>(mut out: W, zone: &KlZone, record: &ZoneRecord) -> io::Result<()> {
    writeln!(
        out,
        "KL zone for {} at {} (index {})",
        record.symbol,
        candle_label(&zone.anchor_timestamp),
        zone.anchor_index
    )?;
    writeln!(out, "  type:          {}", zone.zone_type)?;
    writeln!(out, "  zone high:     {:.4}", zone.zone_high)?;
    writeln!(out, "  zone low:      {:.4}", zone.zone_low)?;
    writeln!(out, "  zone size:     {:.4}", zone.zone_size)?;
    writeln!(out, "  anchor close:  {:.4}", zone.anchor_price)?;
    writeln!(out, "  ATR:           {:.4} x {:.2}", zone.atr_value, zone.atr_multiplier)?;
    match zone.macro_weight {
        Some(w) => writeln!(out, "  macro weight:  {w:.4}")?,
        None => writeln!(
            out,
            "  macro weight:  n/a (neutral {:.2})",
            effective_weight(None)
        )?,
    }
    Ok(())
}

fn run_zone(config_path: &Path, request: &ZoneRequest, save: bool) -> Result<(), KlError> {
    let (config, settings) = load_settings(config_path)?;
    let adapter = csv_adapter(&settings);
    let (zone, record) = compute_zone_for(&adapter, &adapter, &settings, request)?;
    write_zone(io::stdout().lock(), &zone, &record)?;

    if save {
        let store = open_store(&config)?;
        let outcome = store.upsert(&record)?;
        println!("{outcome:?} zone for {} ({})", record.symbol, record.period);
    }
    Ok(())
}

pub fn write_stats<W: Write>(mut out: W, stats: &ZoneStats) -> io::Result<()> {
    writeln!(out, "zones:            {}", stats.total_zones)?;
    writeln!(out, "avg zone size:    {:.4}", stats.avg_zone_size)?;
    match stats.avg_macro_weight {
        Some(w) => writeln!(out, "avg macro weight: {w:.4}")?,
        None => writeln!(out, "avg macro weight: n/a")?,
    }
    writeln!(
        out,
        "swing high / swing low / general: {} / {} / {}",
        stats.swing_high_count, stats.swing_low_count, stats.general_count
    )?;
    if let Some(latest) = &stats.latest_anchor {
        writeln!(out, "latest anchor:    {}", candle_label(latest))?;
    }
    Ok(())
}

fn run_list(config_path: &Path, symbol: &str, period: Option<&str>) -> Result<(), KlError> {
    let (config, settings) = load_settings(config_path)?;
    let period = period.unwrap_or(&settings.period);
    let store = open_store(&config)?;
    let zones = store.zones_for_symbol(symbol, period)?;
    let stats = store.stats(symbol, period)?;

    let mut out = io::stdout().lock();
    writeln!(out, "id\ttype\tanchor\thigh\tlow\tsize\tsession")?;
    for z in &zones {
        let r = &z.record;
        writeln!(
            out,
            "{}\t{}\t{}\t{:.4}\t{:.4}\t{:.4}\t{}",
            z.id,
            r.zone_type,
            candle_label(&r.anchor_timestamp),
            r.zone_high,
            r.zone_low,
            r.zone_size,
            r.session_id.as_deref().unwrap_or("-")
        )?;
    }
    writeln!(out)?;
    write_stats(out, &stats)?;
    Ok(())
}

fn run_delete(config_path: &Path, id: Option<i64>, session: Option<&str>) -> Result<(), KlError> {
    let (config, _) = load_settings(config_path)?;
    let store = open_store(&config)?;
    let removed = match (id, session) {
        (Some(id), _) => usize::from(store.delete(id)?),
        (None, Some(session)) => store.delete_session(session)?,
        (None, None) => 0,
    };
    println!("deleted {removed} zone(s)");
    Ok(())
}
