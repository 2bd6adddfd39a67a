//! Configuration validation.
//!
//! Checks every section a command reads before any data is loaded.

use crate::domain::error::KlError;
use crate::domain::positioning::MacroWeighting;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), KlError> {
    validate_data(config)?;
    validate_enrich(config)?;
    validate_zone(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> KlError {
    KlError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), KlError> {
    match config.get_string("data", "price_dir") {
        Some(s) if !s.trim().is_empty() => {}
        _ => {
            return Err(KlError::ConfigMissing {
                section: "data".to_string(),
                key: "price_dir".to_string(),
            })
        }
    }

    let start = parse_optional_date(config, "start_date")?;
    let end = parse_optional_date(config, "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(invalid("data", "start_date", "start_date must be before end_date"));
        }
    }

    if let Some(window) = config.get_string("data", "window") {
        match window.trim().to_lowercase().as_str() {
            "all" | "quarter" => {}
            _ => return Err(invalid("data", "window", "window must be 'all' or 'quarter'")),
        }
    }

    if let Some(interval) = config.get_string("data", "interval") {
        if interval.trim().is_empty() {
            return Err(invalid("data", "interval", "interval must not be empty"));
        }
    }
    Ok(())
}

/// Optional `[data]` date in `YYYY-MM-DD` form.
pub fn parse_optional_date(
    config: &dyn ConfigPort,
    field: &str,
) -> Result<Option<NaiveDate>, KlError> {
    match config.get_string("data", field) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                invalid(
                    "data",
                    field,
                    &format!("invalid {field} format, expected YYYY-MM-DD"),
                )
            }),
    }
}

fn validate_enrich(config: &dyn ConfigPort) -> Result<(), KlError> {
    let window = config.get_int("enrich", "volume_window", 20);
    if window < 1 {
        return Err(invalid("enrich", "volume_window", "volume_window must be at least 1"));
    }

    let offset = config.get_int("enrich", "utc_offset_hours", 3);
    if !(-14..=14).contains(&offset) {
        return Err(invalid(
            "enrich",
            "utc_offset_hours",
            "utc_offset_hours must be between -14 and 14",
        ));
    }
    Ok(())
}

fn validate_zone(config: &dyn ConfigPort) -> Result<(), KlError> {
    let period = config.get_int("zone", "atr_period", 14);
    if period < 1 {
        return Err(invalid("zone", "atr_period", "atr_period must be at least 1"));
    }

    let multiplier = config.get_double("zone", "atr_multiplier", 2.0);
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(invalid("zone", "atr_multiplier", "atr_multiplier must be positive"));
    }

    let swing = config.get_int("zone", "swing_window", 5);
    if swing < 1 {
        return Err(invalid("zone", "swing_window", "swing_window must be at least 1"));
    }

    if let Some(weighting) = config.get_string("zone", "weighting") {
        weighting
            .parse::<MacroWeighting>()
            .map_err(|reason| invalid("zone", "weighting", &reason))?;
    }

    if let Some(period) = config.get_string("zone", "period") {
        if period.trim().is_empty() {
            return Err(invalid("zone", "period", "period must not be empty"));
        }
    }
    Ok(())
}
