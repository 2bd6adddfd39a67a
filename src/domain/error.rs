//! Domain error types.

use crate::domain::zone::ZoneError;

/// Top-level error type for klzone.
#[derive(Debug, thiserror::Error)]
pub enum KlError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("data source error: {reason}")]
    DataSource { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no price data for {symbol}")]
    NoData { symbol: String },

    #[error(transparent)]
    Zone(#[from] ZoneError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&KlError> for std::process::ExitCode {
    fn from(err: &KlError) -> Self {
        let code: u8 = match err {
            KlError::Io(_) => 1,
            KlError::ConfigParse { .. }
            | KlError::ConfigMissing { .. }
            | KlError::ConfigInvalid { .. } => 2,
            KlError::Database { .. } | KlError::DatabaseQuery { .. } => 3,
            KlError::Zone(_) => 4,
            KlError::DataSource { .. } | KlError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
