//! Price data provider port.

use crate::domain::error::KlError;
use crate::domain::ohlcv::RawBar;
use crate::domain::time_utils::DateRange;

/// Supplies raw bars for a symbol. Rows are returned as read; cleaning and
/// ordering belong to enrichment. Failures surface as
/// [`KlError::DataSource`] carrying the provider's message.
pub trait PriceDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        interval: &str,
        range: &DateRange,
    ) -> Result<Vec<RawBar>, KlError>;
}
