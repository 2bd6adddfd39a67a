//! Positioning (COT) report provider port.

use crate::domain::error::KlError;
use crate::domain::positioning::PositioningRecord;
use crate::domain::time_utils::DateRange;

pub trait PositioningPort {
    /// Reports for `asset` inside `range`, ascending by report date.
    fn fetch_positioning(
        &self,
        asset: &str,
        range: &DateRange,
    ) -> Result<Vec<PositioningRecord>, KlError>;
}
