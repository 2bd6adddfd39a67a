//! Swing point detection.
//!
//! Bar `i` is a swing high when its high is the maximum of the closed window
//! `[i - w, i + w]`, and a swing low when its low is the minimum of that
//! window. Ties are not suppressed, so flat tops can produce adjacent swing
//! highs. The high check runs first: a bar is never in both sets.
//!
//! Bars within `w` of either end are never classified, so the most recent
//! `w` bars cannot be swings until later bars arrive.

use std::collections::BTreeSet;

use crate::domain::enrich::EnrichedBar;

pub const DEFAULT_SWING_WINDOW: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwingKind {
    High,
    Low,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwingIndexSet {
    pub highs: BTreeSet<usize>,
    pub lows: BTreeSet<usize>,
}

impl SwingIndexSet {
    pub fn classify(&self, index: usize) -> Option<SwingKind> {
        if self.highs.contains(&index) {
            Some(SwingKind::High)
        } else if self.lows.contains(&index) {
            Some(SwingKind::Low)
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.highs.is_empty() && self.lows.is_empty()
    }
}

pub fn find_swings(bars: &[EnrichedBar], window: usize) -> SwingIndexSet {
    let mut swings = SwingIndexSet::default();
    if window == 0 || bars.len() < 2 * window + 1 {
        return swings;
    }

    for i in window..bars.len() - window {
        let span = &bars[i - window..=i + window];
        let max_high = span
            .iter()
            .map(|b| b.bar.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let min_low = span
            .iter()
            .map(|b| b.bar.low)
            .fold(f64::INFINITY, f64::min);

        let bar = &bars[i].bar;
        if bar.high >= max_high {
            swings.highs.insert(i);
        } else if bar.low <= min_low {
            swings.lows.insert(i);
        }
    }

    swings
}
