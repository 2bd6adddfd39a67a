//! Core domain types and logic. Pure: no I/O, no shared state.

pub mod ohlcv;
pub mod time_utils;
pub mod enrich;
pub mod indicator;
pub mod swing;
pub mod zone;
pub mod positioning;
pub mod zone_book;
pub mod config_validation;
pub mod error;
