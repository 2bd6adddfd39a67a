//! klzone: Key Liquidity zones from price swings, volatility and
//! positioning reports.
//!
//! Hexagonal architecture: pure computation in [`domain`], port traits in
//! [`ports`], concrete implementations in [`adapters`], command wiring in
//! [`cli`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
