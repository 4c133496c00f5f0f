//! Omen - predictive crypto signal engine
//!
//! Fetches candles from several exchanges with fallback, scores
//! multi-timeframe confluence, gates candidates through a signal policy
//! and keeps one debounced, persisted signal per symbol.

pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

pub use config::Config;
pub use error::{EngineError, Result};
pub use services::{CandleStore, SignalEngine};
pub use types::*;
