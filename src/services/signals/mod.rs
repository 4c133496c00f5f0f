//! Signal generation: indicators, confluence, divergence, HTF trend, the
//! gating policy and the per-symbol signal state.

pub mod confluence;
pub mod divergence;
pub mod engine;
pub mod indicators;
pub mod policy;
pub mod repository;
pub mod state;
pub mod trend;

pub use confluence::ConfluenceEngine;
pub use divergence::DivergenceDetector;
pub use engine::{SignalEngine, SymbolReport};
pub use policy::{Candidate, Gate, PolicyInputs, PolicyOutcome, SignalPolicy};
pub use repository::{MemorySignalRepository, SignalRepository, SqliteSignalRepository};
pub use state::{Evaluation, InvalidationReason, MarketView, SignalStateStore, Transition};
pub use trend::HtfTrendDetector;
