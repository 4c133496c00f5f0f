pub mod candle_store;
pub mod clock;
pub mod file_cache;
pub mod signals;
pub mod throttle;

pub use candle_store::{CandleFetch, CandleStore, DiskCandles, Freshness};
pub use clock::{Clock, ManualClock, SystemClock};
pub use file_cache::FileCache;
pub use signals::{
    MemorySignalRepository, SignalEngine, SignalRepository, SignalStateStore,
    SqliteSignalRepository,
};
pub use throttle::provider_limiter;
