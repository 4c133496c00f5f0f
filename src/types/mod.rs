pub mod analysis;
pub mod candle;
pub mod signal;

pub use analysis::*;
pub use candle::*;
pub use signal::*;
