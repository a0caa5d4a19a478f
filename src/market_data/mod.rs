// =============================================================================
// Market Data
// =============================================================================
//
// Public historical candles feeding the trend engine. Only daily klines are
// consumed; there is no streaming or order-book data.

pub mod candle_source;

pub use candle_source::{Candle, CandleSource};
