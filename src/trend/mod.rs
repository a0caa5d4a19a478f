// =============================================================================
// Trend scoring
// =============================================================================
//
// `engine` is the pure multi-horizon EWMA indicator; `service` wires it to the
// candle source and the trend store.

pub mod engine;
pub mod service;

pub use engine::{TrendBreakdown, TrendEvaluation};
pub use service::TrendService;
