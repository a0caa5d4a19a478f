// =============================================================================
// Supernova — market trend service and signed exchange client
// =============================================================================

pub mod api;
pub mod config;
pub mod exchange;
pub mod market_data;
pub mod storage;
pub mod trend;
