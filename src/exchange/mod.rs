// =============================================================================
// Exchange private API
// =============================================================================
//
// Nonce generation, request signing and the signed dispatch protocol for the
// exchange's private trading endpoints. Independent of the trend pipeline.

pub mod client;
pub mod error;
pub mod nonce;
pub mod params;
pub mod signer;
pub mod types;

pub use client::{ExchangeClient, SignedRequest};
pub use error::ExchangeError;
pub use nonce::NonceGenerator;
pub use params::{
    Params, SortOrder, TimeInForce, TradeHistoryQuery, TradeRequest, TradeSide,
    WithdrawByUsernameRequest, WithdrawCoinRequest,
};
