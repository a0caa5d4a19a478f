// =============================================================================
// Request parameters — canonical form encoding and per-endpoint inputs
// =============================================================================
//
// The signature covers the exact body bytes, so encoding has to be stable:
// keys are kept in a `BTreeMap` and emitted in ascending byte order, values
// are `application/x-www-form-urlencoded` escaped. `method` and `nonce` are
// ordinary keys and sort with everything else.
// =============================================================================

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

/// Parameter set of one private API call, keyed by wire name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Set `key` only when `value` is present.
    pub fn set_opt<V: ToString>(&mut self, key: &str, value: Option<V>) -> &mut Self {
        if let Some(v) = value {
            self.set(key, v);
        }
        self
    }

    /// Set `key` only for a non-empty string.
    pub fn set_non_empty(&mut self, key: &str, value: &str) -> &mut Self {
        if !value.is_empty() {
            self.set(key, value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Form-encode all pairs in ascending key order.
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

// =============================================================================
// Enumerated parameter values
// =============================================================================

/// Order side, sent as the `type` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Limit-order lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeInForce {
    /// Good till cancelled.
    Gtc,
    /// Maker-or-cancel.
    Moc,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gtc => write!(f, "GTC"),
            Self::Moc => write!(f, "MOC"),
        }
    }
}

/// Sort direction for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc => write!(f, "asc"),
            Self::Desc => write!(f, "desc"),
        }
    }
}

// =============================================================================
// Endpoint inputs
// =============================================================================

/// Optional filters for `tradeHistory`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TradeHistoryQuery {
    /// Maximum number of rows.
    pub count: Option<u32>,
    /// Pagination offset (trade id to start from).
    pub from: Option<u64>,
    pub order: Option<SortOrder>,
}

impl TradeHistoryQuery {
    pub(crate) fn apply(&self, params: &mut Params) {
        params
            .set_opt("count", self.count)
            .set_opt("from", self.from)
            .set_opt("order", self.order);
    }
}

/// A `trade` order. Zero amounts are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRequest {
    /// Market pair such as `btc_idr`.
    pub pair: String,
    pub side: TradeSide,
    pub price: Option<Decimal>,
    /// Amount in the pair's base asset (`btc` for `btc_idr`).
    pub base_amount: Option<Decimal>,
    /// Amount in the pair's quote asset (`idr` for `btc_idr`).
    pub quote_amount: Option<Decimal>,
    pub client_order_id: Option<String>,
    pub time_in_force: Option<TimeInForce>,
}

impl TradeRequest {
    pub fn new(pair: impl Into<String>, side: TradeSide) -> Self {
        Self {
            pair: pair.into(),
            side,
            price: None,
            base_amount: None,
            quote_amount: None,
            client_order_id: None,
            time_in_force: None,
        }
    }

    pub(crate) fn to_params(&self) -> Params {
        let (base, quote) = split_pair(&self.pair);
        let non_zero = |d: Option<Decimal>| d.filter(|v| !v.is_zero());

        let mut params = Params::new();
        params
            .set("pair", &self.pair)
            .set("type", self.side)
            .set_opt("price", non_zero(self.price))
            .set_opt(base, non_zero(self.base_amount))
            .set_opt(quote, non_zero(self.quote_amount))
            .set_opt("client_order_id", self.client_order_id.as_deref().filter(|s| !s.is_empty()))
            .set_opt("time_in_force", self.time_in_force);
        params
    }
}

/// On-chain withdrawal via `withdrawCoin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawCoinRequest {
    pub currency: String,
    pub network: String,
    pub address: String,
    pub amount: Decimal,
    pub memo: Option<String>,
    /// Caller-chosen idempotency key.
    pub request_id: String,
}

impl WithdrawCoinRequest {
    pub(crate) fn to_params(&self) -> Params {
        let mut params = Params::new();
        params
            .set("currency", &self.currency)
            .set("network", &self.network)
            .set("withdraw_address", &self.address)
            .set("withdraw_amount", self.amount)
            .set("request_id", &self.request_id)
            .set_opt("withdraw_memo", self.memo.as_deref().filter(|m| !m.is_empty()));
        params
    }
}

/// Internal transfer to another exchange user via `withdrawCoin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawByUsernameRequest {
    pub currency: String,
    pub amount: Decimal,
    pub request_id: String,
    pub username: String,
}

impl WithdrawByUsernameRequest {
    pub(crate) fn to_params(&self) -> Params {
        let mut params = Params::new();
        params
            .set("currency", &self.currency)
            .set("withdraw_input_method", "username")
            .set("withdraw_username", &self.username)
            .set("withdraw_amount", self.amount)
            .set("request_id", &self.request_id);
        params
    }
}

/// Split `btc_idr` into (`btc`, `idr`). Pairs without a separator fall back to
/// the exchange's flagship market keys.
fn split_pair(pair: &str) -> (&str, &str) {
    match pair.split_once('_') {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() => (base, quote),
        _ => ("btc", "idr"),
    }
}
