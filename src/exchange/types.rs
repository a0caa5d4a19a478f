// =============================================================================
// Private API response types
// =============================================================================
//
// Every response shares one envelope:
//
//   { "success": 1, "return": { ...payload... } }
//   { "success": 0, "error": "message", "error_code": "code" }
//
// `BaseResponse` carries the common part and is checked through
// `is_success()`. Endpoint payloads are plain structs decoded from `return`.
// Monetary values stay as strings; the exchange sends them as text.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Envelope
// =============================================================================

/// Fields common to every response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaseResponse {
    #[serde(deserialize_with = "de_flag", default)]
    pub success: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl BaseResponse {
    pub fn is_success(&self) -> bool {
        self.success != 0
    }
}

/// Raw envelope before the payload is decoded into its endpoint type.
///
/// Withdrawal endpoints put their fields next to `success` instead of under
/// `return`; those land in `rest`.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub base: BaseResponse,
    #[serde(rename = "return", default)]
    pub payload: Option<serde_json::Value>,
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

impl Envelope {
    /// The `return` payload. Its absence on a successful response is a decode
    /// error, never an empty default.
    pub fn into_return(self) -> Result<serde_json::Value, serde_json::Error> {
        use serde::de::Error;

        match self.payload {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(serde_json::Error::custom("missing field `return`")),
        }
    }

    /// The payload value: `return` when present, otherwise the remaining
    /// top-level fields.
    pub fn into_payload(self) -> serde_json::Value {
        match self.payload {
            Some(value) if !value.is_null() => value,
            _ => serde_json::Value::Object(self.rest),
        }
    }
}

/// Accept `1`/`0`, `true`/`false`, or numeric strings for the success flag.
fn de_flag<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| D::Error::custom("invalid success flag")),
        serde_json::Value::Bool(b) => Ok(i64::from(b)),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("invalid success flag '{s}'"))),
        serde_json::Value::Null => Ok(0),
        other => Err(D::Error::custom(format!("invalid success flag: {other}"))),
    }
}

// =============================================================================
// Account
// =============================================================================

/// `getInfo` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub server_time: i64,
    #[serde(default)]
    pub balance: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub balance_hold: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub address: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub network: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub memo_is_required: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub verification_status: String,
    #[serde(default)]
    pub gauth_enable: bool,
    #[serde(default)]
    pub withdraw_status: i64,
}

/// `transHistory` payload: per-currency deposit and withdrawal lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransHistory {
    #[serde(default)]
    pub withdraw: HashMap<String, Vec<Transaction>>,
    #[serde(default)]
    pub deposit: HashMap<String, Vec<Transaction>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub rp: Option<String>,
    #[serde(default)]
    pub fee: Option<String>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub submit_time: String,
    #[serde(default)]
    pub success_time: String,
    #[serde(default, alias = "deposit_id")]
    pub withdraw_id: Option<String>,
    #[serde(default)]
    pub tx: String,
    #[serde(default)]
    pub btc: Option<String>,
}

// =============================================================================
// Trading
// =============================================================================

/// `trade` payload. Fill fields depend on the pair, so they are collected by
/// name (`receive_btc`, `spent_idr`, `remain_rp`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeResult {
    #[serde(default, deserialize_with = "de_string")]
    pub order_id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub fee: Option<String>,
    #[serde(default)]
    pub submit_time: Option<String>,
    #[serde(default)]
    pub finish_time: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(flatten)]
    pub amounts: HashMap<String, serde_json::Value>,
}

/// `tradeHistory` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeHistory {
    #[serde(default)]
    pub trades: Vec<OrderRecord>,
}

/// `openOrders` payload. Without a pair filter the exchange groups orders by
/// pair, which is kept in `by_pair`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenOrders {
    #[serde(default, deserialize_with = "de_orders")]
    pub orders: OrdersByPair,
}

/// Open orders either as one list or grouped by pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrdersByPair {
    List(Vec<OpenOrder>),
    Grouped(HashMap<String, Vec<OpenOrder>>),
}

impl Default for OrdersByPair {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl OrdersByPair {
    /// All orders regardless of grouping.
    pub fn all(&self) -> Vec<&OpenOrder> {
        match self {
            Self::List(list) => list.iter().collect(),
            Self::Grouped(map) => map.values().flatten().collect(),
        }
    }
}

fn de_orders<'de, D>(deserializer: D) -> Result<OrdersByPair, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<OrdersByPair>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenOrder {
    #[serde(default, deserialize_with = "de_string")]
    pub order_id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default)]
    pub submit_time: String,
    #[serde(default)]
    pub price: String,
    #[serde(default, rename = "type")]
    pub side: String,
    #[serde(default)]
    pub order_type: Option<String>,
    #[serde(flatten)]
    pub amounts: HashMap<String, serde_json::Value>,
}

/// `orderHistory` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderHistory {
    #[serde(default)]
    pub orders: Vec<OrderRecord>,
}

/// A historical or finished order as reported by `tradeHistory`,
/// `orderHistory` and `cancelOrder`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderRecord {
    #[serde(default, deserialize_with = "de_string")]
    pub order_id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(default, rename = "type")]
    pub side: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub submit_time: String,
    #[serde(default)]
    pub finish_time: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub fee: Option<String>,
    #[serde(flatten)]
    pub amounts: HashMap<String, serde_json::Value>,
}

/// `getOrder` / `getOrderByClientOrderId` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderLookup {
    #[serde(default)]
    pub order: OrderDetail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(default, deserialize_with = "de_string")]
    pub order_id: String,
    #[serde(default)]
    pub price: String,
    #[serde(default, rename = "type")]
    pub side: String,
    #[serde(default)]
    pub submit_time: String,
    #[serde(default)]
    pub finish_time: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    #[serde(flatten)]
    pub amounts: HashMap<String, serde_json::Value>,
}

/// `cancelOrder` / `cancelByClientOrderId` payload.
pub type CancelledOrder = OrderRecord;

// =============================================================================
// Withdrawals
// =============================================================================

/// `withdrawFee` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawFee {
    #[serde(default, deserialize_with = "de_string")]
    pub fee: String,
    #[serde(default)]
    pub server_time: Option<i64>,
}

/// `withdrawCoin` result, reported at the top level of the envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithdrawResult {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub withdraw_currency: String,
    #[serde(default)]
    pub withdraw_address: String,
    #[serde(default, deserialize_with = "de_string")]
    pub withdraw_amount: String,
    #[serde(default, deserialize_with = "de_string")]
    pub fee: String,
    #[serde(default, deserialize_with = "de_string")]
    pub amount_after_fee: String,
    #[serde(default, deserialize_with = "de_string")]
    pub submit_time: String,
    #[serde(default, deserialize_with = "de_string")]
    pub withdraw_id: String,
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub withdraw_username: Option<String>,
}

// =============================================================================
// Referral
// =============================================================================

/// `listDownline` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownlineList {
    #[serde(default)]
    pub downlines: Vec<Downline>,
    #[serde(default)]
    pub total: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Downline {
    #[serde(default, deserialize_with = "de_string")]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub join_date: String,
}

/// `checkDownline` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownlineCheck {
    #[serde(default)]
    pub is_downline: bool,
}

/// `createVoucher` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Voucher {
    #[serde(default, deserialize_with = "de_string")]
    pub voucher_id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub to_email: String,
}

/// Ids and amounts arrive as either numbers or strings depending on the
/// endpoint; normalise to text.
fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}
