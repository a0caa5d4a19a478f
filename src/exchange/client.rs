// =============================================================================
// Exchange private API client — HMAC-SHA512 signed form POSTs
// =============================================================================
//
// Every call is one POST to the private endpoint:
//
//   body = form-encode(params ∪ {method, nonce})   (keys sorted)
//   Key  = API key header
//   Sign = hex(HMAC-SHA512(secret, body))
//
// A 429 is retried once after 500 ms with the very same signed request; the
// nonce has already been consumed and the signature still matches the body.
// The whole call, retry wait included, runs under one deadline.
//
// SECURITY: the secret is never logged or serialized.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::error::ExchangeError;
use super::nonce::NonceGenerator;
use super::params::{
    Params, TradeHistoryQuery, TradeRequest, TradeSide, WithdrawByUsernameRequest,
    WithdrawCoinRequest,
};
use super::signer;
use super::types::{
    AccountInfo, CancelledOrder, DownlineCheck, DownlineList, Envelope, OpenOrders,
    OrderHistory, OrderLookup, TradeHistory, TradeResult, TransHistory, Voucher, WithdrawFee,
    WithdrawResult,
};

/// Production private API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://indodax.com/tapi";

/// Default deadline for one call, including the rate-limit retry.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait before the single retry after HTTP 429.
const RATE_LIMIT_DELAY: Duration = Duration::from_millis(500);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A request that has been assigned a nonce and signed. Sent as-is, and
/// resent as-is on retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub nonce: i64,
    /// Exact bytes transmitted.
    pub body: String,
    pub signature: String,
}

/// Where an endpoint puts its payload in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadLocation {
    /// Under `return`; a missing `return` is a decode error.
    Return,
    /// Under `return` if present, otherwise next to `success`.
    TopLevel,
}

/// Authenticated client for the exchange's private trading API.
#[derive(Clone)]
pub struct ExchangeClient {
    api_key: String,
    secret: String,
    base_url: String,
    timeout: Duration,
    nonce: Arc<NonceGenerator>,
    client: reqwest::Client,
}

impl ExchangeClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create a client against [`DEFAULT_BASE_URL`] with a fresh,
    /// clock-seeded nonce generator.
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self, ExchangeError> {
        let client = reqwest::Client::builder().build()?;

        debug!(base_url = DEFAULT_BASE_URL, "ExchangeClient initialised");

        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            nonce: Arc::new(NonceGenerator::new()),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a nonce generator, e.g. between clones using the same key.
    pub fn with_nonce_generator(mut self, nonce: Arc<NonceGenerator>) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn nonce_generator(&self) -> &Arc<NonceGenerator> {
        &self.nonce
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Assign a nonce to `params`, encode them and sign the body.
    pub fn prepare(&self, method: &str, mut params: Params) -> SignedRequest {
        let nonce = self.nonce.next();
        params.set("method", method).set("nonce", nonce);
        let body = params.encode();
        let signature = signer::sign(body.as_bytes(), self.secret.as_bytes());
        SignedRequest {
            method: method.to_string(),
            nonce,
            body,
            signature,
        }
    }

    /// Call `method` and decode its `return` payload into `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Params,
    ) -> Result<T, ExchangeError> {
        self.call_with(method, params, PayloadLocation::Return).await
    }

    async fn call_with<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Params,
        location: PayloadLocation,
    ) -> Result<T, ExchangeError> {
        let signed = self.prepare(method, params);
        match tokio::time::timeout(self.timeout, self.dispatch(&signed)).await {
            Ok(result) => {
                let bytes = result?;
                decode_response(&bytes, location)
            }
            Err(_) => {
                warn!(method, nonce = signed.nonce, timeout = ?self.timeout, "private API call timed out");
                Err(ExchangeError::Timeout(self.timeout))
            }
        }
    }

    /// Send a signed request, retrying once on 429, and return the raw body
    /// of a 2xx response.
    #[instrument(skip(self, signed), fields(method = %signed.method, nonce = signed.nonce), name = "exchange::dispatch")]
    async fn dispatch(&self, signed: &SignedRequest) -> Result<Vec<u8>, ExchangeError> {
        let request = self
            .client
            .post(&self.base_url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header("Key", &self.api_key)
            .header("Sign", &signed.signature)
            .body(signed.body.clone())
            .build()?;
        // The body is an in-memory string, so the clone is always available.
        let retry = request.try_clone();

        let mut resp = self.client.execute(request).await?;

        if resp.status() == StatusCode::TOO_MANY_REQUESTS {
            warn!(delay_ms = RATE_LIMIT_DELAY.as_millis() as u64, "rate limited, retrying once");
            tokio::time::sleep(RATE_LIMIT_DELAY).await;

            let Some(retry) = retry else {
                let body = resp.text().await?;
                return Err(ExchangeError::RateLimited { body });
            };
            resp = self.client.execute(retry).await?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS {
                let body = resp.text().await?;
                warn!("still rate limited after retry");
                return Err(ExchangeError::RateLimited { body });
            }
        }

        let status = resp.status();
        let bytes = resp.bytes().await?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).into_owned();
            warn!(status = status.as_u16(), "private API returned non-success status");
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        debug!(len = bytes.len(), "private API response received");
        Ok(bytes.to_vec())
    }

    // -------------------------------------------------------------------------
    // Account
    // -------------------------------------------------------------------------

    /// `getInfo` — balances, deposit addresses and profile.
    pub async fn get_info(&self) -> Result<AccountInfo, ExchangeError> {
        self.call("getInfo", Params::new()).await
    }

    /// `transHistory` — deposits and withdrawals, optionally bounded by date.
    pub async fn trans_history(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TransHistory, ExchangeError> {
        let mut params = Params::new();
        params
            .set_opt("start", start.map(|d| d.format("%Y-%m-%d")))
            .set_opt("end", end.map(|d| d.format("%Y-%m-%d")));
        self.call("transHistory", params).await
    }

    // -------------------------------------------------------------------------
    // Trading
    // -------------------------------------------------------------------------

    /// `trade` — place a limit or market order.
    pub async fn trade(&self, order: &TradeRequest) -> Result<TradeResult, ExchangeError> {
        debug!(pair = %order.pair, side = %order.side, "placing order");
        self.call("trade", order.to_params()).await
    }

    /// `tradeHistory` — filled trades for `pair`.
    pub async fn trade_history(
        &self,
        pair: &str,
        query: &TradeHistoryQuery,
    ) -> Result<TradeHistory, ExchangeError> {
        let mut params = Params::new();
        params.set("pair", pair);
        query.apply(&mut params);
        self.call("tradeHistory", params).await
    }

    /// `openOrders` — all pairs when `pair` is `None`.
    pub async fn open_orders(&self, pair: Option<&str>) -> Result<OpenOrders, ExchangeError> {
        let mut params = Params::new();
        params.set_opt("pair", pair.filter(|p| !p.is_empty()));
        self.call("openOrders", params).await
    }

    /// `orderHistory` — zero `count`/`from` are omitted.
    pub async fn order_history(
        &self,
        pair: &str,
        count: Option<u32>,
        from: Option<u64>,
    ) -> Result<OrderHistory, ExchangeError> {
        let mut params = Params::new();
        params
            .set("pair", pair)
            .set_opt("count", count.filter(|c| *c > 0))
            .set_opt("from", from.filter(|f| *f > 0));
        self.call("orderHistory", params).await
    }

    pub async fn get_order(&self, pair: &str, order_id: u64) -> Result<OrderLookup, ExchangeError> {
        let mut params = Params::new();
        params.set("pair", pair).set("order_id", order_id);
        self.call("getOrder", params).await
    }

    pub async fn get_order_by_client_order_id(
        &self,
        client_order_id: &str,
    ) -> Result<OrderLookup, ExchangeError> {
        let mut params = Params::new();
        params.set("client_order_id", client_order_id);
        self.call("getOrderByClientOrderId", params).await
    }

    pub async fn cancel_order(
        &self,
        pair: &str,
        side: TradeSide,
        order_id: u64,
    ) -> Result<CancelledOrder, ExchangeError> {
        let mut params = Params::new();
        params
            .set("pair", pair)
            .set("type", side)
            .set("order_id", order_id);
        self.call("cancelOrder", params).await
    }

    pub async fn cancel_by_client_order_id(
        &self,
        client_order_id: &str,
    ) -> Result<CancelledOrder, ExchangeError> {
        let mut params = Params::new();
        params.set("client_order_id", client_order_id);
        self.call("cancelByClientOrderId", params).await
    }

    // -------------------------------------------------------------------------
    // Withdrawals
    // -------------------------------------------------------------------------

    pub async fn withdraw_fee(
        &self,
        currency: &str,
        network: Option<&str>,
    ) -> Result<WithdrawFee, ExchangeError> {
        let mut params = Params::new();
        params
            .set("currency", currency)
            .set_opt("network", network.filter(|n| !n.is_empty()));
        self.call("withdrawFee", params).await
    }

    /// `withdrawCoin` to an on-chain address.
    #[instrument(skip(self, request), fields(currency = %request.currency, request_id = %request.request_id), name = "exchange::withdraw_coin")]
    pub async fn withdraw_coin(
        &self,
        request: &WithdrawCoinRequest,
    ) -> Result<WithdrawResult, ExchangeError> {
        self.call_with("withdrawCoin", request.to_params(), PayloadLocation::TopLevel)
            .await
    }

    /// `withdrawCoin` to another exchange user by username.
    #[instrument(skip(self, request), fields(currency = %request.currency, request_id = %request.request_id), name = "exchange::withdraw_by_username")]
    pub async fn withdraw_by_username(
        &self,
        request: &WithdrawByUsernameRequest,
    ) -> Result<WithdrawResult, ExchangeError> {
        self.call_with("withdrawCoin", request.to_params(), PayloadLocation::TopLevel)
            .await
    }

    // -------------------------------------------------------------------------
    // Referral
    // -------------------------------------------------------------------------

    pub async fn list_downline(&self, page: u32, limit: u32) -> Result<DownlineList, ExchangeError> {
        let mut params = Params::new();
        params.set("page", page).set("limit", limit);
        self.call("listDownline", params).await
    }

    pub async fn check_downline(&self, email: &str) -> Result<DownlineCheck, ExchangeError> {
        let mut params = Params::new();
        params.set("email", email);
        self.call("checkDownline", params).await
    }

    pub async fn create_voucher(&self, amount: u64, to_email: &str) -> Result<Voucher, ExchangeError> {
        let mut params = Params::new();
        params.set("amount", amount).set("to_email", to_email);
        self.call("createVoucher", params).await
    }
}

impl std::fmt::Debug for ExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeClient")
            .field("api_key", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Decode a 2xx body against the envelope and extract the payload.
fn decode_response<T: DeserializeOwned>(
    bytes: &[u8],
    location: PayloadLocation,
) -> Result<T, ExchangeError> {
    let envelope: Envelope = serde_json::from_slice(bytes)?;

    if !envelope.base.is_success() {
        return Err(ExchangeError::Api {
            message: envelope.base.error.unwrap_or_default(),
            code: envelope.base.error_code,
        });
    }

    let payload = match location {
        PayloadLocation::Return => envelope.into_return()?,
        PayloadLocation::TopLevel => envelope.into_payload(),
    };
    Ok(serde_json::from_value(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use rust_decimal::Decimal;

    const KEY: &str = "test-key";
    const SECRET: &str = "test-secret";

    fn client_for(server: &Server, seed: i64) -> ExchangeClient {
        ExchangeClient::new(KEY, SECRET)
            .unwrap()
            .with_base_url(format!("{}/tapi", server.url()))
            .with_nonce_generator(Arc::new(NonceGenerator::with_seed(seed)))
    }

    #[test]
    fn prepare_merges_method_and_nonce_in_sorted_order() {
        let client = ExchangeClient::new(KEY, SECRET)
            .unwrap()
            .with_nonce_generator(Arc::new(NonceGenerator::with_seed(1_000)));
        let mut params = Params::new();
        params.set("pair", "btc_idr").set("count", 5);

        let signed = client.prepare("tradeHistory", params);
        assert_eq!(signed.nonce, 1_001);
        assert_eq!(signed.body, "count=5&method=tradeHistory&nonce=1001&pair=btc_idr");
        assert_eq!(signed.signature, signer::sign(signed.body.as_bytes(), SECRET.as_bytes()));
    }

    #[test]
    fn prepare_never_reuses_a_nonce() {
        let client = ExchangeClient::new(KEY, SECRET).unwrap();
        let a = client.prepare("getInfo", Params::new());
        let b = client.prepare("getInfo", Params::new());
        assert!(b.nonce > a.nonce);
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn debug_redacts_credentials() {
        let client = ExchangeClient::new(KEY, SECRET).unwrap();
        let dbg = format!("{client:?}");
        assert!(!dbg.contains(KEY));
        assert!(!dbg.contains(SECRET));
    }

    #[tokio::test]
    async fn sends_signed_form_post() {
        let mut server = Server::new_async().await;
        let body = "method=getInfo&nonce=1001";
        let mock = server
            .mock("POST", "/tapi")
            .match_header("content-type", FORM_CONTENT_TYPE)
            .match_header("Key", KEY)
            .match_header("Sign", signer::sign(body.as_bytes(), SECRET.as_bytes()).as_str())
            .match_body(Matcher::Exact(body.to_string()))
            .with_status(200)
            .with_body(r#"{"success":1,"return":{"server_time":1710000000,"user_id":"42","name":"Test","balance":{"idr":"1000"}}}"#)
            .create_async()
            .await;

        let info = client_for(&server, 1_000).get_info().await.unwrap();
        assert_eq!(info.user_id, "42");
        assert_eq!(info.balance["idr"], serde_json::json!("1000"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_once_after_429_with_same_signed_body() {
        let mut server = Server::new_async().await;
        let body = "method=getInfo&nonce=1001";
        let sign = signer::sign(body.as_bytes(), SECRET.as_bytes());

        let limited = server
            .mock("POST", "/tapi")
            .match_header("Sign", sign.as_str())
            .match_body(Matcher::Exact(body.to_string()))
            .with_status(429)
            .with_body("slow down")
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("POST", "/tapi")
            .match_header("Sign", sign.as_str())
            .match_body(Matcher::Exact(body.to_string()))
            .with_status(200)
            .with_body(r#"{"success":1,"return":{"user_id":"7"}}"#)
            .expect(1)
            .create_async()
            .await;

        let info = client_for(&server, 1_000).get_info().await.unwrap();
        assert_eq!(info.user_id, "7");
        limited.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn second_429_is_rate_limit_error_without_further_retry() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/tapi")
            .with_status(429)
            .with_body("slow down")
            .expect(2)
            .create_async()
            .await;

        let err = client_for(&server, 1_000).get_info().await.unwrap_err();
        assert!(err.is_rate_limited(), "unexpected error: {err}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn other_status_fails_immediately_with_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/tapi")
            .with_status(503)
            .with_body("maintenance")
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server, 1_000).get_info().await.unwrap_err();
        match err {
            ExchangeError::Http { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("expected http error, got {other}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn business_error_carries_server_message() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/tapi")
            .with_status(200)
            .with_body(r#"{"success":0,"error":"insufficient balance","error_code":"insufficient_balance"}"#)
            .create_async()
            .await;

        let mut order = TradeRequest::new("btc_idr", TradeSide::Buy);
        order.quote_amount = Some(Decimal::new(150_000, 0));
        let err = client_for(&server, 1_000).trade(&order).await.unwrap_err();
        assert_eq!(err.api_message(), Some("insufficient balance"));
        match err {
            ExchangeError::Api { code, .. } => assert_eq!(code.as_deref(), Some("insufficient_balance")),
            other => panic!("expected api error, got {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_decode_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/tapi")
            .with_status(200)
            .with_body("<html>bad gateway</html>")
            .create_async()
            .await;

        let err = client_for(&server, 1_000).get_info().await.unwrap_err();
        assert!(matches!(err, ExchangeError::Decode(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn missing_return_is_decode_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/tapi")
            .with_status(200)
            .with_body(r#"{"success":1}"#)
            .create_async()
            .await;

        let err = client_for(&server, 1_000).get_info().await.unwrap_err();
        assert!(matches!(err, ExchangeError::Decode(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn trade_history_sends_filters() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/tapi")
            .match_body(Matcher::Exact(
                "count=10&from=500&method=tradeHistory&nonce=1001&order=asc&pair=btc_idr".to_string(),
            ))
            .with_status(200)
            .with_body(r#"{"success":1,"return":{"trades":[{"order_id":"1","type":"buy","price":"100","submit_time":"1","finish_time":"2","status":"filled","fee":"0"}]}}"#)
            .create_async()
            .await;

        let query = TradeHistoryQuery {
            count: Some(10),
            from: Some(500),
            order: Some(crate::exchange::params::SortOrder::Asc),
        };
        let history = client_for(&server, 1_000)
            .trade_history("btc_idr", &query)
            .await
            .unwrap();
        assert_eq!(history.trades.len(), 1);
        assert_eq!(history.trades[0].status, "filled");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn withdraw_reads_top_level_fields() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/tapi")
            .match_body(Matcher::UrlEncoded("method".into(), "withdrawCoin".into()))
            .with_status(200)
            .with_body(r#"{"success":1,"status":"approved","withdraw_currency":"btc","withdraw_address":"bc1qexample","withdraw_amount":"0.01","fee":"0.0005","amount_after_fee":"0.0095","submit_time":"1710000000","withdraw_id":"btc-9","txid":""}"#)
            .create_async()
            .await;

        let request = WithdrawCoinRequest {
            currency: "btc".into(),
            network: "btc".into(),
            address: "bc1qexample".into(),
            amount: Decimal::new(1, 2),
            memo: None,
            request_id: "req-1".into(),
        };
        let result = client_for(&server, 1_000).withdraw_coin(&request).await.unwrap();
        assert_eq!(result.status, "approved");
        assert_eq!(result.amount_after_fee, "0.0095");
    }

    #[tokio::test]
    async fn order_history_omits_zero_paging() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/tapi")
            .match_body(Matcher::Exact("method=orderHistory&nonce=1001&pair=eth_idr".to_string()))
            .with_status(200)
            .with_body(r#"{"success":1,"return":{"orders":[]}}"#)
            .create_async()
            .await;

        let history = client_for(&server, 1_000)
            .order_history("eth_idr", Some(0), Some(0))
            .await
            .unwrap();
        assert!(history.orders.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn deadline_covers_retry_wait() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/tapi")
            .with_status(429)
            .expect_at_least(1)
            .create_async()
            .await;

        let client = client_for(&server, 1_000).with_timeout(Duration::from_millis(100));
        let err = client.get_info().await.unwrap_err();
        assert!(matches!(err, ExchangeError::Timeout(_)), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let client = ExchangeClient::new(KEY, SECRET)
            .unwrap()
            .with_base_url("http://127.0.0.1:1/tapi");
        let err = client.get_info().await.unwrap_err();
        assert!(matches!(err, ExchangeError::Transport(_)), "unexpected error: {err}");
    }
}
