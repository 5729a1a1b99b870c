// bitFlyer Lightning REST client

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::{Method, StatusCode};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{debug, warn};

use super::Exchange;
use crate::config::Config;
use crate::core::order_state::{normalize_bracket, normalize_resting, RawChildOrder, RawParentOrder};
use crate::error::{TradingError, TradingResult};
use crate::types::{Bracket, BracketRequest, PriceLevel, RestingOrder, Side};

type HmacSha256 = Hmac<Sha256>;

/// Which error a failed call turns into
#[derive(Debug, Clone, Copy)]
enum CallKind {
    Query,
    Submit,
}

impl CallKind {
    fn error(self, msg: String) -> TradingError {
        match self {
            CallKind::Query => TradingError::ExchangeQuery(msg),
            CallKind::Submit => TradingError::ExchangeSubmit(msg),
        }
    }

    /// A submit that timed out may still have reached the exchange, so it
    /// stays a submit failure rather than a retryable timeout.
    fn timeout(self, msg: String) -> TradingError {
        match self {
            CallKind::Query => TradingError::ApiTimeout(msg),
            CallKind::Submit => TradingError::ExchangeSubmit(format!("timed out: {}", msg)),
        }
    }

    fn auth(self, msg: String) -> TradingError {
        match self {
            CallKind::Query => TradingError::ApiAuthentication(msg),
            CallKind::Submit => TradingError::ExchangeSubmit(format!("authentication rejected: {}", msg)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    currency_code: String,
    amount: Decimal,
    available: Decimal,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    ltp: Decimal,
}

#[derive(Debug, Deserialize)]
struct ParentOrderEntry {
    parent_order_acceptance_id: String,
    #[serde(default)]
    parent_order_type: Option<String>,
    price: Decimal,
    size: Decimal,
}

#[derive(Debug, Deserialize)]
struct Acceptance {
    parent_order_acceptance_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    status: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
}

/// HMAC-SHA256 signature over `timestamp + method + path + body`, hex encoded.
pub fn sign(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> TradingResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| TradingError::ApiAuthentication(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone)]
pub struct BitflyerClient {
    client: reqwest::Client,
    base_url: String,
    product_code: String,
    api_key: String,
    api_secret: String,
    minute_to_expire: u32,
    interval: PriceLevel,
}

impl BitflyerClient {
    pub fn new(config: &Config) -> TradingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.exchange.request_timeout_secs))
            .build()
            .map_err(|e| TradingError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.exchange.rest_url.trim_end_matches('/').to_string(),
            product_code: config.exchange.product_code.clone(),
            api_key: config.exchange.api_key.clone(),
            api_secret: config.exchange.api_secret.clone(),
            minute_to_expire: config.exchange.minute_to_expire,
            interval: config.grid.price_interval,
        })
    }

    /// Signed request against a private endpoint. `path` includes the query.
    async fn private_request(
        &self,
        kind: CallKind,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> TradingResult<String> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(kind.auth("API_KEY / API_SECRET not set".to_string()));
        }

        let timestamp = Utc::now().timestamp().to_string();
        let body = body.unwrap_or_default();
        let signature = sign(&self.api_secret, &timestamp, method.as_str(), path, &body)?;

        let mut request = self
            .client
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .header("ACCESS-KEY", &self.api_key)
            .header("ACCESS-TIMESTAMP", &timestamp)
            .header("ACCESS-SIGN", signature)
            .header("Content-Type", "application/json");
        if !body.is_empty() {
            request = request.body(body);
        }

        debug!("➡️  {} {}", method, path);
        let response = request.send().await.map_err(|e| Self::transport_error(kind, e))?;
        Self::read_body(kind, response).await
    }

    async fn private_get<T: DeserializeOwned>(&self, path: &str) -> TradingResult<T> {
        let text = self.private_request(CallKind::Query, Method::GET, path, None).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn private_post(&self, path: &str, body: serde_json::Value) -> TradingResult<String> {
        let body = serde_json::to_string(&body)
            .map_err(|e| TradingError::ExchangeSubmit(format!("failed to encode request: {}", e)))?;
        self.private_request(CallKind::Submit, Method::POST, path, Some(body)).await
    }

    fn transport_error(kind: CallKind, err: reqwest::Error) -> TradingError {
        if err.is_timeout() {
            kind.timeout(err.to_string())
        } else {
            kind.error(err.to_string())
        }
    }

    async fn read_body(kind: CallKind, response: reqwest::Response) -> TradingResult<String> {
        let status = response.status();
        let text = response.text().await.map_err(|e| Self::transport_error(kind, e))?;
        if status.is_success() {
            return Ok(text);
        }

        let detail = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|body| {
                body.error_message
                    .map(|msg| format!("{} (status {})", msg, body.status.unwrap_or_default()))
            })
            .unwrap_or(text);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(kind.auth(format!("HTTP {}: {}", status.as_u16(), detail)))
            }
            _ => Err(kind.error(format!("HTTP {}: {}", status.as_u16(), detail))),
        }
    }

    fn decimal_field(value: Decimal, name: &str) -> TradingResult<f64> {
        value
            .to_f64()
            .ok_or_else(|| TradingError::ExchangeSubmit(format!("{} {} is not representable", name, value)))
    }

    /// Both legs of one parent order. Falls back to the list entry when the
    /// detail call fails.
    async fn bracket_detail(&self, entry: &ParentOrderEntry) -> TradingResult<Bracket> {
        let path = format!(
            "/v1/me/getparentorder?parent_order_acceptance_id={}",
            entry.parent_order_acceptance_id
        );
        let raw = match self.private_get::<RawParentOrder>(&path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "⚠️  Detail for {} unavailable ({}), assuming SELL one interval up",
                    entry.parent_order_acceptance_id, e
                );
                RawParentOrder::Flat {
                    parent_order_acceptance_id: entry.parent_order_acceptance_id.clone(),
                    price: entry.price,
                    size: entry.size,
                }
            }
        };
        normalize_bracket(&raw, self.interval)
    }
}

#[async_trait]
impl Exchange for BitflyerClient {
    async fn get_balance(&self, currency: &str) -> TradingResult<Decimal> {
        let balances: Vec<BalanceEntry> = self.private_get("/v1/me/getbalance").await?;
        let entry = balances
            .into_iter()
            .find(|b| b.currency_code == currency)
            .ok_or_else(|| TradingError::ExchangeQuery(format!("no {} balance reported", currency)))?;
        debug!("💴 {} balance: amount {}, available {}", currency, entry.amount, entry.available);
        Ok(entry.available)
    }

    async fn get_ltp(&self) -> TradingResult<Decimal> {
        let response = self
            .client
            .get(format!("{}/v1/ticker", self.base_url))
            .query(&[("product_code", self.product_code.as_str())])
            .send()
            .await
            .map_err(|e| Self::transport_error(CallKind::Query, e))?;
        let text = Self::read_body(CallKind::Query, response).await?;
        let ticker: Ticker = serde_json::from_str(&text)?;

        if ticker.ltp <= Decimal::ZERO {
            return Err(TradingError::ExchangeQuery(format!("non-positive LTP {}", ticker.ltp)));
        }
        Ok(ticker.ltp)
    }

    async fn list_active_brackets(&self) -> TradingResult<Vec<Bracket>> {
        let path = format!(
            "/v1/me/getparentorders?product_code={}&parent_order_state=ACTIVE",
            self.product_code
        );
        let entries: Vec<ParentOrderEntry> = self.private_get(&path).await?;

        let mut brackets = Vec::with_capacity(entries.len());
        for entry in entries
            .iter()
            .filter(|e| e.parent_order_type.as_deref().map_or(true, |t| t == "IFD"))
        {
            brackets.push(self.bracket_detail(entry).await?);
        }
        Ok(brackets)
    }

    async fn list_resting_limit_orders(&self, side: Side) -> TradingResult<Vec<RestingOrder>> {
        let path = format!(
            "/v1/me/getchildorders?product_code={}&child_order_state=ACTIVE",
            self.product_code
        );
        let orders: Vec<RawChildOrder> = self.private_get(&path).await?;

        orders
            .iter()
            .filter(|o| o.side == side)
            .filter(|o| o.child_order_type.as_deref().map_or(true, |t| t == "LIMIT"))
            .map(normalize_resting)
            .collect()
    }

    async fn submit_bracket(&self, request: &BracketRequest) -> TradingResult<String> {
        let body = json!({
            "order_method": "IFD",
            "minute_to_expire": self.minute_to_expire,
            "time_in_force": "GTC",
            "parameters": [
                {
                    "product_code": self.product_code,
                    "condition_type": "LIMIT",
                    "side": Side::Buy.as_str(),
                    "price": request.buy_price,
                    "size": Self::decimal_field(request.buy_size, "buy_size")?,
                },
                {
                    "product_code": self.product_code,
                    "condition_type": "LIMIT",
                    "side": Side::Sell.as_str(),
                    "price": request.sell_price,
                    "size": Self::decimal_field(request.sell_size, "sell_size")?,
                },
            ],
        });

        let text = self.private_post("/v1/me/sendparentorder", body).await?;
        let acceptance: Acceptance = serde_json::from_str(&text)
            .map_err(|e| TradingError::ExchangeSubmit(format!("unexpected response '{}': {}", text, e)))?;
        Ok(acceptance.parent_order_acceptance_id)
    }

    async fn cancel_bracket(&self, bracket_id: &str) -> TradingResult<()> {
        let body = json!({
            "product_code": self.product_code,
            "parent_order_acceptance_id": bracket_id,
        });
        self.private_post("/v1/me/cancelparentorder", body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_get_request() {
        let sig = sign("secret", "1700000000", "GET", "/v1/me/getbalance", "").unwrap();
        assert_eq!(sig, "79587a758aa701507d18db547f65f26852404ed7ed2a6a536f4229c9f0eec306");
    }

    #[test]
    fn test_sign_post_request() {
        let sig = sign(
            "secret",
            "1700000000",
            "POST",
            "/v1/me/cancelparentorder",
            r#"{"product_code":"BTC_JPY"}"#,
        )
        .unwrap();
        assert_eq!(sig, "e15175a26f64ceca0ab56f776ed77b59288b54935d560476d089a7e72ba5207b");
    }

    #[test]
    fn test_call_kind_maps_errors() {
        assert!(matches!(CallKind::Query.error("x".into()), TradingError::ExchangeQuery(_)));
        assert!(matches!(CallKind::Submit.error("x".into()), TradingError::ExchangeSubmit(_)));
    }

    #[test]
    fn test_submit_failures_keep_submit_category() {
        let timeout = CallKind::Submit.timeout("deadline".into());
        assert_eq!(timeout.category(), "exchange_submit");
        assert!(!timeout.is_retryable());
        assert_eq!(CallKind::Submit.auth("401".into()).category(), "exchange_submit");

        assert!(matches!(CallKind::Query.timeout("x".into()), TradingError::ApiTimeout(_)));
        assert!(matches!(CallKind::Query.auth("x".into()), TradingError::ApiAuthentication(_)));
    }
}
