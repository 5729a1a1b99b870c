// External API clients

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::TradingResult;
use crate::types::{Bracket, BracketRequest, RestingOrder, Side};

pub mod bitflyer;

// Re-export client types
pub use bitflyer::BitflyerClient;

/// Exchange operations the reconciliation controller depends on.
///
/// Query methods fail with `TradingError::ExchangeQuery` (or `ApiTimeout`),
/// mutations with `TradingError::ExchangeSubmit`.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Available balance of `currency`
    async fn get_balance(&self, currency: &str) -> TradingResult<Decimal>;

    /// Last traded price of the configured pair
    async fn get_ltp(&self) -> TradingResult<Decimal>;

    async fn list_active_brackets(&self) -> TradingResult<Vec<Bracket>>;

    async fn list_resting_limit_orders(&self, side: Side) -> TradingResult<Vec<RestingOrder>>;

    /// Returns the exchange-assigned acceptance id
    async fn submit_bracket(&self, request: &BracketRequest) -> TradingResult<String>;

    async fn cancel_bracket(&self, bracket_id: &str) -> TradingResult<()>;
}
