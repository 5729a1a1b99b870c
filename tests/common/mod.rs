// Common test utilities and helpers
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use ifd_grid_bot::{
    Bracket, BracketRequest, Config, Controller, Database, Exchange, RestingOrder, Side,
    SqliteLedger, TradingError, TradingResult,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

pub const INTERVAL: i64 = 200_000;

/// Configuration for controller tests: levels 8,000,000 .. 10,600,000 step
/// 200,000, size 0.001, fee 0.1%, live.
pub fn create_test_config() -> Config {
    let mut config = Config::default();
    config.grid.min_price = 8_000_000;
    config.grid.max_price = 10_800_000;
    config.grid.price_interval = INTERVAL;
    config.orders.buy_size = dec!(0.001);
    config.orders.sell_size = dec!(0.001);
    config.orders.fee_rate = dec!(0.001);
    config.policy.live = true;
    config.exchange.api_key = "test-key".to_string();
    config.exchange.api_secret = "test-secret".to_string();
    config
}

/// Create a temporary directory for test databases
pub fn create_temp_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("test.db");
    (temp_dir, db_path)
}

pub fn file_ledger(path: &PathBuf) -> SqliteLedger {
    SqliteLedger::new(Database::new(path).expect("open db")).expect("migrate db")
}

pub fn bracket(id: &str, buy_price: i64) -> Bracket {
    Bracket {
        id: id.to_string(),
        buy_price,
        buy_size: dec!(0.001),
        sell_price: buy_price + INTERVAL,
        sell_size: dec!(0.001),
    }
}

pub fn resting_sell(price: i64) -> RestingOrder {
    RestingOrder { side: Side::Sell, price, size: dec!(0.001) }
}

/// Which mock operation should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Ltp,
    Balance,
    Brackets,
    RestingOrders,
    Submit,
    Cancel,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub ltp: Decimal,
    pub balance: Decimal,
    pub brackets: Vec<Bracket>,
    pub resting_sells: Vec<RestingOrder>,
    pub failing: Vec<Op>,
    pub calls: Vec<Op>,
    pub submitted: Vec<BracketRequest>,
    pub canceled: Vec<String>,
    next_id: u32,
}

/// In-memory exchange double that records every call
#[derive(Debug, Default)]
pub struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new(ltp: Decimal, balance: Decimal) -> Self {
        let exchange = Self::default();
        {
            let mut state = exchange.state();
            state.ltp = ltp;
            state.balance = balance;
        }
        exchange
    }

    pub fn with_brackets(self, brackets: Vec<Bracket>) -> Self {
        self.state().brackets = brackets;
        self
    }

    pub fn with_resting_sells(self, sells: Vec<RestingOrder>) -> Self {
        self.state().resting_sells = sells;
        self
    }

    pub fn failing(self, op: Op) -> Self {
        self.state().failing.push(op);
        self
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    pub fn called(&self, op: Op) -> bool {
        self.state().calls.contains(&op)
    }

    fn enter(&self, op: Op) -> TradingResult<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        state.calls.push(op);
        if state.failing.contains(&op) {
            return Err(match op {
                Op::Submit | Op::Cancel => TradingError::ExchangeSubmit(format!("{:?} rejected", op)),
                _ => TradingError::ExchangeQuery(format!("{:?} unavailable", op)),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn get_balance(&self, _currency: &str) -> TradingResult<Decimal> {
        Ok(self.enter(Op::Balance)?.balance)
    }

    async fn get_ltp(&self) -> TradingResult<Decimal> {
        Ok(self.enter(Op::Ltp)?.ltp)
    }

    async fn list_active_brackets(&self) -> TradingResult<Vec<Bracket>> {
        Ok(self.enter(Op::Brackets)?.brackets.clone())
    }

    async fn list_resting_limit_orders(&self, side: Side) -> TradingResult<Vec<RestingOrder>> {
        let state = self.enter(Op::RestingOrders)?;
        Ok(state.resting_sells.iter().filter(|o| o.side == side).cloned().collect())
    }

    async fn submit_bracket(&self, request: &BracketRequest) -> TradingResult<String> {
        let mut state = self.enter(Op::Submit)?;
        state.next_id += 1;
        let id = format!("JRF-MOCK-{}", state.next_id);
        state.submitted.push(request.clone());
        state.brackets.push(Bracket {
            id: id.clone(),
            buy_price: request.buy_price,
            buy_size: request.buy_size,
            sell_price: request.sell_price,
            sell_size: request.sell_size,
        });
        Ok(id)
    }

    async fn cancel_bracket(&self, bracket_id: &str) -> TradingResult<()> {
        let mut state = self.enter(Op::Cancel)?;
        state.canceled.push(bracket_id.to_string());
        state.brackets.retain(|b| b.id != bracket_id);
        Ok(())
    }
}

pub fn controller(
    config: &Config,
    exchange: MockExchange,
) -> Controller<MockExchange, SqliteLedger> {
    let ledger = SqliteLedger::in_memory().expect("in-memory ledger");
    Controller::from_config(config, exchange, ledger).expect("valid config")
}
