// Status and ledger command implementations
use rust_decimal::Decimal;
use tracing::{info, warn};
use ifd_grid_bot::core::funds::{max_affordable_size, meets_min_order};
use ifd_grid_bot::{
    BitflyerClient, Config, Database, Exchange, Grid, Ledger, OrderSnapshot, PreFlightValidator, Side,
    SqliteLedger, TickRecord, TradingResult,
};

fn open_ledger(config: &Config) -> TradingResult<SqliteLedger> {
    SqliteLedger::new(Database::new(&config.ledger.db_path)?)
}

pub async fn show_status(config: &Config, live: bool) -> TradingResult<()> {
    let grid = Grid::from_config(&config.grid)?;

    info!("📊 System Status");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("⚙️  Product: {} | Mode: {}", config.exchange.product_code, if config.policy.live { "LIVE" } else { "DRY RUN" });
    info!(
        "📐 Grid: {} levels ¥{} - ¥{} step ¥{} ({:?})",
        grid.levels().len(),
        grid.min(),
        grid.max(),
        grid.interval(),
        config.policy.level_policy
    );
    info!(
        "📦 Bracket: BUY {} / SELL {} | fee {} | lookback {} step(s)",
        config.orders.buy_size, config.orders.sell_size, config.orders.fee_rate, config.policy.stale_lookback_steps
    );
    info!("🔑 API keys: {}", if config.has_api_keys() { "configured" } else { "missing" });

    let ledger = open_ledger(config)?;
    if ledger.database().health_check()? {
        info!("💾 Database: {}", config.ledger.db_path);
    }
    show_reservations(&ledger)?;

    let history = TickRecord::recent(ledger.database(), config.ledger.history_limit)?;
    info!("🕒 Recent ticks ({})", history.len());
    for record in &history {
        info!(
            "   {} | {} | price {} | level {} | {} | canceled {} | errors {}",
            record.started_at,
            if record.live { "live" } else { "dry" },
            record.market_price.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
            record.target_level.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string()),
            record.placement,
            record.canceled,
            record.errors
        );
    }

    if live {
        show_exchange_state(config, &grid).await?;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    Ok(())
}

async fn show_exchange_state(config: &Config, grid: &Grid) -> TradingResult<()> {
    let health = PreFlightValidator::new(config.clone()).check_exchange_health().await;
    info!("🌐 {}: {}", health.name, health.message);

    let client = BitflyerClient::new(config)?;
    let price = client.get_ltp().await?;
    match grid.select(price, config.policy.level_policy)? {
        Some(level) if grid.contains_price(price) => info!("💰 LTP ¥{} -> level ¥{}", price, level),
        _ => info!("💰 LTP ¥{} (outside the grid)", price),
    }

    if !config.has_api_keys() {
        warn!("⚠️  API keys missing, skipping private endpoints");
        return Ok(());
    }

    let balance = client.get_balance(&config.exchange.quote_currency).await?;
    let fee = config.orders.fee_rate;
    info!(
        "💴 Available {}: ¥{} (max size {} BTC)",
        config.exchange.quote_currency,
        balance,
        max_affordable_size(price, balance, fee).round_dp(8)
    );
    if !meets_min_order(price, balance, fee, config.orders.min_order_size) {
        warn!("⚠️  Balance does not cover the minimum order of {} BTC", config.orders.min_order_size);
    }

    let brackets = client.list_active_brackets().await?;
    info!("📋 Active brackets ({})", brackets.len());
    for bracket in &brackets {
        info!(
            "   {} BUY {} @ ¥{} -> SELL {} @ ¥{}",
            bracket.id, bracket.buy_size, bracket.buy_price, bracket.sell_size, bracket.sell_price
        );
    }

    let sells = client.list_resting_limit_orders(Side::Sell).await?;
    info!("📋 Resting SELL orders: {}", sells.len());

    let snapshot = OrderSnapshot::new(brackets, sells);
    let occupied = snapshot.occupied_levels(grid.interval(), config.policy.occupancy_rule);
    info!("📌 Occupied levels ({:?}): {:?}", config.policy.occupancy_rule, occupied);
    let duplicates = snapshot.duplicate_levels();
    if !duplicates.is_empty() {
        warn!("⚠️  Multiple brackets share levels: {:?}", duplicates);
    }
    Ok(())
}

fn show_reservations(ledger: &SqliteLedger) -> TradingResult<()> {
    let reserved = ledger.read_reserved()?;
    let reservations = ledger.reservations()?;
    info!("🧾 Reserved: ¥{} across {} bracket(s)", reserved, reservations.len());
    for r in &reservations {
        info!("   {} @ ¥{}: ¥{} (since {})", r.bracket_id, r.level, r.amount, r.created_at);
    }

    let sum: Decimal = reservations.iter().map(|r| r.amount).sum();
    if sum != reserved {
        warn!("⚠️  Total ¥{} differs from reservation sum ¥{}", reserved, sum);
    }
    Ok(())
}

pub fn show_ledger(config: &Config) -> TradingResult<()> {
    let ledger = open_ledger(config)?;
    show_reservations(&ledger)
}

pub fn reset_ledger(config: &Config, yes: bool) -> TradingResult<()> {
    if !yes {
        warn!("⚠️  This forgets every reservation. Re-run with --yes to confirm.");
        return Ok(());
    }
    let ledger = open_ledger(config)?;
    ledger.reset()?;
    info!("✅ Ledger reset to ¥0");
    Ok(())
}

pub fn set_ledger(config: &Config, amount: Decimal) -> TradingResult<()> {
    let ledger = open_ledger(config)?;
    let previous = ledger.read_reserved()?;
    ledger.write_reserved(amount)?;
    info!("✅ Ledger total ¥{} -> ¥{}", previous, amount);
    Ok(())
}
