// Tick command implementation
use tracing::{error, info, warn};
use ifd_grid_bot::{
    BitflyerClient, Config, Controller, Database, PlacementOutcome, PreFlightValidator,
    SqliteLedger, TickRecord, TickReport, TradingError, TradingResult,
};

pub async fn run_tick(mut config: Config, dry_run: bool) -> TradingResult<TickReport> {
    if dry_run {
        config.policy.live = false;
    }

    if config.policy.live {
        info!("🚀 LIVE mode");
        warn!("⚠️  Real orders will be submitted!");
    } else {
        info!("🧪 DRY RUN mode (no orders placed or canceled)");
    }

    let validation = PreFlightValidator::new(config.clone()).validate_for_tick(config.policy.live);
    validation.display();
    if !validation.passed {
        return Err(TradingError::ValidationFailed(format!(
            "{} critical check(s) failed",
            validation.critical_failures().len()
        )));
    }

    let db = Database::new(&config.ledger.db_path)?;
    let ledger = SqliteLedger::new(db.clone())?;
    let client = BitflyerClient::new(&config)?;
    let controller = Controller::from_config(&config, client, ledger)?;

    let report = controller.tick().await;

    if let Err(e) = TickRecord::from_report(&report).insert(&db) {
        // History is informational; the tick outcome stands
        error!("❌ Failed to record tick history: {}", e);
    }

    match &report.placement {
        PlacementOutcome::Placed { bracket_id, level, reserved } => {
            info!("📝 Bracket {} at ¥{} (reserved ¥{})", bracket_id, level, reserved);
        }
        PlacementOutcome::Failed(e) => {
            error!("{}", e.user_message());
            if e.is_retryable() {
                warn!("🔁 Transient failure, the next scheduled tick will retry");
            }
        }
        _ => {}
    }
    for failure in &report.errors {
        error!("{}", failure.user_message());
    }

    Ok(report)
}
