use std::sync::Arc;

use anyhow::{Context, Result};
use elp_pdt::{MemoryStore, PdtPolicy, PdtTracker, SystemClock};
use tracing::info;

use crate::wiring;

/// `elp pdt status`
pub async fn status(config_paths: &[String], from_db: bool) -> Result<()> {
    let (loaded, cfg) = wiring::load_engine_config(config_paths)?;
    let policy = wiring::pdt_policy(&cfg.pdt);

    let store = if from_db {
        let url = elp_config::resolve_database_url(&cfg)?;
        let pool = elp_db::connect(&url).await?;
        let since = week_start_utc(&policy);
        let trades = elp_db::load_day_trades_since(&pool, since)
            .await
            .context("seed day-trade ledger")?;
        info!(count = trades.len(), since = %since, "ledger seeded from database");
        MemoryStore::seeded(trades)
    } else {
        MemoryStore::new()
    };

    let tracker = PdtTracker::new(policy, Arc::new(store), Arc::new(SystemClock));
    let s = tracker.status();

    println!("config_hash={}", loaded.config_hash);
    println!("week_start={}", s.week_start);
    println!("cap={}", s.cap);
    println!("trades_used={}", s.trades_used);
    println!("trades_remaining={}", s.trades_remaining);
    println!("can_trade={}", s.can_trade);
    println!("degraded={}", s.degraded);
    Ok(())
}

fn week_start_utc(policy: &PdtPolicy) -> chrono::DateTime<chrono::Utc> {
    let monday = elp_pdt::calendar::week_start_for(chrono::Utc::now(), policy.reference_tz);
    elp_pdt::calendar::week_start_instant(monday, policy.reference_tz)
}
