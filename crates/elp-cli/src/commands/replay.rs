use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use elp_config::EngineConfig;
use elp_pdt::{calendar, Clock, ManualClock, MemoryStore};
use elp_router::{
    DecisionJournal, ExecutionSink, NullJournal, OutboundOrder, SinkResult, TradeRouter,
};
use elp_schemas::{AllocationDecision, Signal};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::wiring;

/// Execution stand-in: logs what would have been sent.
struct LoggingSink;

impl ExecutionSink for LoggingSink {
    fn submit(&self, order: OutboundOrder) -> SinkResult {
        info!(
            signal_id = %order.signal.signal_id,
            strategy = %order.signal.strategy,
            symbol = %order.signal.symbol,
            action = order.signal.action.as_str(),
            hold_period = order.hold_period.as_str(),
            outcome = order.decision.outcome.as_str(),
            "order dispatched"
        );
        Ok(())
    }
}

/// `elp replay`
///
/// Time is driven by the signals: before each one the clock moves to its
/// `emitted_at` (never backwards) and the router gets a tick, so week
/// rollovers inside the file expire queued requests as they would live.
pub async fn run(config_paths: &[String], signals_path: &str, journal: bool) -> Result<()> {
    let (loaded, cfg) = wiring::load_engine_config(config_paths)?;

    let raw = fs::read_to_string(signals_path)
        .with_context(|| format!("read signals file failed: {signals_path}"))?;
    let signals: Vec<Signal> =
        serde_json::from_str(&raw).context("signals file must hold a JSON array of signals")?;

    let start = signals
        .iter()
        .map(|s| s.emitted_at)
        .min()
        .unwrap_or_else(Utc::now);
    let clock = Arc::new(ManualClock::new(start));

    let (store, journal, writer) = if journal {
        open_journal(&cfg, clock.as_ref()).await?
    } else {
        let journal: Arc<dyn DecisionJournal> = Arc::new(NullJournal);
        (MemoryStore::new(), journal, None)
    };

    let allocator = wiring::build_allocator(&cfg, Arc::new(store), clock.clone());
    let router = TradeRouter::new(allocator, wiring::router_profiles(&cfg), Arc::new(LoggingSink))
        .with_journal(journal);

    info!(config_hash = %loaded.config_hash, signals = signals.len(), "replay started");

    for signal in signals {
        if signal.emitted_at > clock.now() {
            clock.set(signal.emitted_at);
        }
        for d in router.on_tick() {
            print_decision(&d)?;
        }
        match router.handle_signal(signal) {
            Ok(d) => print_decision(&d)?,
            Err(e) => warn!(error = %e, "signal skipped"),
        }
    }
    for d in router.on_tick() {
        print_decision(&d)?;
    }

    let status = router.allocator().tracker().status();
    info!(
        week_start = %status.week_start,
        trades_used = status.trades_used,
        pending = router.allocator().pending_len(),
        "replay finished"
    );

    // Last journal handle goes with the router; the writer then drains and exits.
    drop(router);
    if let Some(handle) = writer {
        handle.await.context("journal writer task failed")?;
    }
    Ok(())
}

async fn open_journal(
    cfg: &EngineConfig,
    clock: &dyn Clock,
) -> Result<(MemoryStore, Arc<dyn DecisionJournal>, Option<JoinHandle<()>>)> {
    let url = elp_config::resolve_database_url(cfg)?;
    let pool = elp_db::connect(&url).await?;

    let tz = cfg.pdt.reference_tz;
    let since = calendar::week_start_instant(calendar::week_start_for(clock.now(), tz), tz);
    let seeded = elp_db::load_day_trades_since(&pool, since)
        .await
        .context("seed day-trade ledger")?;
    info!(count = seeded.len(), "ledger seeded from database");

    let (journal, handle) = elp_db::PgJournal::spawn(pool);
    Ok((MemoryStore::seeded(seeded), Arc::new(journal), Some(handle)))
}

fn print_decision(d: &AllocationDecision) -> Result<()> {
    println!("{}", serde_json::to_string(d).context("serialize decision")?);
    Ok(())
}
