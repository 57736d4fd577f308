//! Postgres persistence for the PDT core.
//!
//! Everything here is best-effort from the allocator's point of view: the
//! in-process ledger is authoritative for the session, the database is a
//! mirror used for audit and for seeding the ledger at boot.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use elp_pdt::TradeRecord;
use elp_schemas::{AllocationDecision, HoldPeriod, Signal, TradeId};
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

mod journal;

pub use journal::PgJournal;

pub const ENV_DB_URL: &str = "ELP_DATABASE_URL";

/// Connect to Postgres using `ELP_DATABASE_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_day_trades_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='day_trades'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_day_trades_table: exists,
    })
}

/// Insert an inbound signal. Re-inserting the same signal id is a no-op.
pub async fn insert_signal(pool: &PgPool, signal: &Signal) -> Result<()> {
    let metadata = serde_json::to_value(&signal.metadata).context("serialize signal metadata")?;
    sqlx::query(
        r#"
        insert into signals (
          signal_id, strategy, symbol, action, confidence, estimated_profit,
          is_day_trade, emitted_at, metadata
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        on conflict (signal_id) do nothing
        "#,
    )
    .bind(signal.signal_id)
    .bind(&signal.strategy)
    .bind(&signal.symbol)
    .bind(signal.action.as_str())
    .bind(signal.confidence)
    .bind(signal.estimated_profit)
    .bind(signal.is_day_trade)
    .bind(signal.emitted_at)
    .bind(metadata)
    .execute(pool)
    .await
    .context("insert_signal failed")?;
    Ok(())
}

/// Append one allocation decision. Returns the row id.
pub async fn insert_decision(
    pool: &PgPool,
    decision: &AllocationDecision,
    hold_period: HoldPeriod,
) -> Result<i64> {
    let req = &decision.request;
    let (id,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        insert into allocation_decisions (
          request_id, strategy_id, symbol, outcome, hold_period, reason,
          confidence, estimated_profit, historical_success_rate, emergency,
          submitted_at, decided_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
        )
        returning decision_id
        "#,
    )
    .bind(req.request_id)
    .bind(&req.strategy_id)
    .bind(&req.symbol)
    .bind(decision.outcome.as_str())
    .bind(hold_period.as_str())
    .bind(&decision.reason)
    .bind(req.confidence)
    .bind(req.estimated_profit)
    .bind(req.historical_success_rate)
    .bind(req.emergency)
    .bind(req.submitted_at)
    .bind(decision.decided_at)
    .fetch_one(pool)
    .await
    .context("insert_decision failed")?;
    Ok(id)
}

/// Record a granted day-trade slot. A re-grant of a released trade reopens it.
pub async fn upsert_day_trade(pool: &PgPool, trade: &TradeRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into day_trades (trade_id, strategy_id, symbol, executed_at)
        values ($1, $2, $3, $4)
        on conflict (trade_id) do update
          set released_at = null
        "#,
    )
    .bind(trade.trade_id.0)
    .bind(&trade.strategy_id)
    .bind(&trade.symbol)
    .bind(trade.executed_at)
    .execute(pool)
    .await
    .context("upsert_day_trade failed")?;
    Ok(())
}

/// Mark a day trade released. Returns `false` if it was unknown or already released.
pub async fn release_day_trade(
    pool: &PgPool,
    trade_id: TradeId,
    released_at: DateTime<Utc>,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update day_trades
           set released_at = $2
         where trade_id = $1
           and released_at is null
        "#,
    )
    .bind(trade_id.0)
    .bind(released_at)
    .execute(pool)
    .await
    .context("release_day_trade failed")?;
    Ok(res.rows_affected() == 1)
}

/// Unreleased day trades executed at or after `since`, oldest first.
pub async fn load_day_trades_since(pool: &PgPool, since: DateTime<Utc>) -> Result<Vec<TradeRecord>> {
    let rows: Vec<(Uuid, String, String, DateTime<Utc>)> = sqlx::query_as(
        r#"
        select trade_id, strategy_id, symbol, executed_at
          from day_trades
         where executed_at >= $1
           and released_at is null
         order by executed_at asc
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await
    .context("load_day_trades_since failed")?;

    Ok(rows
        .into_iter()
        .map(|(trade_id, strategy_id, symbol, executed_at)| TradeRecord {
            trade_id: TradeId(trade_id),
            strategy_id,
            symbol,
            executed_at,
        })
        .collect())
}
