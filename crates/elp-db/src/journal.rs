use chrono::Utc;
use elp_router::{DecisionJournal, JournalEntry};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// [`DecisionJournal`] backed by Postgres.
///
/// `record` only pushes onto an unbounded channel; a spawned task drains it
/// in order and writes each entry. Write failures are logged and dropped.
/// Nothing here can delay or undo a budget decision.
#[derive(Debug, Clone)]
pub struct PgJournal {
    tx: mpsc::UnboundedSender<JournalEntry>,
}

impl PgJournal {
    /// Start the writer task. Must be called inside a tokio runtime.
    ///
    /// The task ends once every `PgJournal` clone is dropped and the
    /// backlog is written.
    pub fn spawn(pool: PgPool) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(writer(pool, rx));
        (Self { tx }, handle)
    }
}

impl DecisionJournal for PgJournal {
    fn record(&self, entry: JournalEntry) {
        if self.tx.send(entry).is_err() {
            warn!("journal writer has stopped; entry dropped");
        }
    }
}

async fn writer(pool: PgPool, mut rx: mpsc::UnboundedReceiver<JournalEntry>) {
    let mut written: u64 = 0;
    while let Some(entry) = rx.recv().await {
        let res = match &entry {
            JournalEntry::Signal(signal) => crate::insert_signal(&pool, signal).await,
            JournalEntry::Decision {
                decision,
                hold_period,
            } => crate::insert_decision(&pool, decision, *hold_period)
                .await
                .map(|_| ()),
            JournalEntry::DayTradeGranted(trade) => crate::upsert_day_trade(&pool, trade).await,
            JournalEntry::DayTradeReleased(trade_id) => {
                crate::release_day_trade(&pool, *trade_id, Utc::now())
                    .await
                    .map(|_| ())
            }
        };
        match res {
            Ok(()) => written += 1,
            Err(e) => warn!(error = %format!("{e:#}"), "journal write failed; continuing"),
        }
    }
    debug!(written, "journal writer drained");
}
