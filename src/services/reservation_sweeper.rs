use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use sea_orm::sea_query::{LockBehavior, LockType};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::config::AppConfig;
use crate::entities::inventory_reservation::{self, Entity as InventoryReservationEntity};
use crate::entities::ReservationStatus;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::services::inventory_reservation_service::apply_transition;
use uuid::Uuid;

const SWEEPER_ACTOR: &str = "reservation-sweeper";

/// Ticks a failed reservation sits out before it is selected again.
const FAILURE_BACKOFF_TICKS: u32 = 10;

/// Outcome of one sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SweepReport {
    /// Candidates selected for this sweep.
    pub examined: u64,
    /// Reservations moved to `EXPIRED`.
    pub expired: u64,
    /// Rows rolled back and left for the next tick.
    pub failed: u64,
    pub swept_at: DateTime<Utc>,
}

/// Releases `PENDING` reservations whose `expiration_time` has passed.
#[derive(Clone)]
pub struct ReservationSweeper {
    db_pool: Arc<DatabaseConnection>,
    event_sender: EventSender,
    interval: Duration,
    batch_size: u64,
    /// Reservations whose release failed, keyed to when they may be retried.
    backoff: Arc<Mutex<HashMap<Uuid, DateTime<Utc>>>>,
}

/// Puts candidates into the lock order shared with every other writer:
/// ascending item id, then reservation id.
fn in_lock_order(
    mut candidates: Vec<inventory_reservation::Model>,
) -> Vec<inventory_reservation::Model> {
    candidates.sort_by_key(|r| (r.inventory_item_id, r.id));
    candidates
}

impl ReservationSweeper {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        interval: Duration,
        batch_size: u64,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            interval,
            batch_size: batch_size.max(1),
            backoff: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(
        db_pool: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: &AppConfig,
    ) -> Self {
        Self::new(
            db_pool,
            event_sender,
            config.sweep_interval(),
            config.reservation_sweep_batch_size,
        )
    }

    pub async fn run_once(&self) -> Result<SweepReport, ServiceError> {
        self.run_once_at(Utc::now()).await
    }

    /// Sweeps reservations that expired before `now`.
    ///
    /// Candidates are locked in one batch transaction. Each row is released in
    /// its own savepoint, so a failing row is rolled back alone. It then sits
    /// out `FAILURE_BACKOFF_TICKS` intervals so it cannot starve later
    /// expirations out of the batch.
    #[instrument(skip(self))]
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<SweepReport, ServiceError> {
        let db = &*self.db_pool;
        let mut backoff = self.backoff.lock().await;
        backoff.retain(|_, retry_at| *retry_at > now);
        let skipped: Vec<Uuid> = backoff.keys().copied().collect();

        let txn = db.begin().await.map_err(ServiceError::db_error)?;

        let mut query = InventoryReservationEntity::find()
            .filter(inventory_reservation::Column::Status.eq(ReservationStatus::Pending))
            .filter(inventory_reservation::Column::ExpirationTime.lt(now));
        if !skipped.is_empty() {
            query = query.filter(inventory_reservation::Column::Id.is_not_in(skipped));
        }
        let mut query = query
            .order_by_asc(inventory_reservation::Column::ExpirationTime)
            .limit(self.batch_size);
        if db.get_database_backend() == DbBackend::Postgres {
            query = query.lock_with_behavior(LockType::Update, LockBehavior::SkipLocked);
        }

        let candidates = in_lock_order(query.all(&txn).await.map_err(ServiceError::db_error)?);
        let retry_at = now + self.failure_backoff();

        let mut report = SweepReport {
            examined: candidates.len() as u64,
            expired: 0,
            failed: 0,
            swept_at: now,
        };
        let mut events = Vec::new();

        for reservation in candidates {
            let reservation_id = reservation.id;
            let savepoint = txn.begin().await.map_err(ServiceError::db_error)?;

            match apply_transition(
                &savepoint,
                reservation,
                ReservationStatus::Expired,
                Some(SWEEPER_ACTOR.to_string()),
            )
            .await
            {
                Ok((_, row_events)) => {
                    savepoint.commit().await.map_err(ServiceError::db_error)?;
                    report.expired += 1;
                    events.extend(row_events);
                }
                Err(e) => {
                    warn!(%reservation_id, error = %e, "failed to expire reservation; will retry");
                    savepoint.rollback().await.map_err(ServiceError::db_error)?;
                    backoff.insert(reservation_id, retry_at);
                    report.failed += 1;
                }
            }
        }

        txn.commit().await.map_err(ServiceError::db_error)?;
        drop(backoff);

        counter!("inventory_ledger.reservations.expired", report.expired);
        if report.failed > 0 {
            counter!("inventory_ledger.sweeper.row_failures", report.failed);
        }
        gauge!("inventory_ledger.sweeper.last_examined", report.examined as f64);

        if report.examined > 0 {
            info!(
                examined = report.examined,
                expired = report.expired,
                failed = report.failed,
                "reservation sweep finished"
            );
        }

        self.event_sender.publish_all(events).await;
        Ok(report)
    }

    fn failure_backoff(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.interval * FAILURE_BACKOFF_TICKS)
            .unwrap_or_else(|_| chrono::Duration::hours(1))
    }

    /// Runs the sweep on a fixed interval until `shutdown` flips to `true`.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?self.interval, batch_size = self.batch_size, "reservation sweeper started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "reservation sweep failed; retrying next tick");
                            counter!("inventory_ledger.sweeper.failures", 1);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("reservation sweeper stopped");
        })
    }
}
