//! Expires payments that stayed `pending` past the configured timeout.
//!
//! Abandoned provider checkouts never call back, so without this sweep their
//! reserved stock and pending memberships would be held forever.

use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    dto::payments::CleanupReport,
    entity::payments::{Column as PaymentCol, Entity as Payments},
    enums::PaymentStatus,
    error::{AppError, AppResult},
    services::payment_service::{self, Outcome},
    state::AppState,
};

pub const TIMEOUT_REASON: &str = "payment timed out";

const BATCH_SIZE: u64 = 200;

/// Fails every pending payment created before the cutoff.
pub async fn run_once(state: &AppState) -> AppResult<CleanupReport> {
    let timeout = chrono::Duration::from_std(state.config.payments.pending_timeout)
        .map_err(|err| AppError::Internal(err.into()))?;
    let cutoff = Utc::now() - timeout;

    let stale: Vec<Uuid> = Payments::find()
        .select_only()
        .column(PaymentCol::Id)
        .filter(PaymentCol::Status.eq(PaymentStatus::Pending.as_str()))
        .filter(PaymentCol::CreatedAt.lt(cutoff))
        .order_by_asc(PaymentCol::CreatedAt)
        .limit(BATCH_SIZE)
        .into_tuple()
        .all(&state.orm)
        .await?;

    let mut report = CleanupReport {
        examined: stale.len(),
        ..CleanupReport::default()
    };

    for payment_id in stale {
        match payment_service::apply_outcome(state, payment_id, Outcome::Failed(TIMEOUT_REASON.into())).await {
            Ok(payment) if payment.status == PaymentStatus::Failed.as_str() => report.expired += 1,
            // settled by a webhook between the select and the lock
            Ok(_) => {}
            Err(err) => {
                report.errors += 1;
                tracing::warn!(payment_id = %payment_id, error = %err, "failed to expire payment");
            }
        }
    }

    Ok(report)
}

/// Spawns the periodic sweep. The first pass runs immediately.
pub fn spawn(state: AppState) -> JoinHandle<()> {
    let every = state.config.payments.cleanup_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            match run_once(&state).await {
                Ok(report) if report.examined > 0 => {
                    tracing::info!(
                        examined = report.examined,
                        expired = report.expired,
                        errors = report.errors,
                        "stale payments swept"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "payment cleanup failed");
                }
            }
        }
    })
}
