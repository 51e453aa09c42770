//! Credit ledger: atomic debit-on-use over the users table.
//!
//! Reservation is the debit itself — a single conditional UPDATE at the
//! storage layer, never read-then-write — so concurrent turns for the same
//! user can never double-spend, even across server processes.

use crate::services::database::Database;
use crate::services::metrics::CREDITS_MOVED;
use service_core::error::AppError;
use tracing::instrument;

/// Handle for credit already debited for an in-flight turn.
///
/// Consumed by exactly one of [`CreditLedger::commit`] or
/// [`CreditLedger::refund`]. `amount` is zero for premium users, whose turns
/// pass the check without being debited.
#[derive(Debug)]
pub struct Reservation {
    user_id: String,
    amount: i64,
}

#[derive(Clone)]
pub struct CreditLedger {
    db: Database,
}

impl CreditLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Reserve `cost` credits for a turn.
    ///
    /// Fails with `PaymentRequired` when the balance does not cover the cost
    /// and the user is not premium. The debit is durable before this
    /// returns; the upstream model is never invoked on an unpaid turn.
    #[instrument(skip(self), fields(user_id = %user_id, cost = cost))]
    pub async fn check_and_reserve(
        &self,
        user_id: &str,
        cost: i64,
    ) -> Result<Reservation, AppError> {
        match self.db.debit_credits_if_sufficient(user_id, cost).await? {
            Some(is_premium) => {
                let amount = if is_premium { 0 } else { cost };
                CREDITS_MOVED
                    .with_label_values(&["reserved"])
                    .inc_by(amount as f64);
                Ok(Reservation {
                    user_id: user_id.to_string(),
                    amount,
                })
            }
            None => {
                // The conditional UPDATE matched nothing: either the user is
                // unknown or the balance was short.
                match self.db.find_user(user_id).await? {
                    Some(_) => Err(AppError::PaymentRequired(anyhow::anyhow!(
                        "Insufficient credits. Please upgrade your plan to continue."
                    ))),
                    None => Err(AppError::NotFound(anyhow::anyhow!(
                        "User '{}' not found",
                        user_id
                    ))),
                }
            }
        }
    }

    /// Confirm a reservation. The debit was already applied at reserve time,
    /// so this only consumes the handle; kept for symmetry with `refund`.
    pub fn commit(&self, reservation: Reservation) {
        tracing::debug!(
            user_id = %reservation.user_id,
            amount = reservation.amount,
            "Reservation committed"
        );
    }

    /// Restore a reserved amount after a turn that produced no output.
    #[instrument(skip(self, reservation), fields(user_id = %reservation.user_id, amount = reservation.amount))]
    pub async fn refund(&self, reservation: Reservation) -> Result<(), AppError> {
        if reservation.amount == 0 {
            return Ok(());
        }

        self.db
            .add_credits(&reservation.user_id, reservation.amount)
            .await?;

        CREDITS_MOVED
            .with_label_values(&["refunded"])
            .inc_by(reservation.amount as f64);

        tracing::info!(
            user_id = %reservation.user_id,
            amount = reservation.amount,
            "Reservation refunded"
        );

        Ok(())
    }

    /// Current credit balance.
    pub async fn get_balance(&self, user_id: &str) -> Result<i64, AppError> {
        let user = self
            .db
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User '{}' not found", user_id)))?;
        Ok(user.credits)
    }

    /// Premium entitlement flag.
    pub async fn is_premium(&self, user_id: &str) -> Result<bool, AppError> {
        let user = self
            .db
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User '{}' not found", user_id)))?;
        Ok(user.is_premium)
    }
}
