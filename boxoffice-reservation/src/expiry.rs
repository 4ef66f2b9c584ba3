use boxoffice_core::{CoreError, CoreResult};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::manager::ReservationManager;

/// Cancels pending reservations nobody confirmed within the hold window,
/// returning their tickets to sale.
#[derive(Clone)]
pub struct HoldExpiry {
    manager: ReservationManager,
    hold: Duration,
    batch_size: usize,
}

impl HoldExpiry {
    pub fn new(manager: ReservationManager, hold: Duration, batch_size: usize) -> Self {
        Self {
            manager,
            hold,
            batch_size,
        }
    }

    pub fn hold(&self) -> Duration {
        self.hold
    }

    /// One pass over stale holds. Each cancellation is its own unit of work,
    /// so a hold confirmed or canceled in the meantime is simply skipped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> CoreResult<usize> {
        let Some(cutoff) = now.checked_sub_signed(self.hold) else {
            debug!(%now, "Hold window reaches before the calendar, nothing to expire");
            return Ok(0);
        };
        let stale = self.manager.pending_before(cutoff, self.batch_size).await?;

        let mut expired = 0;
        for id in stale {
            match self.manager.cancel_reservation(None, id).await {
                Ok(Some(_)) => expired += 1,
                Ok(None) => {}
                Err(err @ (CoreError::InvalidTransition { .. } | CoreError::Conflict(_))) => {
                    debug!(reservation_id = %id, reason = %err, "Skipping hold");
                }
                Err(err) => return Err(err),
            }
        }

        if expired > 0 {
            info!(expired, %cutoff, "Expired stale holds");
        }
        Ok(expired)
    }
}
