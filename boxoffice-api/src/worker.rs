use std::time::Duration;

use boxoffice_reservation::HoldExpiry;
use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Periodically cancels holds older than the configured hold window.
pub async fn start_expiry_worker(expiry: HoldExpiry, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        hold_seconds = expiry.hold().num_seconds(),
        interval_seconds = every.as_secs(),
        "Hold expiry worker started"
    );

    loop {
        ticker.tick().await;
        if let Err(e) = expiry.sweep(Utc::now()).await {
            error!("Hold expiry sweep failed: {}", e);
        }
    }
}
