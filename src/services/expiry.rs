use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::services::bookings;
use crate::state::AppState;

/// Background sweep that moves overdue active bookings to `expired`. Each
/// run is idempotent, so a missed or doubled tick is harmless.
pub fn spawn_expiry_worker(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_secs(state.config.expiry_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let now = Utc::now().naive_utc();
            let result = {
                let mut db = state.db.lock().unwrap();
                bookings::expire_due(&mut db, &now)
            };
            match result {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "expired overdue bookings"),
                Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
            }
        }
    })
}
