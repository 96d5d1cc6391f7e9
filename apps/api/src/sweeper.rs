use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use appointment_cell::ReservationService;
use shared_config::AppConfig;

/// Periodically expires reservations past their TTL, returning the held quantity to the lots.
pub async fn run_reservation_sweeper(config: Arc<AppConfig>) {
    let period = Duration::from_secs(config.reservation_sweep_interval_secs);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Reservation sweeper running every {:?}", period);

    loop {
        ticker.tick().await;

        let service = ReservationService::new(&config);
        match service.expire_stale(&config.supabase_service_role_key).await {
            Ok(0) => {}
            Ok(expired) => info!("Expired {} stale reservations", expired),
            Err(e) => error!("Reservation sweep failed: {}", e),
        }
    }
}
