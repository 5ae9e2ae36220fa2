//! Periodic maintenance: expires rooms and purges stale revocations.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::auth::TokenService;
use crate::rooms::RoomRegistry;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub rooms_deactivated: usize,
    pub revocations_removed: usize,
}

/// Runs one sweep. Failures are logged and the other half still runs.
pub fn sweep_once(rooms: &RoomRegistry, tokens: &TokenService) -> SweepReport {
    let mut report = SweepReport::default();

    match rooms.cleanup_expired_rooms() {
        Ok(count) => report.rooms_deactivated = count,
        Err(e) => tracing::error!(error = %e, "room expiry sweep failed"),
    }
    match tokens.sweep_expired_revocations() {
        Ok(count) => report.revocations_removed = count,
        Err(e) => tracing::error!(error = %e, "revocation sweep failed"),
    }

    tracing::debug!(?report, "sweep finished");
    report
}

/// Spawns the sweeper on the current runtime.
pub fn spawn(
    rooms: Arc<RoomRegistry>,
    tokens: Arc<TokenService>,
    every: Duration,
) -> JoinHandle<()> {
    tracing::info!("starting sweeper (interval: {:?})", every);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            sweep_once(&rooms, &tokens);
        }
    })
}
