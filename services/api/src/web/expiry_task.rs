//! services/api/src/web/expiry_task.rs
//!
//! The background observer that closes sessions whose window has passed, so
//! absences are written even when no instructor view is open.

use attendance_core::AttendanceEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs `SessionManager::tick` every `period` until `shutdown` is cancelled.
pub fn spawn_expiry_watcher(
    engine: Arc<AttendanceEngine>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(period_ms = period.as_millis() as u64, "Expiry watcher started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }
            match engine.sessions.tick().await {
                Ok(report) => {
                    for (session_id, result) in &report.finalized {
                        info!(
                            %session_id,
                            present = result.present_count,
                            absent = result.absent_count,
                            "Expired session finalized"
                        );
                    }
                    if !report.failed.is_empty() {
                        warn!(failed = report.failed.len(), "Some sessions will be retried on the next tick");
                    }
                }
                Err(e) if e.is_retryable() => warn!(error = %e, "Expiry sweep skipped"),
                Err(e) => error!(error = %e, "Expiry sweep failed"),
            }
        }
        info!("Expiry watcher stopped");
    })
}
