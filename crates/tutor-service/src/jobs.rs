//! Background maintenance.
//!
//! One periodic task runs the chat reconciliation pass and the completion
//! sweep. Both are blocking `RocksDB` work, so each round runs on the
//! blocking pool.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;

use tutor_core::ReconcileReport;
use tutor_store::{RocksStore, Store};

/// What one maintenance round did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Reconciliation counts, if the pass ran.
    pub reconcile: Option<ReconcileReport>,
    /// Bookings completed by the sweep, if it ran.
    pub completed: Option<usize>,
}

/// Run one round synchronously. Errors are logged, never propagated, so
/// one failing step does not stop the other.
pub fn run_maintenance_round(store: &RocksStore) -> MaintenanceReport {
    let mut report = MaintenanceReport::default();

    match store.reconcile_chat_rooms() {
        Ok(r) => report.reconcile = Some(r),
        Err(e) => tracing::error!(error = %e, "Chat reconciliation failed"),
    }

    match store.complete_finished_bookings(Utc::now()) {
        Ok(n) => report.completed = Some(n),
        Err(e) => tracing::error!(error = %e, "Completion sweep failed"),
    }

    report
}

/// Spawn the periodic maintenance task. The first round runs immediately.
pub fn spawn_maintenance(store: Arc<RocksStore>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || run_maintenance_round(&store)).await {
                Ok(report) => tracing::debug!(
                    created = report.reconcile.map(|r| r.created),
                    completed = report.completed,
                    "Maintenance round finished"
                ),
                Err(e) => tracing::error!(error = %e, "Maintenance round panicked"),
            }
        }
    })
}
