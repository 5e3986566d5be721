//! Start and stop of the engine loops

use super::{dispatch, status, FlightBridge};
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;
use tracing::info;

/// Tasks owned by a running engine
pub(super) struct LoopHandles {
    control: JoinHandle<()>,
    status: JoinHandle<()>,
}

impl FlightBridge {
    /// Start the control and status loops.
    ///
    /// Returns false if they were already running.
    pub async fn start(&self) -> bool {
        let mut loops = self.loops.lock().await;
        if loops.is_some() {
            return false;
        }

        let settings = &self.core.settings;
        info!(
            control_period_ms = settings.control_period.as_millis() as u64,
            status_period_ms = settings.status_period.as_millis() as u64,
            "Starting flight bridge"
        );

        self.core.controls.reset().await;
        self.core.running.store(true, Ordering::SeqCst);
        *loops = Some(LoopHandles {
            control: tokio::spawn(dispatch::run_control_loop(self.core.clone())),
            status: tokio::spawn(status::run_status_loop(self.core.clone())),
        });
        true
    }

    /// Stop both loops and zero the controls.
    ///
    /// Device calls already in flight are left to complete. Returns false if
    /// the loops were not running.
    pub async fn stop(&self) -> bool {
        let Some(handles) = self.loops.lock().await.take() else {
            return false;
        };
        // Control writers check this flag under the control lock, so nothing
        // lands after the reset below
        self.core.running.store(false, Ordering::SeqCst);

        handles.control.abort();
        handles.status.abort();
        // Cancelled loops only ever finish with a JoinError
        let _ = futures::future::join_all([handles.control, handles.status]).await;

        self.core.controls.reset().await;
        info!("Flight bridge stopped");
        true
    }
}
