//! One-time vehicle mode configuration
//!
//! The first caller claims the guard and issues the configuration sequence
//! on a spawned task; every caller, the first included, waits until that
//! sequence has been issued. Failed calls are logged and not retried: the
//! guard still counts as initialized afterwards.

use crate::device::{
    Aircraft, CoordinateSystem, DeviceResult, OrientationMode, RollPitchControlMode,
    VerticalControlMode, YawControlMode,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub struct InitGuard {
    claimed: AtomicBool,
    done: Arc<watch::Sender<bool>>,
}

impl Default for InitGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl InitGuard {
    pub fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            claimed: AtomicBool::new(false),
            done: Arc::new(done),
        }
    }

    /// Whether the configuration sequence has been issued
    pub fn is_initialized(&self) -> bool {
        *self.done.borrow()
    }

    /// Configure `device` unless some earlier call already did
    ///
    /// Safe to call concurrently. The sequence runs on its own task, so a
    /// caller that is cancelled mid-wait cannot leave it half-issued.
    pub async fn ensure_initialized(&self, device: &Arc<dyn Aircraft>) {
        if self.is_initialized() {
            return;
        }

        if !self.claimed.swap(true, Ordering::SeqCst) {
            let device = device.clone();
            let done = self.done.clone();
            tokio::spawn(async move {
                // Inner task so a panicking device cannot leave waiters hanging
                let outcome = tokio::spawn(async move { configure(device.as_ref()).await }).await;
                match outcome {
                    Ok(0) => info!("Vehicle configured for virtual-stick control"),
                    Ok(failures) => warn!(failures, "Vehicle configured with failures, not retrying"),
                    Err(e) => warn!(error = %e, "Vehicle configuration aborted, not retrying"),
                }
                done.send_replace(true);
            });
        }

        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|initialized| *initialized).await;
    }
}

/// Issue the configuration sequence, returning how many calls failed
async fn configure(device: &dyn Aircraft) -> usize {
    let steps: [(&str, DeviceResult); 9] = [
        ("virtual stick", device.set_virtual_stick_mode_enabled(true).await),
        ("novice mode", device.set_novice_mode_enabled(false).await),
        (
            "yaw control",
            device
                .set_yaw_control_mode(YawControlMode::AngularVelocity)
                .await,
        ),
        (
            "vertical control",
            device
                .set_vertical_control_mode(VerticalControlMode::Velocity)
                .await,
        ),
        (
            "roll/pitch control",
            device
                .set_roll_pitch_control_mode(RollPitchControlMode::Velocity)
                .await,
        ),
        (
            "coordinate system",
            device
                .set_roll_pitch_coordinate_system(CoordinateSystem::Body)
                .await,
        ),
        (
            "collision avoidance",
            device.set_collision_avoidance_enabled(false).await,
        ),
        (
            "obstacle avoidance",
            device.set_active_obstacle_avoidance_enabled(false).await,
        ),
        (
            "orientation",
            device
                .set_flight_orientation_mode(OrientationMode::AircraftHeading)
                .await,
        ),
    ];

    let mut failures = 0;
    for (step, result) in steps {
        if let Err(e) = result {
            warn!(step, error = %e, "Vehicle configuration call failed");
            failures += 1;
        }
    }
    failures
}
