//! Command endpoints
//!
//! Each handler answers as soon as the device action is issued. Only `stop`
//! waits for the vehicle, because it must leave virtual-stick mode before
//! replying.

use super::{BridgeCore, BridgeError};
use bridge_shared::topics;
use std::fmt;
use tracing::{info, warn};

/// Commands exposed as request/response services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightCommand {
    Takeoff,
    Land,
    RotateCw,
    RotateCcw,
    Stop,
}

impl FlightCommand {
    pub const ALL: [FlightCommand; 5] = [
        FlightCommand::Takeoff,
        FlightCommand::Land,
        FlightCommand::RotateCw,
        FlightCommand::RotateCcw,
        FlightCommand::Stop,
    ];

    /// Short service name, e.g. `rotate_cw`
    pub fn name(&self) -> &'static str {
        match self {
            FlightCommand::Takeoff => topics::TAKEOFF,
            FlightCommand::Land => topics::LAND,
            FlightCommand::RotateCw => topics::ROTATE_CW,
            FlightCommand::RotateCcw => topics::ROTATE_CCW,
            FlightCommand::Stop => topics::STOP,
        }
    }

    /// Full service path, e.g. `/flight_commands/rotate_cw`
    pub fn service(&self) -> String {
        topics::service(self.name())
    }

    /// Parse a short name or full service path
    pub fn from_service(service: &str) -> Option<Self> {
        let name = topics::command_name(service);
        Self::ALL.into_iter().find(|cmd| cmd.name() == name)
    }
}

impl fmt::Display for FlightCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl BridgeCore {
    pub(super) async fn takeoff(&self) -> Result<(), BridgeError> {
        self.ensure_running()?;
        let Some(device) = self.device_for("takeoff").await else {
            return Ok(());
        };
        self.guard.ensure_initialized(&device).await;

        info!("Takeoff requested");
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            match device.start_takeoff().await {
                Ok(()) => info!("Takeoff complete"),
                Err(e) => warn!(error = %e, "Takeoff failed"),
            }
            publisher.publish_done().await;

            // Cycle virtual-stick mode so the vehicle takes stick input again
            if let Err(e) = device.set_virtual_stick_mode_enabled(false).await {
                warn!(error = %e, "Failed to disable virtual stick after takeoff");
            }
            if let Err(e) = device.set_virtual_stick_mode_enabled(true).await {
                warn!(error = %e, "Failed to re-enable virtual stick after takeoff");
            }
        });
        Ok(())
    }

    pub(super) async fn land(&self) -> Result<(), BridgeError> {
        self.ensure_running()?;
        let Some(device) = self.device_for("land").await else {
            return Ok(());
        };
        self.guard.ensure_initialized(&device).await;

        info!("Landing requested");
        let publisher = self.publisher.clone();
        tokio::spawn(async move {
            match device.start_landing().await {
                Ok(()) => info!("Landing complete"),
                Err(e) => warn!(error = %e, "Landing failed"),
            }
            publisher.publish_done().await;
        });
        Ok(())
    }

    pub(super) async fn rotate_cw(&self) -> Result<(), BridgeError> {
        self.ensure_running()?;
        if let Some(device) = self.device_for("rotate_cw").await {
            self.guard.ensure_initialized(&device).await;
        }

        if self.telemetry.is_flying().await {
            let rate = self.settings.rotate_cw_yaw_rate;
            self.update_controls(|controls| controls.yaw = rate).await?;
            info!(yaw_rate = rate, "Rotating clockwise");
        } else {
            info!("Not flying, ignoring rotate_cw");
        }
        Ok(())
    }

    /// Accepted but has no action yet
    pub(super) async fn rotate_ccw(&self) -> Result<(), BridgeError> {
        self.ensure_running()?;
        warn!("rotate_ccw has no action, ignoring");
        Ok(())
    }

    pub(super) async fn stop(&self) -> Result<(), BridgeError> {
        self.ensure_running()?;
        let device = self.device_for("stop").await;
        if let Some(device) = &device {
            self.guard.ensure_initialized(device).await;
        }

        info!("Stop requested, zeroing controls");
        self.controls.reset().await;

        if let Some(device) = device {
            device.set_virtual_stick_mode_enabled(false).await?;
        }
        Ok(())
    }
}
