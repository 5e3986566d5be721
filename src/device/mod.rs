//! Vehicle abstraction
//!
//! The bridge never owns the vehicle. The application attaches the current
//! instance to a [`DeviceSlot`] and every component asks the slot for it on
//! each access, tolerating its absence.

pub mod mav;
pub mod sim;
mod types;

pub use mav::MavlinkAircraft;
pub use sim::{DeviceCall, SimulatedAircraft};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// A flight controller accepting virtual-stick input
///
/// Action methods resolve when the vehicle reports completion. Callers that
/// must not wait spawn them.
#[async_trait]
pub trait Aircraft: Send + Sync {
    /// Whether the vehicle link is currently up
    fn is_connected(&self) -> bool;

    async fn set_virtual_stick_mode_enabled(&self, enabled: bool) -> DeviceResult;
    async fn set_novice_mode_enabled(&self, enabled: bool) -> DeviceResult;
    async fn set_yaw_control_mode(&self, mode: YawControlMode) -> DeviceResult;
    async fn set_vertical_control_mode(&self, mode: VerticalControlMode) -> DeviceResult;
    async fn set_roll_pitch_control_mode(&self, mode: RollPitchControlMode) -> DeviceResult;
    async fn set_roll_pitch_coordinate_system(&self, system: CoordinateSystem) -> DeviceResult;
    async fn set_collision_avoidance_enabled(&self, enabled: bool) -> DeviceResult;
    async fn set_active_obstacle_avoidance_enabled(&self, enabled: bool) -> DeviceResult;
    async fn set_flight_orientation_mode(&self, mode: OrientationMode) -> DeviceResult;

    async fn start_takeoff(&self) -> DeviceResult;
    async fn start_landing(&self) -> DeviceResult;
    async fn confirm_landing(&self) -> DeviceResult;

    /// Send one virtual-stick frame
    async fn send_control_data(&self, frame: ControlFrame) -> DeviceResult;

    /// Register for battery updates, replacing any previous registration
    async fn subscribe_battery(&self) -> mpsc::UnboundedReceiver<BatteryEvent>;

    /// Register for flight-state updates, replacing any previous registration
    async fn subscribe_flight_state(&self) -> mpsc::UnboundedReceiver<FlightStateEvent>;
}

/// Source of the current vehicle instance
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// The current instance, or `None` while no vehicle is attached
    async fn current(&self) -> Option<Arc<dyn Aircraft>>;
}

/// Holder for the process-wide vehicle instance
#[derive(Default)]
pub struct DeviceSlot {
    current: RwLock<Option<Arc<dyn Aircraft>>>,
}

impl DeviceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `aircraft` the current instance
    pub async fn attach(&self, aircraft: Arc<dyn Aircraft>) {
        *self.current.write().await = Some(aircraft);
    }

    /// Drop the current instance, returning it
    pub async fn detach(&self) -> Option<Arc<dyn Aircraft>> {
        self.current.write().await.take()
    }
}

#[async_trait]
impl DeviceProvider for DeviceSlot {
    async fn current(&self) -> Option<Arc<dyn Aircraft>> {
        self.current.read().await.clone()
    }
}
