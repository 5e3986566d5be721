//! Shared engine state
//!
//! Each group sits behind its own lock and is written as a whole: the four
//! control axes, the connectivity flag, the battery level and the flight
//! state. Nothing spans two groups.

use crate::device::{BatteryEvent, ControlFrame, FlightStateEvent};
use bridge_shared::StatusSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Currently intended control vector
#[derive(Debug, Default)]
pub struct ControlAxes {
    frame: RwLock<ControlFrame>,
}

impl ControlAxes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest complete update
    pub async fn snapshot(&self) -> ControlFrame {
        *self.frame.read().await
    }

    /// Overwrite all four axes at once
    pub async fn replace(&self, frame: ControlFrame) {
        *self.frame.write().await = frame;
    }

    /// Apply `update` only if `live` is still set once the write lock is held.
    ///
    /// A writer that clears `live` and then calls [`ControlAxes::reset`]
    /// therefore always has the last word.
    pub async fn update_if(&self, live: &AtomicBool, update: impl FnOnce(&mut ControlFrame)) -> bool {
        let mut frame = self.frame.write().await;
        if !live.load(Ordering::SeqCst) {
            return false;
        }
        update(&mut *frame);
        true
    }

    /// Zero every axis
    pub async fn reset(&self) {
        self.replace(ControlFrame::default()).await;
    }
}

/// Everything the engine knows about the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetryState {
    pub connected: bool,
    pub battery_percent: f32,
    pub motors_on: bool,
    pub flying: bool,
    pub altitude: f32,
    pub latitude: f64,
    pub longitude: f64,
    pub landing_confirmation_needed: bool,
}

impl TelemetryState {
    /// Fields published on the status topic
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            battery: self.battery_percent,
            is_connected: self.connected,
            are_motors_on: self.motors_on,
            is_flying: self.flying,
            altitude: self.altitude,
        }
    }
}

/// Last known vehicle state, fed by device events
///
/// Values are only ever overwritten by newer events. A dropped link clears
/// the connectivity flag and nothing else.
#[derive(Debug, Default)]
pub struct Telemetry {
    connected: RwLock<bool>,
    battery_percent: RwLock<f32>,
    flight: RwLock<FlightStateEvent>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_connected(&self, connected: bool) {
        *self.connected.write().await = connected;
    }

    pub async fn apply_battery(&self, event: BatteryEvent) {
        *self.battery_percent.write().await = event.charge_remaining_percent;
    }

    /// Store a flight-state event.
    ///
    /// Returns true when this event raised the landing-confirmation flag,
    /// i.e. the previous event had it cleared.
    pub async fn apply_flight_state(&self, event: FlightStateEvent) -> bool {
        let mut flight = self.flight.write().await;
        let raised = event.landing_confirmation_needed && !flight.landing_confirmation_needed;
        *flight = event;
        raised
    }

    pub async fn is_flying(&self) -> bool {
        self.flight.read().await.flying
    }

    pub async fn snapshot(&self) -> TelemetryState {
        let connected = *self.connected.read().await;
        let battery_percent = *self.battery_percent.read().await;
        let flight = *self.flight.read().await;

        TelemetryState {
            connected,
            battery_percent,
            motors_on: flight.motors_on,
            flying: flight.flying,
            altitude: flight.altitude,
            latitude: flight.latitude,
            longitude: flight.longitude,
            landing_confirmation_needed: flight.landing_confirmation_needed,
        }
    }
}
