//! Values exchanged with the vehicle

use std::time::Duration;
use thiserror::Error;

/// One virtual-stick frame
///
/// `pitch`, `roll` and `yaw` are rates as configured by the control modes
/// (velocity for pitch/roll, deg/s for yaw); `throttle` is the vertical rate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlFrame {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
    pub throttle: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YawControlMode {
    Angle,
    AngularVelocity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalControlMode {
    Position,
    Velocity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollPitchControlMode {
    Angle,
    Velocity,
}

/// Reference frame for roll/pitch inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSystem {
    Ground,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationMode {
    AircraftHeading,
    CourseLock,
    HomeLock,
}

/// Battery state pushed by the vehicle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryEvent {
    pub charge_remaining_percent: f32,
}

/// Flight-controller state pushed by the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlightStateEvent {
    pub motors_on: bool,
    pub flying: bool,
    /// Metres above the takeoff point
    pub altitude: f32,
    pub latitude: f64,
    pub longitude: f64,
    /// Vehicle is holding just above ground and wants a landing confirmation
    pub landing_confirmation_needed: bool,
}

/// Errors reported by a device call on completion
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeviceError {
    #[error("command rejected by vehicle: {0}")]
    Rejected(String),

    #[error("no acknowledgment from vehicle within {0:?}")]
    Timeout(Duration),

    #[error("vehicle link is down")]
    Disconnected,

    #[error("{0} is not supported by this vehicle")]
    Unsupported(&'static str),

    #[error("link error: {0}")]
    Link(String),
}

pub type DeviceResult = Result<(), DeviceError>;
