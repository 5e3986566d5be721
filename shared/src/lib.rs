//! Flight Bridge Shared Protocol Types
//!
//! This crate provides the wire types, frame codec and status format used
//! between the flight bridge and the operators driving it.

pub mod codec;
pub mod proto;
pub mod status;
#[cfg(feature = "io")]
pub mod stream;

use std::time::{SystemTime, UNIX_EPOCH};

// Re-export commonly used types at crate root
pub use proto::*;
pub use status::{StatusParseError, StatusSnapshot};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Service and topic names exposed by the bridge
pub mod topics {
    /// Prefix of every command service
    pub const COMMANDS_BASE: &str = "/flight_commands";

    /// Acknowledgment topic, one empty message per completed device action
    pub const DONE: &str = "/flight_commands/done";

    /// Velocity topic consumed by the bridge
    pub const CMD_VEL: &str = "/cmd_vel";

    /// Status topic, one report per status tick
    pub const STATUS: &str = "/dji/status";

    pub const TAKEOFF: &str = "takeoff";
    pub const LAND: &str = "land";
    pub const ROTATE_CW: &str = "rotate_cw";
    pub const ROTATE_CCW: &str = "rotate_ccw";
    pub const STOP: &str = "stop";

    /// Full service path for a command name, e.g. `/flight_commands/takeoff`
    pub fn service(command: &str) -> String {
        format!("{}/{}", COMMANDS_BASE, command)
    }

    /// Strip the command prefix from a service path.
    ///
    /// Bare names are accepted as-is.
    pub fn command_name(service: &str) -> &str {
        service
            .strip_prefix(COMMANDS_BASE)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(service)
    }
}

/// Builder helpers for creating messages
impl Envelope {
    /// Wrap a payload with a sequence number and the current time
    pub fn new(sequence_id: u64, payload: envelope::Payload) -> Self {
        Self {
            sequence_id,
            timestamp_ms: now_ms(),
            payload: Some(payload),
        }
    }
}

impl CommandRequest {
    /// Create a request for a command name or full service path
    pub fn new(request_id: u64, command: &str) -> Self {
        Self {
            request_id,
            service: topics::service(topics::command_name(command)),
        }
    }
}

impl CommandResponse {
    /// Successful empty response
    pub fn ok(request_id: u64) -> Self {
        Self {
            request_id,
            ok: true,
            error: String::new(),
        }
    }

    /// Failed response carrying the reason
    pub fn failed(request_id: u64, error: impl Into<String>) -> Self {
        Self {
            request_id,
            ok: false,
            error: error.into(),
        }
    }
}

impl Vector3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl Twist {
    /// Create a twist from linear and angular components
    pub fn new(linear: Vector3, angular: Vector3) -> Self {
        Self {
            linear: Some(linear),
            angular: Some(angular),
        }
    }

    /// Linear part, zero when absent on the wire
    pub fn linear(&self) -> Vector3 {
        self.linear.clone().unwrap_or_default()
    }

    /// Angular part, zero when absent on the wire
    pub fn angular(&self) -> Vector3 {
        self.angular.clone().unwrap_or_default()
    }
}
