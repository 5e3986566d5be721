//! Protobuf messages exchanged with operators
//!
//! Every frame on the wire is one [`Envelope`]; the payload selects the
//! topic or service the frame belongs to.

use prost::{Message, Oneof};

/// Top-level frame
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    #[prost(uint64, tag = "1")]
    pub sequence_id: u64,

    #[prost(uint64, tag = "2")]
    pub timestamp_ms: u64,

    #[prost(oneof = "envelope::Payload", tags = "3, 4, 5, 6, 7")]
    pub payload: Option<envelope::Payload>,
}

pub mod envelope {
    use super::*;

    #[derive(Clone, PartialEq, Oneof)]
    pub enum Payload {
        /// Operator → bridge: invoke a command service
        #[prost(message, tag = "3")]
        Request(CommandRequest),

        /// Bridge → operator: answer to a request
        #[prost(message, tag = "4")]
        Response(CommandResponse),

        /// Operator → bridge: velocity vector (`/cmd_vel`)
        #[prost(message, tag = "5")]
        Velocity(Twist),

        /// Bridge → operator: a device action completed (`/flight_commands/done`)
        #[prost(message, tag = "6")]
        Done(Done),

        /// Bridge → operator: status report (`/dji/status`)
        #[prost(message, tag = "7")]
        Status(StatusReport),
    }
}

/// Empty-bodied service call
#[derive(Clone, PartialEq, Message)]
pub struct CommandRequest {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,

    #[prost(string, tag = "2")]
    pub service: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CommandResponse {
    #[prost(uint64, tag = "1")]
    pub request_id: u64,

    #[prost(bool, tag = "2")]
    pub ok: bool,

    #[prost(string, tag = "3")]
    pub error: String,
}

#[derive(Clone, Copy, PartialEq, Message)]
pub struct Vector3 {
    #[prost(double, tag = "1")]
    pub x: f64,

    #[prost(double, tag = "2")]
    pub y: f64,

    #[prost(double, tag = "3")]
    pub z: f64,
}

/// Linear velocity (m/s) and angular rate (rad/s)
#[derive(Clone, PartialEq, Message)]
pub struct Twist {
    #[prost(message, optional, tag = "1")]
    pub linear: Option<Vector3>,

    #[prost(message, optional, tag = "2")]
    pub angular: Option<Vector3>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Done {}

#[derive(Clone, PartialEq, Message)]
pub struct StatusReport {
    #[prost(string, tag = "1")]
    pub data: String,
}
