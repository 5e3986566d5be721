//! Flight Bridge
//!
//! Bridges operator commands and velocity vectors to a virtual-stick flight
//! controller, and the controller's telemetry back to operators.

pub mod bridge;
pub mod config;
pub mod device;
pub mod transport;
pub mod watchdog;

pub use bridge::{BridgeError, BridgePublisher, EngineSettings, FlightBridge, FlightCommand};
pub use config::BridgeConfig;
pub use device::{Aircraft, DeviceProvider, DeviceSlot};
