//! Flight-control bridging engine
//!
//! Translates operator commands and velocity vectors into virtual-stick
//! control of the current vehicle, streams the control state to it every
//! control period and publishes its telemetry every status period.

mod commands;
mod dispatch;
mod guard;
mod lifecycle;
mod state;
mod status;
mod velocity;

pub use commands::FlightCommand;
pub use guard::InitGuard;
pub use state::{ControlAxes, Telemetry, TelemetryState};
pub use velocity::map_velocity;

use crate::device::{Aircraft, ControlFrame, DeviceError, DeviceProvider};
use async_trait::async_trait;
use bridge_shared::Twist;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use lifecycle::LoopHandles;

/// Errors returned to operators
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("flight bridge is stopped")]
    EngineStopped,

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Outbound side of the operator transport
#[async_trait]
pub trait BridgePublisher: Send + Sync {
    /// One empty acknowledgment per completed takeoff, landing or confirmation
    async fn publish_done(&self);

    /// One status line per status tick
    async fn publish_status(&self, status: &str);
}

/// Engine timing and fixed rates
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub control_period: Duration,
    pub status_period: Duration,
    /// Yaw rate applied by `rotate_cw`, deg/s
    pub rotate_cw_yaw_rate: f32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            control_period: Duration::from_millis(100),
            status_period: Duration::from_millis(1000),
            rotate_cw_yaw_rate: -20.0,
        }
    }
}

/// State shared by the engine, its loops and their callbacks
#[derive(Clone)]
pub(crate) struct BridgeCore {
    provider: Arc<dyn DeviceProvider>,
    publisher: Arc<dyn BridgePublisher>,
    controls: Arc<ControlAxes>,
    telemetry: Arc<Telemetry>,
    guard: Arc<InitGuard>,
    settings: Arc<EngineSettings>,
    running: Arc<AtomicBool>,
}

impl BridgeCore {
    fn ensure_running(&self) -> Result<(), BridgeError> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BridgeError::EngineStopped)
        }
    }

    /// Write the control state unless the engine has been stopped meanwhile
    async fn update_controls(&self, update: impl FnOnce(&mut ControlFrame)) -> Result<(), BridgeError> {
        if self.controls.update_if(&self.running, update).await {
            Ok(())
        } else {
            Err(BridgeError::EngineStopped)
        }
    }

    /// Current vehicle, logging when there is none
    async fn device_for(&self, action: &str) -> Option<Arc<dyn Aircraft>> {
        let device = self.provider.current().await;
        if device.is_none() {
            warn!(action, "No vehicle attached, ignoring");
        }
        device
    }
}

/// The bridging engine
pub struct FlightBridge {
    core: BridgeCore,
    loops: Mutex<Option<LoopHandles>>,
}

impl FlightBridge {
    /// Create a stopped engine; call [`FlightBridge::start`] to run it
    pub fn new(
        provider: Arc<dyn DeviceProvider>,
        publisher: Arc<dyn BridgePublisher>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            core: BridgeCore {
                provider,
                publisher,
                controls: Arc::new(ControlAxes::new()),
                telemetry: Arc::new(Telemetry::new()),
                guard: Arc::new(InitGuard::new()),
                settings: Arc::new(settings),
                running: Arc::new(AtomicBool::new(false)),
            },
            loops: Mutex::new(None),
        }
    }

    /// Run one command endpoint
    pub async fn execute(&self, command: FlightCommand) -> Result<(), BridgeError> {
        debug!(command = command.name(), "Executing command");
        match command {
            FlightCommand::Takeoff => self.core.takeoff().await,
            FlightCommand::Land => self.core.land().await,
            FlightCommand::RotateCw => self.core.rotate_cw().await,
            FlightCommand::RotateCcw => self.core.rotate_ccw().await,
            FlightCommand::Stop => self.core.stop().await,
        }
    }

    /// Run the command behind a service name or path
    pub async fn call_service(&self, service: &str) -> Result<(), BridgeError> {
        let command = FlightCommand::from_service(service)
            .ok_or_else(|| BridgeError::UnknownService(service.to_string()))?;
        self.execute(command).await
    }

    /// Replace the control state with the mapping of `twist`
    pub async fn apply_velocity(&self, twist: &Twist) -> Result<(), BridgeError> {
        let frame = map_velocity(twist);
        self.core.update_controls(|controls| *controls = frame).await
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::SeqCst)
    }

    /// Whether the vehicle modes have been configured
    pub fn is_initialized(&self) -> bool {
        self.core.guard.is_initialized()
    }

    pub fn controls(&self) -> &ControlAxes {
        &self.core.controls
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.core.telemetry
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.core.settings
    }
}
