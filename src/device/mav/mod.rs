//! MAVLink Vehicle Backend
//!
//! Drives an ArduPilot copter as a virtual-stick vehicle: GUIDED mode plays
//! the part of virtual-stick mode and every control frame becomes a velocity
//! setpoint.

mod commands;
mod connection;
mod telemetry;

pub use commands::{ArduPilotMode, MavCommandBuilder};
pub use connection::{LinkKind, MavLink, MavlinkConfig};
pub use telemetry::{VehicleStateTracker, VehicleUpdate};

use super::*;
use mavlink::ardupilotmega::{MavCmd, MavMessage, MavResult};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// How long to wait for a COMMAND_ACK
pub const COMMAND_ACK_TIMEOUT: Duration = Duration::from_millis(3000);

/// Height of an automatic takeoff
pub const TAKEOFF_ALTITUDE_M: f32 = 1.2;

/// How control frames are encoded
#[derive(Debug, Clone, Copy)]
struct ControlSettings {
    yaw: YawControlMode,
    coordinates: CoordinateSystem,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            yaw: YawControlMode::AngularVelocity,
            coordinates: CoordinateSystem::Body,
        }
    }
}

#[derive(Default)]
struct Subscribers {
    battery: Option<mpsc::UnboundedSender<BatteryEvent>>,
    flight: Option<mpsc::UnboundedSender<FlightStateEvent>>,
}

pub struct MavlinkAircraft {
    link: Arc<MavLink>,
    commands: MavCommandBuilder,
    settings: Mutex<ControlSettings>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl MavlinkAircraft {
    /// Open the link and start translating telemetry
    pub fn connect(config: MavlinkConfig) -> Arc<Self> {
        let commands = MavCommandBuilder::new(config.target_system, config.target_component);
        let link = MavLink::spawn(config);
        let subscribers = Arc::new(Mutex::new(Subscribers::default()));

        tokio::spawn(telemetry_pump(link.subscribe(), subscribers.clone()));

        Arc::new(Self {
            link,
            commands,
            settings: Mutex::new(ControlSettings::default()),
            subscribers,
        })
    }

    /// Send `msg` and wait for the autopilot to acknowledge `command`
    async fn command_with_ack(&self, command: MavCmd, msg: MavMessage) -> DeviceResult {
        // Subscribe before sending so the ack cannot slip past
        let mut inbound = self.link.subscribe();
        self.link.send(msg).await?;

        let wait = async {
            loop {
                match inbound.recv().await {
                    Ok(MavMessage::COMMAND_ACK(ack)) if ack.command == command => {
                        return match ack.result {
                            MavResult::MAV_RESULT_ACCEPTED => Ok(()),
                            other => Err(DeviceError::Rejected(format!(
                                "{:?}: {:?}",
                                command, other
                            ))),
                        };
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return Err(DeviceError::Disconnected),
                }
            }
        };

        tokio::time::timeout(COMMAND_ACK_TIMEOUT, wait)
            .await
            .map_err(|_| DeviceError::Timeout(COMMAND_ACK_TIMEOUT))?
    }

    async fn set_mode(&self, mode: ArduPilotMode) -> DeviceResult {
        info!(?mode, "Setting flight mode");
        self.command_with_ack(MavCmd::MAV_CMD_DO_SET_MODE, self.commands.set_mode(mode))
            .await
    }
}

/// Forward telemetry to whoever is subscribed right now
async fn telemetry_pump(
    mut inbound: broadcast::Receiver<MavMessage>,
    subscribers: Arc<Mutex<Subscribers>>,
) {
    let mut tracker = VehicleStateTracker::new();
    loop {
        let msg = match inbound.recv().await {
            Ok(msg) => msg,
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Telemetry pump lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(update) = tracker.process_message(&msg) else {
            continue;
        };

        let subscribers = subscribers.lock().await;
        match update {
            VehicleUpdate::Battery(event) => {
                if let Some(tx) = &subscribers.battery {
                    let _ = tx.send(event);
                }
            }
            VehicleUpdate::FlightState(event) => {
                if let Some(tx) = &subscribers.flight {
                    let _ = tx.send(event);
                }
            }
        }
    }
}

#[async_trait]
impl Aircraft for MavlinkAircraft {
    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn set_virtual_stick_mode_enabled(&self, enabled: bool) -> DeviceResult {
        let mode = if enabled {
            ArduPilotMode::Guided
        } else {
            ArduPilotMode::Loiter
        };
        self.set_mode(mode).await
    }

    async fn set_novice_mode_enabled(&self, _enabled: bool) -> DeviceResult {
        Err(DeviceError::Unsupported("novice mode"))
    }

    async fn set_yaw_control_mode(&self, mode: YawControlMode) -> DeviceResult {
        self.settings.lock().await.yaw = mode;
        Ok(())
    }

    async fn set_vertical_control_mode(&self, mode: VerticalControlMode) -> DeviceResult {
        match mode {
            VerticalControlMode::Velocity => Ok(()),
            VerticalControlMode::Position => Err(DeviceError::Unsupported("position throttle")),
        }
    }

    async fn set_roll_pitch_control_mode(&self, mode: RollPitchControlMode) -> DeviceResult {
        match mode {
            RollPitchControlMode::Velocity => Ok(()),
            RollPitchControlMode::Angle => Err(DeviceError::Unsupported("angle roll/pitch")),
        }
    }

    async fn set_roll_pitch_coordinate_system(&self, system: CoordinateSystem) -> DeviceResult {
        self.settings.lock().await.coordinates = system;
        Ok(())
    }

    async fn set_collision_avoidance_enabled(&self, _enabled: bool) -> DeviceResult {
        Err(DeviceError::Unsupported("collision avoidance"))
    }

    async fn set_active_obstacle_avoidance_enabled(&self, _enabled: bool) -> DeviceResult {
        Err(DeviceError::Unsupported("active obstacle avoidance"))
    }

    async fn set_flight_orientation_mode(&self, _mode: OrientationMode) -> DeviceResult {
        Err(DeviceError::Unsupported("orientation mode"))
    }

    async fn start_takeoff(&self) -> DeviceResult {
        self.set_mode(ArduPilotMode::Guided).await?;
        self.command_with_ack(MavCmd::MAV_CMD_COMPONENT_ARM_DISARM, self.commands.arm())
            .await?;
        self.command_with_ack(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            self.commands.takeoff(TAKEOFF_ALTITUDE_M),
        )
        .await
    }

    async fn start_landing(&self) -> DeviceResult {
        self.command_with_ack(MavCmd::MAV_CMD_NAV_LAND, self.commands.land())
            .await
    }

    async fn confirm_landing(&self) -> DeviceResult {
        // ArduPilot lands without a confirmation step
        Err(DeviceError::Unsupported("landing confirmation"))
    }

    async fn send_control_data(&self, frame: ControlFrame) -> DeviceResult {
        let settings = *self.settings.lock().await;
        self.link
            .send(
                self.commands
                    .velocity_setpoint(frame, settings.coordinates, settings.yaw),
            )
            .await
    }

    async fn subscribe_battery(&self) -> mpsc::UnboundedReceiver<BatteryEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.battery = Some(tx);
        rx
    }

    async fn subscribe_flight_state(&self) -> mpsc::UnboundedReceiver<FlightStateEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.flight = Some(tx);
        rx
    }
}
