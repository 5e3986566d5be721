//! MAVLink Command Translation
//!
//! Builds the MAVLink messages that stand in for virtual-stick actions.

use crate::device::{ControlFrame, CoordinateSystem, YawControlMode};
use mavlink::ardupilotmega::{
    MavCmd, MavFrame, MavMessage, PositionTargetTypemask, COMMAND_LONG_DATA,
    SET_POSITION_TARGET_LOCAL_NED_DATA,
};

/// Ignore position (bits 0-2) and acceleration (bits 6-8); velocity is used
const IGNORE_POSITION_AND_ACCEL: u16 = 0b0000_0001_1100_0111;
/// Ignore the absolute yaw field
const IGNORE_YAW: u16 = 0b0000_0100_0000_0000;
/// Ignore the yaw rate field
const IGNORE_YAW_RATE: u16 = 0b0000_1000_0000_0000;

/// ArduPilot Copter flight modes used by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ArduPilotMode {
    /// Accepts external setpoints, the virtual-stick equivalent
    Guided = 4,
    /// Holds position on the pilot's sticks
    Loiter = 5,
}

/// Builds commands addressed to one autopilot
#[derive(Debug, Clone, Copy)]
pub struct MavCommandBuilder {
    target_system: u8,
    target_component: u8,
}

impl MavCommandBuilder {
    pub fn new(target_system: u8, target_component: u8) -> Self {
        Self {
            target_system,
            target_component,
        }
    }

    fn command_long(&self, command: MavCmd, params: [f32; 7]) -> MavMessage {
        MavMessage::COMMAND_LONG(COMMAND_LONG_DATA {
            target_system: self.target_system,
            target_component: self.target_component,
            command,
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        })
    }

    /// Switch flight mode
    pub fn set_mode(&self, mode: ArduPilotMode) -> MavMessage {
        // param1 = MAV_MODE_FLAG_CUSTOM_MODE_ENABLED
        self.command_long(
            MavCmd::MAV_CMD_DO_SET_MODE,
            [1.0, mode as u32 as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    pub fn arm(&self) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )
    }

    /// Climb to `altitude_m` above the current position
    pub fn takeoff(&self, altitude_m: f32) -> MavMessage {
        // NAN keeps current yaw/lat/lon
        self.command_long(
            MavCmd::MAV_CMD_NAV_TAKEOFF,
            [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, altitude_m],
        )
    }

    /// Land at the current position
    pub fn land(&self) -> MavMessage {
        self.command_long(
            MavCmd::MAV_CMD_NAV_LAND,
            [0.0, 0.0, 0.0, f32::NAN, f32::NAN, f32::NAN, 0.0],
        )
    }

    /// Velocity setpoint for one virtual-stick frame
    ///
    /// Roll drives forward velocity, pitch lateral velocity, throttle climb
    /// rate (NED z points down) and yaw the heading, in deg/s or degrees
    /// depending on `yaw_mode`.
    pub fn velocity_setpoint(
        &self,
        frame: ControlFrame,
        coordinates: CoordinateSystem,
        yaw_mode: YawControlMode,
    ) -> MavMessage {
        let coordinate_frame = match coordinates {
            CoordinateSystem::Body => MavFrame::MAV_FRAME_BODY_NED,
            CoordinateSystem::Ground => MavFrame::MAV_FRAME_LOCAL_NED,
        };

        let (yaw, yaw_rate, ignore) = match yaw_mode {
            YawControlMode::AngularVelocity => (0.0, frame.yaw.to_radians(), IGNORE_YAW),
            YawControlMode::Angle => (frame.yaw.to_radians(), 0.0, IGNORE_YAW_RATE),
        };

        MavMessage::SET_POSITION_TARGET_LOCAL_NED(SET_POSITION_TARGET_LOCAL_NED_DATA {
            time_boot_ms: 0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
            vx: frame.roll,
            vy: frame.pitch,
            vz: -frame.throttle,
            afx: 0.0,
            afy: 0.0,
            afz: 0.0,
            yaw,
            yaw_rate,
            type_mask: PositionTargetTypemask::from_bits_truncate(
                IGNORE_POSITION_AND_ACCEL | ignore,
            ),
            target_system: self.target_system,
            target_component: self.target_component,
            coordinate_frame,
        })
    }
}
