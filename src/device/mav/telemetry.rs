//! MAVLink Telemetry Reader
//!
//! Folds autopilot messages into the battery and flight-state events the
//! bridge subscribes to.

use crate::device::{BatteryEvent, FlightStateEvent};
use mavlink::ardupilotmega::{MavAutopilot, MavLandedState, MavMessage, MavModeFlag};

/// Event produced by one MAVLink message
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleUpdate {
    Battery(BatteryEvent),
    FlightState(FlightStateEvent),
}

/// Latest known vehicle state, built up from individual messages
#[derive(Debug, Default)]
pub struct VehicleStateTracker {
    flight: FlightStateEvent,
    /// Set once EXTENDED_SYS_STATE has been seen; before that, armed implies flying
    landed_state_known: bool,
}

impl VehicleStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flight_state(&self) -> FlightStateEvent {
        self.flight
    }

    /// Process a MAVLink message, returning the event it produces, if any
    pub fn process_message(&mut self, msg: &MavMessage) -> Option<VehicleUpdate> {
        match msg {
            MavMessage::SYS_STATUS(sys) => {
                // -1 means the autopilot does not estimate remaining charge
                if sys.battery_remaining < 0 {
                    return None;
                }
                Some(VehicleUpdate::Battery(BatteryEvent {
                    charge_remaining_percent: sys.battery_remaining as f32,
                }))
            }

            MavMessage::HEARTBEAT(hb) => {
                // Heartbeats from GCSs and companions share the link
                if hb.autopilot == MavAutopilot::MAV_AUTOPILOT_INVALID {
                    return None;
                }
                let armed = hb.base_mode.contains(MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED);
                let mut next = self.flight;
                next.motors_on = armed;
                if !self.landed_state_known {
                    next.flying = armed;
                }
                self.replace(next)
            }

            MavMessage::EXTENDED_SYS_STATE(ext) => {
                self.landed_state_known = true;
                let mut next = self.flight;
                next.flying = matches!(
                    ext.landed_state,
                    MavLandedState::MAV_LANDED_STATE_IN_AIR
                        | MavLandedState::MAV_LANDED_STATE_TAKEOFF
                        | MavLandedState::MAV_LANDED_STATE_LANDING
                );
                self.replace(next)
            }

            MavMessage::GLOBAL_POSITION_INT(pos) => {
                let mut next = self.flight;
                next.latitude = pos.lat as f64 / 1e7;
                next.longitude = pos.lon as f64 / 1e7;
                next.altitude = pos.relative_alt as f32 / 1000.0; // mm to m
                self.replace(next)
            }

            _ => None,
        }
    }

    /// Store `next`, reporting it only when something changed
    fn replace(&mut self, next: FlightStateEvent) -> Option<VehicleUpdate> {
        if next == self.flight {
            return None;
        }
        self.flight = next;
        Some(VehicleUpdate::FlightState(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::ardupilotmega::{
        EXTENDED_SYS_STATE_DATA, GLOBAL_POSITION_INT_DATA, HEARTBEAT_DATA, SYS_STATUS_DATA,
    };

    fn heartbeat(armed: bool) -> MavMessage {
        let mut base_mode = MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED;
        if armed {
            base_mode |= MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED;
        }
        MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            autopilot: MavAutopilot::MAV_AUTOPILOT_ARDUPILOTMEGA,
            base_mode,
            ..Default::default()
        })
    }

    fn landed_state(state: MavLandedState) -> MavMessage {
        MavMessage::EXTENDED_SYS_STATE(EXTENDED_SYS_STATE_DATA {
            landed_state: state,
            ..Default::default()
        })
    }

    #[test]
    fn test_battery_from_sys_status() {
        let mut tracker = VehicleStateTracker::new();
        let msg = MavMessage::SYS_STATUS(SYS_STATUS_DATA {
            battery_remaining: 76,
            ..Default::default()
        });
        assert_eq!(
            tracker.process_message(&msg),
            Some(VehicleUpdate::Battery(BatteryEvent {
                charge_remaining_percent: 76.0
            }))
        );

        let unknown = MavMessage::SYS_STATUS(SYS_STATUS_DATA {
            battery_remaining: -1,
            ..Default::default()
        });
        assert_eq!(tracker.process_message(&unknown), None);
    }

    #[test]
    fn test_armed_heartbeat_turns_motors_on() {
        let mut tracker = VehicleStateTracker::new();
        match tracker.process_message(&heartbeat(true)) {
            Some(VehicleUpdate::FlightState(state)) => {
                assert!(state.motors_on);
                assert!(state.flying, "armed implies flying until landed state is known");
            }
            other => panic!("unexpected update: {:?}", other),
        }
        // Same state again is not re-reported
        assert_eq!(tracker.process_message(&heartbeat(true)), None);
    }

    #[test]
    fn test_landed_state_overrides_armed_guess() {
        let mut tracker = VehicleStateTracker::new();
        tracker.process_message(&landed_state(MavLandedState::MAV_LANDED_STATE_ON_GROUND));
        tracker.process_message(&heartbeat(true));

        let state = tracker.flight_state();
        assert!(state.motors_on);
        assert!(!state.flying);

        tracker.process_message(&landed_state(MavLandedState::MAV_LANDED_STATE_IN_AIR));
        assert!(tracker.flight_state().flying);
    }

    #[test]
    fn test_position_scaling() {
        let mut tracker = VehicleStateTracker::new();
        let msg = MavMessage::GLOBAL_POSITION_INT(GLOBAL_POSITION_INT_DATA {
            lat: 321_234_567,
            lon: 348_765_432,
            relative_alt: 12_300,
            ..Default::default()
        });
        tracker.process_message(&msg);

        let state = tracker.flight_state();
        assert!((state.latitude - 32.1234567).abs() < 1e-9);
        assert!((state.longitude - 34.8765432).abs() < 1e-9);
        assert_eq!(state.altitude, 12.3);
    }

    #[test]
    fn test_companion_heartbeat_ignored() {
        let mut tracker = VehicleStateTracker::new();
        let msg = MavMessage::HEARTBEAT(HEARTBEAT_DATA {
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::MAV_MODE_FLAG_SAFETY_ARMED,
            ..Default::default()
        });
        assert_eq!(tracker.process_message(&msg), None);
    }
}
