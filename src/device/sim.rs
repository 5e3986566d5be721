//! In-memory vehicle
//!
//! Records every call it receives and keeps a crude flight model, so the
//! bridge can run end to end without hardware.

use super::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// Oldest calls are dropped past this many entries
const CALL_LOG_CAPACITY: usize = 4096;

/// Height reached by an automatic takeoff
pub const TAKEOFF_ALTITUDE_M: f32 = 1.2;

/// Height at which landing protection holds and asks for confirmation
pub const LANDING_PROTECTION_ALTITUDE_M: f32 = 0.3;

/// Battery drained per non-zero control frame while airborne
const DRAIN_PER_FRAME: f32 = 0.005;

/// A call received by [`SimulatedAircraft`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceCall {
    VirtualStickMode(bool),
    NoviceMode(bool),
    YawControl(YawControlMode),
    VerticalControl(VerticalControlMode),
    RollPitchControl(RollPitchControlMode),
    CoordinateSystem(CoordinateSystem),
    CollisionAvoidance(bool),
    ObstacleAvoidance(bool),
    Orientation(OrientationMode),
    Takeoff,
    Landing,
    ConfirmLanding,
    ControlData(ControlFrame),
}

impl DeviceCall {
    /// Mode configuration calls, as opposed to actions and control frames
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self,
            DeviceCall::Takeoff
                | DeviceCall::Landing
                | DeviceCall::ConfirmLanding
                | DeviceCall::ControlData(_)
        )
    }
}

#[derive(Default)]
struct Subscribers {
    battery: Option<mpsc::UnboundedSender<BatteryEvent>>,
    flight: Option<mpsc::UnboundedSender<FlightStateEvent>>,
}

pub struct SimulatedAircraft {
    connected: AtomicBool,
    fail_takeoff: AtomicBool,
    fail_configuration: AtomicBool,
    landing_protection: bool,
    action_latency: Duration,
    control_period: Duration,
    calls: Mutex<VecDeque<DeviceCall>>,
    subscribers: Mutex<Subscribers>,
    flight: Mutex<FlightStateEvent>,
    battery: Mutex<f32>,
}

impl Default for SimulatedAircraft {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAircraft {
    /// A connected, grounded vehicle with a full battery
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            fail_takeoff: AtomicBool::new(false),
            fail_configuration: AtomicBool::new(false),
            landing_protection: false,
            action_latency: Duration::ZERO,
            control_period: Duration::from_millis(100),
            calls: Mutex::new(VecDeque::new()),
            subscribers: Mutex::new(Subscribers::default()),
            flight: Mutex::new(FlightStateEvent::default()),
            battery: Mutex::new(100.0),
        }
    }

    /// Hold at [`LANDING_PROTECTION_ALTITUDE_M`] during landing until confirmed
    pub fn with_landing_protection(mut self, enabled: bool) -> Self {
        self.landing_protection = enabled;
        self
    }

    /// Delay before takeoff/landing/confirmation complete
    pub fn with_action_latency(mut self, latency: Duration) -> Self {
        self.action_latency = latency;
        self
    }

    /// Period used to integrate throttle into altitude
    pub fn with_control_period(mut self, period: Duration) -> Self {
        self.control_period = period;
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make subsequent takeoffs complete with an error
    pub fn set_takeoff_failure(&self, fail: bool) {
        self.fail_takeoff.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent mode configuration calls complete with an error
    pub fn set_configuration_failure(&self, fail: bool) {
        self.fail_configuration.store(fail, Ordering::SeqCst);
    }

    /// Calls received so far, oldest first
    pub async fn calls(&self) -> Vec<DeviceCall> {
        self.calls.lock().await.iter().copied().collect()
    }

    /// Number of received calls matching `pred`
    pub async fn count(&self, pred: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.lock().await.iter().filter(|c| pred(*c)).count()
    }

    /// Control frames received so far, oldest first
    pub async fn control_frames(&self) -> Vec<ControlFrame> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                DeviceCall::ControlData(frame) => Some(*frame),
                _ => None,
            })
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    /// Push a battery update to the current subscriber
    pub async fn emit_battery(&self, percent: f32) {
        *self.battery.lock().await = percent;
        if let Some(tx) = &self.subscribers.lock().await.battery {
            let _ = tx.send(BatteryEvent {
                charge_remaining_percent: percent,
            });
        }
    }

    /// Replace the flight state and push it to the current subscriber
    pub async fn emit_flight_state(&self, state: FlightStateEvent) {
        *self.flight.lock().await = state;
        self.notify_flight(state).await;
    }

    pub async fn flight_state(&self) -> FlightStateEvent {
        *self.flight.lock().await
    }

    async fn notify_flight(&self, state: FlightStateEvent) {
        if let Some(tx) = &self.subscribers.lock().await.flight {
            let _ = tx.send(state);
        }
    }

    async fn record(&self, call: DeviceCall) {
        let mut calls = self.calls.lock().await;
        if calls.len() == CALL_LOG_CAPACITY {
            calls.pop_front();
        }
        calls.push_back(call);
    }

    async fn configure(&self, call: DeviceCall) -> DeviceResult {
        self.record(call).await;
        if self.fail_configuration.load(Ordering::SeqCst) {
            return Err(DeviceError::Rejected(format!("{:?} refused", call)));
        }
        Ok(())
    }

    async fn act(&self, call: DeviceCall) -> DeviceResult {
        self.record(call).await;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DeviceError::Disconnected);
        }
        if !self.action_latency.is_zero() {
            tokio::time::sleep(self.action_latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Aircraft for SimulatedAircraft {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn set_virtual_stick_mode_enabled(&self, enabled: bool) -> DeviceResult {
        self.configure(DeviceCall::VirtualStickMode(enabled)).await
    }

    async fn set_novice_mode_enabled(&self, enabled: bool) -> DeviceResult {
        self.configure(DeviceCall::NoviceMode(enabled)).await
    }

    async fn set_yaw_control_mode(&self, mode: YawControlMode) -> DeviceResult {
        self.configure(DeviceCall::YawControl(mode)).await
    }

    async fn set_vertical_control_mode(&self, mode: VerticalControlMode) -> DeviceResult {
        self.configure(DeviceCall::VerticalControl(mode)).await
    }

    async fn set_roll_pitch_control_mode(&self, mode: RollPitchControlMode) -> DeviceResult {
        self.configure(DeviceCall::RollPitchControl(mode)).await
    }

    async fn set_roll_pitch_coordinate_system(&self, system: CoordinateSystem) -> DeviceResult {
        self.configure(DeviceCall::CoordinateSystem(system)).await
    }

    async fn set_collision_avoidance_enabled(&self, enabled: bool) -> DeviceResult {
        self.configure(DeviceCall::CollisionAvoidance(enabled)).await
    }

    async fn set_active_obstacle_avoidance_enabled(&self, enabled: bool) -> DeviceResult {
        self.configure(DeviceCall::ObstacleAvoidance(enabled)).await
    }

    async fn set_flight_orientation_mode(&self, mode: OrientationMode) -> DeviceResult {
        self.configure(DeviceCall::Orientation(mode)).await
    }

    async fn start_takeoff(&self) -> DeviceResult {
        self.act(DeviceCall::Takeoff).await?;
        if self.fail_takeoff.load(Ordering::SeqCst) {
            return Err(DeviceError::Rejected("motors failed to start".into()));
        }

        let state = {
            let mut flight = self.flight.lock().await;
            flight.motors_on = true;
            flight.flying = true;
            flight.altitude = flight.altitude.max(TAKEOFF_ALTITUDE_M);
            *flight
        };
        debug!(altitude = state.altitude, "simulated takeoff complete");
        self.notify_flight(state).await;
        Ok(())
    }

    async fn start_landing(&self) -> DeviceResult {
        self.act(DeviceCall::Landing).await?;

        let state = {
            let mut flight = self.flight.lock().await;
            if self.landing_protection && flight.flying {
                flight.altitude = LANDING_PROTECTION_ALTITUDE_M;
                flight.landing_confirmation_needed = true;
            } else {
                *flight = FlightStateEvent {
                    latitude: flight.latitude,
                    longitude: flight.longitude,
                    ..FlightStateEvent::default()
                };
            }
            *flight
        };
        self.notify_flight(state).await;
        Ok(())
    }

    async fn confirm_landing(&self) -> DeviceResult {
        self.act(DeviceCall::ConfirmLanding).await?;

        let state = {
            let mut flight = self.flight.lock().await;
            *flight = FlightStateEvent {
                latitude: flight.latitude,
                longitude: flight.longitude,
                ..FlightStateEvent::default()
            };
            *flight
        };
        self.notify_flight(state).await;
        Ok(())
    }

    async fn send_control_data(&self, frame: ControlFrame) -> DeviceResult {
        self.record(DeviceCall::ControlData(frame)).await;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(DeviceError::Disconnected);
        }

        let changed = {
            let mut flight = self.flight.lock().await;
            if !flight.flying {
                return Ok(());
            }
            if frame.throttle != 0.0 {
                let climb = frame.throttle * self.control_period.as_secs_f32();
                flight.altitude = (flight.altitude + climb).max(0.0);
                Some(*flight)
            } else {
                None
            }
        };

        // Hovering is free, manoeuvring drains the battery
        if frame != ControlFrame::default() {
            let percent = {
                let mut battery = self.battery.lock().await;
                *battery = (*battery - DRAIN_PER_FRAME).max(0.0);
                *battery
            };
            if let Some(tx) = &self.subscribers.lock().await.battery {
                let _ = tx.send(BatteryEvent {
                    charge_remaining_percent: percent,
                });
            }
        }
        if let Some(state) = changed {
            self.notify_flight(state).await;
        }
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_in_order() {
        let sim = SimulatedAircraft::new();
        sim.set_virtual_stick_mode_enabled(true).await.unwrap();
        sim.start_takeoff().await.unwrap();
        sim.send_control_data(ControlFrame::default()).await.unwrap();

        assert_eq!(
            sim.calls().await,
            vec![
                DeviceCall::VirtualStickMode(true),
                DeviceCall::Takeoff,
                DeviceCall::ControlData(ControlFrame::default()),
            ]
        );
    }

    #[tokio::test]
    async fn test_takeoff_pushes_flight_state() {
        let sim = SimulatedAircraft::new();
        let mut rx = sim.subscribe_flight_state().await;

        sim.start_takeoff().await.unwrap();
        let state = rx.recv().await.expect("flight state");
        assert!(state.flying);
        assert!(state.motors_on);
        assert_eq!(state.altitude, TAKEOFF_ALTITUDE_M);
    }

    #[tokio::test]
    async fn test_takeoff_failure() {
        let sim = SimulatedAircraft::new();
        sim.set_takeoff_failure(true);

        assert!(matches!(sim.start_takeoff().await, Err(DeviceError::Rejected(_))));
        assert!(!sim.flight_state().await.flying);
    }

    #[tokio::test]
    async fn test_landing_protection_asks_for_confirmation() {
        let sim = SimulatedAircraft::new().with_landing_protection(true);
        sim.start_takeoff().await.unwrap();
        let mut rx = sim.subscribe_flight_state().await;

        sim.start_landing().await.unwrap();
        let held = rx.recv().await.expect("held state");
        assert!(held.landing_confirmation_needed);
        assert_eq!(held.altitude, LANDING_PROTECTION_ALTITUDE_M);

        sim.confirm_landing().await.unwrap();
        let landed = rx.recv().await.expect("landed state");
        assert!(!landed.flying);
        assert!(!landed.landing_confirmation_needed);
    }

    #[tokio::test]
    async fn test_throttle_climbs_while_flying() {
        let sim = SimulatedAircraft::new().with_control_period(Duration::from_millis(500));
        sim.start_takeoff().await.unwrap();
        let mut battery = sim.subscribe_battery().await;

        sim.send_control_data(ControlFrame {
            throttle: 2.0,
            ..ControlFrame::default()
        })
        .await
        .unwrap();

        assert_eq!(sim.flight_state().await.altitude, TAKEOFF_ALTITUDE_M + 1.0);
        let drained = battery.recv().await.expect("battery event");
        assert!(drained.charge_remaining_percent < 100.0);
    }

    #[tokio::test]
    async fn test_new_subscription_replaces_old() {
        let sim = SimulatedAircraft::new();
        let mut first = sim.subscribe_battery().await;
        let mut second = sim.subscribe_battery().await;

        sim.emit_battery(50.0).await;
        assert_eq!(second.recv().await.unwrap().charge_remaining_percent, 50.0);
        // the replaced sender was dropped
        assert!(first.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_disconnected_actions_fail() {
        let sim = SimulatedAircraft::new();
        sim.set_connected(false);

        assert_eq!(sim.start_landing().await, Err(DeviceError::Disconnected));
        assert_eq!(sim.count(|c| *c == DeviceCall::Landing).await, 1);
    }
}
