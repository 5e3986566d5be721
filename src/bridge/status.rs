//! Status poll loop
//!
//! Publishes a telemetry snapshot once per status period. The first tick
//! that finds a vehicle also subscribes to its battery and flight-state
//! events; those feed [`Telemetry`](super::Telemetry) as they arrive, off
//! the loop's clock.

use super::BridgeCore;
use crate::device::{Aircraft, BatteryEvent, FlightStateEvent};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Event pumps for one vehicle, aborted with the loop that owns them
struct SubscriptionPumps {
    battery: JoinHandle<()>,
    flight: JoinHandle<()>,
}

impl SubscriptionPumps {
    async fn register(core: &BridgeCore, device: Arc<dyn Aircraft>) -> Self {
        info!("Subscribing to vehicle battery and flight state");
        let battery_rx = device.subscribe_battery().await;
        let flight_rx = device.subscribe_flight_state().await;

        Self {
            battery: tokio::spawn(battery_pump(battery_rx, core.clone())),
            flight: tokio::spawn(flight_pump(flight_rx, core.clone(), device)),
        }
    }
}

impl Drop for SubscriptionPumps {
    fn drop(&mut self) {
        self.battery.abort();
        self.flight.abort();
    }
}

pub(super) async fn run_status_loop(core: BridgeCore) {
    let mut ticker = interval(core.settings.status_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut pumps: Option<SubscriptionPumps> = None;

    loop {
        ticker.tick().await;
        status_tick(&core, &mut pumps).await;
    }
}

async fn status_tick(core: &BridgeCore, pumps: &mut Option<SubscriptionPumps>) {
    match core.provider.current().await {
        Some(device) => {
            core.telemetry.set_connected(device.is_connected()).await;
            if pumps.is_none() {
                *pumps = Some(SubscriptionPumps::register(core, device).await);
            }
        }
        None => core.telemetry.set_connected(false).await,
    }

    let status = core.telemetry.snapshot().await.status().to_string();
    debug!(%status, "Publishing status");
    core.publisher.publish_status(&status).await;
}

async fn battery_pump(mut events: mpsc::UnboundedReceiver<BatteryEvent>, core: BridgeCore) {
    while let Some(event) = events.recv().await {
        core.telemetry.apply_battery(event).await;
    }
    debug!("Battery subscription ended");
}

async fn flight_pump(
    mut events: mpsc::UnboundedReceiver<FlightStateEvent>,
    core: BridgeCore,
    device: Arc<dyn Aircraft>,
) {
    while let Some(event) = events.recv().await {
        if core.telemetry.apply_flight_state(event).await {
            info!(altitude = event.altitude, "Vehicle asks for landing confirmation");
            let device = device.clone();
            let publisher = core.publisher.clone();
            tokio::spawn(async move {
                match device.confirm_landing().await {
                    Ok(()) => info!("Landing confirmed"),
                    Err(e) => warn!(error = %e, "Landing confirmation failed"),
                }
                publisher.publish_done().await;
            });
        }
    }
    debug!("Flight-state subscription ended");
}

#[cfg(test)]
mod tests {
    use crate::bridge::testing::*;
    use crate::bridge::FlightCommand;
    use crate::device::{BatteryEvent, DeviceCall, FlightStateEvent, SimulatedAircraft};
    use bridge_shared::StatusSnapshot;
    use std::time::Duration;

    fn confirmation_needed() -> FlightStateEvent {
        FlightStateEvent {
            motors_on: true,
            flying: true,
            altitude: 0.3,
            landing_confirmation_needed: true,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_every_status_period() {
        let h = running().await;
        assert_eq!(h.publisher.statuses().await.len(), 1, "first tick is immediate");

        tokio::time::sleep(Duration::from_millis(2050)).await;
        assert_eq!(h.publisher.statuses().await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_status_line() {
        let h = running().await;
        assert_eq!(
            h.publisher.last_status().await.as_deref(),
            Some("battery=0.0;isConnected=true;areMotorsOn=false;isFlying=false;altitude=0.0")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reflects_vehicle_events() {
        let h = running().await;
        h.sim.emit_battery(87.5).await;
        h.sim
            .emit_flight_state(FlightStateEvent {
                motors_on: true,
                flying: true,
                altitude: 12.3,
                ..Default::default()
            })
            .await;

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(
            h.publisher.last_status().await.as_deref(),
            Some("battery=87.5;isConnected=true;areMotorsOn=true;isFlying=true;altitude=12.3")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_apply_between_ticks() {
        let h = running().await;
        h.sim.emit_battery(42.0).await;
        settle().await;

        let state = h.bridge.telemetry().snapshot().await;
        assert_eq!(state.battery_percent, 42.0);
        assert_eq!(h.publisher.statuses().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_landing_confirmation_once_per_transition() {
        let h = running_with(SimulatedAircraft::new().with_landing_protection(true)).await;

        h.sim.emit_flight_state(confirmation_needed()).await;
        h.sim.emit_flight_state(confirmation_needed()).await;
        settle().await;

        assert_eq!(h.sim.count(|c| *c == DeviceCall::ConfirmLanding).await, 1);
        assert_eq!(h.publisher.done_count(), 1);
        assert!(!h.bridge.telemetry().snapshot().await.flying);

        h.sim.emit_flight_state(confirmation_needed()).await;
        settle().await;
        assert_eq!(h.sim.count(|c| *c == DeviceCall::ConfirmLanding).await, 2);
        assert_eq!(h.publisher.done_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_protected_landing_flow() {
        let h = running_with(SimulatedAircraft::new().with_landing_protection(true)).await;

        h.bridge.execute(FlightCommand::Takeoff).await.unwrap();
        settle().await;
        assert!(h.bridge.telemetry().is_flying().await);

        h.bridge.execute(FlightCommand::Land).await.unwrap();
        settle().await;

        // One done for takeoff, one for landing, one for the confirmation
        assert_eq!(h.publisher.done_count(), 3);
        assert_eq!(h.sim.count(|c| *c == DeviceCall::ConfirmLanding).await, 1);
        assert!(!h.bridge.telemetry().is_flying().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_confirmation_still_publishes_done() {
        let h = running().await;
        h.sim.set_connected(false);

        h.sim.emit_flight_state(confirmation_needed()).await;
        settle().await;

        assert_eq!(h.sim.count(|c| *c == DeviceCall::ConfirmLanding).await, 1);
        assert_eq!(h.publisher.done_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vehicle_absent_throughout() {
        let h = harness().await;
        h.slot.detach().await;
        h.bridge.start().await;

        tokio::time::sleep(Duration::from_millis(2050)).await;
        let statuses = h.publisher.statuses().await;
        assert_eq!(statuses.len(), 3);
        for status in statuses {
            let parsed: StatusSnapshot = status.parse().unwrap();
            assert!(!parsed.is_connected);
        }
        assert!(h.sim.calls().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_vehicle_keeps_last_known_values() {
        let h = running().await;
        h.sim.emit_battery(71.5).await;
        h.sim
            .emit_flight_state(FlightStateEvent {
                motors_on: true,
                flying: true,
                altitude: 3.0,
                ..Default::default()
            })
            .await;
        settle().await;

        h.slot.detach().await;
        tokio::time::sleep(Duration::from_millis(1000)).await;

        assert_eq!(
            h.publisher.last_status().await.as_deref(),
            Some("battery=71.5;isConnected=false;areMotorsOn=true;isFlying=true;altitude=3.0")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_drop_reported() {
        let h = running().await;
        h.sim.set_connected(false);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        let status: StatusSnapshot = h.publisher.last_status().await.unwrap().parse().unwrap();
        assert!(!status.is_connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_restored_after_restart() {
        let h = running().await;
        h.bridge.stop().await;
        h.bridge.start().await;
        settle().await;

        h.bridge
            .telemetry()
            .apply_battery(BatteryEvent {
                charge_remaining_percent: 10.0,
            })
            .await;
        h.sim.emit_battery(90.0).await;
        settle().await;
        assert_eq!(h.bridge.telemetry().snapshot().await.battery_percent, 90.0);
    }
}
