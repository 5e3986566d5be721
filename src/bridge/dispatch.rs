//! Control dispatch loop
//!
//! Sends the current control state to the vehicle once per control period.

use super::BridgeCore;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

pub(super) async fn run_control_loop(core: BridgeCore) {
    let mut ticker = interval(core.settings.control_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        control_tick(&core).await;
    }
}

async fn control_tick(core: &BridgeCore) {
    let Some(device) = core.provider.current().await else {
        return;
    };
    core.guard.ensure_initialized(&device).await;

    let frame = core.controls.snapshot().await;
    // One send per tick; the next tick does not wait for it
    tokio::spawn(async move {
        if let Err(e) = device.send_control_data(frame).await {
            debug!(error = %e, "Control frame not delivered");
        }
    });
}
