use anyhow::Result;
use clap::Parser;
use flight_bridge::config::{BridgeConfig, DeviceBackend};
use flight_bridge::device::{Aircraft, DeviceSlot, MavlinkAircraft, SimulatedAircraft};
use flight_bridge::transport::{BroadcastPublisher, OperatorServer};
use flight_bridge::watchdog::LinkWatchdog;
use flight_bridge::FlightBridge;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "flight-bridge", version, about = "Operator bridge for virtual-stick flight controllers")]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Operator listen address, overrides the config file
    #[arg(long)]
    listen: Option<String>,

    /// Use the simulated vehicle whatever the config says
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let mut config = BridgeConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if args.simulate {
        config.device.backend = DeviceBackend::Simulated;
    }

    info!("Flight bridge starting: {}", config.node_name);
    info!("  Operators: {}", config.listen_addr);

    // Vehicle
    let slot = Arc::new(DeviceSlot::new());
    let aircraft: Arc<dyn Aircraft> = match config.device.backend {
        DeviceBackend::Simulated => {
            info!("  Vehicle: simulated");
            Arc::new(SimulatedAircraft::new().with_landing_protection(true))
        }
        DeviceBackend::Mavlink => {
            info!("  Vehicle: MAVLink {}", config.device.mavlink.connection.address());
            MavlinkAircraft::connect(config.device.mavlink.clone())
        }
    };
    slot.attach(aircraft).await;

    // Engine and operator transport
    let publisher = Arc::new(BroadcastPublisher::new());
    let bridge = Arc::new(FlightBridge::new(
        slot.clone(),
        publisher.clone(),
        config.engine_settings(),
    ));
    let server = OperatorServer::bind(&config.listen_addr, bridge.clone(), publisher).await?;
    let watchdog = LinkWatchdog::new(Arc::new(server.sessions()), config.watchdog_period());

    bridge.start().await;
    watchdog.start().await;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Operator server failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    watchdog.stop().await;
    bridge.stop().await;
    slot.detach().await;
    Ok(())
}
