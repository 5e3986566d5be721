//! Flight Controller Link
//!
//! Keeps a MAVLink connection to an ArduPilot autopilot alive over serial,
//! UDP or TCP, reconnecting when it drops.

use crate::device::DeviceError;
use mavlink::ardupilotmega::{
    MavAutopilot, MavMessage, MavModeFlag, MavState, MavType, HEARTBEAT_DATA,
};
use mavlink::error::MessageReadError;
use mavlink::{MavConnection, MavHeader};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);
const IDLE_READ_BACKOFF: Duration = Duration::from_millis(5);
const READER_STOP_TIMEOUT: Duration = Duration::from_secs(3);

type SharedConnection = Arc<dyn MavConnection<MavMessage> + Send + Sync>;

/// Connection type for the flight controller
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LinkKind {
    /// Serial port (e.g. "/dev/ttyACM0")
    Serial { port: String, baud: u32 },
    /// Listen for UDP (e.g. "0.0.0.0:14550")
    Udp { address: String },
    /// Connect over TCP (e.g. "127.0.0.1:5760")
    Tcp { address: String },
}

impl Default for LinkKind {
    fn default() -> Self {
        // SITL default
        Self::Udp {
            address: "0.0.0.0:14550".into(),
        }
    }
}

impl LinkKind {
    /// Address string understood by `mavlink::connect`
    pub fn address(&self) -> String {
        match self {
            LinkKind::Serial { port, baud } => format!("serial:{}:{}", port, baud),
            LinkKind::Udp { address } => format!("udpin:{}", address),
            LinkKind::Tcp { address } => format!("tcpout:{}", address),
        }
    }
}

/// MAVLink connection settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MavlinkConfig {
    pub connection: LinkKind,
    /// System ID for this companion computer
    pub system_id: u8,
    /// Component ID for this companion computer
    pub component_id: u8,
    /// Target system ID (flight controller)
    pub target_system: u8,
    /// Target component ID (autopilot)
    pub target_component: u8,
}

impl Default for MavlinkConfig {
    fn default() -> Self {
        Self {
            connection: LinkKind::default(),
            system_id: 255,
            component_id: 191, // MAV_COMP_ID_ONBOARD_COMPUTER
            target_system: 1,
            target_component: 1, // MAV_COMP_ID_AUTOPILOT1
        }
    }
}

/// Handle to the background link task
pub struct MavLink {
    outbound_tx: mpsc::Sender<MavMessage>,
    inbound_tx: broadcast::Sender<MavMessage>,
    connected: Arc<AtomicBool>,
}

impl MavLink {
    /// Start the link task; it connects and reconnects on its own
    pub fn spawn(config: MavlinkConfig) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::channel(100);
        let (inbound_tx, _) = broadcast::channel(256);
        let connected = Arc::new(AtomicBool::new(false));

        tokio::spawn(link_loop(
            config,
            outbound_rx,
            inbound_tx.clone(),
            connected.clone(),
        ));

        Arc::new(Self {
            outbound_tx,
            inbound_tx,
            connected,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue a message for the autopilot
    pub async fn send(&self, msg: MavMessage) -> Result<(), DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::Disconnected);
        }
        self.outbound_tx
            .send(msg)
            .await
            .map_err(|_| DeviceError::Link("link task stopped".into()))
    }

    /// Every message received from now on
    pub fn subscribe(&self) -> broadcast::Receiver<MavMessage> {
        self.inbound_tx.subscribe()
    }
}

async fn link_loop(
    config: MavlinkConfig,
    mut outbound_rx: mpsc::Receiver<MavMessage>,
    inbound_tx: broadcast::Sender<MavMessage>,
    connected: Arc<AtomicBool>,
) {
    loop {
        let address = config.connection.address();
        info!(%address, "Connecting to flight controller");

        let attempt = {
            let address = address.clone();
            tokio::task::spawn_blocking(move || mavlink::connect::<MavMessage>(&address)).await
        };

        match attempt {
            Ok(Ok(conn)) => {
                info!(%address, "Connected to flight controller");
                let conn: SharedConnection = Arc::from(conn);
                connected.store(true, Ordering::SeqCst);

                if let Err(e) = run_session(conn, &config, &mut outbound_rx, &inbound_tx).await {
                    warn!(error = %e, "Flight controller link dropped");
                }

                connected.store(false, Ordering::SeqCst);
                // Anything queued for the old session is stale
                while outbound_rx.try_recv().is_ok() {}
            }
            Ok(Err(e)) => warn!(%address, error = %e, "Failed to connect to flight controller"),
            Err(e) => warn!(error = %e, "Connect task failed"),
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Pump one established connection until it fails
///
/// The blocking reader is always told to stop and awaited before returning,
/// so the next connect attempt never races a reader still holding the port.
async fn run_session(
    conn: SharedConnection,
    config: &MavlinkConfig,
    outbound_rx: &mut mpsc::Receiver<MavMessage>,
    inbound_tx: &broadcast::Sender<MavMessage>,
) -> Result<(), DeviceError> {
    let header = MavHeader {
        system_id: config.system_id,
        component_id: config.component_id,
        sequence: 0,
    };

    // recv() blocks, so reading lives on the blocking pool
    let stop = Arc::new(AtomicBool::new(false));
    let mut reader = {
        let conn = conn.clone();
        let tx = inbound_tx.clone();
        let stop = stop.clone();
        tokio::task::spawn_blocking(move || read_loop(|| conn.recv(), &tx, &stop))
    };

    let result = pump(&conn, &header, &mut reader, outbound_rx).await;
    stop_reader(&stop, &mut reader).await;
    result
}

async fn pump(
    conn: &SharedConnection,
    header: &MavHeader,
    reader: &mut JoinHandle<Result<(), String>>,
    outbound_rx: &mut mpsc::Receiver<MavMessage>,
) -> Result<(), DeviceError> {
    let mut heartbeat = interval(HEARTBEAT_PERIOD);

    loop {
        tokio::select! {
            finished = &mut *reader => {
                let reason = match finished {
                    Ok(Err(e)) => e,
                    Ok(Ok(())) => "reader stopped".to_string(),
                    Err(e) => e.to_string(),
                };
                return Err(DeviceError::Link(reason));
            }

            _ = heartbeat.tick() => {
                conn.send(header, &companion_heartbeat())
                    .map_err(|e| DeviceError::Link(e.to_string()))?;
            }

            outbound = outbound_rx.recv() => {
                let Some(msg) = outbound else {
                    debug!("Outbound channel closed");
                    return Ok(());
                };
                conn.send(header, &msg)
                    .map_err(|e| DeviceError::Link(e.to_string()))?;
            }
        }
    }
}

/// Forward received messages until `stop` is set or the read fails
fn read_loop<F>(
    mut recv: F,
    tx: &broadcast::Sender<MavMessage>,
    stop: &AtomicBool,
) -> Result<(), String>
where
    F: FnMut() -> Result<(MavHeader, MavMessage), MessageReadError>,
{
    while !stop.load(Ordering::SeqCst) {
        match recv() {
            Ok((_header, msg)) => {
                // A message that arrives after teardown belongs to no session
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                let _ = tx.send(msg);
            }
            Err(MessageReadError::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(IDLE_READ_BACKOFF);
            }
            Err(e) => return Err(e.to_string()),
        }
    }
    Ok(())
}

/// Signal the reader and wait for its thread to let go of the connection
async fn stop_reader(stop: &AtomicBool, reader: &mut JoinHandle<Result<(), String>>) {
    stop.store(true, Ordering::SeqCst);
    if reader.is_finished() {
        return;
    }
    // A quiet link only wakes the reader on its next inbound message
    match tokio::time::timeout(READER_STOP_TIMEOUT, reader).await {
        Ok(_) => debug!("Link reader stopped"),
        Err(_) => warn!(
            timeout_ms = READER_STOP_TIMEOUT.as_millis() as u64,
            "Link reader still blocked in recv, reconnecting anyway"
        ),
    }
}

/// Heartbeat identifying this process as an onboard controller
fn companion_heartbeat() -> MavMessage {
    MavMessage::HEARTBEAT(HEARTBEAT_DATA {
        custom_mode: 0,
        mavtype: MavType::MAV_TYPE_ONBOARD_CONTROLLER,
        autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
        base_mode: MavModeFlag::empty(),
        system_status: MavState::MAV_STATE_ACTIVE,
        mavlink_version: 3,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MavlinkConfig::default();
        assert_eq!(config.system_id, 255);
        assert_eq!(config.target_system, 1);
        assert_eq!(config.connection.address(), "udpin:0.0.0.0:14550");
    }

    #[test]
    fn test_connection_addresses() {
        let serial = LinkKind::Serial {
            port: "/dev/ttyACM0".into(),
            baud: 57600,
        };
        assert_eq!(serial.address(), "serial:/dev/ttyACM0:57600");

        let tcp = LinkKind::Tcp {
            address: "127.0.0.1:5760".into(),
        };
        assert_eq!(tcp.address(), "tcpout:127.0.0.1:5760");
    }

    #[test]
    fn test_companion_heartbeat() {
        match companion_heartbeat() {
            MavMessage::HEARTBEAT(hb) => {
                assert_eq!(hb.mavtype, MavType::MAV_TYPE_ONBOARD_CONTROLLER);
                assert_eq!(hb.autopilot, MavAutopilot::MAV_AUTOPILOT_INVALID);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    fn would_block() -> MessageReadError {
        MessageReadError::Io(std::io::ErrorKind::WouldBlock.into())
    }

    #[test]
    fn test_reader_stops_on_flag() {
        let (tx, mut rx) = broadcast::channel(16);
        let stop = AtomicBool::new(false);
        let mut reads = 0;

        let result = read_loop(
            || {
                reads += 1;
                if reads == 3 {
                    stop.store(true, Ordering::SeqCst);
                }
                let header = MavHeader {
                    system_id: 1,
                    component_id: 1,
                    sequence: reads as u8,
                };
                Ok((header, companion_heartbeat()))
            },
            &tx,
            &stop,
        );

        assert!(result.is_ok());
        assert_eq!(reads, 3);
        // The read that raced the stop is dropped
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reader_error_ends_loop() {
        let (tx, _rx) = broadcast::channel(16);
        let stop = AtomicBool::new(false);
        let result = read_loop(
            || Err(MessageReadError::Io(std::io::ErrorKind::ConnectionReset.into())),
            &tx,
            &stop,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_session_teardown_joins_idle_reader() {
        let (tx, _rx) = broadcast::channel(16);
        let stop = Arc::new(AtomicBool::new(false));
        let mut reader = {
            let stop = stop.clone();
            tokio::task::spawn_blocking(move || read_loop(|| Err(would_block()), &tx, &stop))
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        stop_reader(&stop, &mut reader).await;
        assert!(reader.is_finished());
    }
}
