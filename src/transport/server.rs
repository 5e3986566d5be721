//! Operator TCP server
//!
//! Every accepted connection is an operator session: its requests and
//! velocity vectors drive the engine, and it receives every acknowledgment
//! and status frame the engine publishes.

use super::publisher::BroadcastPublisher;
use crate::bridge::FlightBridge;
use crate::watchdog::LinkProbe;
use anyhow::Result;
use bridge_shared::stream::{write_envelope, FrameReader};
use bridge_shared::{envelope::Payload, CommandResponse, Envelope};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// Count of live operator sessions
#[derive(Clone, Default)]
pub struct SessionTracker {
    active: Arc<AtomicUsize>,
}

impl SessionTracker {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn enter(&self) -> SessionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        SessionGuard(self.active.clone())
    }
}

impl LinkProbe for SessionTracker {
    fn is_reachable(&self) -> bool {
        self.active() > 0
    }
}

struct SessionGuard(Arc<AtomicUsize>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct OperatorServer {
    listener: TcpListener,
    bridge: Arc<FlightBridge>,
    publisher: Arc<BroadcastPublisher>,
    sessions: SessionTracker,
}

impl OperatorServer {
    pub async fn bind(
        addr: &str,
        bridge: Arc<FlightBridge>,
        publisher: Arc<BroadcastPublisher>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Operator server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            bridge,
            publisher,
            sessions: SessionTracker::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Live-session counter, e.g. for a [`LinkWatchdog`](crate::watchdog::LinkWatchdog)
    pub fn sessions(&self) -> SessionTracker {
        self.sessions.clone()
    }

    /// Accept sessions until the listener fails
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            info!(%addr, "Operator connected");

            let bridge = self.bridge.clone();
            let publisher = self.publisher.clone();
            let guard = self.sessions.enter();
            tokio::spawn(async move {
                let _guard = guard;
                match serve_session(stream, &bridge, &publisher).await {
                    Ok(()) => info!(%addr, "Operator disconnected"),
                    Err(e) => error!(%addr, error = %e, "Operator session failed"),
                }
            });
        }
    }
}

async fn serve_session(
    stream: TcpStream,
    bridge: &FlightBridge,
    publisher: &BroadcastPublisher,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let (reader, mut writer) = stream.into_split();
    let mut inbound = FrameReader::new(reader);
    let mut outbound = publisher.subscribe();

    loop {
        tokio::select! {
            frame = inbound.recv() => {
                let Some(envelope) = frame? else {
                    return Ok(());
                };
                if let Some(reply) = handle_inbound(bridge, publisher, envelope).await {
                    write_envelope(&mut writer, &reply).await?;
                }
            }

            published = outbound.recv() => match published {
                Ok(envelope) => write_envelope(&mut writer, &envelope).await?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Operator session lagging, frames dropped");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// Apply one inbound envelope to the engine, returning the reply if any
pub async fn handle_inbound(
    bridge: &FlightBridge,
    publisher: &BroadcastPublisher,
    envelope: Envelope,
) -> Option<Envelope> {
    match envelope.payload {
        Some(Payload::Request(request)) => {
            info!(service = %request.service, id = request.request_id, "Service call");
            let response = match bridge.call_service(&request.service).await {
                Ok(()) => CommandResponse::ok(request.request_id),
                Err(e) => {
                    warn!(service = %request.service, error = %e, "Service call failed");
                    CommandResponse::failed(request.request_id, e.to_string())
                }
            };
            Some(Envelope::new(
                publisher.next_sequence(),
                Payload::Response(response),
            ))
        }
        Some(Payload::Velocity(twist)) => {
            if let Err(e) = bridge.apply_velocity(&twist).await {
                debug!(error = %e, "Velocity dropped");
            }
            None
        }
        Some(_) => {
            debug!(seq = envelope.sequence_id, "Ignoring bridge-to-operator frame");
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::EngineSettings;
    use crate::device::{DeviceSlot, SimulatedAircraft};
    use bridge_shared::{CommandRequest, StatusSnapshot, Twist, Vector3};
    use std::time::Duration;
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::time::timeout;

    async fn engine() -> (Arc<FlightBridge>, Arc<BroadcastPublisher>) {
        let slot = Arc::new(DeviceSlot::new());
        slot.attach(Arc::new(SimulatedAircraft::new())).await;
        let publisher = Arc::new(BroadcastPublisher::new());
        let bridge = Arc::new(FlightBridge::new(
            slot,
            publisher.clone(),
            EngineSettings::default(),
        ));
        (bridge, publisher)
    }

    /// Read frames until one matches
    async fn next_matching(
        reader: &mut FrameReader<OwnedReadHalf>,
        pred: impl Fn(&Payload) -> bool,
    ) -> Payload {
        timeout(Duration::from_secs(5), async {
            loop {
                let envelope = reader.recv().await.unwrap().expect("server closed");
                if let Some(payload) = envelope.payload {
                    if pred(&payload) {
                        return payload;
                    }
                }
            }
        })
        .await
        .expect("no matching frame")
    }

    #[tokio::test]
    async fn test_request_response() {
        let (bridge, publisher) = engine().await;
        bridge.start().await;

        let reply = handle_inbound(
            &bridge,
            &publisher,
            Envelope::new(1, Payload::Request(CommandRequest::new(7, "land"))),
        )
        .await;
        match reply.and_then(|e| e.payload) {
            Some(Payload::Response(response)) => {
                assert_eq!(response.request_id, 7);
                assert!(response.ok);
            }
            _ => panic!("expected a response"),
        }
        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_failures_carry_reason() {
        let (bridge, publisher) = engine().await;

        let stopped = handle_inbound(
            &bridge,
            &publisher,
            Envelope::new(1, Payload::Request(CommandRequest::new(1, "takeoff"))),
        )
        .await;
        match stopped.and_then(|e| e.payload) {
            Some(Payload::Response(response)) => {
                assert!(!response.ok);
                assert_eq!(response.error, "flight bridge is stopped");
            }
            _ => panic!("expected a response"),
        }

        bridge.start().await;
        let unknown = handle_inbound(
            &bridge,
            &publisher,
            Envelope::new(2, Payload::Request(CommandRequest::new(2, "flip"))),
        )
        .await;
        match unknown.and_then(|e| e.payload) {
            Some(Payload::Response(response)) => {
                assert!(!response.ok);
                assert!(response.error.contains("/flight_commands/flip"));
            }
            _ => panic!("expected a response"),
        }
        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_velocity_has_no_reply() {
        let (bridge, publisher) = engine().await;
        bridge.start().await;

        let twist = Twist::new(Vector3::new(0.0, 0.0, 1.0), Vector3::default());
        let reply = handle_inbound(&bridge, &publisher, Envelope::new(1, Payload::Velocity(twist))).await;

        assert!(reply.is_none());
        assert_eq!(bridge.controls().snapshot().await.throttle, 1.0);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn test_operator_session_end_to_end() {
        let (bridge, publisher) = engine().await;
        let server = OperatorServer::bind("127.0.0.1:0", bridge.clone(), publisher.clone())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let sessions = server.sessions();
        tokio::spawn(server.run());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = FrameReader::new(reader);

        // Wait for the server to pick the session up
        timeout(Duration::from_secs(5), async {
            while sessions.active() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert!(sessions.is_reachable());
        bridge.start().await;

        let status = next_matching(&mut reader, |p| matches!(p, Payload::Status(_))).await;
        if let Payload::Status(report) = status {
            let snapshot: StatusSnapshot = report.data.parse().unwrap();
            assert!(snapshot.is_connected);
        }

        let request = Envelope::new(1, Payload::Request(CommandRequest::new(11, "takeoff")));
        write_envelope(&mut writer, &request).await.unwrap();

        let response = next_matching(&mut reader, |p| matches!(p, Payload::Response(_))).await;
        if let Payload::Response(response) = response {
            assert_eq!(response.request_id, 11);
            assert!(response.ok);
        }
        next_matching(&mut reader, |p| matches!(p, Payload::Done(_))).await;

        drop(writer);
        drop(reader);
        timeout(Duration::from_secs(5), async {
            while sessions.active() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        bridge.stop().await;
    }
}
