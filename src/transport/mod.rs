//! Operator transport
//!
//! Length-prefixed protobuf envelopes over TCP: operators call the command
//! services and stream velocity vectors, the bridge fans acknowledgments
//! and status out to every session.

pub mod publisher;
pub mod server;

pub use publisher::BroadcastPublisher;
pub use server::{handle_inbound, OperatorServer, SessionTracker};
pub use bridge_shared::stream::{write_envelope, FrameReader};
