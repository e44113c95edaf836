//! Heartbeat Module
//!
//! Wire protocol and transport for the inter-node heartbeat.

pub mod protocol;
pub mod transport;

pub use protocol::{decode_frame, encode_frame, FrameHeader, HeartbeatMessage};
pub use transport::{HeartbeatLink, UdpLink};
