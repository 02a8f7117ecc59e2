//! WebSocket streaming
//!
//! # Components
//!
//! - `Server` - owns every connection and drives the tick loop
//! - `ClientConnection` - one subscriber: control messages, capture binding,
//!   stream session lifecycle
//! - `Transport` - non-blocking outbound queue to one socket
//! - `ControlCommand` / `Notice` - the text control protocol

pub mod client;
pub mod control;
pub mod server;
pub mod transport;

pub use client::{ClientConnection, ClientContext, ClientSettings, ConnectionInfo};
pub use control::{ControlCommand, Notice};
pub use server::{ClientsSnapshot, Server};
pub use transport::{
    ChannelTransport, ConnectionId, Outbound, Transport, TransportEvent, TransportEventSink,
    TransportSink, TransportStats,
};
