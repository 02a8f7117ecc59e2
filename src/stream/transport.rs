//! Transport abstraction between the server loop and client sockets
//!
//! The socket itself is owned by the web layer. Connections only hold a
//! `Transport` handle whose sends never block: each outbound message is
//! enqueued on a bounded per-connection queue drained by the socket's
//! writer task. Inbound traffic reaches the server loop as `TransportEvent`s.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::video::{EncodedPacket, PacketSink};
use crate::warn_throttled;

/// Server-assigned connection identifier
pub type ConnectionId = Uuid;

/// Message queued for a client
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
    Close,
}

/// Outbound half of a client connection
pub trait Transport: Send + Sync {
    /// Queue a text message
    fn send_text(&self, text: String) -> Result<()>;

    /// Queue a binary message
    fn send_binary(&self, data: Bytes) -> Result<()>;

    /// Ask the transport to close the socket
    fn close(&self);

    /// Messages discarded because the client was not keeping up
    fn dropped(&self) -> u64 {
        0
    }
}

/// Inbound event delivered to the server loop
pub enum TransportEvent {
    Opened {
        id: ConnectionId,
        transport: Arc<dyn Transport>,
    },
    Text {
        id: ConnectionId,
        payload: String,
    },
    Binary {
        id: ConnectionId,
        payload: Bytes,
    },
    Closed {
        id: ConnectionId,
    },
    Failed {
        id: ConnectionId,
        reason: String,
    },
}

impl TransportEvent {
    pub fn id(&self) -> ConnectionId {
        match self {
            TransportEvent::Opened { id, .. }
            | TransportEvent::Text { id, .. }
            | TransportEvent::Binary { id, .. }
            | TransportEvent::Closed { id }
            | TransportEvent::Failed { id, .. } => *id,
        }
    }
}

impl std::fmt::Debug for TransportEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEvent::Opened { id, .. } => write!(f, "Opened({})", id),
            TransportEvent::Text { id, payload } => write!(f, "Text({}, {} bytes)", id, payload.len()),
            TransportEvent::Binary { id, payload } => {
                write!(f, "Binary({}, {} bytes)", id, payload.len())
            }
            TransportEvent::Closed { id } => write!(f, "Closed({})", id),
            TransportEvent::Failed { id, reason } => write!(f, "Failed({}, {})", id, reason),
        }
    }
}

/// Receiver of per-connection transport callbacks
pub trait TransportEventSink {
    fn on_message(&mut self, payload: &str);
    fn on_binary(&mut self, payload: &[u8]);
    fn on_close(&mut self);
    fn on_fail(&mut self, reason: &str);
}

/// Transport backed by a bounded tokio channel
pub struct ChannelTransport {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    throttler: Arc<LogThrottler>,
    dropped: AtomicU64,
    closing: AtomicBool,
}

impl ChannelTransport {
    /// Create a transport and the receiver its writer task drains
    pub fn channel(
        id: ConnectionId,
        capacity: usize,
        throttler: Arc<LogThrottler>,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id,
                tx,
                throttler,
                dropped: AtomicU64::new(0),
                closing: AtomicBool::new(false),
            },
            rx,
        )
    }

    fn enqueue(&self, message: Outbound) -> Result<()> {
        if self.closing.load(Ordering::Acquire) {
            return Err(AppError::TransportWriteFailed(format!(
                "connection {} is closing",
                self.id
            )));
        }
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn_throttled!(
                    self.throttler,
                    &format!("send_queue_full:{}", self.id),
                    "Client {} is not keeping up, dropped {} messages so far",
                    self.id,
                    dropped
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(AppError::TransportWriteFailed(format!(
                "connection {} send queue closed",
                self.id
            ))),
        }
    }
}

impl Transport for ChannelTransport {
    fn send_text(&self, text: String) -> Result<()> {
        self.enqueue(Outbound::Text(text))
    }

    fn send_binary(&self, data: Bytes) -> Result<()> {
        self.enqueue(Outbound::Binary(data))
    }

    fn close(&self) {
        if !self.closing.swap(true, Ordering::AcqRel) {
            // Best effort when the queue is full
            let _ = self.tx.try_send(Outbound::Close);
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Per-connection delivery counters
#[derive(Debug, Default)]
pub struct TransportStats {
    pub packets_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
}

impl TransportStats {
    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// Packet sink writing one binary message per encoded packet
#[derive(Clone)]
pub struct TransportSink {
    transport: Arc<dyn Transport>,
    stats: Arc<TransportStats>,
}

impl TransportSink {
    pub fn new(transport: Arc<dyn Transport>, stats: Arc<TransportStats>) -> Self {
        Self { transport, stats }
    }
}

impl PacketSink for TransportSink {
    fn send_packet(&mut self, packet: EncodedPacket) -> Result<()> {
        let len = packet.len() as u64;
        self.transport.send_binary(packet.data)?;
        self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_sent.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }
}
