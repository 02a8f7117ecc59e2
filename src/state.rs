use std::sync::Arc;
use tokio::sync::mpsc;

use crate::capture::CaptureHost;
use crate::config::ConfigStore;
use crate::stream::{ClientsSnapshot, TransportEvent};
use crate::utils::LogThrottler;
use crate::video::EncoderRegistry;

/// Application-wide state shared across handlers
///
/// Handlers never touch connections directly. Sockets talk to the server
/// loop through `events`; connection listings come from `clients`, which
/// the loop republishes after every sweep.
pub struct AppState {
    /// Configuration store
    pub config: ConfigStore,
    /// Encoder backends available to clients
    pub registry: Arc<EncoderRegistry>,
    /// Frame producer
    pub host: Arc<dyn CaptureHost>,
    /// Inbound socket events for the server loop
    pub events: mpsc::Sender<TransportEvent>,
    /// Last published connection snapshot
    pub clients: ClientsSnapshot,
    /// Shared log throttler (per-connection send warnings)
    pub throttler: Arc<LogThrottler>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ConfigStore,
        registry: Arc<EncoderRegistry>,
        host: Arc<dyn CaptureHost>,
        events: mpsc::Sender<TransportEvent>,
        clients: ClientsSnapshot,
        throttler: Arc<LogThrottler>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry,
            host,
            events,
            clients,
            throttler,
        })
    }

    /// Outbound queue length for new connections
    pub fn send_queue_capacity(&self) -> usize {
        self.config.get().stream.send_queue_capacity
    }
}
