//! Connection registry and server loop
//!
//! The server owns every `ClientConnection`. All mutation (accept, dispatch
//! of transport events, tick, sweep) happens on the single task running
//! `Server::run`, so connections need no locking. HTTP handlers observe the
//! registry only through the published snapshot.

use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::{ClientConnection, ClientContext, ConnectionInfo};
use super::control::Notice;
use super::transport::{ConnectionId, Transport, TransportEvent, TransportEventSink};
use crate::error::{AppError, Result};

/// Shared, lock-free view of the live connections
pub type ClientsSnapshot = Arc<ArcSwap<Vec<ConnectionInfo>>>;

pub struct Server {
    ctx: Arc<ClientContext>,
    connections: HashMap<ConnectionId, ClientConnection>,
    /// Set by `shutdown`; no connection is accepted afterwards
    quiescing: bool,
    /// 0 = unlimited
    max_clients: usize,
    tick_interval: Duration,
    snapshot: ClientsSnapshot,
}

impl Server {
    pub fn new(ctx: Arc<ClientContext>, max_clients: usize) -> Self {
        let tick_interval = ctx.settings.tick_interval;
        Self {
            ctx,
            connections: HashMap::new(),
            quiescing: false,
            max_clients,
            tick_interval,
            snapshot: Arc::new(ArcSwap::from_pointee(Vec::new())),
        }
    }

    /// Handle HTTP handlers read connection info from
    pub fn snapshot(&self) -> ClientsSnapshot {
        self.snapshot.clone()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn is_quiescing(&self) -> bool {
        self.quiescing
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&ClientConnection> {
        self.connections.get(id)
    }

    /// Register a new connection for `transport`
    pub fn accept(&mut self, id: ConnectionId, transport: Arc<dyn Transport>) -> Result<()> {
        if self.quiescing {
            transport.close();
            return Err(AppError::Internal("server is shutting down".to_string()));
        }
        if self.max_clients > 0 && self.live_count() >= self.max_clients {
            let _ = transport.send_text(Notice::Error("too many clients".to_string()).to_text());
            transport.close();
            return Err(AppError::Internal(format!(
                "client limit of {} reached",
                self.max_clients
            )));
        }
        if self.connections.contains_key(&id) {
            return Err(AppError::Internal(format!("duplicate connection id {}", id)));
        }

        self.connections
            .insert(id, ClientConnection::new(id, transport, self.ctx.clone()));
        info!(id = %id, clients = self.connections.len(), "Client connected");
        Ok(())
    }

    /// Route one transport event to its connection
    pub fn dispatch(&mut self, event: TransportEvent) {
        if let TransportEvent::Opened { id, transport } = event {
            if let Err(e) = self.accept(id, transport) {
                warn!(id = %id, "Rejected connection: {}", e);
            }
            return;
        }

        let id = event.id();
        let Some(connection) = self.connections.get_mut(&id) else {
            debug!(id = %id, "Event for unknown connection: {:?}", event);
            return;
        };

        match event {
            TransportEvent::Text { payload, .. } => connection.on_message(&payload),
            TransportEvent::Binary { payload, .. } => connection.on_binary(&payload),
            TransportEvent::Closed { .. } => connection.on_close(),
            TransportEvent::Failed { reason, .. } => connection.on_fail(&reason),
            TransportEvent::Opened { .. } => {}
        }
    }

    /// Run one pump pass over every connection
    pub fn tick_all(&mut self) {
        for connection in self.connections.values_mut() {
            connection.tick();
        }
    }

    /// Drop closed connections, returning how many were removed
    pub fn sweep(&mut self) -> usize {
        let before = self.connections.len();
        self.connections.retain(|id, connection| {
            let keep = !connection.is_closed();
            if !keep {
                debug!(id = %id, "Sweeping closed connection");
            }
            keep
        });
        let removed = before - self.connections.len();
        if removed > 0 {
            info!(removed, clients = self.connections.len(), "Swept closed connections");
        }
        removed
    }

    /// Publish connection info for HTTP handlers
    pub fn publish_snapshot(&self) {
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .values()
            .filter(|c| !c.is_closed())
            .map(|c| c.info())
            .collect();
        infos.sort_by_key(|i| i.id);
        self.snapshot.store(Arc::new(infos));
    }

    /// Stop accepting, flush and close every connection
    pub fn shutdown(&mut self) {
        if self.quiescing {
            return;
        }
        self.quiescing = true;
        info!(clients = self.connections.len(), "Shutting down stream server");

        for connection in self.connections.values_mut() {
            connection.close_stream();
            connection.transport().close();
        }
        self.connections.clear();
        self.publish_snapshot();
    }

    fn live_count(&self) -> usize {
        self.connections.values().filter(|c| !c.is_closed()).count()
    }

    /// Drive the server until `token` is cancelled or the event channel ends
    ///
    /// Each pass either handles one transport event or, on the tick, runs
    /// sweep, then `tick_all`, then publishes the snapshot.
    pub async fn run(mut self, mut events: mpsc::Receiver<TransportEvent>, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.tick_interval.as_millis() as u64,
            model = %self.ctx.settings.execution_model,
            "Stream server started"
        );

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                _ = interval.tick() => {
                    self.sweep();
                    self.tick_all();
                    self.publish_snapshot();
                }
            }
        }

        self.shutdown();
        info!("Stream server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}
