use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::capture::SourceInfo;
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::stream::ConnectionInfo;
use crate::video::encoder::EncoderInfo;

// ============================================================================
// Health
// ============================================================================

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub clients: usize,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        clients: state.clients.load().len(),
    })
}

// ============================================================================
// Codecs & Sources
// ============================================================================

#[derive(Serialize)]
pub struct CodecsResponse {
    /// Codec used when a client does not choose one
    pub default: String,
    pub codecs: Vec<EncoderInfo>,
}

pub async fn list_codecs(State(state): State<Arc<AppState>>) -> Json<CodecsResponse> {
    Json(CodecsResponse {
        default: state.config.get().stream.codec.clone(),
        codecs: state.registry.list(),
    })
}

pub async fn list_sources(State(state): State<Arc<AppState>>) -> Json<Vec<SourceInfo>> {
    let mut sources = state.host.sources();
    sources.sort_by_key(|s| s.handle);
    Json(sources)
}

// ============================================================================
// Clients
// ============================================================================

pub async fn list_clients(State(state): State<Arc<AppState>>) -> Json<Vec<ConnectionInfo>> {
    Json(state.clients.load().to_vec())
}

pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConnectionInfo>> {
    state
        .clients
        .load()
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("client {}", id)))
}

// ============================================================================
// Config
// ============================================================================

pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<AppConfig> {
    Json(state.config.get().as_ref().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureBinding, PatternHost};
    use crate::config::{CaptureConfig, ConfigStore, SourceConfig};
    use crate::utils::LogThrottler;
    use crate::video::{EncoderRegistry, Resolution};
    use arc_swap::ArcSwap;
    use tokio::sync::mpsc;

    fn state() -> Arc<AppState> {
        let (events, _rx) = mpsc::channel(1);
        let host = PatternHost::from_config(&CaptureConfig {
            sources: vec![SourceConfig::new(9, 16, 16, 3), SourceConfig::new(2, 8, 8, 4)],
            ..Default::default()
        });
        AppState::new(
            ConfigStore::in_memory(AppConfig::default()).unwrap(),
            Arc::new(EncoderRegistry::with_builtin()),
            Arc::new(host),
            events,
            Arc::new(ArcSwap::from_pointee(Vec::new())),
            Arc::new(LogThrottler::default()),
        )
    }

    fn info(id: Uuid) -> ConnectionInfo {
        ConnectionInfo {
            id,
            client_id: Some(3),
            binding: Some(CaptureBinding::new(9)),
            codec: "mjpeg".to_string(),
            stream_open: true,
            resolution: Some(Resolution::new(16, 16)),
            frames_captured: 5,
            packets_sent: 5,
            bytes_sent: 1000,
            packets_dropped: 0,
            connected_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_health_and_codecs() {
        let state = state();
        let Json(health) = health_check(State(state.clone())).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.clients, 0);

        let Json(codecs) = list_codecs(State(state)).await;
        assert_eq!(codecs.default, "mjpeg");
        assert!(codecs.codecs.iter().any(|c| c.name == "mjpeg"));
        assert!(codecs.codecs.iter().any(|c| c.name == "rawvideo"));
    }

    #[tokio::test]
    async fn test_sources_are_sorted() {
        let Json(sources) = list_sources(State(state())).await;
        assert_eq!(sources.iter().map(|s| s.handle).collect::<Vec<_>>(), vec![2, 9]);
    }

    #[tokio::test]
    async fn test_clients_come_from_snapshot() {
        let state = state();
        let id = Uuid::new_v4();
        state.clients.store(Arc::new(vec![info(id)]));

        let Json(clients) = list_clients(State(state.clone())).await;
        assert_eq!(clients.len(), 1);

        let Json(client) = get_client(State(state.clone()), Path(id)).await.unwrap();
        assert_eq!(client.client_id, Some(3));

        let err = get_client(State(state), Path(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
