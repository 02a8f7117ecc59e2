//! Client connection - one remote subscriber and its stream
//!
//! Lifecycle:
//! - created when the transport reports a new socket
//! - a control message binds it to a capture source (`open_stream`)
//! - the stream session opens on the first captured frame, because only
//!   then is the geometry known, and reopens whenever the geometry changes
//! - `resize` / `options` messages run `close_stream` + `open_stream`
//! - transport close, failure or a failed write tears everything down
//!
//! With the `tick` execution model the session lives inline and is driven
//! by `tick()`. With `worker` it lives on an `EncodeWorker` thread and
//! `tick()` only captures and hands frames over. A connection never uses
//! both.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::control::{ControlCommand, Notice};
use super::transport::{ConnectionId, Transport, TransportEventSink, TransportSink, TransportStats};
use crate::capture::{resolve_binding, CaptureBinding, CaptureHost};
use crate::config::{ExecutionModel, StreamConfig};
use crate::error::{AppError, Result};
use crate::utils::LogThrottler;
use crate::video::{
    EncodeWorker, EncoderRegistry, EncodingOptions, Resolution, StreamFormat, StreamSession,
    VideoFrame,
};
use crate::warn_throttled;

/// Pipeline settings shared by every connection
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Codec used until a client selects another one
    pub codec: String,
    /// Options layered beneath client options
    pub default_options: EncodingOptions,
    pub execution_model: ExecutionModel,
    /// Encode period for worker threads
    pub tick_interval: Duration,
}

impl ClientSettings {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            codec: config.codec.clone(),
            default_options: config.default_options.clone(),
            execution_model: config.execution_model,
            tick_interval: config.tick_interval(),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}

/// Collaborators every connection needs
pub struct ClientContext {
    pub registry: Arc<EncoderRegistry>,
    pub host: Arc<dyn CaptureHost>,
    pub settings: ClientSettings,
    pub throttler: Arc<LogThrottler>,
}

/// Where this connection's stream session lives
enum Pipeline {
    Inline(StreamSession),
    Worker(Option<EncodeWorker>),
}

/// Snapshot of a connection for the HTTP API
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub client_id: Option<i64>,
    pub binding: Option<CaptureBinding>,
    pub codec: String,
    pub stream_open: bool,
    pub resolution: Option<Resolution>,
    pub frames_captured: u64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub packets_dropped: u64,
    pub connected_secs: u64,
}

/// One remote subscriber
pub struct ClientConnection {
    id: ConnectionId,
    /// Correlation id chosen by the client
    client_id: Option<i64>,
    transport: Arc<dyn Transport>,
    sink: TransportSink,
    stats: Arc<TransportStats>,
    ctx: Arc<ClientContext>,
    binding: Option<CaptureBinding>,
    capture_enabled: bool,
    closed: bool,
    codec: String,
    /// Client options (without `codec`), accumulated across messages
    options: EncodingOptions,
    pipeline: Pipeline,
    /// Format whose open failed; not retried until the format changes or
    /// the client sends a new control message
    failed_format: Option<StreamFormat>,
    frames_captured: u64,
    connected_at: Instant,
}

impl ClientConnection {
    pub fn new(id: ConnectionId, transport: Arc<dyn Transport>, ctx: Arc<ClientContext>) -> Self {
        let stats = Arc::new(TransportStats::default());
        let pipeline = match ctx.settings.execution_model {
            ExecutionModel::Tick => Pipeline::Inline(StreamSession::new(
                ctx.registry.clone(),
                ctx.settings.default_options.clone(),
            )),
            ExecutionModel::Worker => Pipeline::Worker(None),
        };

        Self {
            id,
            client_id: None,
            sink: TransportSink::new(transport.clone(), stats.clone()),
            transport,
            stats,
            codec: ctx.settings.codec.clone(),
            ctx,
            binding: None,
            capture_enabled: false,
            closed: false,
            options: EncodingOptions::new(),
            pipeline,
            failed_format: None,
            frames_captured: 0,
            connected_at: Instant::now(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn client_id(&self) -> Option<i64> {
        self.client_id
    }

    pub fn binding(&self) -> Option<&CaptureBinding> {
        self.binding.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn options(&self) -> &EncodingOptions {
        &self.options
    }

    /// Whether an encoder session is currently open
    pub fn is_stream_open(&self) -> bool {
        match &self.pipeline {
            Pipeline::Inline(session) => session.is_open(),
            Pipeline::Worker(worker) => worker.as_ref().is_some_and(|w| w.is_stream_open()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn info(&self) -> ConnectionInfo {
        let resolution = match &self.pipeline {
            Pipeline::Inline(session) => session.encoded_resolution(),
            Pipeline::Worker(worker) => worker.as_ref().and_then(|w| w.encoded_resolution()),
        };
        ConnectionInfo {
            id: self.id,
            client_id: self.client_id,
            binding: self.binding.clone(),
            codec: self.codec.clone(),
            stream_open: self.is_stream_open(),
            resolution,
            frames_captured: self.frames_captured,
            packets_sent: self.stats.packets_sent(),
            bytes_sent: self.stats.bytes_sent(),
            packets_dropped: self.transport.dropped(),
            connected_secs: self.connected_at.elapsed().as_secs(),
        }
    }

    /// Parse and apply one text control message
    ///
    /// Malformed messages are answered with an error notice; the
    /// connection stays open and its stream state is untouched.
    pub fn handle_control_message(&mut self, payload: &str) {
        if self.closed {
            return;
        }
        debug!(id = %self.id, "Control message: {}", payload);

        match ControlCommand::parse(payload) {
            Ok(command) => self.apply(command),
            Err(e) => self.notify(Notice::Error(e.to_string())),
        }
    }

    fn apply(&mut self, command: ControlCommand) {
        self.failed_format = None;

        match command {
            ControlCommand::Open {
                handle,
                id,
                options,
            } => {
                if id.is_some() {
                    self.client_id = id;
                }
                let binding = match resolve_binding(self.ctx.host.as_ref(), handle) {
                    Ok(binding) => binding,
                    Err(e) => {
                        self.notify(Notice::Error(e.to_string()));
                        return;
                    }
                };
                if let Some(options) = options {
                    self.merge_options(options);
                }
                self.close_stream();
                self.open_stream(binding);
            }
            ControlCommand::Resize => {
                let Some(binding) = self.binding.clone() else {
                    self.notify(Notice::Warning("resize requested without a bound source".into()));
                    return;
                };
                self.close_stream();
                self.open_stream(binding);
                self.notify(Notice::ResizeDone);
            }
            ControlCommand::Options { options } => {
                self.merge_options(options);
                if let Some(binding) = self.binding.clone() {
                    self.close_stream();
                    self.open_stream(binding);
                }
                self.notify(Notice::ResizeDone);
            }
        }
    }

    fn merge_options(&mut self, mut options: EncodingOptions) {
        if let Some(codec) = options.take_codec() {
            info!(id = %self.id, "Client selected codec {}", codec);
            self.codec = codec;
        }
        self.options.merge(&options.normalized());
    }

    /// Bind to a capture source
    ///
    /// The session itself opens on the first captured frame.
    pub fn open_stream(&mut self, binding: CaptureBinding) {
        if self.closed {
            return;
        }
        info!(id = %self.id, binding = %binding, codec = %self.codec, "Opening stream");

        if self.ctx.host.is_valid(&binding) {
            self.ctx.host.enable_capture(&binding);
            self.capture_enabled = true;
        }
        self.binding = Some(binding);

        if matches!(self.pipeline, Pipeline::Worker(_)) {
            let session = StreamSession::new(
                self.ctx.registry.clone(),
                self.ctx.settings.default_options.clone(),
            );
            match EncodeWorker::spawn(
                &self.id.simple().to_string()[..8],
                session,
                self.codec.clone(),
                self.options.clone(),
                self.sink.clone(),
                self.ctx.settings.tick_interval,
            ) {
                Ok(worker) => self.pipeline = Pipeline::Worker(Some(worker)),
                Err(e) => {
                    error!(id = %self.id, "Failed to start encode worker: {}", e);
                    self.notify(Notice::Error(e.to_string()));
                }
            }
        }
    }

    /// Unbind and close the session, flushing buffered packets. Idempotent.
    pub fn close_stream(&mut self) {
        if let Some(binding) = self.binding.take() {
            if self.capture_enabled {
                if self.ctx.host.is_valid(&binding) {
                    self.ctx.host.disable_capture(&binding);
                } else {
                    debug!(id = %self.id, binding = %binding, "Source already gone, skipping disable");
                }
                self.capture_enabled = false;
            }
            info!(id = %self.id, binding = %binding, "Closing stream");
        }

        match &mut self.pipeline {
            Pipeline::Inline(session) => session.close(&mut self.sink),
            Pipeline::Worker(slot) => {
                if let Some(mut worker) = slot.take() {
                    worker.stop();
                    for e in worker.take_errors() {
                        debug!(id = %self.id, "Encode worker error during shutdown: {}", e);
                    }
                }
            }
        }
    }

    /// Pull at most one frame from the bound source and encode it
    pub fn tick(&mut self) {
        if self.closed {
            return;
        }

        let errors = match &self.pipeline {
            Pipeline::Worker(Some(worker)) => worker.take_errors(),
            _ => Vec::new(),
        };
        for e in errors {
            self.handle_pipeline_error(e);
        }
        if self.closed {
            return;
        }

        let Some(binding) = self.binding.as_ref() else {
            return;
        };
        let host = self.ctx.host.clone();
        if !host.is_valid(binding) {
            return;
        }
        if !self.capture_enabled {
            host.enable_capture(binding);
            self.capture_enabled = true;
        }
        let Some(frame) = host.capture(binding) else {
            return;
        };
        self.frames_captured += 1;

        let result = match &mut self.pipeline {
            Pipeline::Inline(session) => encode_inline(
                session,
                &frame,
                &self.codec,
                &self.options,
                &mut self.failed_format,
                &mut self.sink,
            ),
            Pipeline::Worker(Some(worker)) => {
                worker.submit(frame);
                Ok(())
            }
            Pipeline::Worker(None) => Ok(()),
        };

        if let Err(e) = result {
            self.handle_pipeline_error(e);
        }
    }

    fn handle_pipeline_error(&mut self, e: AppError) {
        match e {
            e if e.is_transport() => {
                warn!(id = %self.id, "{}, closing connection", e);
                self.teardown();
            }
            e if e.is_frame_local() => {
                warn_throttled!(
                    self.ctx.throttler,
                    &format!("frame:{}", self.id),
                    "Dropping frame for {}: {}",
                    self.id,
                    e
                );
            }
            e => self.notify(Notice::Error(e.to_string())),
        }
    }

    /// Send a notice to the client and mirror it to the log
    fn notify(&mut self, notice: Notice) {
        match &notice {
            Notice::Error(msg) => warn!(id = %self.id, "{}", msg),
            Notice::Warning(msg) => warn!(id = %self.id, "{}", msg),
            Notice::Info(msg) => info!(id = %self.id, "{}", msg),
            Notice::ResizeDone => debug!(id = %self.id, "Reconfiguration done"),
        }
        if let Err(e) = self.transport.send_text(notice.to_text()) {
            if !self.closed {
                warn!(id = %self.id, "{}, closing connection", e);
                self.teardown();
            }
        }
    }

    /// The transport reported an orderly close
    pub fn handle_close(&mut self) {
        info!(id = %self.id, "Client closed connection");
        self.teardown();
    }

    /// The transport reported an error
    pub fn handle_fail(&mut self, reason: &str) {
        warn!(id = %self.id, "Client connection failed: {}", reason);
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.close_stream();
        self.closed = true;
        self.transport.close();
        self.ctx.throttler.clear_suffix(&self.id.to_string());
    }
}

impl TransportEventSink for ClientConnection {
    fn on_message(&mut self, payload: &str) {
        self.handle_control_message(payload);
    }

    fn on_binary(&mut self, payload: &[u8]) {
        debug!(id = %self.id, "Ignoring {} byte binary message", payload.len());
    }

    fn on_close(&mut self) {
        self.handle_close();
    }

    fn on_fail(&mut self, reason: &str) {
        self.handle_fail(reason);
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.close_stream();
    }
}

/// Open (or reopen on geometry change) and push one frame
fn encode_inline(
    session: &mut StreamSession,
    frame: &VideoFrame,
    codec: &str,
    options: &EncodingOptions,
    failed_format: &mut Option<StreamFormat>,
    sink: &mut TransportSink,
) -> Result<()> {
    if session.format() != Some(frame.format) {
        if *failed_format == Some(frame.format) {
            return Ok(());
        }
        if session.is_open() {
            debug!("Source changed to {}, reopening stream session", frame.format);
            session.close(sink);
        }
        if let Err(e) = session.open(frame.format, codec, options) {
            *failed_format = Some(frame.format);
            return Err(e);
        }
        *failed_format = None;
    }

    session.push_frame(frame.data(), frame.format, sink)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::transport::Outbound;
    use crate::test_support::{registry_with, RecordingFactory, RecordingTransport, ScriptedHost};
    use uuid::Uuid;

    struct Fixture {
        factory: RecordingFactory,
        host: Arc<ScriptedHost>,
        transport: Arc<RecordingTransport>,
        ctx: Arc<ClientContext>,
    }

    impl Fixture {
        fn new(model: ExecutionModel) -> Self {
            let factory = RecordingFactory::new("stub");
            let host = Arc::new(ScriptedHost::new());
            host.add_source(100, StreamFormat::new(64, 48, 4), true);
            host.add_source(7, StreamFormat::new(32, 32, 3), false);
            let ctx = Arc::new(ClientContext {
                registry: registry_with(&factory),
                host: host.clone(),
                settings: ClientSettings {
                    codec: "stub".to_string(),
                    default_options: EncodingOptions::new(),
                    execution_model: model,
                    tick_interval: Duration::from_millis(1),
                },
                throttler: Arc::new(LogThrottler::default()),
            });
            Self {
                factory,
                host,
                transport: Arc::new(RecordingTransport::new()),
                ctx,
            }
        }

        fn connect(&self) -> ClientConnection {
            ClientConnection::new(Uuid::new_v4(), self.transport.clone(), self.ctx.clone())
        }

        fn connect_with(&self, transport: Arc<RecordingTransport>) -> ClientConnection {
            ClientConnection::new(Uuid::new_v4(), transport, self.ctx.clone())
        }
    }

    #[test]
    fn test_default_handle_binds_primary() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 1, "id": 42}"#);

        assert_eq!(client.binding(), Some(&CaptureBinding::new(100)));
        assert_eq!(client.client_id(), Some(42));
        assert_eq!(fx.host.enabled_count(100), 1);
        // Opening is deferred until a frame is captured
        assert!(!client.is_stream_open());
        assert!(fx.factory.configured_resolutions().is_empty());

        client.tick();
        assert!(client.is_stream_open());
        assert_eq!(fx.factory.configured_resolutions(), vec![Resolution::new(64, 48)]);
        assert_eq!(fx.transport.binary_count(), 1);
    }

    #[test]
    fn test_malformed_message_keeps_connection() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message("{not json");

        assert!(!client.is_closed());
        assert!(client.binding().is_none());
        let texts = fx.transport.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("error: "));
    }

    #[test]
    fn test_missing_handle_is_reported() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"id": 1}"#);

        assert!(client.binding().is_none());
        assert!(fx.transport.texts()[0].starts_with("error: Invalid capture binding"));
    }

    #[test]
    fn test_resize_reopens_with_new_geometry() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 7}"#);
        client.tick();

        fx.host.set_format(7, StreamFormat::new(40, 30, 3));
        client.handle_control_message(r#"{"message": "resize"}"#);
        assert_eq!(fx.transport.texts(), vec!["resize_done".to_string()]);
        assert_eq!(fx.host.enabled_count(7), 1);
        assert!(!client.is_stream_open());

        client.tick();
        client.tick();
        assert_eq!(
            fx.factory.configured_resolutions(),
            vec![Resolution::new(32, 32), Resolution::new(40, 30)]
        );
        // Every packet after the resize carries the new geometry only
        let packets = fx.transport.binaries();
        assert!(packets[1..].iter().all(|p| p.starts_with(b"40x30#")));
    }

    #[test]
    fn test_source_resize_without_message() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 100}"#);
        client.tick();

        fx.host.set_format(100, StreamFormat::new(81, 61, 4));
        client.tick();
        assert_eq!(
            fx.factory.configured_resolutions(),
            vec![Resolution::new(64, 48), Resolution::new(82, 62)]
        );
        assert_eq!(fx.factory.submitted(), vec![0, 0]);
    }

    #[test]
    fn test_depth_change_reopens() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 100}"#);
        client.tick();

        fx.host.set_format(100, StreamFormat::new(64, 48, 3));
        client.tick();
        assert_eq!(fx.factory.configured_resolutions().len(), 2);
    }

    #[test]
    fn test_options_apply_from_first_frame() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 1}"#);
        client.tick();
        client.tick();

        client.handle_control_message(r#"{"options": {"bit_rate": "800000"}}"#);
        assert_eq!(fx.transport.texts(), vec!["resize_done".to_string()]);
        client.tick();

        assert_eq!(fx.factory.configured_bitrates(), vec![400_000, 800_000]);
        assert_eq!(client.options().get("b"), Some("800000"));
        // The reopened session starts counting from zero
        assert_eq!(fx.factory.submitted(), vec![0, 1, 0]);
    }

    #[test]
    fn test_options_select_codec() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 1, "options": {"codec": "mjpeg", "q": "50"}}"#);
        assert_eq!(client.codec(), "mjpeg");
        assert!(!client.options().contains_key("codec"));

        client.tick();
        assert!(client.is_stream_open());
        assert!(fx.factory.configured_resolutions().is_empty());
        let packet = &fx.transport.binaries()[0];
        assert_eq!(&packet[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_unknown_codec_reported_once() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 1, "options": {"codec": "nonexistent_codec"}}"#);
        client.tick();
        client.tick();
        client.tick();

        assert!(!client.is_closed());
        assert!(!client.is_stream_open());
        let texts = fx.transport.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("error: Codec not found"));

        // A corrected request recovers
        client.handle_control_message(r#"{"message": "options", "options": {"codec": "stub"}}"#);
        client.tick();
        assert!(client.is_stream_open());
    }

    #[test]
    fn test_close_stream_is_idempotent() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 1}"#);
        client.tick();

        client.close_stream();
        client.close_stream();
        assert_eq!(fx.host.disable_calls(100), 1);
        assert_eq!(fx.host.enabled_count(100), 0);
        assert_eq!(fx.factory.close_count(), 1);
        assert!(client.binding().is_none());
    }

    #[test]
    fn test_source_disappears_mid_stream() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 7}"#);
        client.tick();
        let sent = fx.transport.binary_count();

        fx.host.remove_source(7);
        client.tick();
        client.tick();
        assert_eq!(fx.transport.binary_count(), sent);
        assert!(!client.is_closed());

        client.handle_close();
        assert!(client.is_closed());
        assert_eq!(fx.host.disable_calls(7), 0);
        assert_eq!(fx.factory.close_count(), 1);
    }

    #[test]
    fn test_bad_frame_is_dropped() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 100}"#);
        client.tick();

        fx.host.corrupt_next_frame(100);
        client.tick();
        client.tick();

        assert!(!client.is_closed());
        assert_eq!(fx.factory.submitted(), vec![0, 1]);
        assert!(fx.transport.texts().is_empty());
    }

    #[test]
    fn test_write_failure_tears_down() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 1}"#);
        client.tick();

        fx.transport.fail_writes();
        client.tick();
        assert!(client.is_closed());
        assert_eq!(fx.host.enabled_count(100), 0);
        assert!(fx.transport.is_closed());

        // Closed connections ignore everything
        client.handle_control_message(r#"{"handle": 1}"#);
        client.tick();
        assert!(client.binding().is_none());
    }

    #[test]
    fn test_clients_are_independent() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let second = Arc::new(RecordingTransport::new());
        let mut a = fx.connect();
        let mut b = fx.connect_with(second.clone());
        a.handle_control_message(r#"{"handle": 1}"#);
        b.handle_control_message(r#"{"handle": 1}"#);
        a.tick();
        b.tick();
        assert_eq!(fx.host.enabled_count(100), 2);

        a.handle_control_message(r#"{"options": {"b": "2M"}}"#);
        a.tick();
        b.tick();

        assert_eq!(fx.factory.configured_bitrates(), vec![400_000, 400_000, 2_000_000]);
        assert_eq!(b.options().get("b"), None);
        assert_eq!(fx.transport.binary_count(), 2);
        assert_eq!(second.binary_count(), 2);
    }

    #[test]
    fn test_binary_messages_are_ignored() {
        let fx = Fixture::new(ExecutionModel::Tick);
        let mut client = fx.connect();
        client.on_binary(&[1, 2, 3]);
        assert!(!client.is_closed());
        assert!(fx.transport.sent().is_empty());
    }

    #[test]
    fn test_worker_model_streams() {
        let fx = Fixture::new(ExecutionModel::Worker);
        let mut client = fx.connect();
        client.handle_control_message(r#"{"handle": 1}"#);

        let deadline = Instant::now() + Duration::from_secs(5);
        while fx.transport.binary_count() < 3 && Instant::now() < deadline {
            client.tick();
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(fx.transport.binary_count() >= 3);
        assert!(client.is_stream_open());
        let info = client.info();
        assert!(info.stream_open);
        assert_eq!(info.resolution, Some(Resolution::new(64, 48)));

        client.handle_fail("reset by peer");
        assert!(client.is_closed());
        assert_eq!(fx.factory.eos_count(), 1);
        assert_eq!(fx.host.enabled_count(100), 0);
        assert!(fx
            .transport
            .sent()
            .iter()
            .all(|m| !matches!(m, Outbound::Text(t) if t.starts_with("error"))));
    }
}
