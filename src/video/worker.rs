//! Dedicated encode thread per connection
//!
//! The worker owns its `StreamSession` outright. The capture side hands
//! frames over through a single-slot mailbox: a newer frame replaces an
//! unconsumed older one, so a slow encoder never builds a backlog. Errors
//! are reported back over a channel and handled by the owning connection.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::encoder::EncodingOptions;
use super::format::{Resolution, StreamFormat};
use super::frame::VideoFrame;
use super::session::{PacketSink, StreamSession};
use crate::error::{AppError, Result};

/// Latest captured frame, last writer wins
#[derive(Default)]
pub struct LatestFrame {
    slot: Mutex<Option<VideoFrame>>,
    overwritten: AtomicU64,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a frame, returning true if an unconsumed frame was replaced
    pub fn put(&self, frame: VideoFrame) -> bool {
        let replaced = self.slot.lock().replace(frame).is_some();
        if replaced {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        replaced
    }

    /// Remove and return the stored frame
    pub fn take(&self) -> Option<VideoFrame> {
        self.slot.lock().take()
    }

    /// Frames replaced before the consumer saw them
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

enum WorkerCommand {
    Stop,
}

/// State visible from outside the worker thread
#[derive(Default)]
struct WorkerStatus {
    stream_open: AtomicBool,
    /// Encoded geometry of the open session
    resolution: Mutex<Option<Resolution>>,
    frames_encoded: AtomicU64,
}

impl WorkerStatus {
    fn set_open(&self, resolution: Option<Resolution>) {
        *self.resolution.lock() = resolution;
        self.stream_open.store(resolution.is_some(), Ordering::Release);
    }
}

/// Encode thread feeding one connection
pub struct EncodeWorker {
    mailbox: Arc<LatestFrame>,
    status: Arc<WorkerStatus>,
    commands: Sender<WorkerCommand>,
    errors: Receiver<AppError>,
    handle: Option<JoinHandle<()>>,
}

impl EncodeWorker {
    /// Start a worker that opens `session` on the first frame it receives
    pub fn spawn<S>(
        name: &str,
        session: StreamSession,
        codec: String,
        options: EncodingOptions,
        sink: S,
        period: Duration,
    ) -> Result<Self>
    where
        S: PacketSink + Send + 'static,
    {
        let mailbox = Arc::new(LatestFrame::new());
        let status = Arc::new(WorkerStatus::default());
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (err_tx, err_rx) = mpsc::channel();

        let worker = WorkerLoop {
            session,
            codec,
            options,
            sink,
            period,
            mailbox: mailbox.clone(),
            status: status.clone(),
            commands: cmd_rx,
            errors: err_tx,
            failed_format: None,
        };

        let handle = std::thread::Builder::new()
            .name(format!("encode-{}", name))
            .spawn(move || worker.run())
            .map_err(|e| AppError::Internal(format!("Failed to spawn encode thread: {}", e)))?;

        Ok(Self {
            mailbox,
            status,
            commands: cmd_tx,
            errors: err_rx,
            handle: Some(handle),
        })
    }

    /// Hand a captured frame to the worker
    pub fn submit(&self, frame: VideoFrame) {
        self.mailbox.put(frame);
    }

    /// Errors reported since the last call
    pub fn take_errors(&self) -> Vec<AppError> {
        self.errors.try_iter().collect()
    }

    pub fn is_stream_open(&self) -> bool {
        self.status.stream_open.load(Ordering::Acquire)
    }

    /// Resolution packets are currently encoded at
    pub fn encoded_resolution(&self) -> Option<Resolution> {
        *self.status.resolution.lock()
    }

    pub fn frames_encoded(&self) -> u64 {
        self.status.frames_encoded.load(Ordering::Relaxed)
    }

    pub fn frames_overwritten(&self) -> u64 {
        self.mailbox.overwritten()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the thread and wait for it to flush its session
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.commands.send(WorkerCommand::Stop);
        if handle.join().is_err() {
            warn!("Encode thread panicked");
        }
    }
}

impl Drop for EncodeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

struct WorkerLoop<S> {
    session: StreamSession,
    codec: String,
    options: EncodingOptions,
    sink: S,
    period: Duration,
    mailbox: Arc<LatestFrame>,
    status: Arc<WorkerStatus>,
    commands: Receiver<WorkerCommand>,
    errors: Sender<AppError>,
    /// Format whose open failed; not retried until the format changes
    failed_format: Option<StreamFormat>,
}

impl<S: PacketSink> WorkerLoop<S> {
    fn run(mut self) {
        debug!(codec = %self.codec, "Encode thread started");

        loop {
            match self.commands.recv_timeout(self.period) {
                Ok(WorkerCommand::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            let Some(frame) = self.mailbox.take() else {
                continue;
            };

            if let Err(e) = self.encode(&frame) {
                let fatal = e.is_transport();
                let _ = self.errors.send(e);
                if fatal {
                    break;
                }
            }
        }

        self.session.close(&mut self.sink);
        self.status.set_open(None);
        info!(
            codec = %self.codec,
            frames = self.status.frames_encoded.load(Ordering::Relaxed),
            "Encode thread stopped"
        );
    }

    fn encode(&mut self, frame: &VideoFrame) -> Result<()> {
        if self.session.format() != Some(frame.format) {
            if self.failed_format == Some(frame.format) {
                return Ok(());
            }
            if self.session.is_open() {
                debug!(
                    "Source changed to {}, reopening stream session",
                    frame.format
                );
                self.session.close(&mut self.sink);
            }
            if let Err(e) = self.session.open(frame.format, &self.codec, &self.options) {
                self.failed_format = Some(frame.format);
                self.status.set_open(None);
                return Err(e);
            }
            self.failed_format = None;
            self.status.set_open(self.session.encoded_resolution());
        }

        self.session
            .push_frame(frame.data(), frame.format, &mut self.sink)?;
        self.status.frames_encoded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
