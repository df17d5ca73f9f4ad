//! `Pipeline` — top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Pipeline::new(config)
//!     └─► start(decoder, estimator)
//!           channels opened → capture started → dispatcher → workers → publisher
//!     └─► stop()
//!           sentinel injected per worker channel (dispatcher bypassed)
//!           → capture signalled off → bounded-grace join → Stopped
//! ```
//!
//! `start()`/`stop()` return errors rather than panicking when called in the
//! wrong state.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so the capture handle lives
//! entirely on a dedicated capture thread; a sync mpsc channel propagates
//! the open result (actual sample rate or error) back to the `start()`
//! caller before any downstream stage is spawned.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    analysis::{MusicEstimator, SpeechDecoder},
    audio::AudioCapture,
    error::{Result, SonoscopeError},
    params::{param_channel, ParamReceiver, ParamSender, ParamUpdate},
    pipeline::{
        chunk_channel,
        dispatch::{DispatchLanes, Dispatcher},
        ChunkMessage, ChunkSender, CountersSnapshot, PipelineCounters,
    },
    publish::{self, SnapshotEvent},
    state::AnalysisState,
    workers::{music::MusicWorker, speech::SpeechWorker, spectrum::SpectrumWorker},
};

/// Broadcast capacity: buffered events for slow subscribers.
const BROADCAST_CAP: usize = 64;

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sample rate (Hz) assumed when no capture device dictates one; the
    /// device's actual rate wins on the capture path. Default: 16000.
    pub sample_rate: u32,
    /// Capacity of the ingest queue and of each worker queue. Default: 100.
    pub channel_capacity: usize,
    /// How long the dispatcher waits on a full worker queue before dropping
    /// for that lane only. Default: 100 ms.
    pub dispatch_timeout: Duration,
    /// Bounded wait used by the dispatcher and workers on their inbound
    /// queues, so sentinel delivery and liveness checks are never starved.
    /// Default: 1 s.
    pub recv_timeout: Duration,
    /// Mean-absolute-amplitude threshold below which a chunk is treated as
    /// silence and skipped by the speech worker. Default: 0.01.
    pub energy_threshold: f32,
    /// Music analysis window duration in seconds. Default: 2.0.
    pub music_window_secs: f32,
    /// Interval between snapshot broadcasts. Default: 1 s.
    pub publish_interval: Duration,
    /// Grace period for workers to finish in-flight work at shutdown.
    /// Default: 2 s.
    pub shutdown_grace: Duration,
    /// Capacity of the subscriber parameter queue. Default: 64.
    pub param_capacity: usize,
    /// Preferred capture device name; `None` selects the system default.
    pub preferred_input_device: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channel_capacity: 100,
            dispatch_timeout: Duration::from_millis(100),
            recv_timeout: Duration::from_secs(1),
            energy_threshold: 0.01,
            music_window_secs: 2.0,
            publish_interval: Duration::from_secs(1),
            shutdown_grace: Duration::from_secs(2),
            param_capacity: 64,
            preferred_input_device: None,
        }
    }
}

/// Current state of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Created but `start()` not yet called.
    Idle,
    /// Capturing, analyzing and publishing.
    Running,
    /// Stopped cleanly; may be started again.
    Stopped,
    /// Startup or shutdown failure.
    Error,
}

/// Emitted whenever the pipeline state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub status: PipelineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// The top-level pipeline handle.
///
/// `Send + Sync` — all fields use interior mutability, so it can be wrapped
/// in an `Arc` and shared with async tasks.
pub struct Pipeline {
    config: PipelineConfig,
    state: Arc<AnalysisState>,
    /// `true` while capture + stages are active.
    running: Arc<AtomicBool>,
    status: Arc<Mutex<PipelineStatus>>,
    snapshot_tx: broadcast::Sender<SnapshotEvent>,
    status_tx: broadcast::Sender<StatusEvent>,
    counters: Arc<PipelineCounters>,
    param_tx: ParamSender,
    param_rx: ParamReceiver,
    /// Spawned stage handles, joined at stop.
    handles: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
    /// Worker-queue senders kept for direct sentinel injection at stop.
    worker_txs: Mutex<Vec<ChunkSender>>,
    ingest_tx: Mutex<Option<ChunkSender>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let (snapshot_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (param_tx, param_rx) = param_channel(config.param_capacity);

        Self {
            config,
            state: Arc::new(AnalysisState::new()),
            running: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(PipelineStatus::Idle)),
            snapshot_tx,
            status_tx,
            counters: Arc::new(PipelineCounters::default()),
            param_tx,
            param_rx,
            handles: Mutex::new(Vec::new()),
            worker_txs: Mutex::new(Vec::new()),
            ingest_tx: Mutex::new(None),
        }
    }

    /// Start the capture device and all pipeline stages.
    ///
    /// Blocks until the audio device is confirmed open (or fails). A device
    /// that cannot be opened is fatal to the whole pipeline: startup aborts,
    /// nothing downstream is left running, and the error is returned.
    ///
    /// # Errors
    /// - `SonoscopeError::AlreadyRunning` if already started.
    /// - `SonoscopeError::NoDefaultInputDevice` / `AudioDevice` /
    ///   `AudioStream` on device failure.
    pub fn start(
        &self,
        decoder: Box<dyn SpeechDecoder>,
        estimator: Box<dyn MusicEstimator>,
    ) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SonoscopeError::AlreadyRunning);
        }

        let (ingest_tx, ingest_rx) = chunk_channel(self.config.channel_capacity);

        // Sync oneshot: the capture thread reports open success (with the
        // actual device sample rate) or failure back to this caller.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<u32>>();
        let spawn_result = {
            let ingest_tx = ingest_tx.clone();
            let running = Arc::clone(&self.running);
            let counters = Arc::clone(&self.counters);
            let preferred = self.config.preferred_input_device.clone();
            thread::Builder::new()
                .name("capture".into())
                .spawn(move || {
                    // The stream is !Send: open, poll and drop on this thread.
                    let capture = match AudioCapture::open_with_preference(
                        ingest_tx,
                        Arc::clone(&running),
                        counters,
                        preferred.as_deref(),
                    ) {
                        Ok(c) => {
                            let _ = open_tx.send(Ok(c.sample_rate));
                            c
                        }
                        Err(e) => {
                            let _ = open_tx.send(Err(e));
                            return;
                        }
                    };
                    while running.load(Ordering::Relaxed) {
                        thread::sleep(Duration::from_millis(25));
                    }
                    capture.stop();
                    // Dropping the handle closes the device on its own thread.
                })
        };
        let capture_handle = match spawn_result {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(PipelineStatus::Error, Some(e.to_string()));
                return Err(e.into());
            }
        };

        let sample_rate = match open_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = capture_handle.join();
                self.set_status(PipelineStatus::Error, Some(e.to_string()));
                return Err(e);
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                let _ = capture_handle.join();
                self.set_status(PipelineStatus::Error, Some("capture thread died".into()));
                return Err(SonoscopeError::Other(anyhow::anyhow!(
                    "capture thread died before reporting open result"
                )));
            }
        };

        self.handles.lock().push(("capture", capture_handle));
        *self.ingest_tx.lock() = Some(ingest_tx);

        if let Err(e) = self.start_stages(ingest_rx, sample_rate, decoder, estimator) {
            // Orderly abort of whatever already started.
            error!(error = %e, "stage startup failed — aborting");
            let _ = self.shutdown_stages();
            self.set_status(PipelineStatus::Error, Some(e.to_string()));
            return Err(e);
        }

        self.set_status(PipelineStatus::Running, None);
        info!(sample_rate, "pipeline started");
        Ok(())
    }

    /// Start every stage except the capture device and hand back the ingest
    /// sender, so the caller feeds sample chunks directly (file replay,
    /// integration tests). Uses `config.sample_rate` as the chunk rate.
    pub fn start_with_ingest(
        &self,
        decoder: Box<dyn SpeechDecoder>,
        estimator: Box<dyn MusicEstimator>,
    ) -> Result<ChunkSender> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SonoscopeError::AlreadyRunning);
        }

        let (ingest_tx, ingest_rx) = chunk_channel(self.config.channel_capacity);
        *self.ingest_tx.lock() = Some(ingest_tx.clone());

        if let Err(e) = self.start_stages(ingest_rx, self.config.sample_rate, decoder, estimator) {
            let _ = self.shutdown_stages();
            self.set_status(PipelineStatus::Error, Some(e.to_string()));
            return Err(e);
        }

        self.set_status(PipelineStatus::Running, None);
        info!("pipeline started (manual ingest)");
        Ok(ingest_tx)
    }

    /// Stop the pipeline: sentinel every worker directly (bypassing a
    /// possibly stuck dispatcher), stop the capture source, and wait a
    /// bounded grace period for all stages to exit.
    ///
    /// # Errors
    /// - `SonoscopeError::NotRunning` if not currently running.
    /// - `SonoscopeError::ShutdownTimeout` if a stage outlived the grace
    ///   period.
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SonoscopeError::NotRunning);
        }
        info!("pipeline stop requested");

        let result = self.shutdown_stages();
        match &result {
            Ok(()) => self.set_status(PipelineStatus::Stopped, None),
            Err(e) => self.set_status(PipelineStatus::Error, Some(e.to_string())),
        }

        let snap = self.counters.snapshot();
        info!(
            dispatched = snap.dispatched,
            capture_dropped = snap.capture_dropped,
            speech_chunks = snap.speech_chunks,
            music_windows = snap.music_windows,
            spectrum_updates = snap.spectrum_updates,
            "pipeline stopped — counters"
        );
        result
    }

    /// Current status (snapshot).
    pub fn status(&self) -> PipelineStatus {
        *self.status.lock()
    }

    /// Subscribe to periodic analysis snapshots.
    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<SnapshotEvent> {
        self.snapshot_tx.subscribe()
    }

    /// Subscribe to pipeline status changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    /// Handle subscribers use to push parameter updates toward the pipeline.
    pub fn param_sender(&self) -> ParamSender {
        self.param_tx.clone()
    }

    /// Drain all pending subscriber parameter updates.
    pub fn drain_params(&self) -> Vec<ParamUpdate> {
        self.param_rx.try_iter().collect()
    }

    /// Direct read of the latest analysis values.
    pub fn analysis_snapshot(&self) -> crate::state::AnalysisSnapshot {
        self.state.snapshot()
    }

    /// Observability counters for all stages.
    pub fn counters(&self) -> CountersSnapshot {
        self.counters.snapshot()
    }

    // ── Internal helpers ────────────────────────────────────────────────

    /// Spawn dispatcher, the three workers and the publisher, in that order.
    fn start_stages(
        &self,
        ingest_rx: crate::pipeline::ChunkReceiver,
        sample_rate: u32,
        decoder: Box<dyn SpeechDecoder>,
        estimator: Box<dyn MusicEstimator>,
    ) -> Result<()> {
        let cap = self.config.channel_capacity;
        let (speech_tx, speech_rx) = chunk_channel(cap);
        let (music_tx, music_rx) = chunk_channel(cap);
        let (spectrum_tx, spectrum_rx) = chunk_channel(cap);
        {
            let mut txs = self.worker_txs.lock();
            txs.push(speech_tx.clone());
            txs.push(music_tx.clone());
            txs.push(spectrum_tx.clone());
        }

        let dispatcher = Dispatcher::new(
            ingest_rx,
            DispatchLanes {
                speech: speech_tx,
                music: music_tx,
                spectrum: spectrum_tx,
            },
            Arc::clone(&self.counters),
            self.config.recv_timeout,
            self.config.dispatch_timeout,
        );
        self.spawn_stage("dispatcher", move || dispatcher.run())?;

        let speech = SpeechWorker::new(
            speech_rx,
            Arc::clone(&self.state),
            decoder,
            self.config.energy_threshold,
            self.config.recv_timeout,
            Arc::clone(&self.counters),
        );
        self.spawn_stage("speech-worker", move || speech.run())?;

        let music = MusicWorker::new(
            music_rx,
            Arc::clone(&self.state),
            estimator,
            sample_rate,
            self.config.music_window_secs,
            self.config.recv_timeout,
            Arc::clone(&self.counters),
        );
        self.spawn_stage("music-worker", move || music.run())?;

        let spectrum = SpectrumWorker::new(
            spectrum_rx,
            Arc::clone(&self.state),
            self.config.recv_timeout,
            Arc::clone(&self.counters),
        );
        self.spawn_stage("spectrum-worker", move || spectrum.run())?;

        let publisher_state = Arc::clone(&self.state);
        let publisher_tx = self.snapshot_tx.clone();
        let publisher_running = Arc::clone(&self.running);
        let interval = self.config.publish_interval;
        self.spawn_stage("publisher", move || {
            publish::run(publisher_state, publisher_tx, publisher_running, interval)
        })?;

        Ok(())
    }

    fn spawn_stage<F>(&self, name: &'static str, f: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.into()).spawn(f)?;
        self.handles.lock().push((name, handle));
        Ok(())
    }

    /// Shared shutdown path: sentinels, running flag, bounded-grace join.
    fn shutdown_stages(&self) -> Result<()> {
        // 1. Sentinel every worker queue directly — guaranteed termination
        //    even if the dispatcher is blocked or already gone.
        for tx in self.worker_txs.lock().drain(..) {
            if let Err(e) = tx.send_timeout(ChunkMessage::Terminate, self.config.dispatch_timeout) {
                // Worker will still see disconnect once all senders drop.
                warn!(error = %e, "could not inject terminate into worker queue");
            }
        }
        // Terminate the ingest path so the dispatcher exits too.
        if let Some(tx) = self.ingest_tx.lock().take() {
            if let Err(e) = tx.send_timeout(ChunkMessage::Terminate, self.config.dispatch_timeout) {
                warn!(error = %e, "could not inject terminate into ingest queue");
            }
        }

        // 2. Stop the capture callback and the publisher loop.
        self.running.store(false, Ordering::SeqCst);

        // 3. Bounded grace period for in-flight work to complete.
        let deadline = Instant::now() + self.config.shutdown_grace;
        let mut timed_out: Option<&'static str> = None;
        for (name, handle) in self.handles.lock().drain(..) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                if handle.join().is_err() {
                    error!(stage = name, "stage panicked before shutdown");
                }
            } else {
                error!(stage = name, "stage did not exit within the grace period");
                timed_out.get_or_insert(name);
            }
        }

        match timed_out {
            None => Ok(()),
            Some(stage) => Err(SonoscopeError::ShutdownTimeout {
                stage: stage.to_string(),
            }),
        }
    }

    fn set_status(&self, new_status: PipelineStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(StatusEvent {
            status: new_status,
            detail,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stop_before_start_is_an_error() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        assert!(matches!(pipeline.stop(), Err(SonoscopeError::NotRunning)));
        assert_eq!(pipeline.status(), PipelineStatus::Idle);
    }

    #[test]
    fn param_updates_flow_from_sender_to_drain() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let sender = pipeline.param_sender();
        sender.submit(crate::params::ParamUpdate(json!({"threshold": 0.02})));
        sender.submit(crate::params::ParamUpdate(json!({"window": 4.0})));

        let drained = pipeline.drain_params();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0["threshold"], 0.02);
        assert!(pipeline.drain_params().is_empty());
    }

    #[test]
    fn status_events_reach_subscribers() {
        let pipeline = Pipeline::new(PipelineConfig::default());
        let mut rx = pipeline.subscribe_status();
        pipeline.set_status(PipelineStatus::Error, Some("boom".into()));
        let event = rx.try_recv().unwrap();
        assert_eq!(event.status, PipelineStatus::Error);
        assert_eq!(event.detail.as_deref(), Some("boom"));
    }

    #[test]
    fn default_config_matches_documented_values() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.sample_rate, 16_000);
        assert_eq!(cfg.channel_capacity, 100);
        assert_eq!(cfg.music_window_secs, 2.0);
        assert_eq!(cfg.publish_interval, Duration::from_secs(1));
    }
}
