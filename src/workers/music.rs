//! Music worker: sliding-window pitch and tempo estimation.
//!
//! Pitch and tempo both need several seconds of context, so chunks are
//! accumulated into a buffer and both estimators run over the *entire*
//! buffer once it reaches the configured window length. After each analysis
//! the first half of the window is discarded, keeping the second half as
//! overlap so successive windows share context instead of restarting cold.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::analysis::MusicEstimator;
use crate::pipeline::{ChunkReceiver, PipelineCounters, SampleChunk};
use crate::state::AnalysisState;
use crate::workers::{poll_chunk, Polled, Step};

pub struct MusicWorker {
    rx: ChunkReceiver,
    state: Arc<AnalysisState>,
    estimator: Box<dyn MusicEstimator>,
    sample_rate: u32,
    /// Analysis trigger length in samples (window duration × sample rate).
    window_len: usize,
    buffer: Vec<f32>,
    recv_timeout: Duration,
    counters: Arc<PipelineCounters>,
}

impl MusicWorker {
    pub fn new(
        rx: ChunkReceiver,
        state: Arc<AnalysisState>,
        estimator: Box<dyn MusicEstimator>,
        sample_rate: u32,
        window_secs: f32,
        recv_timeout: Duration,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        let window_len = ((window_secs * sample_rate as f32) as usize).max(1);
        Self {
            rx,
            state,
            estimator,
            sample_rate,
            window_len,
            buffer: Vec::with_capacity(window_len * 2),
            recv_timeout,
            counters,
        }
    }

    /// Run until terminate. A partial final window is discarded on exit.
    pub fn run(mut self) {
        info!(window_len = self.window_len, "music worker started");
        loop {
            match poll_chunk(&self.rx, self.recv_timeout) {
                Polled::Chunk(chunk) => {
                    if self.process_one(&chunk) == Step::Fatal {
                        break;
                    }
                }
                Polled::Terminate => break,
                Polled::Empty => continue,
            }
        }
        info!("music worker stopped");
    }

    fn process_one(&mut self, chunk: &SampleChunk) -> Step {
        self.counters.music_chunks.fetch_add(1, Ordering::Relaxed);
        self.buffer.extend_from_slice(&chunk.samples);
        if self.buffer.len() < self.window_len {
            return Step::Processed;
        }
        self.analyze_window()
    }

    /// Run both estimators over the full buffer, publish, then slide.
    ///
    /// Publication is deliberately asymmetric, matching the established
    /// contract: a window with no positive pitch candidate publishes no
    /// pitch update (the previous value stands — 0.0 is never written as a
    /// fake reading), while tempo is published for every analyzed window.
    fn analyze_window(&mut self) -> Step {
        self.counters.music_windows.fetch_add(1, Ordering::Relaxed);

        let pitch = self.estimator.pitch_track(&self.buffer, self.sample_rate);
        let tempo = self.estimator.tempo(&self.buffer, self.sample_rate);

        let (candidates, tempo_bpm) = match (pitch, tempo) {
            (Ok(p), Ok(t)) => (p, t),
            (pitch, tempo) => {
                if let Err(e) = pitch {
                    warn!(error = %e, "pitch estimation failed for this window");
                }
                if let Err(e) = tempo {
                    warn!(error = %e, "tempo estimation failed for this window");
                }
                self.counters
                    .music_window_errors
                    .fetch_add(1, Ordering::Relaxed);
                // Drop the failed window and rebuild from the next chunks.
                self.buffer.clear();
                return Step::Skipped;
            }
        };

        match median_positive(&candidates) {
            Some(pitch_hz) => {
                debug!(pitch_hz, "pitch estimate");
                self.state.update_pitch(pitch_hz);
            }
            None => debug!("no positive pitch candidate in window — pitch not updated"),
        }

        if tempo_bpm.is_finite() && tempo_bpm >= 0.0 {
            debug!(tempo_bpm, "tempo estimate");
            self.state.update_tempo(tempo_bpm);
        } else {
            warn!(tempo_bpm, "rejecting non-finite or negative tempo estimate");
        }

        // Slide: keep the second half of the window as overlap context.
        self.buffer.drain(..self.window_len / 2);
        Step::Processed
    }
}

/// Median of the strictly positive, finite candidates.
fn median_positive(candidates: &[f32]) -> Option<f32> {
    let mut valid: Vec<f32> = candidates
        .iter()
        .copied()
        .filter(|p| *p > 0.0 && p.is_finite())
        .collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(f32::total_cmp);
    let mid = valid.len() / 2;
    if valid.len() % 2 == 1 {
        Some(valid[mid])
    } else {
        Some((valid[mid - 1] + valid[mid]) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SonoscopeError};
    use crate::pipeline::{chunk_channel, ChunkMessage, ChunkSender};
    use approx::assert_relative_eq;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn median_ignores_non_positive_candidates() {
        assert_eq!(median_positive(&[-1.0, 0.0, 440.0]), Some(440.0));
        assert_eq!(median_positive(&[100.0, 300.0, 200.0]), Some(200.0));
        assert_eq!(median_positive(&[100.0, 200.0]), Some(150.0));
        assert_eq!(median_positive(&[0.0, -5.0]), None);
        assert_eq!(median_positive(&[]), None);
        assert_eq!(median_positive(&[f32::NAN, 50.0]), Some(50.0));
    }

    /// Estimator with scripted per-window behavior and call counting.
    struct ScriptedEstimator {
        windows: Arc<AtomicUsize>,
        pitch_scripts: Arc<Mutex<Vec<Result<Vec<f32>>>>>,
        tempo_bpm: f32,
        /// Buffer length observed on each pitch_track call.
        seen_lens: Arc<Mutex<Vec<usize>>>,
    }

    impl MusicEstimator for ScriptedEstimator {
        fn pitch_track(&mut self, samples: &[f32], _sample_rate: u32) -> Result<Vec<f32>> {
            self.windows.fetch_add(1, Ordering::Relaxed);
            self.seen_lens.lock().push(samples.len());
            let mut scripts = self.pitch_scripts.lock();
            if scripts.is_empty() {
                Ok(vec![330.0])
            } else {
                scripts.remove(0)
            }
        }

        fn tempo(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<f32> {
            Ok(self.tempo_bpm)
        }
    }

    struct Harness {
        tx: ChunkSender,
        state: Arc<AnalysisState>,
        windows: Arc<AtomicUsize>,
        seen_lens: Arc<Mutex<Vec<usize>>>,
        counters: Arc<PipelineCounters>,
        handle: thread::JoinHandle<()>,
    }

    fn spawn_worker(window_secs: f32, pitch_scripts: Vec<Result<Vec<f32>>>) -> Harness {
        let (tx, rx) = chunk_channel(32);
        let state = Arc::new(AnalysisState::new());
        let windows = Arc::new(AtomicUsize::new(0));
        let seen_lens = Arc::new(Mutex::new(Vec::new()));
        let counters = Arc::new(PipelineCounters::default());
        let estimator = ScriptedEstimator {
            windows: Arc::clone(&windows),
            pitch_scripts: Arc::new(Mutex::new(pitch_scripts)),
            tempo_bpm: 128.0,
            seen_lens: Arc::clone(&seen_lens),
        };
        let worker = MusicWorker::new(
            rx,
            Arc::clone(&state),
            Box::new(estimator),
            16_000,
            window_secs,
            Duration::from_millis(50),
            Arc::clone(&counters),
        );
        Harness {
            tx,
            state,
            windows,
            seen_lens,
            counters,
            handle: thread::spawn(move || worker.run()),
        }
    }

    fn send_chunks(tx: &ChunkSender, count: usize, len: usize) {
        for _ in 0..count {
            tx.send(ChunkMessage::Chunk(SampleChunk::new(vec![0.1; len], 16_000)))
                .unwrap();
        }
    }

    #[test]
    fn triggers_once_buffer_reaches_window_length() {
        // 0.25 s window at 16 kHz = 4000 samples; 1024-sample chunks.
        let h = spawn_worker(0.25, vec![]);
        send_chunks(&h.tx, 3, 1024); // 3072 < 4000 — no trigger yet
        h.tx.send(ChunkMessage::Terminate).unwrap();
        h.handle.join().unwrap();
        assert_eq!(h.windows.load(Ordering::Relaxed), 0);

        let h = spawn_worker(0.25, vec![]);
        send_chunks(&h.tx, 4, 1024); // 4096 ≥ 4000 — exactly one trigger
        h.tx.send(ChunkMessage::Terminate).unwrap();
        h.handle.join().unwrap();
        assert_eq!(h.windows.load(Ordering::Relaxed), 1);
        let snap = h.state.snapshot();
        assert_relative_eq!(snap.pitch_hz, 330.0);
        assert_relative_eq!(snap.tempo_bpm, 128.0);
    }

    #[test]
    fn analysis_covers_whole_buffer_and_slides_by_half_window() {
        // Window 4096 samples, chunk 1024 → trigger at 4096, slide to 2048,
        // next trigger after two more chunks at 4096 again.
        let h = spawn_worker(0.256, vec![]);
        send_chunks(&h.tx, 6, 1024);
        h.tx.send(ChunkMessage::Terminate).unwrap();
        h.handle.join().unwrap();

        assert_eq!(h.windows.load(Ordering::Relaxed), 2);
        assert_eq!(&*h.seen_lens.lock(), &vec![4096, 4096]);
    }

    #[test]
    fn window_with_no_positive_pitch_keeps_previous_value_but_updates_tempo() {
        let h = spawn_worker(
            0.256,
            vec![Ok(vec![440.0, 442.0, 438.0]), Ok(vec![0.0, -1.0])],
        );
        send_chunks(&h.tx, 6, 1024);
        h.tx.send(ChunkMessage::Terminate).unwrap();
        h.handle.join().unwrap();

        let snap = h.state.snapshot();
        // Second window had no valid candidate: first window's median stands.
        assert_relative_eq!(snap.pitch_hz, 440.0);
        assert_relative_eq!(snap.tempo_bpm, 128.0);
        assert_eq!(h.windows.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn estimator_error_loses_one_window_and_recovers() {
        let h = spawn_worker(
            0.256,
            vec![
                Err(SonoscopeError::Analysis("window corrupt".into())),
                Ok(vec![220.0]),
            ],
        );
        // First 4 chunks → errored window, buffer cleared. Next 4 chunks →
        // clean window from scratch.
        send_chunks(&h.tx, 8, 1024);
        h.tx.send(ChunkMessage::Terminate).unwrap();
        h.handle.join().unwrap();

        let snap = h.state.snapshot();
        assert_relative_eq!(snap.pitch_hz, 220.0);
        assert_eq!(h.counters.snapshot().music_window_errors, 1);
        assert_eq!(&*h.seen_lens.lock(), &vec![4096, 4096]);
    }

    #[test]
    fn partial_window_is_discarded_on_terminate() {
        let h = spawn_worker(2.0, vec![]);
        send_chunks(&h.tx, 3, 1024);
        h.tx.send(ChunkMessage::Terminate).unwrap();
        h.handle.join().unwrap();
        assert_eq!(h.windows.load(Ordering::Relaxed), 0);
        assert_eq!(h.state.snapshot().tempo_bpm, 0.0);
    }
}
