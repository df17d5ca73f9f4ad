//! Channel plumbing between the capture callback and the analysis workers.
//!
//! Every queue in the pipeline is a bounded `crossbeam_channel` carrying
//! tagged [`ChunkMessage`] elements, so "no more data" is a distinct variant
//! rather than a null chunk. The capture callback only ever `try_send`s; the
//! dispatcher and workers block with bounded timeouts.

pub mod chunk;
pub mod dispatch;

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{bounded, Receiver, Sender};

pub use chunk::{ChunkMessage, SampleChunk};

/// Sending half of a chunk queue.
pub type ChunkSender = Sender<ChunkMessage>;
/// Receiving half of a chunk queue. Single-consumer by convention: each
/// worker owns exactly one receiver.
pub type ChunkReceiver = Receiver<ChunkMessage>;

/// Create a bounded FIFO chunk queue with the given capacity.
pub fn chunk_channel(capacity: usize) -> (ChunkSender, ChunkReceiver) {
    bounded(capacity)
}

/// Shared observability counters, incremented by every stage.
///
/// Relaxed ordering throughout — these are diagnostics, not synchronization.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    /// Chunks the capture callback failed to enqueue (ingest queue full).
    pub capture_dropped: AtomicUsize,
    /// Chunks the dispatcher pulled off the ingest queue.
    pub dispatched: AtomicUsize,
    /// Per-lane chunks dropped because a worker queue stayed full past the
    /// dispatch timeout.
    pub dropped_speech: AtomicUsize,
    pub dropped_music: AtomicUsize,
    pub dropped_spectrum: AtomicUsize,
    /// Chunks each worker dequeued.
    pub speech_chunks: AtomicUsize,
    pub music_chunks: AtomicUsize,
    pub spectrum_chunks: AtomicUsize,
    /// Chunks the speech worker skipped below the energy threshold.
    pub speech_silence_skips: AtomicUsize,
    /// Decoder invocations and per-item decode failures.
    pub speech_decodes: AtomicUsize,
    pub speech_decode_errors: AtomicUsize,
    /// Music windows analyzed and windows lost to estimator errors.
    pub music_windows: AtomicUsize,
    pub music_window_errors: AtomicUsize,
    /// Spectrum updates published to the shared state.
    pub spectrum_updates: AtomicUsize,
}

impl PipelineCounters {
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            capture_dropped: self.capture_dropped.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped_speech: self.dropped_speech.load(Ordering::Relaxed),
            dropped_music: self.dropped_music.load(Ordering::Relaxed),
            dropped_spectrum: self.dropped_spectrum.load(Ordering::Relaxed),
            speech_chunks: self.speech_chunks.load(Ordering::Relaxed),
            music_chunks: self.music_chunks.load(Ordering::Relaxed),
            spectrum_chunks: self.spectrum_chunks.load(Ordering::Relaxed),
            speech_silence_skips: self.speech_silence_skips.load(Ordering::Relaxed),
            speech_decodes: self.speech_decodes.load(Ordering::Relaxed),
            speech_decode_errors: self.speech_decode_errors.load(Ordering::Relaxed),
            music_windows: self.music_windows.load(Ordering::Relaxed),
            music_window_errors: self.music_window_errors.load(Ordering::Relaxed),
            spectrum_updates: self.spectrum_updates.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineCounters`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CountersSnapshot {
    pub capture_dropped: usize,
    pub dispatched: usize,
    pub dropped_speech: usize,
    pub dropped_music: usize,
    pub dropped_spectrum: usize,
    pub speech_chunks: usize,
    pub music_chunks: usize,
    pub spectrum_chunks: usize,
    pub speech_silence_skips: usize,
    pub speech_decodes: usize,
    pub speech_decode_errors: usize,
    pub music_windows: usize,
    pub music_window_errors: usize,
    pub spectrum_updates: usize,
}
