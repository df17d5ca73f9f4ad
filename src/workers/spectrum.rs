//! Spectrum worker: stateless per-chunk magnitude spectrum.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::analysis::spectrum::{bin_frequency, dominant_bin, SpectrumAnalyzer};
use crate::pipeline::{ChunkReceiver, PipelineCounters, SampleChunk};
use crate::state::AnalysisState;
use crate::workers::{poll_chunk, Polled, Step};

pub struct SpectrumWorker {
    rx: ChunkReceiver,
    state: Arc<AnalysisState>,
    analyzer: SpectrumAnalyzer,
    recv_timeout: Duration,
    counters: Arc<PipelineCounters>,
}

impl SpectrumWorker {
    pub fn new(
        rx: ChunkReceiver,
        state: Arc<AnalysisState>,
        recv_timeout: Duration,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            rx,
            state,
            analyzer: SpectrumAnalyzer::new(),
            recv_timeout,
            counters,
        }
    }

    pub fn run(mut self) {
        info!("spectrum worker started");
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
        info!("spectrum worker stopped");
    }

    /// Every non-empty chunk produces exactly one published update; any
    /// throttling toward subscribers is the publisher's job.
    fn process_one(&mut self, chunk: &SampleChunk) -> Step {
        self.counters.spectrum_chunks.fetch_add(1, Ordering::Relaxed);

        let magnitudes = self.analyzer.magnitudes(&chunk.samples);
        if magnitudes.is_empty() {
            return Step::Skipped;
        }

        if let Some(bin) = dominant_bin(&magnitudes) {
            // Diagnostics only — the full spectrum is what gets published.
            debug!(
                dominant_hz = bin_frequency(bin, chunk.samples.len(), chunk.sample_rate),
                "dominant frequency"
            );
        }

        self.state.update_spectrum(magnitudes);
        self.counters.spectrum_updates.fetch_add(1, Ordering::Relaxed);
        Step::Processed
    }
}
