//! Speech worker: energy gate → PCM conversion → streaming decoder.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::analysis::{to_pcm_i16, DecodeOutcome, SpeechDecoder};
use crate::pipeline::{ChunkReceiver, PipelineCounters, SampleChunk};
use crate::state::AnalysisState;
use crate::workers::{poll_chunk, Polled, Step};

pub struct SpeechWorker {
    rx: ChunkReceiver,
    state: Arc<AnalysisState>,
    decoder: Box<dyn SpeechDecoder>,
    /// Chunks whose mean absolute amplitude falls below this are treated as
    /// silence and never reach the decoder.
    energy_threshold: f32,
    recv_timeout: Duration,
    counters: Arc<PipelineCounters>,
}

impl SpeechWorker {
    pub fn new(
        rx: ChunkReceiver,
        state: Arc<AnalysisState>,
        decoder: Box<dyn SpeechDecoder>,
        energy_threshold: f32,
        recv_timeout: Duration,
        counters: Arc<PipelineCounters>,
    ) -> Self {
        Self {
            rx,
            state,
            decoder,
            energy_threshold,
            recv_timeout,
            counters,
        }
    }

    /// Run until terminate. A decoder that fails to warm up terminates this
    /// worker only; the rest of the pipeline keeps running and the speech
    /// field simply stops updating.
    pub fn run(mut self) {
        if let Err(e) = self.decoder.warm_up() {
            error!(error = %e, "speech decoder failed to initialize — speech worker exiting");
            return;
        }
        info!("speech worker started");

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
        info!("speech worker stopped");
    }

    fn process_one(&mut self, chunk: &SampleChunk) -> Step {
        self.counters.speech_chunks.fetch_add(1, Ordering::Relaxed);

        let energy = chunk.mean_abs_amplitude();
        if energy < self.energy_threshold {
            self.counters
                .speech_silence_skips
                .fetch_add(1, Ordering::Relaxed);
            return Step::Skipped;
        }

        let pcm = to_pcm_i16(&chunk.samples);
        self.counters.speech_decodes.fetch_add(1, Ordering::Relaxed);
        match self.decoder.accept(&pcm) {
            Ok(DecodeOutcome::Final(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    // No speech in this span — not an error, nothing to publish.
                    debug!("empty final discarded");
                } else {
                    debug!(text = trimmed, "final transcript");
                    self.state.update_speech(trimmed);
                }
                Step::Processed
            }
            Ok(DecodeOutcome::Partial(text)) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    self.state.update_speech(trimmed);
                }
                Step::Processed
            }
            Err(e) => {
                self.counters
                    .speech_decode_errors
                    .fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "decode failed for one chunk — skipping");
                Step::Skipped
            }
        }
    }
}
