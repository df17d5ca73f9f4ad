//! Stub capability backends — no real decoding or estimation.
//!
//! Used by the demo binary and tests so the full fan-out pipeline can be
//! exercised end-to-end before real backends are wired in.

use tracing::debug;

use super::{DecodeOutcome, MusicEstimator, SpeechDecoder};
use crate::error::Result;

/// Echo-style decoder.
///
/// Accumulates sample counts and pretends to reach an utterance boundary
/// every `finals_every` calls; other calls return a partial ellipsis.
pub struct StubDecoder {
    calls: u32,
    finals_every: u32,
    accepted_samples: usize,
}

impl StubDecoder {
    pub fn new() -> Self {
        Self {
            calls: 0,
            finals_every: 8,
            accepted_samples: 0,
        }
    }
}

impl Default for StubDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechDecoder for StubDecoder {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubDecoder::warm_up — no-op");
        Ok(())
    }

    fn accept(&mut self, pcm: &[i16]) -> Result<DecodeOutcome> {
        self.calls += 1;
        self.accepted_samples += pcm.len();
        if self.calls % self.finals_every == 0 {
            let text = format!("[stub: {} samples heard]", self.accepted_samples);
            self.accepted_samples = 0;
            Ok(DecodeOutcome::Final(text))
        } else {
            Ok(DecodeOutcome::Partial("\u{2026}".to_string()))
        }
    }

    fn reset(&mut self) {
        debug!("StubDecoder::reset");
        self.accepted_samples = 0;
    }
}

/// Constant-output estimator.
pub struct StubEstimator {
    pub pitch_hz: f32,
    pub tempo_bpm: f32,
}

impl StubEstimator {
    pub fn new(pitch_hz: f32, tempo_bpm: f32) -> Self {
        Self { pitch_hz, tempo_bpm }
    }
}

impl Default for StubEstimator {
    fn default() -> Self {
        Self::new(440.0, 120.0)
    }
}

impl MusicEstimator for StubEstimator {
    fn pitch_track(&mut self, samples: &[f32], _sample_rate: u32) -> Result<Vec<f32>> {
        // One candidate per ~23 ms frame, like a real per-frame tracker.
        let frames = (samples.len() / 512).max(1);
        Ok(vec![self.pitch_hz; frames])
    }

    fn tempo(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<f32> {
        Ok(self.tempo_bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_decoder_emits_final_every_nth_call() {
        let mut decoder = StubDecoder::new();
        decoder.warm_up().unwrap();
        let mut finals = 0;
        for _ in 0..16 {
            match decoder.accept(&[0; 1024]).unwrap() {
                DecodeOutcome::Final(text) => {
                    finals += 1;
                    assert!(text.contains("samples heard"));
                }
                DecodeOutcome::Partial(text) => assert_eq!(text, "\u{2026}"),
            }
        }
        assert_eq!(finals, 2);
    }

    #[test]
    fn stub_estimator_returns_configured_values() {
        let mut est = StubEstimator::new(220.0, 90.0);
        let track = est.pitch_track(&vec![0.0; 2048], 16_000).unwrap();
        assert_eq!(track, vec![220.0; 4]);
        assert_eq!(est.tempo(&[], 16_000).unwrap(), 90.0);
    }
}
