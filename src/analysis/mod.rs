//! Analysis capability abstractions.
//!
//! The workers never embed a decoding or estimation algorithm; they consume
//! opaque capabilities behind these traits ("given N samples at rate R,
//! produce result X"). The crate ships stub backends for development and
//! tests; real backends (Vosk/Whisper-style streaming decoders, YIN pitch
//! trackers, beat trackers) plug in without touching the pipeline.
//!
//! `&mut self` throughout intentionally expresses that backends may be
//! stateful — streaming decoders keep utterance-boundary state between
//! calls.

pub mod spectrum;
pub mod stub;

use crate::error::Result;

/// One decoder response: either a committed utterance or an in-progress
/// hypothesis that a later call may supersede.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Complete utterance boundary reached. Empty text means "no speech in
    /// this span" and is discarded by the caller.
    Final(String),
    /// Provisional hypothesis for the current span.
    Partial(String),
}

/// Stateful streaming speech decoder.
pub trait SpeechDecoder: Send + 'static {
    /// One-time initialization (load models, allocate decoder state).
    /// Failure here is fatal to the speech worker only.
    fn warm_up(&mut self) -> Result<()>;

    /// Feed one chunk of 16-bit PCM and get back the decoder's current
    /// final-or-partial outcome. The decoder owns utterance-boundary
    /// detection.
    fn accept(&mut self, pcm: &[i16]) -> Result<DecodeOutcome>;

    /// Discard any in-flight utterance state.
    fn reset(&mut self);
}

/// Pitch and tempo estimation over a multi-second sample buffer.
pub trait MusicEstimator: Send + 'static {
    /// Per-frame pitch candidates in Hz; values ≤ 0 mean "no pitch detected
    /// for that frame".
    fn pitch_track(&mut self, samples: &[f32], sample_rate: u32) -> Result<Vec<f32>>;

    /// Single scalar BPM estimate over the same buffer.
    fn tempo(&mut self, samples: &[f32], sample_rate: u32) -> Result<f32>;
}

/// Convert normalized f32 samples to the 16-bit PCM encoding streaming
/// decoders consume.
pub fn to_pcm_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_conversion_scales_and_clamps() {
        let pcm = to_pcm_i16(&[0.0, 1.0, -1.0, 2.0, 0.5]);
        assert_eq!(pcm[0], 0);
        assert_eq!(pcm[1], 32767);
        assert_eq!(pcm[2], -32767);
        assert_eq!(pcm[3], 32767);
        assert_eq!(pcm[4], 16383);
    }
}
