//! Typed audio chunk and the tagged channel element that carries it.

/// A contiguous block of mono samples at a known sample rate.
///
/// Produced once by the capture callback; the dispatcher clones it per lane,
/// after which each worker owns an independent copy.
#[derive(Debug, Clone)]
pub struct SampleChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl SampleChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean absolute amplitude — the energy measure the speech worker gates on.
    pub fn mean_abs_amplitude(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().map(|s| s.abs()).sum();
        sum / self.samples.len() as f32
    }
}

/// Element type of every pipeline queue.
///
/// Termination is a distinct variant so it can never be confused with an
/// empty or invalid chunk. Workers treat `Terminate` as a terminal
/// transition, not an error.
#[derive(Debug, Clone)]
pub enum ChunkMessage {
    Chunk(SampleChunk),
    Terminate,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn duration_reflects_rate() {
        let chunk = SampleChunk::new(vec![0.0; 16_000], 16_000);
        assert_relative_eq!(chunk.duration_secs(), 1.0);
    }

    #[test]
    fn mean_abs_amplitude_of_alternating_signal() {
        let samples: Vec<f32> = (0..64)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let chunk = SampleChunk::new(samples, 16_000);
        assert_relative_eq!(chunk.mean_abs_amplitude(), 0.5);
    }

    #[test]
    fn empty_chunk_has_zero_energy() {
        let chunk = SampleChunk::new(vec![], 16_000);
        assert_eq!(chunk.mean_abs_amplitude(), 0.0);
        assert!(chunk.is_empty());
    }
}
