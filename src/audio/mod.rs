//! Audio capture via cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It must never block: the only queue operation it performs is a
//! `try_send` into the bounded ingest channel, and a full channel drops the
//! chunk with a warning rather than waiting. Device-level stream errors are
//! logged from the error callback and never raised inside the data path.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must be created and dropped on the same thread;
//! the lifecycle controller runs it on a dedicated capture thread.

pub mod device;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample, Stream,
};

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use crate::error::{Result, SonoscopeError};
use crate::pipeline::{ChunkMessage, ChunkSender, PipelineCounters, SampleChunk};
use tracing::{error, info, warn};

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — create and drop on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to make the callback no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise the default input
    /// device, otherwise the first available one. Mono-downmixed f32 chunks
    /// are `try_send`-enqueued on `ingest`.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        ingest: ChunkSender,
        running: Arc<AtomicBool>,
        counters: Arc<PipelineCounters>,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let mut selected = None;

        if let Some(preferred) = preferred_device_name {
            match host.input_devices() {
                Ok(mut devices) => {
                    selected = devices
                        .find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                    if selected.is_none() {
                        warn!("preferred input device '{preferred}' not found, falling back");
                    }
                }
                Err(e) => warn!("failed to list input devices while resolving preference: {e}"),
            }
        }

        let device = if let Some(device) = selected {
            device
        } else if let Some(default) = host.default_input_device() {
            default
        } else {
            let mut devices = host
                .input_devices()
                .map_err(|e| SonoscopeError::AudioDevice(e.to_string()))?;
            let fallback = devices.next().ok_or(SonoscopeError::NoDefaultInputDevice)?;
            warn!("no default input device, falling back to first available input");
            fallback
        };

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| SonoscopeError::AudioDevice(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config = supported.config();

        info!(sample_rate, channels, "audio config selected");

        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_stream::<f32>(
                &device, &config, channels, sample_rate, ingest, Arc::clone(&running), counters,
            ),
            SampleFormat::I16 => build_stream::<i16>(
                &device, &config, channels, sample_rate, ingest, Arc::clone(&running), counters,
            ),
            SampleFormat::U16 => build_stream::<u16>(
                &device, &config, channels, sample_rate, ingest, Arc::clone(&running), counters,
            ),
            fmt => Err(SonoscopeError::AudioStream(format!(
                "unsupported sample format: {fmt:?}"
            ))),
        }?;

        stream
            .play()
            .map_err(|e| SonoscopeError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Open the system default microphone.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(
        ingest: ChunkSender,
        running: Arc<AtomicBool>,
        counters: Arc<PipelineCounters>,
    ) -> Result<Self> {
        Self::open_with_preference(ingest, running, counters, None)
    }

    /// Stop: signal the callback to no-op on its next invocation.
    /// Idempotent; actual device teardown happens when the handle drops.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Build an input stream for one sample format, downmixing to mono f32.
#[cfg(feature = "audio-cpal")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sample_rate: u32,
    ingest: ChunkSender,
    running: Arc<AtomicBool>,
    counters: Arc<PipelineCounters>,
) -> Result<Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let dropped_since_warn = AtomicUsize::new(0);
    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                let chunk = downmix_to_mono(data, channels);
                match ingest.try_send(ChunkMessage::Chunk(SampleChunk::new(chunk, sample_rate))) {
                    Ok(()) => {}
                    Err(_) => {
                        counters.capture_dropped.fetch_add(1, Ordering::Relaxed);
                        // Rate-limit the warning so a stalled dispatcher
                        // doesn't flood the log from the RT thread.
                        if dropped_since_warn.fetch_add(1, Ordering::Relaxed) % 50 == 0 {
                            warn!("ingest queue full — dropping capture chunk");
                        }
                    }
                }
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| SonoscopeError::AudioStream(e.to_string()))
}

/// Average interleaved frames down to one mono f32 sample per frame.
#[cfg(feature = "audio-cpal")]
fn downmix_to_mono<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    if channels <= 1 {
        return data.iter().map(|s| f32::from_sample(*s)).collect();
    }
    data.chunks_exact(channels)
        .map(|frame| {
            frame.iter().map(|s| f32::from_sample(*s)).sum::<f32>() / channels as f32
        })
        .collect()
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _ingest: ChunkSender,
        _running: Arc<AtomicBool>,
        _counters: Arc<PipelineCounters>,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(SonoscopeError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn open_default(
        ingest: ChunkSender,
        running: Arc<AtomicBool>,
        counters: Arc<PipelineCounters>,
    ) -> Result<Self> {
        Self::open_with_preference(ingest, running, counters, None)
    }
}

#[cfg(all(test, feature = "audio-cpal"))]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_interleaved_stereo_frames() {
        let data: Vec<f32> = vec![0.2, 0.4, -0.5, 0.5, 1.0, 0.0];
        let mono = downmix_to_mono(&data, 2);
        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
        assert!((mono[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_passes_mono_through() {
        let data: Vec<i16> = vec![0, 16384, -16384];
        let mono = downmix_to_mono(&data, 1);
        assert_eq!(mono.len(), 3);
        assert!((mono[1] - 0.5).abs() < 1e-3);
        assert!((mono[2] + 0.5).abs() < 1e-3);
    }
}
