//! Live demo: capture from the default microphone with stub analysis
//! backends and print one snapshot per second until Ctrl-C.
//!
//! ```sh
//! RUST_LOG=sonoscope=debug cargo run --bin live
//! ```

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sonoscope::analysis::stub::{StubDecoder, StubEstimator};
use sonoscope::audio::device::list_input_devices;
use sonoscope::{Pipeline, PipelineConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sonoscope=info")),
        )
        .init();

    for device in list_input_devices() {
        info!(
            name = device.name.as_str(),
            default = device.is_default,
            "input device"
        );
    }

    let pipeline = Arc::new(Pipeline::new(PipelineConfig::default()));
    pipeline.start(
        Box::new(StubDecoder::new()),
        Box::new(StubEstimator::default()),
    )?;

    let mut snapshots = pipeline.subscribe_snapshots();
    let printer = tokio::spawn(async move {
        while let Ok(event) = snapshots.recv().await {
            info!(
                seq = event.seq,
                speech = event.snapshot.speech_text.as_str(),
                pitch_hz = event.snapshot.pitch_hz,
                tempo_bpm = event.snapshot.tempo_bpm,
                spectrum_bins = event.snapshot.spectrum.len(),
                "snapshot"
            );
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");

    for update in pipeline.drain_params() {
        info!(payload = %update.0, "unconsumed parameter update");
    }
    if let Err(e) = pipeline.stop() {
        warn!(error = %e, "shutdown was not clean");
    }
    printer.abort();

    let counters = pipeline.counters();
    info!(
        dispatched = counters.dispatched,
        capture_dropped = counters.capture_dropped,
        speech_chunks = counters.speech_chunks,
        music_windows = counters.music_windows,
        spectrum_updates = counters.spectrum_updates,
        "final counters"
    );
    Ok(())
}
