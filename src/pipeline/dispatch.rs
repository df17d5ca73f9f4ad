//! Single-reader fan-out from the ingest queue to the three worker lanes.
//!
//! Each lane is an independent backpressure domain: a full speech queue can
//! drop speech chunks while music and spectrum keep receiving theirs. The
//! dispatcher itself never does analysis work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, SendTimeoutError};
use tracing::{debug, info, trace, warn};

use super::{ChunkMessage, ChunkReceiver, ChunkSender, PipelineCounters, SampleChunk};

/// The three destination lanes, in fixed order.
pub struct DispatchLanes {
    pub speech: ChunkSender,
    pub music: ChunkSender,
    pub spectrum: ChunkSender,
}

impl DispatchLanes {
    fn iter(&self) -> [(&'static str, &ChunkSender); 3] {
        [
            ("speech", &self.speech),
            ("music", &self.music),
            ("spectrum", &self.spectrum),
        ]
    }
}

pub struct Dispatcher {
    ingest: ChunkReceiver,
    lanes: DispatchLanes,
    counters: Arc<PipelineCounters>,
    /// How long to wait for an ingest chunk before re-checking. Empty-queue
    /// timeouts are steady-state, not errors.
    recv_timeout: Duration,
    /// How long to wait on a full lane before dropping for that lane only.
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        ingest: ChunkReceiver,
        lanes: DispatchLanes,
        counters: Arc<PipelineCounters>,
        recv_timeout: Duration,
        send_timeout: Duration,
    ) -> Self {
        Self {
            ingest,
            lanes,
            counters,
            recv_timeout,
            send_timeout,
        }
    }

    /// Run until the ingest queue yields `Terminate` or disconnects.
    pub fn run(self) {
        info!("dispatcher started");
        loop {
            match self.ingest.recv_timeout(self.recv_timeout) {
                Ok(ChunkMessage::Chunk(chunk)) => {
                    self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                    self.fan_out(chunk);
                }
                Ok(ChunkMessage::Terminate) => {
                    debug!("dispatcher received terminate");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    trace!("ingest queue empty");
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("ingest queue disconnected");
                    break;
                }
            }
        }
        self.propagate_terminate();
        info!("dispatcher stopped");
    }

    /// Replicate one chunk onto every lane, dropping independently per lane.
    fn fan_out(&self, chunk: SampleChunk) {
        for (name, lane) in self.lanes.iter() {
            match lane.send_timeout(ChunkMessage::Chunk(chunk.clone()), self.send_timeout) {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(_)) => {
                    self.drop_counter(name).fetch_add(1, Ordering::Relaxed);
                    warn!(lane = name, "worker queue full past timeout — chunk dropped");
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    // Worker already gone (e.g. fatal-to-worker exit). The
                    // remaining lanes keep receiving.
                    self.drop_counter(name).fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Forward exactly one sentinel to each lane.
    fn propagate_terminate(&self) {
        for (name, lane) in self.lanes.iter() {
            if let Err(e) = lane.send_timeout(ChunkMessage::Terminate, self.send_timeout) {
                // The lifecycle controller also injects sentinels directly at
                // shutdown, so a full or disconnected lane is not fatal here.
                warn!(lane = name, error = %e, "could not forward terminate");
            }
        }
    }

    fn drop_counter(&self, lane: &str) -> &AtomicUsize {
        match lane {
            "speech" => &self.counters.dropped_speech,
            "music" => &self.counters.dropped_music,
            _ => &self.counters.dropped_spectrum,
        }
    }
}
