//! Publisher loop — periodic best-effort broadcast of analysis snapshots.
//!
//! Every interval the loop takes one atomic snapshot of the shared state and
//! sends it to all currently attached subscribers over a broadcast channel.
//! There is no delivery acknowledgment or retry: a missed or lagged event is
//! superseded by the next one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::state::{AnalysisSnapshot, AnalysisState};

/// How finely the inter-publish sleep is sliced so a stop request is
/// observed promptly rather than after a full interval.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// One published snapshot with a monotonically increasing sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEvent {
    pub seq: u64,
    pub snapshot: AnalysisSnapshot,
}

/// Run until `running` goes false. Consumes the thread it runs on.
pub fn run(
    state: Arc<AnalysisState>,
    tx: broadcast::Sender<SnapshotEvent>,
    running: Arc<AtomicBool>,
    interval: Duration,
) {
    info!(interval_ms = interval.as_millis() as u64, "publisher started");
    let mut seq = 0u64;

    while running.load(Ordering::Relaxed) {
        let event = SnapshotEvent {
            seq,
            snapshot: state.snapshot(),
        };
        seq += 1;
        // Err just means no subscribers are attached right now.
        if tx.send(event).is_err() {
            trace!("no snapshot subscribers attached");
        }

        let deadline = Instant::now() + interval;
        while running.load(Ordering::Relaxed) && Instant::now() < deadline {
            std::thread::sleep(SLEEP_SLICE.min(deadline.saturating_duration_since(Instant::now())));
        }
    }
    debug!(published = seq, "publisher stopped");
}
