//! Parameter channel — configuration updates flowing from subscribers
//! toward the pipeline, decoupled from the audio path.
//!
//! Multi-producer (one `ParamSender` clone per subscriber), single-consumer
//! (the pipeline), same bounded-queue discipline as the audio channels:
//! a full queue drops the update rather than blocking the submitter.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// An arbitrary key/value payload from a subscriber. No schema validation —
/// the payload is enqueued verbatim for downstream consumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ParamUpdate(pub serde_json::Value);

/// Receiving half, owned by the pipeline.
pub type ParamReceiver = Receiver<ParamUpdate>;

/// Cloneable submission handle handed to subscribers.
#[derive(Debug, Clone)]
pub struct ParamSender(Sender<ParamUpdate>);

impl ParamSender {
    /// Enqueue an update; returns `false` (and logs) if the queue is full or
    /// the pipeline is gone. Best-effort: no retry, no ack.
    pub fn submit(&self, update: ParamUpdate) -> bool {
        match self.0.try_send(update) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("parameter queue full — update dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("parameter queue disconnected — update dropped");
                false
            }
        }
    }
}

/// Create a bounded parameter queue.
pub fn param_channel(capacity: usize) -> (ParamSender, ParamReceiver) {
    let (tx, rx) = bounded(capacity);
    (ParamSender(tx), rx)
}
