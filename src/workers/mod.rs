//! Analysis worker loops.
//!
//! Every worker follows the same shape: pull one tagged message off its own
//! bounded channel with a bounded wait, process it, and report the outcome
//! as an explicit [`Step`] value. The loop — not exception propagation —
//! decides whether to continue or terminate, so transient per-item failures
//! can never escape a worker.

pub mod music;
pub mod speech;
pub mod spectrum;

use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tracing::trace;

use crate::pipeline::{ChunkMessage, ChunkReceiver, SampleChunk};

/// Outcome of processing a single dequeued chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Chunk fully processed (state may have been updated).
    Processed,
    /// Chunk intentionally skipped (silence gate, recoverable error).
    Skipped,
    /// Unrecoverable worker-scoped failure — terminate this worker only.
    Fatal,
}

/// One bounded-wait poll of a worker channel.
pub(crate) enum Polled {
    Chunk(SampleChunk),
    Terminate,
    Empty,
}

pub(crate) fn poll_chunk(rx: &ChunkReceiver, timeout: Duration) -> Polled {
    match rx.recv_timeout(timeout) {
        Ok(ChunkMessage::Chunk(chunk)) => Polled::Chunk(chunk),
        Ok(ChunkMessage::Terminate) => Polled::Terminate,
        Err(RecvTimeoutError::Timeout) => {
            trace!("worker queue empty");
            Polled::Empty
        }
        // All senders gone — equivalent to termination.
        Err(RecvTimeoutError::Disconnected) => Polled::Terminate,
    }
}
