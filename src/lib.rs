//! sonoscope — real-time microphone fan-out and analysis pipeline.
//!
//! One capture source feeds three independent analysis workers through a
//! dispatcher; workers publish into a shared state that a periodic
//! publisher broadcasts to subscribers.
//!
//! ```text
//!  microphone ──► ingest queue ──► dispatcher ──┬─► speech worker  ──┐
//!   (cpal cb)                                   ├─► music worker   ──┼─► AnalysisState
//!                                               └─► spectrum worker──┘        │
//!                                                                             ▼
//!  subscribers ◄── broadcast ◄──────────────────────────────────── publisher loop
//! ```
//!
//! Every queue is bounded; a congested stage drops chunks for itself without
//! stalling capture or the other stages. Shutdown is sentinel-driven with a
//! bounded grace period.
//!
//! The speech and music analyses are pluggable through the
//! [`SpeechDecoder`](analysis::SpeechDecoder) and
//! [`MusicEstimator`](analysis::MusicEstimator) traits;
//! [`analysis::stub`] provides dependency-free implementations for demos
//! and tests.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod analysis;
pub mod audio;
pub mod engine;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod publish;
pub mod state;
pub mod workers;

pub use analysis::{DecodeOutcome, MusicEstimator, SpeechDecoder};
pub use engine::{Pipeline, PipelineConfig, PipelineStatus, StatusEvent};
pub use error::{Result, SonoscopeError};
pub use params::{ParamSender, ParamUpdate};
pub use publish::SnapshotEvent;
pub use state::{AnalysisSnapshot, AnalysisState};
