use thiserror::Error;

/// All errors produced by sonoscope.
#[derive(Debug, Error)]
pub enum SonoscopeError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("speech decoder error: {0}")]
    Decode(String),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("pipeline is not running")]
    NotRunning,

    #[error("stage '{stage}' did not exit within the shutdown grace period")]
    ShutdownTimeout { stage: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SonoscopeError>;
