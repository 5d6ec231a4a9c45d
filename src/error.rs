//! Per-frame error taxonomy. Every variant is scoped to the frame in flight.

use std::time::Duration;
use thiserror::Error;

/// The inbound message could not be turned into a frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameDecodeError {
    #[error("unsupported image encoding '{0}'")]
    UnsupportedEncoding(String),
    #[error("image has zero size ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("row step {step} is smaller than {min} bytes for width {width}")]
    BadStep { step: u32, min: u32, width: u32 },
    #[error("image data holds {actual} bytes, expected {expected}")]
    DataLength { expected: usize, actual: usize },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    #[error("frame not supported by the detector: {0}")]
    Unsupported(String),
    #[error("model failure: {0}")]
    ModelFailure(String),
    #[error("inference did not finish within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to serialize result: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cannot render output image: {0}")]
    Image(#[from] FrameDecodeError),
    #[error("output channel disconnected")]
    Disconnected,
    #[error("transport rejected result: {0}")]
    Transport(String),
}

/// Anything that can make the pipeline drop a single frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Decode(#[from] FrameDecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    OutOfUnitRange { name: &'static str, value: f32 },
    #[error("{name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f32 },
    #[error("input size must be a positive multiple of 32, got {0}")]
    InputSize(u32),
    #[error("failed to read config file {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Why a pipeline could not be started.
#[derive(Debug, Error)]
pub enum PipelineSetupError {
    #[error("invalid detection settings: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to start inference thread: {0}")]
    Spawn(#[from] std::io::Error),
}
