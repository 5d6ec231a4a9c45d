mod utils;
pub mod bridge;
pub mod common;
pub mod data;
pub mod detection_processing;
pub mod detection_runners;
pub mod distance;
pub mod error;
pub mod frame_store;
pub mod pipeline;
pub mod publisher;

use crate::common::ModelConfig;
use crate::data::DetectConfig;
use crate::detection_runners::OrtYolo;

pub use crate::bridge::{ImageConverter, ImageMessage};
pub use crate::detection_processing::PostProcessor;
pub use crate::frame_store::FrameStore;
pub use crate::pipeline::{FrameOutcome, PipelineController, PipelineState, PipelineStats};
pub use crate::publisher::{ChannelSink, DetectionMessage, PublishedResult, ResultPublisher, Sink};

/// Loads the ONNX model described by `model_details` and warms it up.
///
/// The decoder keeps every box at or above `detect_config.conf_threshold`; suppression happens later
/// in [`PostProcessor`].
pub fn init_detector(model_details: &ModelConfig, detect_config: &DetectConfig) -> anyhow::Result<OrtYolo> {
    log::debug!("\n{}", model_details.summary());
    OrtYolo::new(model_details, detect_config.conf_threshold)
}
