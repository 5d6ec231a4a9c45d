//! Runtime options for post-processing and the frame pipeline.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::common::{Encoding, ModelConfig};
use crate::error::ConfigError;

/// Options consumed by the post-processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    /// Class ids to keep. Empty keeps every class.
    pub class_filter: BTreeSet<usize>,
    /// Suppress overlapping boxes across classes instead of per class.
    pub agnostic_nms: bool,
    pub distance_estimation_enabled: bool,
    /// Real-world width of the tracked object, in the unit distances are reported in.
    pub known_object_width: f32,
    /// Focal length in pixels, usually calibrated from a reference shot.
    pub focal_length: f32,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            conf_threshold: 0.4,
            iou_threshold: 0.45,
            class_filter: BTreeSet::new(),
            agnostic_nms: false,
            distance_estimation_enabled: false,
            known_object_width: 0.,
            focal_length: 0.,
        }
    }
}

impl DetectConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_conf_threshold(mut self, x: f32) -> Self {
        self.conf_threshold = x;
        self
    }

    pub fn with_iou_threshold(mut self, x: f32) -> Self {
        self.iou_threshold = x;
        self
    }

    pub fn with_classes(mut self, classes: &[usize]) -> Self {
        self.class_filter = classes.iter().copied().collect();
        self
    }

    pub fn with_agnostic_nms(mut self, x: bool) -> Self {
        self.agnostic_nms = x;
        self
    }

    /// Enables marker distance estimation with the given calibration.
    pub fn with_distance(mut self, known_object_width: f32, focal_length: f32) -> Self {
        self.distance_estimation_enabled = true;
        self.known_object_width = known_object_width;
        self.focal_length = focal_length;
        self
    }

    pub fn is_class_wanted(&self, class_id: usize) -> bool {
        self.class_filter.is_empty() || self.class_filter.contains(&class_id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        unit_range("conf_threshold", self.conf_threshold)?;
        unit_range("iou_threshold", self.iou_threshold)?;
        if self.distance_estimation_enabled {
            positive("known_object_width", self.known_object_width)?;
            positive("focal_length", self.focal_length)?;
        }
        Ok(())
    }
}

/// Options for the controller and publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Give up on a frame whose inference takes longer than this. `None` waits indefinitely.
    pub inference_timeout_ms: Option<u64>,
    /// How long an idle worker sleeps waiting for a frame before re-checking for shutdown.
    pub idle_wait_ms: u64,
    /// Layout frames are converted to on receipt; must match what the detector accepts.
    pub input_encoding: Encoding,
    pub output_encoding: Encoding,
    /// Draw detections onto the published image.
    pub annotate: bool,
    /// Bound of the output channel.
    pub output_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inference_timeout_ms: Some(2_000),
            idle_wait_ms: 100,
            input_encoding: Encoding::Rgb8,
            output_encoding: Encoding::Bgr8,
            annotate: true,
            output_capacity: 10,
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sub-millisecond timeouts round up to 1ms; a zero timeout stays zero.
    pub fn with_inference_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inference_timeout_ms = timeout
            .map(|t| u64::try_from(t.as_micros().div_ceil(1000)).unwrap_or(u64::MAX));
        self
    }

    pub fn with_annotate(mut self, x: bool) -> Self {
        self.annotate = x;
        self
    }

    pub fn with_output_encoding(mut self, encoding: Encoding) -> Self {
        self.output_encoding = encoding;
        self
    }

    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = capacity;
        self
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        self.inference_timeout_ms.map(Duration::from_millis)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

/// Everything a deployment configures, as read from a TOML file.
///
/// ```toml
/// [model]
/// weights_path = "runs/train/yolov5s_results6/weights/best.onnx"
/// input_size = 416
/// inference_device = "0"
///
/// [detect]
/// conf_threshold = 0.4
/// class_filter = [0, 2]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub model: ModelConfig,
    pub detect: DetectConfig,
    pub pipeline: PipelineConfig,
}

impl DetectorSettings {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let settings: DetectorSettings = toml::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let size = self.model.input_size;
        if size == 0 || size % 32 != 0 {
            return Err(ConfigError::InputSize(size));
        }
        self.detect.validate()
    }
}

fn unit_range(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { name, value })
    }
}

fn positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value > 0. && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}
