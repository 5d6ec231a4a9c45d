use serde::{Deserialize, Serialize};
use crate::common::inference_device::InferenceDevice;
use crate::common::model_version::ModelVersion;

/// Files and runtime placement for the production detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub weights_path: String,
    pub ort_lib_path: String,
    /// One class name per line. Empty means use the model metadata, or `# n` placeholders.
    pub labels_path: String,
    pub inference_device: InferenceDevice,
    pub model_version: ModelVersion,
    /// Square model input resolution in pixels.
    pub input_size: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights_path: "weights/best.onnx".to_string(),
            ort_lib_path: "libonnxruntime.so".to_string(),
            labels_path: String::new(),
            inference_device: InferenceDevice::CPU,
            model_version: ModelVersion::YoloV5,
            input_size: 416,
        }
    }
}

impl ModelConfig {
    pub fn new(weights_path: String, ort_lib_path: String, labels_path: String,
               inference_device: InferenceDevice, model_version: ModelVersion, input_size: u32) -> Self {
        Self {
            weights_path,
            ort_lib_path,
            labels_path,
            inference_device,
            model_version,
            input_size,
        }
    }

    pub fn set_device_type(&mut self, device_type: InferenceDevice) {
        self.inference_device = device_type;
    }

    pub fn summary(&self) -> String {
        format!("Weights File Path: {}\n\
        Labels Path: {}\n\
        OnnxRuntime Lib Path: {}\n\
        Inference Device: {}\n\
        Model Version: {}\n\
        Model Input Resolution: {}x{}",
                self.weights_path, self.labels_path, self.ort_lib_path,
                self.inference_device, self.model_version.name(),
                self.input_size, self.input_size)
    }
}
