use serde::{Deserialize, Serialize};

/// Where the model runs. A bare number selects that CUDA device, so `--device 0` means CUDA device 0.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InferenceDevice {
    #[default] CPU,
    CUDA(usize),
    TensorRT(usize),
    CoreML(usize),
}

// Hardcoded device names, as accepted on the command line.
const CPU: &str = "cpu";
const CUDA: &str = "cuda";
const TENSOR_RT: &str = "tensorrt";
const CORE_ML: &str = "coreml";

impl InferenceDevice {
    pub fn from_str(device: &str, device_id: usize) -> Option<Self> {
        match device.to_lowercase().as_str() {
            CPU => Some(InferenceDevice::CPU),
            CUDA | "gpu" => Some(InferenceDevice::CUDA(device_id)),
            TENSOR_RT => Some(InferenceDevice::TensorRT(device_id)),
            CORE_ML => Some(InferenceDevice::CoreML(device_id)),
            _ => None,
        }
    }

    /// Parses `cpu`, `0`, `cuda:1`, `tensorrt:0` and the like. An empty string means CPU.
    pub fn parse(device: &str) -> Option<Self> {
        let device = device.trim();
        if device.is_empty() {
            return Some(InferenceDevice::CPU);
        }
        if let Ok(id) = device.parse::<usize>() {
            return Some(InferenceDevice::CUDA(id));
        }
        match device.split_once(':') {
            Some((name, id)) => InferenceDevice::from_str(name, id.trim().parse().ok()?),
            None => InferenceDevice::from_str(device, 0),
        }
    }

    pub fn str_lowercase(&self) -> &'static str {
        match self {
            InferenceDevice::CPU => CPU,
            InferenceDevice::CUDA(_) => CUDA,
            InferenceDevice::TensorRT(_) => TENSOR_RT,
            InferenceDevice::CoreML(_) => CORE_ML,
        }
    }

    pub fn device_id(&self) -> Option<usize> {
        match self {
            InferenceDevice::CPU => None,
            InferenceDevice::CUDA(id) | InferenceDevice::TensorRT(id) | InferenceDevice::CoreML(id) => Some(*id),
        }
    }

    pub fn all_inference_devices() -> Vec<String> {
        vec![
            CPU.to_string(),
            CUDA.to_string(),
            TENSOR_RT.to_string(),
            CORE_ML.to_string(),
        ]
    }
}

impl std::fmt::Display for InferenceDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.device_id() {
            None => f.write_str(self.str_lowercase()),
            Some(id) => write!(f, "{}:{}", self.str_lowercase(), id),
        }
    }
}

impl TryFrom<String> for InferenceDevice {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        InferenceDevice::parse(&value).ok_or_else(|| {
            format!("unknown device '{}', expected a GPU id or one of {:?}", value, InferenceDevice::all_inference_devices())
        })
    }
}

impl From<InferenceDevice> for String {
    fn from(device: InferenceDevice) -> Self {
        device.to_string()
    }
}
