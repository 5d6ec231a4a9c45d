pub mod detector;
pub mod fixed_detector;
pub mod inference_process;
pub mod inference_worker;
pub mod ort_detector;

pub use detector::*;
pub use fixed_detector::FixedDetector;
pub use inference_worker::InferenceWorker;
pub use ort_detector::OrtYolo;
