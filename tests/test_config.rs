extern crate duckie_detect;

use std::io::Write;
use std::time::Duration;
use duckie_detect::common::{Encoding, InferenceDevice, ModelVersion};
use duckie_detect::data::{DetectConfig, DetectorSettings, PipelineConfig};
use duckie_detect::error::ConfigError;

#[test]
fn settings_load_from_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"
[model]
weights_path = "weights/duckie.onnx"
model_version = "yolov8"
inference_device = "0"
input_size = 640

[detect]
conf_threshold = 0.5
class_filter = [0, 2]
agnostic_nms = true

[pipeline]
inference_timeout_ms = 500
output_encoding = "rgb8"
"#).unwrap();

    let settings = DetectorSettings::load(file.path()).unwrap();
    assert_eq!(settings.model.weights_path, "weights/duckie.onnx");
    assert_eq!(settings.model.model_version, ModelVersion::YoloV8);
    assert_eq!(settings.model.inference_device, InferenceDevice::CUDA(0));
    assert_eq!(settings.model.input_size, 640);
    assert_eq!(settings.detect.conf_threshold, 0.5);
    assert_eq!(settings.detect.iou_threshold, 0.45);
    assert!(settings.detect.is_class_wanted(2));
    assert!(!settings.detect.is_class_wanted(1));
    assert!(settings.detect.agnostic_nms);
    assert_eq!(settings.pipeline.inference_timeout(), Some(Duration::from_millis(500)));
    assert_eq!(settings.pipeline.output_encoding, Encoding::Rgb8);
}

#[test]
fn empty_file_gives_defaults() {
    let settings = DetectorSettings::from_toml_str("").unwrap();
    assert_eq!(settings, DetectorSettings::default());
    assert_eq!(settings.model.input_size, 416);
    assert_eq!(settings.pipeline.output_encoding, Encoding::Bgr8);
}

#[test]
fn out_of_range_values_are_rejected() {
    let err = DetectorSettings::from_toml_str("[detect]\nconf_threshold = 1.5\n").unwrap_err();
    assert!(matches!(err, ConfigError::OutOfUnitRange { name: "conf_threshold", .. }));

    let err = DetectorSettings::from_toml_str("[model]\ninput_size = 500\n").unwrap_err();
    assert!(matches!(err, ConfigError::InputSize(500)));

    let err = DetectConfig::new().with_distance(20., 0.).validate().unwrap_err();
    assert!(matches!(err, ConfigError::NotPositive { name: "focal_length", .. }));
}

#[test]
fn unreadable_or_malformed_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let missing = DetectorSettings::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(missing, ConfigError::Io { .. }));

    let err = DetectorSettings::from_toml_str("[detect\nconf_threshold = ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn device_names_parse() {
    assert_eq!(InferenceDevice::parse(""), Some(InferenceDevice::CPU));
    assert_eq!(InferenceDevice::parse("1"), Some(InferenceDevice::CUDA(1)));
    assert_eq!(InferenceDevice::parse("tensorrt:0"), Some(InferenceDevice::TensorRT(0)));
    assert_eq!(InferenceDevice::CUDA(0).to_string(), "cuda:0");
}

#[test]
fn sub_millisecond_timeouts_round_up() {
    let timeout = |t| PipelineConfig::new().with_inference_timeout(t).inference_timeout();

    assert_eq!(timeout(Some(Duration::from_micros(300))), Some(Duration::from_millis(1)));
    assert_eq!(timeout(Some(Duration::from_micros(1500))), Some(Duration::from_millis(2)));
    assert_eq!(timeout(Some(Duration::from_millis(250))), Some(Duration::from_millis(250)));
    assert_eq!(timeout(Some(Duration::ZERO)), Some(Duration::ZERO));
    assert_eq!(timeout(Some(Duration::MAX)), Some(Duration::from_millis(u64::MAX)));
    assert_eq!(timeout(None), None);
}
