use anyhow::Result;
use fast_image_resize::Resizer;
use image::RgbImage;
use ndarray::{Array, Axis, Ix2, IxDyn};
use rayon::prelude::*;
use regex::Regex;

use crate::common::{Detection, DetectionSet, Frame, ImageTransformInfo, ModelConfig, YoloPreds};
use crate::detection_runners::detector::{frame_to_rgb, Detector, InferenceOutput};
use crate::detection_runners::inference_process::InferenceProcess;
use crate::detection_runners::ort_detector::{image_ops, OrtEngine};
use crate::error::InferenceError;
use crate::utils;

/// YOLO detector on ONNXRuntime. Produces un-suppressed boxes in model input coordinates.
#[derive(Debug)]
pub struct OrtYolo {
    engine: OrtEngine,
    input_size: u32,
    min_confidence: f32,
    names: Vec<String>,
    layout: YoloPreds,
    profile: bool,
}

impl InferenceProcess for OrtYolo {
    type Input = RgbImage;

    fn preprocess(&self, x: &Self::Input) -> Result<(Array<f32, IxDyn>, ImageTransformInfo)> {
        let mut resizer = Resizer::new();
        image_ops::preprocess(x, self.input_size, &mut resizer)
    }

    fn inference(&mut self, x: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>> {
        self.engine.run(x)
    }

    fn postprocess(&self, y: Array<f32, IxDyn>) -> Result<DetectionSet> {
        decode_predictions(y, self.layout, self.min_confidence, &self.names)
    }
}

/// Decodes a raw `[1, rows, cols]` YOLO output into un-suppressed detections.
///
/// `layout` picks between the anchors-first v5 style (`cx, cy, w, h, objectness, classes...`) and
/// the transposed v8 style (`cx, cy, w, h, classes...` per column). Each anchor keeps its best class;
/// anchors under `min_confidence` or with a non-positive size are dropped. Labels come from `names`
/// when the class id is in range.
pub fn decode_predictions(y: Array<f32, IxDyn>, layout: YoloPreds, min_confidence: f32, names: &[String]) -> Result<DetectionSet> {
    if y.ndim() != 3 || y.shape()[0] == 0 {
        anyhow::bail!("Expected a [1, rows, cols] output tensor, got shape {:?}", y.shape());
    }
    let preds = y.index_axis_move(Axis(0), 0).into_dimensionality::<Ix2>()?;
    let preds = if layout.anchors_first { preds } else { preds.reversed_axes() };

    let nc = layout.num_classes(preds.shape()[1]);
    if nc == 0 {
        anyhow::bail!("Output rows of {} values carry no class scores", preds.shape()[1]);
    }
    let class_offset = if layout.has_objectness { 5 } else { 4 };

    let detections = preds
        .axis_iter(Axis(0))
        .into_par_iter()
        .filter_map(|row| {
            let (class_id, &class_score) = row
                .iter()
                .skip(class_offset)
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))?;

            let confidence = if layout.has_objectness {
                row[4] * class_score
            } else {
                class_score
            };

            // filtering low scores
            if confidence < min_confidence {
                return None;
            }

            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            if w <= 0. || h <= 0. {
                return None;
            }

            let mut det = Detection::default()
                .with_cxcy_wh(cx, cy, w, h)
                .with_confidence(confidence)
                .with_class_id(class_id);
            if let Some(name) = names.get(class_id) {
                det = det.with_label(name);
            }
            Some(det)
        })
        .collect::<Vec<_>>();

    Ok(detections)
}

impl Detector for OrtYolo {
    fn name(&self) -> &'static str {
        "ort-yolo"
    }

    fn infer(&mut self, frame: &Frame) -> Result<InferenceOutput, InferenceError> {
        let image = frame_to_rgb(frame)?;
        let profile = self.profile;
        self.forward(&image, profile)
            .map_err(|err| InferenceError::ModelFailure(format!("{:#}", err)))
    }

    fn warm_up(&mut self) -> Result<(), InferenceError> {
        let blank = RgbImage::new(self.input_size, self.input_size);
        self.run(&blank)
            .map(|_| ())
            .map_err(|err| InferenceError::ModelFailure(format!("warm-up failed: {:#}", err)))
    }
}

impl OrtYolo {
    /// Loads the model, resolves class names and runs one warm-up pass.
    ///
    /// `min_confidence` only trims obviously empty anchors; the post-processor applies the real threshold.
    pub fn new(config: &ModelConfig, min_confidence: f32) -> Result<Self> {
        log::info!("Initializing ORT session with ({}) execution provider", config.inference_device);
        let engine = OrtEngine::new(config)?;

        let names = if config.labels_path.is_empty() {
            Self::fetch_names(&engine).unwrap_or_default()
        } else {
            utils::file_to_vec(&config.labels_path)
                .map_err(|e| anyhow::anyhow!("Failed to read labels file {}: {}", config.labels_path, e))?
        };
        if names.is_empty() {
            log::warn!("No class names found, labels will be left empty");
        }

        log::info!("YOLO Version: {} | Classes: {}", config.model_version.name(), names.len());

        let mut yolo = Self {
            engine,
            input_size: config.input_size,
            min_confidence,
            names,
            layout: config.model_version.layout(),
            profile: false,
        };
        yolo.warm_up()?;
        Ok(yolo)
    }

    pub fn with_profile(mut self, profile: bool) -> Self {
        self.profile = profile;
        self
    }

    fn fetch_names(engine: &OrtEngine) -> Option<Vec<String>> {
        // fetch class names from onnx metadata
        // String format: `{0: 'person', 1: 'bicycle', 2: 'sports ball', ..., 27: "yellow_lady's_slipper"}`
        let re = Regex::new(r#"(['"])([-()\w '"]+)(['"])"#).ok()?;
        engine.try_fetch("names").map(|names| {
            re.captures_iter(&names)
                .map(|x| x.extract::<3>())
                .map(|(_, [_, name, _])| name.to_string())
                .collect()
        })
    }
}
