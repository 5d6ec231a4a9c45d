use std::time::Instant;
use ndarray::{Array, IxDyn};
use crate::common::{DetectionSet, ImageTransformInfo};
use crate::detection_runners::detector::InferenceOutput;
use crate::utils;

/// Stages of a model-backed detector.
pub trait InferenceProcess: Sized {
    type Input;

    /// Pre-process the input data.
    fn preprocess(&self, x: &Self::Input) -> anyhow::Result<(Array<f32, IxDyn>, ImageTransformInfo)>;

    /// Executes the model on the preprocessed data.
    fn inference(&mut self, x: Array<f32, IxDyn>) -> anyhow::Result<Array<f32, IxDyn>>;

    /// Decode the model's output into detections in model input coordinates.
    fn postprocess(&self, y: Array<f32, IxDyn>) -> anyhow::Result<DetectionSet>;

    /// Executes the full pipeline.
    fn run(&mut self, x: &Self::Input) -> anyhow::Result<InferenceOutput> {
        let (xs, transform) = self.preprocess(x)?;
        let ys = self.inference(xs)?;
        let detections = self.postprocess(ys)?;
        Ok(InferenceOutput::new(detections, transform))
    }

    /// Executes the full pipeline, tracing the time spent in each stage.
    fn forward(&mut self, x: &Self::Input, profile: bool) -> anyhow::Result<InferenceOutput> {
        let detect_time = Instant::now();
        let mut _detect_elapsed = detect_time.elapsed();

        let (xs, transform) = self.preprocess(x)?;
        let t_pre = detect_time.elapsed();
        _detect_elapsed = utils::trace("TIME", "Preprocessing input", detect_time, _detect_elapsed);

        let ys = self.inference(xs)?;
        let t_exe = detect_time.elapsed() - t_pre;
        _detect_elapsed = utils::trace("TIME", "Detection run", detect_time, _detect_elapsed);

        let detections = self.postprocess(ys)?;
        let t_post = detect_time.elapsed() - t_pre - t_exe;
        utils::trace("TIME", "Postprocessing", detect_time, _detect_elapsed);

        if profile {
            log::info!("> Preprocess: {t_pre:?} | Inference: {t_exe:?} | Postprocess: {t_post:?}");
        }

        Ok(InferenceOutput::new(detections, transform))
    }
}
