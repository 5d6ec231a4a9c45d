use image::RgbImage;
use crate::common::{DetectionSet, Encoding, Frame, ImageTransformInfo};
use crate::error::InferenceError;

/// Raw model output for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    /// Boxes in model input coordinates, in model output order.
    pub detections: DetectionSet,
    pub transform: ImageTransformInfo,
}

impl InferenceOutput {
    pub fn new(detections: DetectionSet, transform: ImageTransformInfo) -> Self {
        Self { detections, transform }
    }

    /// Rescales every box to source image pixels.
    pub fn into_source_space(self) -> DetectionSet {
        let transform = self.transform;
        self.detections
            .into_iter()
            .map(|mut det| {
                det.bbox = transform.to_source(&det.bbox);
                det
            })
            .collect()
    }
}

/// Anything that turns a frame into raw detections.
///
/// Implementations may keep whatever state the model needs, but one call must not influence the
/// result of the next beyond that.
pub trait Detector: Send {
    fn name(&self) -> &'static str;

    fn infer(&mut self, frame: &Frame) -> Result<InferenceOutput, InferenceError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<(), InferenceError> {
        Ok(())
    }
}

/// Checks a frame is a non-empty `rgb8` buffer and returns it as an image.
pub fn frame_to_rgb(frame: &Frame) -> Result<RgbImage, InferenceError> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(InferenceError::Unsupported(format!("frame has zero size ({}x{})", width, height)));
    }
    if frame.encoding() != Encoding::Rgb8 {
        return Err(InferenceError::Unsupported(format!(
            "expected rgb8 input, got {}", frame.encoding().as_str()
        )));
    }
    frame.to_rgb8().ok_or_else(|| {
        InferenceError::Unsupported(format!(
            "buffer of {} bytes does not fit {}x{} rgb8", frame.data().len(), width, height
        ))
    })
}
