use serde::{Deserialize, Serialize};
use crate::common::BBox;
use crate::detection_runners::ort_detector::nms::Nms;

/// A single object found in a frame.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Estimated distance to the camera, in the units of the calibration width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
}

/// Detections for one frame, highest confidence first once post-processed.
pub type DetectionSet = Vec<Detection>;

impl Nms for Detection {
    fn iou(&self, other: &Self) -> f32 {
        self.bbox.iou(&other.bbox)
    }

    fn confidence(&self) -> f32 {
        self.confidence
    }
}

impl Detection {
    pub fn new(class_id: usize, confidence: f32, bbox: BBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
            label: None,
            distance: None,
        }
    }

    /// Sets the box from its centre and size, the layout YOLO heads emit.
    pub fn with_cxcy_wh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = BBox::default().with_cxcy_wh(cx, cy, w, h);
        self
    }

    pub fn with_confidence(mut self, conf: f32) -> Self {
        self.confidence = conf;
        self
    }

    pub fn with_class_id(mut self, class_id: usize) -> Self {
        self.class_id = class_id;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Pixel width of the box, used as the perceived width for distance estimation.
    pub fn pixel_width(&self) -> f32 {
        self.bbox.width()
    }
}
