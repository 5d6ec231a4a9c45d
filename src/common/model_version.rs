use serde::{Deserialize, Serialize};

/// YOLO generation of the exported model. Decides how the output tensor is laid out.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVersion {
    #[default] YoloV5,
    YoloV6,
    YoloV7,
    YoloV8,
    YoloV9,
    YoloV11,
}

impl ModelVersion {
    pub fn name(&self) -> String {
        match self {
            Self::YoloV5 => "YoloV5".to_string(),
            Self::YoloV6 => "YoloV6".to_string(),
            Self::YoloV7 => "YoloV7".to_string(),
            Self::YoloV8 => "YoloV8".to_string(),
            Self::YoloV9 => "YoloV9".to_string(),
            Self::YoloV11 => "YoloV11".to_string(),
        }
    }

    pub fn from_name(version: &str) -> Option<ModelVersion> {
        match version.to_lowercase().trim_start_matches("yolo") {
            "v5" => Some(ModelVersion::YoloV5),
            "v6" => Some(ModelVersion::YoloV6),
            "v7" => Some(ModelVersion::YoloV7),
            "v8" => Some(ModelVersion::YoloV8),
            "v9" => Some(ModelVersion::YoloV9),
            "v11" => Some(ModelVersion::YoloV11),
            _ => None,
        }
    }

    pub fn layout(&self) -> YoloPreds {
        match self {
            Self::YoloV5 | Self::YoloV6 | Self::YoloV7 => YoloPreds::n_a_cxcywh_confclss(),
            Self::YoloV8 | Self::YoloV9 | Self::YoloV11 => YoloPreds::n_cxcywh_clss_a(),
        }
    }
}

/// Shape of one image's predictions in the raw output tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YoloPreds {
    /// `[A, 4 + ...]` when true, `[4 + ..., A]` when the anchors come last.
    pub anchors_first: bool,
    /// Whether an objectness score sits between the box and the class scores.
    pub has_objectness: bool,
}

impl YoloPreds {
    pub fn n_a_cxcywh_confclss() -> Self {
        // YOLOv5 | YOLOv6 | YOLOv7 : NACxcywhConfClss
        Self {
            anchors_first: true,
            has_objectness: true,
        }
    }

    pub fn n_cxcywh_clss_a() -> Self {
        // YOLOv8 | YOLOv9 | YOLO11 : NCxcywhClssA
        Self {
            anchors_first: false,
            has_objectness: false,
        }
    }

    /// Number of classes implied by a prediction row of `row_len` values.
    pub fn num_classes(&self, row_len: usize) -> usize {
        let fixed = if self.has_objectness { 5 } else { 4 };
        row_len.saturating_sub(fixed)
    }
}
