use std::collections::BTreeMap;
use crate::common::{Detection, DetectionSet};
use crate::data::DetectConfig;
use crate::detection_runners::ort_detector::nms::nms;
use crate::distance::{DistanceEstimator, MarkerDistance};

/// Turns raw detector output into the final, suppressed detection set.
///
/// Pure over its inputs: the same raw detections and config always give the same output.
pub struct PostProcessor {
    estimator: Box<dyn DistanceEstimator>,
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PostProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostProcessor").finish_non_exhaustive()
    }
}

impl PostProcessor {
    pub fn new() -> Self {
        Self::with_estimator(Box::new(MarkerDistance))
    }

    pub fn with_estimator(estimator: Box<dyn DistanceEstimator>) -> Self {
        Self { estimator }
    }

    /// 1. drop below `conf_threshold`
    /// 2. drop classes outside `class_filter`
    /// 3. group per class, or one group with `agnostic_nms`
    /// 4. NMS within each group
    /// 5. estimate distance from box width when enabled
    ///
    /// The result is ordered by descending confidence and may be empty.
    pub fn process(&self, raw: DetectionSet, config: &DetectConfig) -> DetectionSet {
        // NaN scores fail the comparison and are dropped
        let candidates = raw
            .into_iter()
            .filter(|det| det.confidence >= config.conf_threshold)
            .filter(|det| config.is_class_wanted(det.class_id));

        let mut groups: BTreeMap<usize, Vec<Detection>> = BTreeMap::new();
        for det in candidates {
            let key = if config.agnostic_nms { 0 } else { det.class_id };
            groups.entry(key).or_default().push(det);
        }

        let mut detections: DetectionSet = Vec::new();
        for (_, mut group) in groups {
            nms(&mut group, config.iou_threshold);
            detections.append(&mut group);
        }

        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        if config.distance_estimation_enabled {
            for det in detections.iter_mut() {
                det.distance = self.estimator.distance_to_camera(
                    config.known_object_width,
                    config.focal_length,
                    det.pixel_width(),
                );
            }
        }

        detections
    }
}
