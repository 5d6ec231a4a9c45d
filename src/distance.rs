//! Marker-based monocular distance: triangle similarity between a known object width and its
//! apparent width in pixels.

/// Geometry used to turn a perceived width into a distance.
pub trait DistanceEstimator: Send + Sync {
    /// `None` when no distance can be derived, e.g. for a zero-width box.
    fn distance_to_camera(&self, known_width: f32, focal_length: f32, perceived_width: f32) -> Option<f32>;
}

/// `known_width * focal_length / perceived_width`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkerDistance;

impl DistanceEstimator for MarkerDistance {
    fn distance_to_camera(&self, known_width: f32, focal_length: f32, perceived_width: f32) -> Option<f32> {
        distance_to_camera(known_width, focal_length, perceived_width)
    }
}

/// Reports the same distance for every detection.
#[derive(Debug, Clone, Copy)]
pub struct ConstantDistance(pub f32);

impl DistanceEstimator for ConstantDistance {
    fn distance_to_camera(&self, _known_width: f32, _focal_length: f32, _perceived_width: f32) -> Option<f32> {
        Some(self.0)
    }
}

pub fn distance_to_camera(known_width: f32, focal_length: f32, perceived_width: f32) -> Option<f32> {
    if perceived_width <= 0. || !perceived_width.is_finite() {
        return None;
    }
    Some(known_width * focal_length / perceived_width)
}

/// Focal length in pixels from a reference shot of the marker at a known distance.
pub fn focal_length_from_reference(known_distance: f32, known_width: f32, perceived_width: f32) -> Option<f32> {
    if known_width <= 0. {
        return None;
    }
    Some(perceived_width * known_distance / known_width)
}
