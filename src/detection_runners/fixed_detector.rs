use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use crate::common::{DetectionSet, Frame, ImageTransformInfo};
use crate::detection_runners::detector::{frame_to_rgb, Detector, InferenceOutput};
use crate::error::InferenceError;

/// Deterministic detector that replays scripted answers. Boxes are in source coordinates.
///
/// Scripted results are consumed in order; once the script is empty every call returns the
/// fallback detections.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    fallback: DetectionSet,
    script: VecDeque<Result<DetectionSet, InferenceError>>,
    delay: Option<Duration>,
    call_delays: VecDeque<Duration>,
    calls: Arc<AtomicUsize>,
}

impl FixedDetector {
    pub fn new(detections: DetectionSet) -> Self {
        Self {
            fallback: detections,
            script: VecDeque::new(),
            delay: None,
            call_delays: VecDeque::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answers with an empty set.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn then(mut self, result: Result<DetectionSet, InferenceError>) -> Self {
        self.script.push_back(result);
        self
    }

    pub fn then_fail(self, reason: &str) -> Self {
        self.then(Err(InferenceError::ModelFailure(reason.to_string())))
    }

    /// Sleeps this long inside every call, like a slow model would.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Per-call delays for the first calls, used before falling back to [`with_delay`](Self::with_delay).
    pub fn with_call_delays(mut self, delays: &[Duration]) -> Self {
        self.call_delays = delays.iter().copied().collect();
        self
    }

    /// Shared counter of `infer` calls, readable after the detector moved to another thread.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Detector for FixedDetector {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn infer(&mut self, frame: &Frame) -> Result<InferenceOutput, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.call_delays.pop_front().or(self.delay) {
            std::thread::sleep(delay);
        }
        frame_to_rgb(frame)?;

        let detections = match self.script.pop_front() {
            Some(result) => result?,
            None => self.fallback.clone(),
        };
        let (width, height) = frame.dimensions();
        Ok(InferenceOutput::new(detections, ImageTransformInfo::identity(width, height)))
    }
}
