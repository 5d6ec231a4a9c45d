use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;
use crate::common::Frame;
use crate::detection_runners::InferenceOutput;
use crate::error::InferenceError;

/// A frame handed to the inference thread.
#[derive(Debug)]
pub struct InferenceRequest {
    pub seq: u64,
    pub frame: Frame,
    /// The caller stops waiting for the reply at this instant.
    pub deadline: Option<Instant>,
}

/// The detector's answer for the request with the same `seq`.
#[derive(Debug)]
pub struct InferenceReply {
    pub seq: u64,
    pub result: Result<InferenceOutput, InferenceError>,
}

/// Ends owned by the inference thread.
#[derive(Debug)]
pub struct DetectionState {
    pub opt_rx: crossbeam_channel::Receiver<Box<InferenceRequest>>,
    pub det_tx: crossbeam_channel::Sender<Box<InferenceReply>>,
    /// Id of the newest request issued. Anything older has been given up on.
    pub latest: Arc<AtomicU64>,
}

/// Ends owned by the pipeline controller.
#[derive(Debug)]
pub struct SendState {
    pub opt_tx: crossbeam_channel::Sender<Box<InferenceRequest>>,
    pub det_rx: crossbeam_channel::Receiver<Box<InferenceReply>>,
    pub latest: Arc<AtomicU64>,
}

/// Builds a connected pair. Sending a request never blocks; the inference thread skips stale ones.
pub fn inference_channels() -> (SendState, DetectionState) {
    let (opt_tx, opt_rx) = crossbeam_channel::unbounded();
    let (det_tx, det_rx) = crossbeam_channel::unbounded();
    let latest = Arc::new(AtomicU64::new(0));
    (
        SendState { opt_tx, det_rx, latest: latest.clone() },
        DetectionState { opt_rx, det_tx, latest },
    )
}
