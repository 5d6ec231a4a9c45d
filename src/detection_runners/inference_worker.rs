//! Runs a [`Detector`] on its own thread so the controller can stop waiting on a hung model.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use crossbeam_channel::RecvTimeoutError;
use crate::common::Frame;
use crate::data::send_channels::{inference_channels, DetectionState, InferenceReply, InferenceRequest, SendState};
use crate::detection_runners::detector::{Detector, InferenceOutput};
use crate::error::InferenceError;

pub struct InferenceWorker {
    channels: SendState,
    next_id: u64,
    detector_name: &'static str,
    _handle: JoinHandle<()>,
}

impl InferenceWorker {
    /// Moves the detector onto a new thread. The thread exits once the worker is dropped
    /// and any call in progress has returned.
    pub fn spawn(detector: Box<dyn Detector>) -> std::io::Result<Self> {
        let detector_name = detector.name();
        let (channels, detection_state) = inference_channels();
        let handle = std::thread::Builder::new()
            .name(format!("infer-{}", detector_name))
            .spawn(move || inference_loop(detector, detection_state))?;

        Ok(Self {
            channels,
            next_id: 0,
            detector_name,
            _handle: handle,
        })
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector_name
    }

    /// Runs one frame through the detector.
    ///
    /// With a timeout, the wait for the reply counts against it. A request given up on is never
    /// started later, and its reply is dropped here if it was already running.
    pub fn infer(&mut self, frame: Frame, timeout: Option<Duration>) -> Result<InferenceOutput, InferenceError> {
        self.next_id += 1;
        let id = self.next_id;
        let deadline = timeout.map(|t| Instant::now() + t);
        self.channels.latest.store(id, Ordering::Release);

        let request = Box::new(InferenceRequest { seq: id, frame, deadline });
        self.channels.opt_tx.send(request).map_err(|_| stopped())?;

        loop {
            let reply = match deadline {
                None => self.channels.det_rx.recv().map_err(|_| stopped())?,
                Some(deadline) => match self.channels.det_rx.recv_timeout(remaining(deadline)) {
                    Ok(reply) => reply,
                    Err(RecvTimeoutError::Timeout) => return Err(InferenceError::Timeout(timeout.unwrap_or_default())),
                    Err(RecvTimeoutError::Disconnected) => return Err(stopped()),
                },
            };
            if reply.seq == id {
                return reply.result;
            }
            log::debug!("Discarding stale inference result for request {}", reply.seq);
        }
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

fn stopped() -> InferenceError {
    InferenceError::ModelFailure("inference thread stopped".to_string())
}

/// A request is stale once a newer one was issued or its caller's deadline has passed.
fn is_stale(request: &InferenceRequest, latest: u64) -> bool {
    request.seq < latest || request.deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

fn inference_loop(mut detector: Box<dyn Detector>, detection_state: DetectionState) {
    // MESSAGE LOOP STARTS HERE
    while let Ok(mut request) = detection_state.opt_rx.recv() {
        // jump to the newest queued request
        while let Ok(newer) = detection_state.opt_rx.try_recv() {
            log::debug!("Skipping superseded inference request {}", request.seq);
            request = newer;
        }
        if is_stale(&request, detection_state.latest.load(Ordering::Acquire)) {
            log::debug!("Skipping abandoned inference request {}", request.seq);
            continue;
        }

        let InferenceRequest { seq, frame, .. } = *request;
        let result = catch_unwind(AssertUnwindSafe(|| detector.infer(&frame)))
            .unwrap_or_else(|_| Err(InferenceError::ModelFailure(format!("{} detector panicked", detector.name()))));

        if detection_state.det_tx.send(Box::new(InferenceReply { seq, result })).is_err() {
            break;
        }
    }
    log::debug!("Inference thread for {} detector exiting", detector.name());
}
