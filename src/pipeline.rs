//! The per-frame state machine: take the freshest frame, infer, post-process, publish.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::Serialize;
use crate::bridge::{ImageConverter, ImageMessage};
use crate::common::{Encoding, Frame};
use crate::data::{DetectConfig, PipelineConfig, TimeCalc, CROSS_MARK};
use crate::detection_processing::PostProcessor;
use crate::detection_runners::{Detector, InferenceWorker};
use crate::error::{FrameDecodeError, FrameError, PipelineSetupError};
use crate::frame_store::FrameStore;
use crate::publisher::{ResultPublisher, Sink};
use crate::utils;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    #[default] Idle,
    Ingesting,
    Inferring,
    PostProcessing,
    Publishing,
    /// Transient; the controller moves straight back to `Idle`.
    FrameFailed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What one [`PipelineController::step`] did.
#[derive(Debug)]
pub enum FrameOutcome {
    /// No frame was waiting.
    Idle,
    Published { seq: u64, detections: usize },
    /// The frame was dropped. Nothing was published for it.
    Failed { seq: u64, error: FrameError },
}

impl FrameOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, FrameOutcome::Published { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FrameOutcome::Failed { .. })
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct PipelineStats {
    /// Frames taken from the store.
    pub processed: u64,
    pub published: u64,
    pub failed: u64,
    /// Frames replaced in the store before they were taken.
    pub superseded: u64,
    /// Rejected on receipt, before reaching the store.
    pub rejected: u64,
    pub avg_inference: Option<Duration>,
}

/// Transport-side entry point. Cheap to clone and safe to call from any thread.
#[derive(Debug, Clone)]
pub struct FrameIngest {
    converter: Arc<ImageConverter>,
    store: FrameStore,
    encoding: Encoding,
    rejected: Arc<AtomicU64>,
}

impl FrameIngest {
    /// Converts an inbound message and stages it as the current frame.
    ///
    /// A malformed message is dropped and reported; whatever frame is already staged stays.
    pub fn on_image(&self, msg: &ImageMessage) -> Result<(), FrameDecodeError> {
        match self.converter.to_frame(msg, self.encoding) {
            Ok(frame) => {
                self.store.put(frame);
                Ok(())
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                log::warn!("{} Dropping inbound image '{}': {}", CROSS_MARK, msg.header.frame_id, e);
                Err(e)
            }
        }
    }

    pub fn store(&self) -> &FrameStore {
        &self.store
    }
}

pub struct PipelineController {
    ingest: FrameIngest,
    worker: InferenceWorker,
    post_processor: PostProcessor,
    publisher: ResultPublisher,
    detect_config: DetectConfig,
    pipeline_config: PipelineConfig,
    state: PipelineState,
    processed: u64,
    published: u64,
    failed: u64,
    infer_time: TimeCalc,
}

impl PipelineController {
    /// Starts the inference thread and wires the stages together. Everything the pipeline needs is
    /// owned from here on.
    ///
    /// `detect_config` is validated first; thresholds outside `[0, 1]` or NaN are rejected.
    pub fn new(detector: Box<dyn Detector>, sink: Box<dyn Sink>,
               detect_config: DetectConfig, pipeline_config: PipelineConfig) -> Result<Self, PipelineSetupError> {
        detect_config.validate()?;
        let worker = InferenceWorker::spawn(detector)?;
        log::info!("Pipeline using {} detector, inference timeout {:?}",
            worker.detector_name(), pipeline_config.inference_timeout());

        let ingest = FrameIngest {
            converter: Arc::new(ImageConverter::new()),
            store: FrameStore::new(),
            encoding: pipeline_config.input_encoding,
            rejected: Default::default(),
        };
        let publisher = ResultPublisher::new(sink, pipeline_config.output_encoding, pipeline_config.annotate);

        Ok(Self {
            ingest,
            worker,
            post_processor: PostProcessor::new(),
            publisher,
            detect_config,
            pipeline_config,
            state: PipelineState::Idle,
            processed: 0,
            published: 0,
            failed: 0,
            infer_time: TimeCalc::default(),
        })
    }

    pub fn with_post_processor(mut self, post_processor: PostProcessor) -> Self {
        self.post_processor = post_processor;
        self
    }

    pub fn on_image(&self, msg: &ImageMessage) -> Result<(), FrameDecodeError> {
        self.ingest.on_image(msg)
    }

    /// Handle for the thread that receives images.
    pub fn ingest(&self) -> FrameIngest {
        self.ingest.clone()
    }

    pub fn store(&self) -> &FrameStore {
        &self.ingest.store
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn detect_config(&self) -> &DetectConfig {
        &self.detect_config
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            processed: self.processed,
            published: self.published,
            failed: self.failed,
            superseded: self.ingest.store.stats().superseded,
            rejected: self.ingest.rejected.load(Ordering::Relaxed),
            avg_inference: self.infer_time.avg_i(0),
        }
    }

    /// Runs one cycle to completion. Returns immediately when no frame is staged.
    pub fn step(&mut self) -> FrameOutcome {
        let Some(frame) = self.ingest.store.take_current() else {
            self.state = PipelineState::Idle;
            return FrameOutcome::Idle;
        };
        self.processed += 1;
        self.transition(PipelineState::Ingesting);

        let seq = frame.seq();
        match self.process_frame(frame) {
            Ok(detections) => {
                self.published += 1;
                self.transition(PipelineState::Idle);
                FrameOutcome::Published { seq, detections }
            }
            Err(error) => {
                self.failed += 1;
                log::error!("{} Frame {} dropped in {}: {}", CROSS_MARK, seq, self.state, error);
                self.transition(PipelineState::FrameFailed);
                self.transition(PipelineState::Idle);
                FrameOutcome::Failed { seq, error }
            }
        }
    }

    /// Processes frames until `shutdown` is set. Checks the flag at least every `idle_wait`.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        let idle_wait = self.pipeline_config.idle_wait();
        while !shutdown.load(Ordering::Acquire) {
            if self.ingest.store.wait_for_frame(idle_wait) {
                self.step();
            }
        }
        let stats = self.stats();
        log::info!("Pipeline stopped: {} processed, {} published, {} failed, {} superseded",
            stats.processed, stats.published, stats.failed, stats.superseded);
    }

    fn process_frame(&mut self, frame: Frame) -> Result<usize, FrameError> {
        let start = Instant::now();
        let l_type = format!("FRAME {}", frame.seq());

        self.transition(PipelineState::Inferring);
        let output = self.worker.infer(frame.clone(), self.pipeline_config.inference_timeout())?;
        self.infer_time.add_or_push(0, start.elapsed());
        let elapsed = utils::trace(&l_type, "Inference", start, Duration::ZERO);

        self.transition(PipelineState::PostProcessing);
        let detections = self.post_processor.process(output.into_source_space(), &self.detect_config);
        let elapsed = utils::trace(&l_type, "PostProcess", start, elapsed);
        let count = detections.len();

        self.transition(PipelineState::Publishing);
        self.publisher.emit(frame, detections)?;
        utils::trace(&l_type, "Publish", start, elapsed);

        Ok(count)
    }

    fn transition(&mut self, next: PipelineState) {
        log::trace!("{} -> {}", self.state, next);
        self.state = next;
    }
}
