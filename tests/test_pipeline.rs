extern crate duckie_detect;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use crossbeam_channel::Receiver;
use duckie_detect::common::{DetectionSet, Encoding};
use duckie_detect::data::{DetectConfig, PipelineConfig};
use duckie_detect::detection_runners::{FixedDetector, InferenceWorker};
use duckie_detect::error::{ConfigError, FrameError, InferenceError, PipelineSetupError, PublishError};
use duckie_detect::publisher::CallbackSink;
use duckie_detect::{ChannelSink, DetectionMessage, ImageConverter, FrameOutcome, PipelineController, PipelineState, PublishedResult};

use fixtures::{det, rgb_message};

fn raw_detections() -> DetectionSet {
    vec![
        det(0, 0.9, 10., 10., 60., 60.),
        det(0, 0.85, 11., 11., 61., 61.),
        det(1, 0.5, 80., 20., 100., 40.),
    ]
}

fn pipeline(detector: FixedDetector, config: PipelineConfig) -> (PipelineController, Receiver<PublishedResult>) {
    let (sink, rx) = ChannelSink::new(config.output_capacity);
    let controller = PipelineController::new(Box::new(detector), Box::new(sink), DetectConfig::new(), config)
        .unwrap();
    (controller, rx)
}

#[test]
fn frame_is_published_with_suppressed_detections() {
    let (mut controller, rx) = pipeline(FixedDetector::new(raw_detections()), PipelineConfig::new());
    controller.on_image(&rgb_message("cam_0")).unwrap();

    match controller.step() {
        FrameOutcome::Published { seq, detections } => assert_eq!((seq, detections), (1, 2)),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(controller.state(), PipelineState::Idle);

    let result = rx.try_recv().unwrap();
    assert_eq!(result.image.encoding, "bgr8");
    assert_eq!((result.image.width, result.image.height), (120, 100));
    assert_eq!(result.image.header.frame_id, "cam_0");

    let message: DetectionMessage = serde_json::from_str(&result.json).unwrap();
    assert_eq!(message, result.detections);
    assert_eq!(message.frame_id, "cam_0");
    let classes: Vec<usize> = message.detections.iter().map(|d| d.class_id).collect();
    assert_eq!(classes, vec![0, 1]);
}

#[test]
fn published_image_is_annotated() {
    let (mut controller, rx) = pipeline(FixedDetector::new(raw_detections()), PipelineConfig::new());
    controller.on_image(&rgb_message("cam_0")).unwrap();
    assert!(controller.step().is_published());

    let image = rx.try_recv().unwrap().image;
    let pixel = |x: usize, y: usize| {
        let i = (y * image.width as usize + x) * 3;
        [image.data[i], image.data[i + 1], image.data[i + 2]]
    };
    assert_eq!(pixel(10, 10), [128, 0, 128]);
    assert_eq!(pixel(30, 30), [90, 90, 90]);
}

#[test]
fn idle_step_does_nothing() {
    let detector = FixedDetector::new(raw_detections());
    let calls = detector.call_counter();
    let (mut controller, rx) = pipeline(detector, PipelineConfig::new());

    assert!(matches!(controller.step(), FrameOutcome::Idle));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn model_failure_drops_only_that_frame() {
    let detector = FixedDetector::new(raw_detections()).then_fail("bad tensor");
    let (mut controller, rx) = pipeline(detector, PipelineConfig::new());

    controller.on_image(&rgb_message("cam_0")).unwrap();
    match controller.step() {
        FrameOutcome::Failed { seq, error } => {
            assert_eq!(seq, 1);
            assert!(matches!(error, FrameError::Inference(InferenceError::ModelFailure(_))));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(controller.state(), PipelineState::Idle);
    assert!(rx.try_recv().is_err());

    controller.on_image(&rgb_message("cam_1")).unwrap();
    assert!(controller.step().is_published());
    assert_eq!(rx.try_recv().unwrap().detections.frame_id, "cam_1");

    let stats = controller.stats();
    assert_eq!((stats.processed, stats.published, stats.failed), (2, 1, 1));
}

#[test]
fn slow_inference_times_out() {
    let detector = FixedDetector::new(raw_detections()).with_delay(Duration::from_millis(300));
    let config = PipelineConfig::new().with_inference_timeout(Some(Duration::from_millis(20)));
    let (mut controller, rx) = pipeline(detector, config);

    controller.on_image(&rgb_message("cam_0")).unwrap();
    match controller.step() {
        FrameOutcome::Failed { error, .. } => {
            assert!(matches!(error, FrameError::Inference(InferenceError::Timeout(_))));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(rx.try_recv().is_err());

    controller.on_image(&rgb_message("cam_1")).unwrap();
    assert!(!controller.store().is_empty());
}

#[test]
fn late_reply_is_not_mistaken_for_the_next_frame() {
    let detector = FixedDetector::empty()
        .then(Ok(vec![det(5, 0.99, 0., 0., 20., 20.)]))
        .then(Ok(vec![det(6, 0.8, 0., 0., 20., 20.)]))
        .with_delay(Duration::from_millis(100));
    let mut worker = InferenceWorker::spawn(Box::new(detector)).unwrap();
    let converter = ImageConverter::new();

    let first = converter.to_frame(&rgb_message("cam_0"), Encoding::Rgb8).unwrap();
    let timed_out = worker.infer(first, Some(Duration::from_millis(20)));
    assert!(matches!(timed_out, Err(InferenceError::Timeout(_))));

    let second = converter.to_frame(&rgb_message("cam_1"), Encoding::Rgb8).unwrap();
    let output = worker.infer(second, Some(Duration::from_secs(5))).unwrap();
    assert_eq!(output.detections[0].class_id, 6);
}

#[test]
fn slow_call_does_not_starve_later_frames() {
    let detector = FixedDetector::new(raw_detections())
        .with_call_delays(&[Duration::from_millis(250)])
        .with_delay(Duration::from_millis(10));
    let calls = detector.call_counter();
    let mut worker = InferenceWorker::spawn(Box::new(detector)).unwrap();
    let converter = ImageConverter::new();
    let timeout = Some(Duration::from_millis(100));

    let results: Vec<_> = (0..6)
        .map(|i| {
            let frame = converter.to_frame(&rgb_message(&format!("cam_{}", i)), Encoding::Rgb8).unwrap();
            worker.infer(frame, timeout)
        })
        .collect();

    assert!(matches!(results[0], Err(InferenceError::Timeout(_))));
    assert!(matches!(results[1], Err(InferenceError::Timeout(_))));
    assert!(results[2..].iter().all(|r| r.is_ok()), "{:?}", results);
    // the request given up on while the slow call ran is never started
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[test]
fn unsupported_frame_layout_is_reported() {
    let mut config = PipelineConfig::new();
    config.input_encoding = Encoding::Bgr8;
    let (mut controller, rx) = pipeline(FixedDetector::new(raw_detections()), config);

    controller.on_image(&rgb_message("cam_0")).unwrap();
    match controller.step() {
        FrameOutcome::Failed { error, .. } => {
            assert!(matches!(error, FrameError::Inference(InferenceError::Unsupported(_))));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(rx.try_recv().is_err());
}

#[test]
fn publish_failure_is_isolated() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = crossbeam_channel::unbounded();
    let counter = attempts.clone();
    let sink = CallbackSink(move |result: PublishedResult| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(PublishError::Transport("broker unavailable".to_string()));
        }
        tx.send(result).map_err(|_| PublishError::Disconnected)
    });
    let mut controller = PipelineController::new(
        Box::new(FixedDetector::new(raw_detections())),
        Box::new(sink),
        DetectConfig::new(),
        PipelineConfig::new(),
    )
    .unwrap();

    controller.on_image(&rgb_message("cam_0")).unwrap();
    match controller.step() {
        FrameOutcome::Failed { error, .. } => {
            assert!(matches!(error, FrameError::Publish(PublishError::Transport(_))));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    controller.on_image(&rgb_message("cam_1")).unwrap();
    assert!(controller.step().is_published());
    assert_eq!(rx.try_recv().unwrap().detections.frame_id, "cam_1");
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn full_output_channel_loses_the_new_result() {
    let config = PipelineConfig::new().with_output_capacity(1);
    let (mut controller, rx) = pipeline(FixedDetector::new(raw_detections()), config);

    controller.on_image(&rgb_message("cam_0")).unwrap();
    assert!(controller.step().is_published());
    controller.on_image(&rgb_message("cam_1")).unwrap();
    match controller.step() {
        FrameOutcome::Failed { error, .. } => {
            assert!(matches!(error, FrameError::Publish(PublishError::Transport(_))));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(rx.try_recv().unwrap().detections.frame_id, "cam_0");

    drop(rx);
    controller.on_image(&rgb_message("cam_2")).unwrap();
    assert!(matches!(
        controller.step(),
        FrameOutcome::Failed { error: FrameError::Publish(PublishError::Disconnected), .. }
    ));
}

#[test]
fn newest_frame_wins_between_cycles() {
    let detector = FixedDetector::new(raw_detections());
    let calls = detector.call_counter();
    let (mut controller, rx) = pipeline(detector, PipelineConfig::new());

    for i in 0..3 {
        controller.on_image(&rgb_message(&format!("cam_{}", i))).unwrap();
    }
    assert!(controller.step().is_published());
    assert!(matches!(controller.step(), FrameOutcome::Idle));

    assert_eq!(rx.try_recv().unwrap().detections.frame_id, "cam_2");
    assert!(rx.try_recv().is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(controller.stats().superseded, 2);
}

#[test]
fn malformed_message_keeps_staged_frame() {
    let (controller, _rx) = pipeline(FixedDetector::empty(), PipelineConfig::new());

    controller.on_image(&rgb_message("cam_0")).unwrap();
    assert!(controller.on_image(&fixtures::truncated_message("cam_1")).is_err());

    assert!(!controller.store().is_empty());
    assert_eq!(controller.stats().rejected, 1);
}

#[test]
fn run_processes_frames_from_another_thread() {
    let (mut controller, rx) = pipeline(FixedDetector::new(raw_detections()), PipelineConfig::new());
    let ingest = controller.ingest();
    let shutdown = Arc::new(AtomicBool::new(false));

    let worker_shutdown = shutdown.clone();
    let worker = thread::spawn(move || {
        controller.run(&worker_shutdown);
        controller.stats()
    });

    ingest.on_image(&rgb_message("cam_0")).unwrap();
    let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(result.detections.frame_id, "cam_0");

    shutdown.store(true, Ordering::Release);
    let stats = worker.join().unwrap();
    assert_eq!(stats.published, 1);
    assert!(stats.avg_inference.is_some());
}

#[test]
fn invalid_thresholds_are_rejected_at_startup() {
    let start = |detect: DetectConfig| {
        let (sink, _rx) = ChannelSink::new(1);
        PipelineController::new(Box::new(FixedDetector::empty()), Box::new(sink), detect, PipelineConfig::new())
    };

    let nan_iou = start(DetectConfig::new().with_iou_threshold(f32::NAN));
    assert!(matches!(
        nan_iou,
        Err(PipelineSetupError::Config(ConfigError::OutOfUnitRange { name: "iou_threshold", .. }))
    ));

    let high_conf = start(DetectConfig::new().with_conf_threshold(1.5));
    assert!(matches!(
        high_conf,
        Err(PipelineSetupError::Config(ConfigError::OutOfUnitRange { name: "conf_threshold", .. }))
    ));

    assert!(start(DetectConfig::new().with_iou_threshold(0.45)).is_ok());
}

#[test]
fn distances_reach_the_published_message() {
    let (sink, rx) = ChannelSink::new(4);
    let mut controller = PipelineController::new(
        Box::new(FixedDetector::new(vec![det(0, 0.9, 10., 10., 110., 60.)])),
        Box::new(sink),
        DetectConfig::new().with_distance(20., 500.),
        PipelineConfig::new().with_annotate(false),
    )
    .unwrap();

    controller.on_image(&rgb_message("cam_0")).unwrap();
    assert!(controller.step().is_published());
    let message = rx.try_recv().unwrap().detections;
    assert_eq!(message.detections[0].distance, Some(100.));
}
