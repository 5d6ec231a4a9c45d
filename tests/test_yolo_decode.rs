extern crate duckie_detect;

use ndarray::{Array, IxDyn};
use duckie_detect::common::{DetectionSet, ModelVersion};
use duckie_detect::detection_runners::ort_detector::decode_predictions;

fn names() -> Vec<String> {
    vec!["duckie".to_string(), "duck".to_string()]
}

fn by_confidence(mut detections: DetectionSet) -> DetectionSet {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    detections
}

#[test]
fn v5_rows_scale_class_score_by_objectness() {
    // [1, anchors, cx cy w h obj c0 c1]
    #[rustfmt::skip]
    let data = vec![
        50., 40., 20., 10., 0.9, 0.2, 0.8,
        10., 10., 4., 4., 0.5, 0.9, 0.1,
        30., 30., 0., 8., 1.0, 1.0, 0.0,
        100., 100., 10., 10., 1.0, 0.6, 0.3,
    ];
    let y = Array::from_shape_vec(IxDyn(&[1, 4, 7]), data).unwrap();

    let out = by_confidence(decode_predictions(y, ModelVersion::YoloV5.layout(), 0.5, &names()).unwrap());

    assert_eq!(out.len(), 2, "{:?}", out);
    assert!((out[0].confidence - 0.72).abs() < 1e-5);
    assert_eq!(out[0].class_id, 1);
    assert_eq!(out[0].label.as_deref(), Some("duck"));
    assert_eq!(out[0].bbox.xy1_xy2(), (40., 35., 60., 45.));

    assert!((out[1].confidence - 0.6).abs() < 1e-5);
    assert_eq!(out[1].class_id, 0);
    assert_eq!(out[1].label.as_deref(), Some("duckie"));
    assert_eq!(out[1].bbox.xy1_xy2(), (95., 95., 105., 105.));
}

#[test]
fn v8_columns_are_anchors() {
    // [1, cx cy w h c0 c1, anchors]
    #[rustfmt::skip]
    let data = vec![
        50., 10., 200.,
        40., 10., 100.,
        20., 4., 40.,
        10., 4., 20.,
        0.1, 0.3, 0.95,
        0.7, 0.2, 0.05,
    ];
    let y = Array::from_shape_vec(IxDyn(&[1, 6, 3]), data).unwrap();
    let names = vec!["duckie".to_string()];

    let out = by_confidence(decode_predictions(y, ModelVersion::YoloV8.layout(), 0.5, &names).unwrap());

    assert_eq!(out.len(), 2, "{:?}", out);
    assert!((out[0].confidence - 0.95).abs() < 1e-6);
    assert_eq!(out[0].class_id, 0);
    assert_eq!(out[0].label.as_deref(), Some("duckie"));
    assert_eq!(out[0].bbox.xy1_xy2(), (180., 90., 220., 110.));

    assert!((out[1].confidence - 0.7).abs() < 1e-6);
    assert_eq!(out[1].class_id, 1);
    // no name for class 1
    assert_eq!(out[1].label, None);
    assert_eq!(out[1].bbox.xy1_xy2(), (40., 35., 60., 45.));
}

#[test]
fn confidence_cut_is_inclusive() {
    let data = vec![10., 10., 4., 4., 0.5, 1.0];
    let y = Array::from_shape_vec(IxDyn(&[1, 1, 6]), data).unwrap();

    let out = decode_predictions(y, ModelVersion::YoloV5.layout(), 0.5, &[]).unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].label, None);
}

#[test]
fn malformed_output_is_an_error() {
    let flat = Array::from_shape_vec(IxDyn(&[4, 7]), vec![0.; 28]).unwrap();
    assert!(decode_predictions(flat, ModelVersion::YoloV5.layout(), 0.25, &names()).is_err());

    // box and objectness only, no class scores
    let no_classes = Array::from_shape_vec(IxDyn(&[1, 2, 5]), vec![1.; 10]).unwrap();
    assert!(decode_predictions(no_classes, ModelVersion::YoloV5.layout(), 0.25, &names()).is_err());
}
