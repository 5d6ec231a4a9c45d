extern crate duckie_detect;

use fast_image_resize::Resizer;
use image::{Rgb, RgbImage};
use duckie_detect::common::{BBox, ImageTransformInfo};
use duckie_detect::detection_runners::ort_detector::image_ops::{preprocess, LETTERBOX_FILL};

#[test]
fn wide_image_is_letterboxed_top_left() {
    let image = RgbImage::from_pixel(640, 320, Rgb([255, 0, 0]));
    let (tensor, transform) = preprocess(&image, 416, &mut Resizer::new()).unwrap();

    assert_eq!(tensor.shape(), &[1, 3, 416, 416]);
    assert_eq!(transform.scale, 0.65);

    // red channel inside the image, padding below it
    assert!((tensor[[0, 0, 10, 10]] - 1.0).abs() < 0.01);
    assert!(tensor[[0, 1, 10, 10]].abs() < 0.01);
    let fill = LETTERBOX_FILL as f32 / 255.0;
    assert_eq!(tensor[[0, 0, 400, 10]], fill);
    assert_eq!(tensor[[0, 2, 400, 400]], fill);
}

#[test]
fn boxes_map_back_to_source_and_clamp() {
    let transform = ImageTransformInfo::letterbox(640, 320, 416, 416);
    let mapped = transform.to_source(&BBox::new(13., 26., 130., 416.));

    assert!((mapped.x1 - 20.).abs() < 1e-3);
    assert!((mapped.y1 - 40.).abs() < 1e-3);
    assert!((mapped.x2 - 200.).abs() < 1e-3);
    assert_eq!(mapped.y2, 320.);
}
