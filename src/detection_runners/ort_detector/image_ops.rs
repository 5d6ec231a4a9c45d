//! Functions to preprocess images.

use anyhow::{bail, Result};
use fast_image_resize::{
    images::{CroppedImageMut, Image as FirImage},
    pixels::PixelType,
    FilterType, ResizeAlg, ResizeOptions, Resizer,
};
use image::RgbImage;
use ndarray::{Array, IxDyn};
use crate::common::ImageTransformInfo;

/// Grey used to fill the letterbox padding.
pub const LETTERBOX_FILL: u8 = 114;

/// Letterboxes `image` into a `target` x `target` NCHW f32 tensor scaled to `[0, 1]`.
pub fn preprocess(image: &RgbImage, target: u32, resizer: &mut Resizer) -> Result<(Array<f32, IxDyn>, ImageTransformInfo)> {
    let options = ResizeOptions::new()
        .resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));

    let src = to_fir_image(image.clone())?;
    let (resized, transform) = letterbox_image(&src, target, target, LETTERBOX_FILL, resizer, &options)?;
    let flat = nchw_normalize_flat(&resized)?;

    let batch = Array::from_shape_vec(
        (1, 3, target as usize, target as usize),
        flat,
    )?.into_dyn();

    Ok((batch, transform))
}

pub fn to_fir_image<'a>(image: RgbImage) -> Result<FirImage<'a>> {
    let (width, height) = image.dimensions();
    let buffer = image.into_raw();

    Ok(FirImage::from_vec_u8(width, height, buffer, PixelType::U8x3)?)
}

fn letterbox_image<'a>(
    img: &FirImage,
    target_h: u32,
    target_w: u32,
    bg: u8,
    resizer: &mut Resizer,
    resize_options: &ResizeOptions,
) -> Result<(FirImage<'a>, ImageTransformInfo)> {
    let (w0, h0) = (img.width(), img.height());
    if w0 == 0 || h0 == 0 {
        bail!("Cannot letterbox an empty image ({}x{})", w0, h0);
    }
    let transform = ImageTransformInfo::letterbox(w0, h0, target_w, target_h);
    let new_w = ((w0 as f32 * transform.scale).round() as u32).clamp(1, target_w);
    let new_h = ((h0 as f32 * transform.scale).round() as u32).clamp(1, target_h);

    let mut padded = FirImage::from_vec_u8(
        target_w,
        target_h,
        vec![bg; (target_w * target_h * 3) as usize],
        PixelType::U8x3,
    )?;

    // Anchored top-left, so only the scale matters when mapping boxes back.
    let mut cropped = CroppedImageMut::new(&mut padded, 0, 0, new_w, new_h)?;
    resizer.resize(img, &mut cropped, resize_options)?;

    Ok((padded, transform))
}

fn nchw_normalize_flat(img: &FirImage) -> Result<Vec<f32>> {
    let buf = img.buffer();
    let w = img.width() as usize;
    let h = img.height() as usize;

    if buf.len() != w * h * 3 {
        bail!("Unexpected buffer size: got {}, expected {}", buf.len(), w * h * 3);
    }

    let mut out = vec![0.0f32; buf.len()];
    let hw = w * h;

    for i in 0..hw {
        out[i] = buf[3 * i] as f32 / 255.0;
        out[i + hw] = buf[3 * i + 1] as f32 / 255.0;
        out[i + 2 * hw] = buf[3 * i + 2] as f32 / 255.0;
    }

    Ok(out)
}
