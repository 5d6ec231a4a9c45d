//! Conversion between transport image messages and in-memory frames.

use std::sync::atomic::{AtomicU64, Ordering};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use crate::common::{Encoding, Frame, Header};
use crate::error::FrameDecodeError;

/// Raw camera image as carried on the input and output channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageMessage {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: bool,
    /// Bytes per row, including any padding.
    pub step: u32,
    pub data: Vec<u8>,
}

impl ImageMessage {
    /// Tightly packed message from pixel data already in `encoding`.
    pub fn new(header: Header, width: u32, height: u32, encoding: Encoding, data: Vec<u8>) -> Self {
        Self {
            header,
            height,
            width,
            encoding: encoding.as_str().to_string(),
            is_bigendian: false,
            step: width.saturating_mul(encoding.channels()),
            data,
        }
    }

    pub fn from_rgb(header: Header, image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(header, width, height, Encoding::Rgb8, image.as_raw().clone())
    }
}

/// Owned by one pipeline; numbers the frames it produces.
#[derive(Debug, Default)]
pub struct ImageConverter {
    next_seq: AtomicU64,
}

impl ImageConverter {
    pub fn new() -> Self {
        Default::default()
    }

    /// Validates `msg` and converts its pixels to `desired`.
    pub fn to_frame(&self, msg: &ImageMessage, desired: Encoding) -> Result<Frame, FrameDecodeError> {
        let encoding = Encoding::from_str(&msg.encoding)
            .ok_or_else(|| FrameDecodeError::UnsupportedEncoding(msg.encoding.clone()))?;
        let rgb = Self::unpack_rgb(&msg.data, msg.width, msg.height, msg.step, encoding)?;
        let data = Self::encode_rgb(&rgb, desired);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(Frame::new(seq, msg.width, msg.height, desired, data, msg.header.clone()))
    }

    /// Encodes an RGB image for the output channel.
    pub fn to_message(image: &RgbImage, encoding: Encoding, header: Header) -> ImageMessage {
        let (width, height) = image.dimensions();
        ImageMessage::new(header, width, height, encoding, Self::encode_rgb(image.as_raw(), encoding))
    }

    /// Decodes a frame in any supported layout back to RGB.
    pub fn frame_to_rgb(frame: &Frame) -> Result<RgbImage, FrameDecodeError> {
        let (width, height) = frame.dimensions();
        let step = width.saturating_mul(frame.channels());
        let rgb = Self::unpack_rgb(frame.data(), width, height, step, frame.encoding())?;
        RgbImage::from_raw(width, height, rgb).ok_or(FrameDecodeError::DataLength {
            expected: width as usize * height as usize * 3,
            actual: frame.data().len(),
        })
    }

    /// Tightly packed RGB triples from a buffer of `height` rows of `step` bytes.
    fn unpack_rgb(data: &[u8], width: u32, height: u32, step: u32, encoding: Encoding) -> Result<Vec<u8>, FrameDecodeError> {
        if width == 0 || height == 0 {
            return Err(FrameDecodeError::EmptyImage { width, height });
        }
        let channels = encoding.channels() as usize;
        let row_len = width as usize * channels;
        if (step as usize) < row_len {
            return Err(FrameDecodeError::BadStep {
                step,
                min: u32::try_from(row_len).unwrap_or(u32::MAX),
                width,
            });
        }
        let expected = step as usize * height as usize;
        if data.len() != expected {
            return Err(FrameDecodeError::DataLength { expected, actual: data.len() });
        }

        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        for row in data.chunks_exact(step as usize) {
            for px in row[..row_len].chunks_exact(channels) {
                match encoding {
                    Encoding::Rgb8 | Encoding::Rgba8 => rgb.extend_from_slice(&[px[0], px[1], px[2]]),
                    Encoding::Bgr8 | Encoding::Bgra8 => rgb.extend_from_slice(&[px[2], px[1], px[0]]),
                    Encoding::Mono8 => rgb.extend_from_slice(&[px[0], px[0], px[0]]),
                }
            }
        }
        Ok(rgb)
    }

    fn encode_rgb(rgb: &[u8], encoding: Encoding) -> Vec<u8> {
        match encoding {
            Encoding::Rgb8 => rgb.to_vec(),
            Encoding::Bgr8 => rgb.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0]]).collect(),
            Encoding::Rgba8 => rgb.chunks_exact(3).flat_map(|p| [p[0], p[1], p[2], 255]).collect(),
            Encoding::Bgra8 => rgb.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0], 255]).collect(),
            Encoding::Mono8 => rgb
                .chunks_exact(3)
                .map(|p| (0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32).round() as u8)
                .collect(),
        }
    }
}
