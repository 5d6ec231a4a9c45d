use std::sync::Arc;
use std::time::Instant;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use crate::common::BBox;

/// Pixel layouts accepted on the input channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default] Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Mono8,
}

impl Encoding {
    pub fn from_str(encoding: &str) -> Option<Self> {
        match encoding.to_lowercase().as_str() {
            "rgb8" => Some(Encoding::Rgb8),
            "bgr8" => Some(Encoding::Bgr8),
            "rgba8" => Some(Encoding::Rgba8),
            "bgra8" => Some(Encoding::Bgra8),
            "mono8" | "8uc1" => Some(Encoding::Mono8),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Rgb8 => "rgb8",
            Encoding::Bgr8 => "bgr8",
            Encoding::Rgba8 => "rgba8",
            Encoding::Bgra8 => "bgra8",
            Encoding::Mono8 => "mono8",
        }
    }

    pub fn channels(&self) -> u32 {
        match self {
            Encoding::Rgb8 | Encoding::Bgr8 => 3,
            Encoding::Rgba8 | Encoding::Bgra8 => 4,
            Encoding::Mono8 => 1,
        }
    }
}

/// Transport header carried through from the inbound message to the published result.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Capture time reported by the camera, in nanoseconds.
    pub stamp_ns: u64,
    pub frame_id: String,
}

/// One received camera image. The pixel buffer is shared and never mutated, so clones are cheap.
#[derive(Debug, Clone)]
pub struct Frame {
    seq: u64,
    width: u32,
    height: u32,
    encoding: Encoding,
    data: Arc<[u8]>,
    header: Header,
    received_at: Instant,
}

impl Frame {
    pub fn new(seq: u64, width: u32, height: u32, encoding: Encoding, data: Vec<u8>, header: Header) -> Self {
        Self {
            seq,
            width,
            height,
            encoding,
            data: data.into(),
            header,
            received_at: Instant::now(),
        }
    }

    pub fn from_rgb(seq: u64, image: RgbImage, header: Header) -> Self {
        let (width, height) = image.dimensions();
        Self::new(seq, width, height, Encoding::Rgb8, image.into_raw(), header)
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn channels(&self) -> u32 {
        self.encoding.channels()
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Copies the pixels into an [`RgbImage`]. `None` unless the frame is a well-formed `rgb8` buffer.
    pub fn to_rgb8(&self) -> Option<RgbImage> {
        if self.encoding != Encoding::Rgb8 {
            return None;
        }
        RgbImage::from_raw(self.width, self.height, self.data.to_vec())
    }
}

/// Mapping between source image coordinates and the model's letterboxed input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageTransformInfo {
    pub width_src: u32,
    pub height_src: u32,
    pub width_dst: u32,
    pub height_dst: u32,
    pub scale: f32,
    pub width_pad: f32,
    pub height_pad: f32,
}

impl ImageTransformInfo {
    /// Source and model input share one coordinate space.
    pub fn identity(width: u32, height: u32) -> Self {
        Self {
            width_src: width,
            height_src: height,
            width_dst: width,
            height_dst: height,
            scale: 1.,
            width_pad: 0.,
            height_pad: 0.,
        }
    }

    /// Aspect-preserving resize of `(width_src, height_src)` into the top-left of the destination.
    pub fn letterbox(width_src: u32, height_src: u32, width_dst: u32, height_dst: u32) -> Self {
        let scale = (width_dst as f32 / width_src as f32).min(height_dst as f32 / height_src as f32);
        Self {
            width_src,
            height_src,
            width_dst,
            height_dst,
            scale,
            width_pad: 0.,
            height_pad: 0.,
        }
    }

    /// Maps a box from model input coordinates back to the source image, clamped to its bounds.
    pub fn to_source(&self, bbox: &BBox) -> BBox {
        let scale = if self.scale > 0. { self.scale } else { 1. };
        BBox::new(
            (bbox.x1 - self.width_pad) / scale,
            (bbox.y1 - self.height_pad) / scale,
            (bbox.x2 - self.width_pad) / scale,
            (bbox.y2 - self.height_pad) / scale,
        )
        .clamp_to(self.width_src as f32, self.height_src as f32)
    }
}
