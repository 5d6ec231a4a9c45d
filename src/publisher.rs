//! Output side of the relay: annotation, serialization and hand-off to the transport.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use crate::bridge::{ImageConverter, ImageMessage};
use crate::common::{DetectionSet, Encoding, Frame};
use crate::error::PublishError;

/// Structured detections for one published frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMessage {
    pub seq: u64,
    pub stamp_ns: u64,
    pub frame_id: String,
    pub width: u32,
    pub height: u32,
    /// Time from frame receipt to publish.
    pub latency_ms: f64,
    pub detections: DetectionSet,
}

/// What goes out on the output channel for one frame.
#[derive(Debug, Clone)]
pub struct PublishedResult {
    pub image: ImageMessage,
    pub detections: DetectionMessage,
    /// `detections` serialized as JSON.
    pub json: String,
}

/// The external transport.
pub trait Sink: Send {
    fn send(&self, result: PublishedResult) -> Result<(), PublishError>;
}

/// Bounded channel output. A full channel loses the new result rather than blocking the pipeline.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<PublishedResult>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, Receiver<PublishedResult>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl Sink for ChannelSink {
    fn send(&self, result: PublishedResult) -> Result<(), PublishError> {
        match self.tx.try_send(result) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PublishError::Transport(format!(
                "output queue full ({} pending)", self.tx.len()
            ))),
            Err(TrySendError::Disconnected(_)) => Err(PublishError::Disconnected),
        }
    }
}

/// Sink backed by a closure.
pub struct CallbackSink<F>(pub F);

impl<F> Sink for CallbackSink<F>
where
    F: Fn(PublishedResult) -> Result<(), PublishError> + Send,
{
    fn send(&self, result: PublishedResult) -> Result<(), PublishError> {
        (self.0)(result)
    }
}

pub(crate) fn get_class_colour(class: usize) -> Rgb<u8> {
    match class {
        0 => Rgb([128, 0, 128]),     // purple (people)
        1..=8 => Rgb([0, 255, 0]),   // green (vehicles)
        14..=23 => Rgb([255, 0, 0]), // red (animals)
        _ => Rgb([0, 0, 255])        // blue (everything else)
    }
}

/// Draws class-coloured box outlines onto output images.
#[derive(Debug, Clone, Copy)]
pub struct Annotator {
    pub thickness: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self { thickness: 2 }
    }
}

impl Annotator {
    pub fn draw(&self, image: &mut RgbImage, detections: &DetectionSet) {
        for det in detections {
            let (x, y, w, h) = det.bbox.as_xy_wh_i32();
            let colour = get_class_colour(det.class_id);
            for inset in 0..self.thickness as i32 {
                let (w, h) = (w - 2 * inset, h - 2 * inset);
                if w < 1 || h < 1 {
                    break;
                }
                draw_hollow_rect_mut(image, Rect::at(x + inset, y + inset).of_size(w as u32, h as u32), colour);
            }
        }
    }
}

pub struct ResultPublisher {
    sink: Box<dyn Sink>,
    output_encoding: Encoding,
    annotator: Option<Annotator>,
}

impl ResultPublisher {
    pub fn new(sink: Box<dyn Sink>, output_encoding: Encoding, annotate: bool) -> Self {
        Self {
            sink,
            output_encoding,
            annotator: annotate.then(Annotator::default),
        }
    }

    /// Serializes one frame and its detections and hands them to the sink. Nothing is retried.
    pub fn emit(&self, frame: Frame, detections: DetectionSet) -> Result<(), PublishError> {
        let mut image = ImageConverter::frame_to_rgb(&frame)?;
        if let Some(annotator) = &self.annotator {
            annotator.draw(&mut image, &detections);
        }

        let header = frame.header().clone();
        let message = DetectionMessage {
            seq: frame.seq(),
            stamp_ns: header.stamp_ns,
            frame_id: header.frame_id.clone(),
            width: frame.width(),
            height: frame.height(),
            latency_ms: frame.received_at().elapsed().as_secs_f64() * 1000.,
            detections,
        };
        let json = serde_json::to_string(&message)?;
        let image = ImageConverter::to_message(&image, self.output_encoding, header);

        self.sink.send(PublishedResult {
            image,
            detections: message,
            json,
        })
    }
}
