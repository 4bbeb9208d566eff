//! Object detection: letterbox preprocessing, a hardware-accelerator backend
//! with a software fallback, output decoding and non-maximum suppression.
//!
//! The backend is chosen once when [`InferenceEngine`] is built. A failed or
//! missing backend degrades to "no detections" rather than an error.

mod accelerator;
mod backend;
mod decode;
mod engine;
mod geometry;
mod nms;
#[cfg(feature = "software-inference")]
mod software;

pub use accelerator::{open_accelerator, AcceleratorRuntime};
pub use backend::{Backend, RawOutput};
pub use decode::{Candidate, OutputDecoder};
pub use engine::InferenceEngine;
pub use geometry::{iou, Letterbox};
pub use nms::non_max_suppression;
#[cfg(feature = "software-inference")]
pub use software::{ensure_model, SoftwareRuntime};

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// One detected object in original-frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Detection {
    pub fn corners(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Anything that turns a frame into detections.
///
/// Implementations must be callable from several streams at once and must
/// not fail: errors are logged and reported as an empty set.
pub trait Detector: Send + Sync {
    fn infer(&self, frame: &RgbImage) -> Vec<Detection>;
}
