use super::backend::Backend;
use super::decode::{Candidate, OutputDecoder};
use super::geometry::Letterbox;
use super::nms::non_max_suppression;
use super::{Detection, Detector};
use crate::config::InferenceConfig;
use crate::error::InferenceError;
use image::RgbImage;
use parking_lot::Mutex;
use tracing::{trace, warn};

/// Detector shared by every stream.
///
/// Pre- and post-processing run on the caller's thread; only the backend run
/// itself is serialized.
pub struct InferenceEngine {
    backend: Mutex<Option<Backend>>,
    backend_name: Option<&'static str>,
    input_size: Option<(u32, u32)>,
    decoder: OutputDecoder,
    nms_iou_threshold: f32,
    max_detections: usize,
}

impl InferenceEngine {
    /// Pick and initialize the backend once
    pub fn new(config: &InferenceConfig) -> Self {
        Self::with_backend(Backend::select(config), config)
    }

    pub fn with_backend(backend: Option<Backend>, config: &InferenceConfig) -> Self {
        Self {
            backend_name: backend.as_ref().map(Backend::name),
            input_size: backend.as_ref().map(Backend::input_size),
            backend: Mutex::new(backend),
            decoder: OutputDecoder::new(
                config.num_classes,
                config.extra_column,
                config.score_threshold,
            ),
            nms_iou_threshold: config.nms_iou_threshold,
            max_detections: config.max_detections,
        }
    }

    /// Active backend, if any
    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend_name
    }

    pub fn is_active(&self) -> bool {
        self.backend_name.is_some()
    }

    /// Detections for one frame, or the backend/decode error
    pub fn try_infer(&self, frame: &RgbImage) -> Result<Vec<Detection>, InferenceError> {
        let Some((input_width, input_height)) = self.input_size else {
            return Ok(Vec::new());
        };

        let letterbox = Letterbox::fit(frame.width(), frame.height(), input_width, input_height);
        let input = letterbox.apply(frame);

        let output = {
            let mut backend = self.backend.lock();
            match backend.as_mut() {
                Some(backend) => backend.run(&input)?,
                None => return Ok(Vec::new()),
            }
        };

        let candidates = self.decoder.decode(&output.shape, &output.data)?;
        Ok(self.postprocess(&candidates, &letterbox, frame.width(), frame.height()))
    }

    fn postprocess(
        &self,
        candidates: &[Candidate],
        letterbox: &Letterbox,
        frame_width: u32,
        frame_height: u32,
    ) -> Vec<Detection> {
        let detections: Vec<Detection> = candidates
            .iter()
            .map(|c| {
                let [x1, y1, x2, y2] =
                    letterbox.to_original(c.cx, c.cy, c.w, c.h, frame_width, frame_height);
                Detection {
                    class_id: c.class_id,
                    confidence: c.confidence,
                    x1,
                    y1,
                    x2,
                    y2,
                }
            })
            .collect();

        let kept = non_max_suppression(detections, self.nms_iou_threshold, self.max_detections);
        trace!(
            "{} candidates, {} after suppression",
            candidates.len(),
            kept.len()
        );
        kept
    }
}

impl Detector for InferenceEngine {
    fn infer(&self, frame: &RgbImage) -> Vec<Detection> {
        match self.try_infer(frame) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("Inference failed, treating frame as empty: {}", e);
                Vec::new()
            }
        }
    }
}
