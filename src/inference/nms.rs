use super::geometry::iou;
use super::Detection;

/// Greedy class-agnostic suppression by descending confidence.
///
/// A detection is dropped when its IoU with an already kept one exceeds
/// `iou_threshold`. At most `max_detections` survive.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len().min(max_detections));
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| iou(k.corners(), candidate.corners()) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}
