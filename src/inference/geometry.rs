use image::imageops::{self, FilterType};
use image::RgbImage;

/// Aspect-preserving fit of a frame into the model's input, padded with
/// black. Keeps the scale and pad offsets needed to map boxes back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_left: u32,
    pub pad_top: u32,
    /// Size of the scaled frame inside the input
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub input_width: u32,
    pub input_height: u32,
}

impl Letterbox {
    pub fn fit(frame_width: u32, frame_height: u32, input_width: u32, input_height: u32) -> Self {
        let frame_width = frame_width.max(1);
        let frame_height = frame_height.max(1);

        let scale = (input_width as f32 / frame_width as f32)
            .min(input_height as f32 / frame_height as f32);
        let scaled_width = ((frame_width as f32 * scale).round() as u32).clamp(1, input_width);
        let scaled_height = ((frame_height as f32 * scale).round() as u32).clamp(1, input_height);

        Self {
            scale,
            pad_left: (input_width - scaled_width) / 2,
            pad_top: (input_height - scaled_height) / 2,
            scaled_width,
            scaled_height,
            input_width,
            input_height,
        }
    }

    /// Resize and pad a frame into a new input-sized image
    pub fn apply(&self, frame: &RgbImage) -> RgbImage {
        let mut canvas = RgbImage::new(self.input_width, self.input_height);

        if frame.dimensions() == (self.scaled_width, self.scaled_height) {
            imageops::replace(&mut canvas, frame, self.pad_left as i64, self.pad_top as i64);
        } else {
            let scaled = imageops::resize(
                frame,
                self.scaled_width,
                self.scaled_height,
                FilterType::Triangle,
            );
            imageops::replace(&mut canvas, &scaled, self.pad_left as i64, self.pad_top as i64);
        }

        canvas
    }

    /// Map a center/size box from input space to clamped corner coordinates
    /// in the original frame. Boxes come out at least one pixel wide and tall.
    pub fn to_original(
        &self,
        cx: f32,
        cy: f32,
        w: f32,
        h: f32,
        frame_width: u32,
        frame_height: u32,
    ) -> [f32; 4] {
        let max_x = frame_width.saturating_sub(1) as f32;
        let max_y = frame_height.saturating_sub(1) as f32;
        let pad_left = self.pad_left as f32;
        let pad_top = self.pad_top as f32;

        let x1 = ((cx - w / 2.0 - pad_left) / self.scale).clamp(0.0, max_x);
        let y1 = ((cy - h / 2.0 - pad_top) / self.scale).clamp(0.0, max_y);
        let x2 = ((cx + w / 2.0 - pad_left) / self.scale).clamp(0.0, max_x);
        let y2 = ((cy + h / 2.0 - pad_top) / self.scale).clamp(0.0, max_y);

        let (x1, x2) = at_least_one_pixel(x1, x2, max_x);
        let (y1, y2) = at_least_one_pixel(y1, y2, max_y);
        [x1, y1, x2, y2]
    }

    /// Map corner coordinates from the original frame to a center/size box in
    /// input space
    pub fn to_input(&self, corners: [f32; 4]) -> [f32; 4] {
        let [x1, y1, x2, y2] = corners;
        let pad_left = self.pad_left as f32;
        let pad_top = self.pad_top as f32;

        let ix1 = x1 * self.scale + pad_left;
        let iy1 = y1 * self.scale + pad_top;
        let ix2 = x2 * self.scale + pad_left;
        let iy2 = y2 * self.scale + pad_top;

        [
            (ix1 + ix2) / 2.0,
            (iy1 + iy2) / 2.0,
            ix2 - ix1,
            iy2 - iy1,
        ]
    }
}

fn at_least_one_pixel(low: f32, high: f32, max: f32) -> (f32, f32) {
    if high - low >= 1.0 {
        return (low, high);
    }
    let high = (low + 1.0).min(max);
    let low = (high - 1.0).max(0.0);
    (low, high)
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes.
///
/// Zero when the boxes do not overlap or either has no area.
pub fn iou(a: [f32; 4], b: [f32; 4]) -> f32 {
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    if area_a <= 0.0 || area_b <= 0.0 || a[2] < a[0] || b[2] < b[0] {
        return 0.0;
    }

    let inter_w = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let inter_h = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = inter_w * inter_h;

    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}
