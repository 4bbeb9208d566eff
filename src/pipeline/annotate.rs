use crate::config::AnnotationConfig;
use crate::tracker::Track;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::fs;
use tracing::{debug, warn};

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 200, 0]);
const BOX_THICKNESS: u32 = 2;

/// Draws track boxes and labels onto frame copies
pub struct Annotator {
    font: Option<Font<'static>>,
    scale: Scale,
}

impl Annotator {
    /// Load the label font. Without a usable font only boxes are drawn.
    pub fn load(config: &AnnotationConfig) -> Self {
        let font = match fs::read(&config.font_path) {
            Ok(data) => match Font::try_from_vec(data) {
                Some(font) => {
                    debug!("Loaded label font {}", config.font_path);
                    Some(font)
                }
                None => {
                    warn!(
                        "Failed to parse font file '{}', labels disabled",
                        config.font_path
                    );
                    None
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read font file '{}': {}, labels disabled",
                    config.font_path, e
                );
                None
            }
        };

        Self {
            font,
            scale: Scale::uniform(config.font_size),
        }
    }

    /// Annotator that draws boxes only
    pub fn boxes_only() -> Self {
        Self {
            font: None,
            scale: Scale::uniform(0.0),
        }
    }

    pub fn has_labels(&self) -> bool {
        self.font.is_some()
    }

    /// Copy of `image` with every track drawn on it
    pub fn draw(&self, image: &RgbImage, tracks: &[Track]) -> RgbImage {
        let mut canvas = image.clone();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return canvas;
        }

        for track in tracks {
            let x1 = track.x1.max(0.0) as i32;
            let y1 = track.y1.max(0.0) as i32;
            let x2 = (track.x2.max(0.0) as i32).max(x1 + 1);
            let y2 = (track.y2.max(0.0) as i32).max(y1 + 1);

            for inset in 0..BOX_THICKNESS as i32 {
                let w = (x2 - x1 - 2 * inset).max(1) as u32;
                let h = (y2 - y1 - 2 * inset).max(1) as u32;
                draw_hollow_rect_mut(
                    &mut canvas,
                    Rect::at(x1 + inset, y1 + inset).of_size(w, h),
                    BOX_COLOR,
                );
            }

            if let Some(font) = &self.font {
                let text_y = (y1 - self.scale.y as i32 - 2).max(0);
                draw_text_mut(
                    &mut canvas,
                    LABEL_COLOR,
                    x1,
                    text_y,
                    self.scale,
                    font,
                    &label(track),
                );
            }
        }

        canvas
    }
}

/// Text drawn above a track's box
pub fn label(track: &Track) -> String {
    format!(
        "id:{} cls:{} conf:{:.2}",
        track.stable_uid, track.class_id, track.confidence
    )
}
