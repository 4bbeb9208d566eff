use super::source::FrameSource;
use crate::frame::Frame;
use async_trait::async_trait;
use image::{Rgb, RgbImage};

/// Generated test pattern for `stub://` URLs: a gradient background with a
/// bright block sweeping left to right.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    frame_count: u64,
    released: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame_count: 0,
            released: false,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn render(&self) -> RgbImage {
        let block = (self.width / 8).max(1);
        let travel = self.width.saturating_sub(block).max(1) as u64;
        let left = ((self.frame_count * 4) % travel) as u32;
        let top = self.height / 3;
        let shade = (self.frame_count % 64) as u8;

        RgbImage::from_fn(self.width, self.height, |x, y| {
            if x >= left && x < left + block && y >= top && y < top + block {
                Rgb([240, 240, 240])
            } else {
                let r = (x * 255 / self.width) as u8;
                let g = (y * 255 / self.height) as u8;
                Rgb([r / 2, g / 2, 40 + shade])
            }
        })
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn read(&mut self) -> Option<Frame> {
        if self.released {
            return None;
        }
        self.frame_count += 1;
        Some(Frame::new(self.render()))
    }

    async fn release(&mut self) {
        self.released = true;
    }
}
