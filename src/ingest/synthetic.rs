//! Synthetic frame source (`stub://`) for tests and dry runs.
//!
//! Produces a moving gradient test pattern at the configured size. It never
//! contains a readable symbol, so a scan run against it exercises the loop
//! without logging anything.

use anyhow::Result;
use image::{Rgb, RgbImage};

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::{Capture, Frame};

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            connected: false,
        }
    }

    fn generate(&self) -> RgbImage {
        let shift = self.frame_count as u32;
        RgbImage::from_fn(self.config.width, self.config.height, |x, y| {
            let v = ((x + y + shift) % 256) as u8;
            Rgb([v, v / 2, 255 - v])
        })
    }
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always "connected".
    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.config.url);
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Capture> {
        self.frame_count += 1;
        Ok(Capture::Frame(Frame::new(self.generate(), self.frame_count)))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }
}
