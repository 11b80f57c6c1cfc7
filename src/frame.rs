//! Captured frames.
//!
//! - `Frame`: one RGB image handed from a frame source to the scan loop.
//! - `Capture`: the outcome of a single read from a source.
//!
//! Frames are owned by the loop for exactly one iteration; the decoder reads
//! them, the renderer draws on them, and they are dropped before the next read.

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};
use std::time::{Duration, Instant};

use crate::enhance;

/// One captured color frame.
pub struct Frame {
    image: RgbImage,
    /// Sequence number assigned by the source (1-based).
    pub index: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, index: u64) -> Self {
        Self {
            image,
            index,
            captured_at: Instant::now(),
        }
    }

    /// Build a frame from packed RGB24 bytes.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32, index: u64) -> Result<Self> {
        let expected = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))? as usize;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::new(image, index))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Mutable access for annotation.
    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Single-channel intensity view of the frame.
    pub fn intensity(&self) -> GrayImage {
        enhance::to_intensity(&self.image)
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

/// Result of one read from a frame source.
pub enum Capture {
    /// A frame is ready for processing.
    Frame(Frame),
    /// The read produced nothing this time; the loop moves on.
    Empty,
    /// A finite source has no more frames.
    Ended,
}

impl Capture {
    pub fn is_ended(&self) -> bool {
        matches!(self, Capture::Ended)
    }
}
