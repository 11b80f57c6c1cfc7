//! Live frame demos.
//!
//! `FrameStream` pulls frames from any `FrameSource`, optionally mirrors them,
//! applies one `StreamTransform` and writes each result as a numbered PNG.
//! It stops at the end of the source, at the frame limit, or on quit.

use anyhow::{anyhow, Result};
use image::{imageops, DynamicImage, RgbImage};
use imageproc::filter::median_filter;
use imageproc::rect::Rect;
use std::fmt;

use crate::controls::{Command, Controls};
use crate::frame::Capture;
use crate::ingest::FrameSource;
use crate::render::SnapshotWriter;
use crate::vision::{self, ThresholdSpec};

/// What happens to every frame before it is written.
#[derive(Clone, Debug)]
pub enum StreamTransform {
    /// Frames as captured.
    Passthrough,
    Gray,
    /// Adaptive mean threshold, then a 3x3 median to clear speckle.
    Threshold { block: u32, offset: i16 },
    /// Box the area matching an RGB color.
    ColorBox { target: [u8; 3] },
    /// Box-blur fixed regions.
    Anonymize { regions: Vec<Rect>, kernel: u32 },
}

impl StreamTransform {
    /// Reject parameters that would fail on every frame.
    pub fn validate(&self) -> Result<()> {
        match self {
            StreamTransform::Threshold { block, .. } if *block < 3 || block % 2 == 0 => {
                Err(anyhow!("adaptive block size must be odd and at least 3"))
            }
            StreamTransform::Anonymize { regions, .. } if regions.is_empty() => {
                Err(anyhow!("anonymize needs at least one region"))
            }
            StreamTransform::Anonymize { kernel: 0, .. } => {
                Err(anyhow!("blur kernel must be positive"))
            }
            _ => Ok(()),
        }
    }

    pub fn apply(&self, mut image: RgbImage) -> Result<RgbImage> {
        match self {
            StreamTransform::Passthrough => Ok(image),
            StreamTransform::Gray => Ok(DynamicImage::ImageLuma8(vision::to_gray(&image)).to_rgb8()),
            StreamTransform::Threshold { block, offset } => {
                let (_, binary) = vision::apply_threshold(
                    &vision::to_gray(&image),
                    ThresholdSpec::AdaptiveMean {
                        block: *block,
                        offset: *offset,
                    },
                )?;
                Ok(DynamicImage::ImageLuma8(median_filter(&binary, 1, 1)).to_rgb8())
            }
            StreamTransform::ColorBox { target } => {
                vision::highlight_color(&mut image, *target);
                Ok(image)
            }
            StreamTransform::Anonymize { regions, kernel } => {
                vision::anonymize(&mut image, regions, *kernel);
                Ok(image)
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StreamSummary {
    pub frames: u64,
    pub empty_reads: u64,
    pub written: u64,
    pub source: String,
}

impl fmt::Display for StreamSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Processed {} frame(s) from {} ({} written, {} empty read(s))",
            self.frames, self.source, self.written, self.empty_reads
        )
    }
}

pub struct FrameStream<F> {
    source: F,
    transform: StreamTransform,
    writer: SnapshotWriter,
    controls: Controls,
    flip: bool,
    max_frames: Option<u64>,
    frames: u64,
    empty_reads: u64,
}

impl<F: FrameSource> FrameStream<F> {
    pub fn new(source: F, transform: StreamTransform, writer: SnapshotWriter) -> Self {
        Self {
            source,
            transform,
            writer,
            controls: Controls::headless(),
            flip: false,
            max_frames: None,
            frames: 0,
            empty_reads: 0,
        }
    }

    /// Mirror frames horizontally before the transform (webcam selfie view).
    pub fn with_flip(mut self, flip: bool) -> Self {
        self.flip = flip;
        self
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn with_controls(mut self, controls: Controls) -> Self {
        self.controls = controls;
        self
    }

    /// Run until the source ends, the frame limit is hit or quit is requested.
    /// The source is released on every exit path.
    pub fn run(&mut self) -> Result<StreamSummary> {
        self.transform.validate()?;
        let result = self.drive();
        self.source.release();
        let summary = self.summary();
        if let Err(err) = &result {
            log::error!("frame stream stopped: {:#}", err);
        }
        result.map(|()| summary)
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            if self.controls.quit_requested() || self.controls.poll().contains(&Command::Quit) {
                log::info!("shutdown requested");
                return Ok(());
            }
            if let Some(max) = self.max_frames {
                if self.frames >= max {
                    log::info!("frame limit {} reached", max);
                    return Ok(());
                }
            }

            let frame = match self.source.next_frame()? {
                Capture::Frame(frame) => frame,
                Capture::Empty => {
                    self.empty_reads += 1;
                    continue;
                }
                Capture::Ended => {
                    log::info!("source {} ended", self.source.stats().source);
                    return Ok(());
                }
            };
            self.frames += 1;

            let index = frame.index;
            let mut image = frame.into_image();
            if self.flip {
                imageops::flip_horizontal_in_place(&mut image);
            }
            let output = self.transform.apply(image)?;
            let path = self.writer.write(&output, index)?;
            log::debug!("frame {} -> {}", index, path.display());
        }
    }

    fn summary(&self) -> StreamSummary {
        StreamSummary {
            frames: self.frames,
            empty_reads: self.empty_reads,
            written: self.writer.written(),
            source: self.source.stats().source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn split_image() -> RgbImage {
        RgbImage::from_fn(8, 4, |x, _| {
            if x < 4 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        })
    }

    #[test]
    fn gray_output_keeps_size_and_is_neutral() -> Result<()> {
        let out = StreamTransform::Gray.apply(split_image())?;
        assert_eq!(out.dimensions(), (8, 4));
        let [r, g, b] = out.get_pixel(0, 0).0;
        assert!(r == g && g == b);
        Ok(())
    }

    #[test]
    fn threshold_output_is_binary() -> Result<()> {
        let out = StreamTransform::Threshold { block: 3, offset: 1 }.apply(split_image())?;
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0] || p.0 == [255, 255, 255]));
        Ok(())
    }

    #[test]
    fn bad_parameters_are_rejected_up_front() {
        assert!(StreamTransform::Threshold { block: 20, offset: 1 }.validate().is_err());
        assert!(StreamTransform::Anonymize {
            regions: vec![],
            kernel: 50
        }
        .validate()
        .is_err());
        assert!(StreamTransform::ColorBox { target: [0, 255, 0] }.validate().is_ok());
    }
}
