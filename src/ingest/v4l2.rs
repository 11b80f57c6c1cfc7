//! V4L2 frame source.
//!
//! This module provides `V4l2Source` for USB webcams and other local V4L2
//! devices, addressed either by node path (`/dev/video0`) or by index (`0`).
//!
//! The device is asked for RGB24 first; drivers that refuse fall back to
//! whatever they report, and YUYV and MJPG buffers are converted to RGB here.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::Instant;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{frame_interval, health_grace, FrameSource, SourceConfig, SourceStats};
use crate::frame::{Capture, Frame};

pub struct V4l2Source {
    config: SourceConfig,
    device_path: String,
    state: Option<V4l2State>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    fourcc: [u8; 4],
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// Map a device index to its node path; paths pass through.
pub fn device_path(address: &str) -> String {
    let trimmed = address.trim();
    match trimmed.parse::<u32>() {
        Ok(index) => format!("/dev/video{}", index),
        Err(_) => trimmed.to_string(),
    }
}

impl V4l2Source {
    pub fn new(config: SourceConfig) -> Result<Self> {
        Ok(Self {
            device_path: device_path(&config.url),
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
            fourcc: *b"RGB3",
        })
    }

    /// Packed RGB plus its dimensions, or `None` for a corrupt MJPG buffer.
    fn to_rgb(&self, buf: &[u8]) -> Result<Option<(Vec<u8>, u32, u32)>> {
        if &self.fourcc == b"MJPG" {
            return match image::load_from_memory(buf) {
                Ok(image) => {
                    let rgb = image.into_rgb8();
                    let (width, height) = rgb.dimensions();
                    Ok(Some((rgb.into_raw(), width, height)))
                }
                Err(err) => {
                    log::debug!("V4l2Source: dropping undecodable MJPG buffer: {}", err);
                    Ok(None)
                }
            };
        }
        let format = PixelFormat::from_fourcc(&self.fourcc).ok_or_else(|| {
            anyhow!(
                "unsupported pixel format {}",
                String::from_utf8_lossy(&self.fourcc)
            )
        })?;
        let rgb = normalize_to_rgb(buf, self.active_width, self.active_height, format)?;
        Ok(Some((rgb, self.active_width, self.active_height)))
    }
}

impl FrameSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.device_path)
            .with_context(|| format!("open v4l2 device {}", self.device_path))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "V4l2Source: failed to set format on {}: {}",
                    self.device_path,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.device_path,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.fourcc = format.fourcc.repr;
        if &self.fourcc != b"MJPG" && PixelFormat::from_fourcc(&self.fourcc).is_none() {
            return Err(anyhow!(
                "{} only offers {}; need RGB3, YUYV or MJPG",
                self.device_path,
                format.fourcc
            ));
        }
        self.last_error = None;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{} {})",
            self.device_path,
            self.active_width,
            self.active_height,
            format.fourcc
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Capture> {
        use v4l::io::traits::CaptureStream;

        let min_interval = frame_interval(self.config.target_fps);
        loop {
            let state = self.state.as_mut().context("v4l2 device not connected")?;
            let captured = state.with_mut(|fields| {
                fields
                    .stream
                    .next()
                    .map(|(buf, _meta)| buf.to_vec())
            });
            let buf = match captured {
                Ok(buf) => buf,
                Err(err) => {
                    self.last_error = Some(err.to_string());
                    return Err(anyhow::Error::new(err).context("capture v4l2 frame"));
                }
            };

            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }
            self.last_frame_at = Some(now);

            let Some((rgb, width, height)) = self.to_rgb(&buf)? else {
                return Ok(Capture::Empty);
            };
            self.frame_count += 1;
            self.last_error = None;
            return Frame::from_rgb(rgb, width, height, self.frame_count).map(Capture::Frame);
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= health_grace(self.config.target_fps)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.device_path.clone(),
        }
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: released {}", self.device_path);
        }
    }
}
