//! Frame sources.
//!
//! This module provides the sources the scan loop reads from:
//! - Synthetic test pattern (`stub://name`)
//! - Local still images or a directory of images
//! - HTTP MJPEG/JPEG streams such as phone camera apps (feature: ingest-http)
//! - USB/V4L2 devices by path or index (feature: ingest-v4l2)
//!
//! Every source yields `Capture` values. A read that produces nothing is
//! `Capture::Empty` and the loop just moves on; `Capture::Ended` marks the end
//! of a finite source. There is no read timeout: a stalled camera stalls the
//! loop.

pub mod file;
#[cfg(feature = "ingest-http")]
pub mod http;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::path::Path;

use crate::frame::Capture;

pub use file::ImageFileSource;
#[cfg(feature = "ingest-http")]
pub use http::HttpSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Configuration shared by every source kind.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source address: `stub://…`, `http(s)://…`, `/dev/videoN`, a device index, or a local path.
    pub url: String,
    /// Target frame rate. Sources decimate to this rate; 0 disables decimation.
    pub target_fps: u32,
    /// Preferred frame width (devices and synthetic frames).
    pub width: u32,
    /// Preferred frame height (devices and synthetic frames).
    pub height: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            target_fps: 30,
            width: 1280,
            height: 720,
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A sequential stream of frames.
pub trait FrameSource {
    /// Open the underlying device or stream. Failure is fatal to the caller.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next capture is available.
    fn next_frame(&mut self) -> Result<Capture>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;

    /// Release the device or stream. Called once on shutdown.
    fn release(&mut self) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    Synthetic,
    Http,
    Device,
    Images,
}

impl SourceKind {
    pub fn classify(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        if trimmed.starts_with("stub://") {
            return Ok(SourceKind::Synthetic);
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return Ok(SourceKind::Http);
        }
        if trimmed.starts_with("/dev/video") || trimmed.parse::<u32>().is_ok() {
            return Ok(SourceKind::Device);
        }
        if trimmed.contains("://") {
            return Err(anyhow!("unsupported source scheme in '{}'", trimmed));
        }
        Ok(SourceKind::Images)
    }
}

/// Camera source selected by address.
pub struct CameraSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    Images(ImageFileSource),
    #[cfg(feature = "ingest-http")]
    Http(HttpSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Source),
}

impl CameraSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let backend = match SourceKind::classify(&config.url)? {
            SourceKind::Synthetic => SourceBackend::Synthetic(SyntheticSource::new(config)),
            SourceKind::Images => {
                SourceBackend::Images(ImageFileSource::new(Path::new(config.url.trim()))?)
            }
            SourceKind::Http => {
                #[cfg(feature = "ingest-http")]
                {
                    SourceBackend::Http(HttpSource::new(config)?)
                }
                #[cfg(not(feature = "ingest-http"))]
                {
                    return Err(anyhow!("HTTP sources require the ingest-http feature"));
                }
            }
            SourceKind::Device => {
                #[cfg(feature = "ingest-v4l2")]
                {
                    SourceBackend::Device(V4l2Source::new(config)?)
                }
                #[cfg(not(feature = "ingest-v4l2"))]
                {
                    return Err(anyhow!("camera devices require the ingest-v4l2 feature"));
                }
            }
        };
        Ok(Self { backend })
    }

    fn inner(&mut self) -> &mut dyn FrameSource {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source,
            SourceBackend::Images(source) => source,
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source,
            #[cfg(feature = "ingest-v4l2")]
            SourceBackend::Device(source) => source,
        }
    }

    fn inner_ref(&self) -> &dyn FrameSource {
        match &self.backend {
            SourceBackend::Synthetic(source) => source,
            SourceBackend::Images(source) => source,
            #[cfg(feature = "ingest-http")]
            SourceBackend::Http(source) => source,
            #[cfg(feature = "ingest-v4l2")]
            SourceBackend::Device(source) => source,
        }
    }
}

impl FrameSource for CameraSource {
    fn connect(&mut self) -> Result<()> {
        self.inner().connect()
    }

    fn next_frame(&mut self) -> Result<Capture> {
        self.inner().next_frame()
    }

    fn is_healthy(&self) -> bool {
        self.inner_ref().is_healthy()
    }

    fn stats(&self) -> SourceStats {
        self.inner_ref().stats()
    }

    fn release(&mut self) {
        self.inner().release()
    }
}

#[cfg(any(feature = "ingest-http", feature = "ingest-v4l2", test))]
pub(crate) fn frame_interval(target_fps: u32) -> std::time::Duration {
    use std::time::Duration;

    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

#[cfg(any(feature = "ingest-http", feature = "ingest-v4l2", test))]
pub(crate) fn health_grace(target_fps: u32) -> std::time::Duration {
    use std::time::Duration;

    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn classifies_source_addresses() {
        assert_eq!(SourceKind::classify("stub://cam").unwrap(), SourceKind::Synthetic);
        assert_eq!(
            SourceKind::classify("http://10.0.0.5:4747/video").unwrap(),
            SourceKind::Http
        );
        assert_eq!(SourceKind::classify("/dev/video2").unwrap(), SourceKind::Device);
        assert_eq!(SourceKind::classify("0").unwrap(), SourceKind::Device);
        assert_eq!(SourceKind::classify("cards/").unwrap(), SourceKind::Images);
        assert!(SourceKind::classify("rtsp://cam/stream").is_err());
        assert!(SourceKind::classify("  ").is_err());
    }

    #[test]
    fn stub_camera_source_produces_frames() -> Result<()> {
        let mut source = CameraSource::new(SourceConfig {
            url: "stub://test".to_string(),
            target_fps: 0,
            width: 64,
            height: 48,
        })?;
        source.connect()?;
        match source.next_frame()? {
            Capture::Frame(frame) => {
                assert_eq!((frame.width(), frame.height()), (64, 48));
            }
            _ => panic!("expected a frame"),
        }
        assert_eq!(source.stats().frames_captured, 1);
        assert!(source.is_healthy());
        Ok(())
    }

    #[test]
    fn frame_interval_handles_zero_fps() {
        assert_eq!(frame_interval(0), Duration::ZERO);
        assert_eq!(frame_interval(10), Duration::from_millis(100));
        assert_eq!(health_grace(0), Duration::from_secs(2));
        assert_eq!(health_grace(1), Duration::from_secs(6));
    }
}
