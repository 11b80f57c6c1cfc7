//! HTTP camera source.
//!
//! This module provides `HttpSource` for phone camera apps and IP cameras
//! that serve either an MJPEG stream (`multipart/x-mixed-replace`) or a JPEG
//! snapshot per request.
//!
//! The HTTP source is responsible for:
//! - Connecting to the stream once at startup
//! - Splitting the MJPEG byte stream into JPEG frames
//! - Decoding JPEG frames in-memory
//! - Decimating to the target frame rate

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};

use url::Url;

use super::{frame_interval, health_grace, FrameSource, SourceConfig, SourceStats};
use crate::frame::{Capture, Frame};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

pub struct HttpSource {
    config: SourceConfig,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    frame_count: u64,
    last_error: Option<String>,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    SingleJpeg,
}

impl HttpSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse camera url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported camera scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        Ok(Self {
            config,
            stream: None,
            last_frame_at: None,
            connected_at: None,
            frame_count: 0,
            last_error: None,
        })
    }

    fn decode(&mut self, jpeg_bytes: &[u8]) -> Capture {
        match image::load_from_memory(jpeg_bytes) {
            Ok(image) => {
                self.frame_count += 1;
                self.last_error = None;
                Capture::Frame(Frame::new(image.into_rgb8(), self.frame_count))
            }
            Err(err) => {
                log::debug!("HttpSource: dropping undecodable frame: {}", err);
                self.last_error = Some(err.to_string());
                Capture::Empty
            }
        }
    }
}

impl FrameSource for HttpSource {
    fn connect(&mut self) -> Result<()> {
        let response = ureq::get(&self.config.url)
            .call()
            .with_context(|| format!("connect to camera {}", self.config.url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if content_type.contains("multipart") {
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(response.into_reader())));
            log::info!("HttpSource: connected to {} (mjpeg)", self.config.url);
        } else {
            self.stream = Some(HttpStream::SingleJpeg);
            log::info!("HttpSource: connected to {} (snapshot)", self.config.url);
        }
        self.connected_at = Some(Instant::now());
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Capture> {
        let min_interval = frame_interval(self.config.target_fps);
        loop {
            let stream = self
                .stream
                .as_mut()
                .ok_or_else(|| anyhow!("http source not connected; call connect() first"))?;
            let jpeg_bytes = match stream {
                HttpStream::Mjpeg(stream) => match stream.read_next_jpeg()? {
                    Some(bytes) => bytes,
                    None => {
                        log::warn!("HttpSource: stream {} ended", self.config.url);
                        return Ok(Capture::Ended);
                    }
                },
                HttpStream::SingleJpeg => match fetch_single_jpeg(&self.config.url) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        log::debug!("HttpSource: snapshot failed: {:#}", err);
                        self.last_error = Some(err.to_string());
                        return Ok(Capture::Empty);
                    }
                },
            };

            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }
            self.last_frame_at = Some(now);
            return Ok(self.decode(&jpeg_bytes));
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= health_grace(self.config.target_fps)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.url.clone(),
        }
    }

    fn release(&mut self) {
        self.stream = None;
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Next complete JPEG from the stream, or `None` once the stream closes.
    fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

/// Byte range of the first complete SOI..EOI JPEG in `buffer`.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}
