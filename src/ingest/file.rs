//! Local image source.
//!
//! Reads a single still image, or every image in a directory in file-name
//! order, and yields each exactly once. Useful for replaying captured ID-card
//! photos through the scanner.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
use crate::frame::{Capture, Frame};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct ImageFileSource {
    origin: PathBuf,
    pending: Vec<PathBuf>,
    next: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageFileSource {
    pub fn new(path: &Path) -> Result<Self> {
        if path.as_os_str().is_empty() {
            return Err(anyhow!("image source path must not be empty"));
        }
        Ok(Self {
            origin: path.to_path_buf(),
            pending: Vec::new(),
            next: 0,
            frame_count: 0,
            last_error: None,
        })
    }

    /// Images still to be yielded.
    pub fn remaining(&self) -> usize {
        self.pending.len().saturating_sub(self.next)
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

impl FrameSource for ImageFileSource {
    fn connect(&mut self) -> Result<()> {
        let meta = std::fs::metadata(&self.origin)
            .with_context(|| format!("open image source {}", self.origin.display()))?;
        self.pending = if meta.is_dir() {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(&self.origin)
                .with_context(|| format!("list {}", self.origin.display()))?
            {
                let path = entry?.path();
                if path.is_file() && has_image_extension(&path) {
                    files.push(path);
                }
            }
            files.sort();
            files
        } else {
            vec![self.origin.clone()]
        };
        if self.pending.is_empty() {
            return Err(anyhow!("no images found in {}", self.origin.display()));
        }
        self.next = 0;
        log::info!(
            "ImageFileSource: {} image(s) from {}",
            self.pending.len(),
            self.origin.display()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Capture> {
        let Some(path) = self.pending.get(self.next).cloned() else {
            return Ok(Capture::Ended);
        };
        self.next += 1;

        match image::open(&path) {
            Ok(image) => {
                self.frame_count += 1;
                self.last_error = None;
                Ok(Capture::Frame(Frame::new(image.into_rgb8(), self.frame_count)))
            }
            Err(err) => {
                log::warn!("ImageFileSource: skipping {}: {}", path.display(), err);
                self.last_error = Some(err.to_string());
                Ok(Capture::Empty)
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.origin.display().to_string(),
        }
    }
}
